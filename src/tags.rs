//! Picking the best catalog tag for an upstream tag.
//!
//! An exact match always wins. Otherwise tags are compared as versions
//! (`3`, `3.12`, `v3.12.4`, with any `-suffix` ignored) and the closest
//! version that is not lower than the upstream one is chosen:
//!
//! ```text
//! 2      -> 3
//! 3.7    -> 3.9
//! 3.11.1 -> 3.11.5
//! ```

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(v?)(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:-.*)?$").unwrap());

/// How many version components a tag spells out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specificity {
    Major,
    Minor,
    Patch,
}

/// A tag read as a version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagVersion {
    pub has_v: bool,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub specificity: Specificity,
}

impl TagVersion {
    /// Parses a version-like tag. Returns `None` for irregular tags such as
    /// `latest` or `bookworm`.
    pub fn parse(tag: &str) -> Option<Self> {
        let caps = VERSION.captures(tag)?;
        let component = |i: usize| -> Option<Option<u64>> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().ok().map(Some),
                None => Some(None),
            }
        };

        let major = component(2)??;
        let minor = component(3)?;
        let patch = component(4)?;
        let specificity = match (minor, patch) {
            (_, Some(_)) => Specificity::Patch,
            (Some(_), None) => Specificity::Minor,
            (None, None) => Specificity::Major,
        };

        Some(TagVersion {
            has_v: caps.get(1).is_some_and(|m| !m.as_str().is_empty()),
            major,
            minor: minor.unwrap_or(0),
            patch: patch.unwrap_or(0),
            specificity,
        })
    }

    /// Whether `other` can stand in for this version at all.
    fn comparable(&self, other: &TagVersion) -> bool {
        self.specificity == other.specificity && self.has_v == other.has_v
    }

    fn numeric_cmp(&self, other: &TagVersion) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

/// Returns the best tag in `available` for `tag`, or `None`.
///
/// Versions are never downgraded. When several candidates compare equal,
/// the first one in `available` wins, so `3.13` listed before `3.13-dev`
/// is preferred.
pub fn best_tag<S: AsRef<str>>(available: &[S], tag: &str) -> Option<String> {
    if let Some(exact) = available.iter().find(|t| t.as_ref() == tag) {
        return Some(exact.as_ref().to_string());
    }

    let wanted = TagVersion::parse(tag)?;
    let mut best: Option<(TagVersion, &str)> = None;
    for candidate in available {
        let candidate = candidate.as_ref();
        let Some(version) = TagVersion::parse(candidate) else {
            continue;
        };
        if !version.comparable(&wanted) || version.numeric_cmp(&wanted) == Ordering::Less {
            continue;
        }
        if let Some((current, _)) = &best
            && version.numeric_cmp(current) != Ordering::Less
        {
            continue;
        }
        best = Some((version, candidate));
    }

    best.map(|(_, t)| t.to_string())
}

/// An inclusion rule over tag names. A tag is kept if any filter accepts it.
pub enum TagFilter {
    /// Development variants, e.g. `3.12-dev`.
    Dev,
    /// Everything except development variants.
    NonDev,
    Custom(Box<dyn Fn(&str) -> bool + Send + Sync>),
}

impl TagFilter {
    pub fn custom(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        TagFilter::Custom(Box::new(f))
    }

    pub fn accepts(&self, tag: &str) -> bool {
        match self {
            TagFilter::Dev => tag.ends_with("-dev"),
            TagFilter::NonDev => !tag.ends_with("-dev"),
            TagFilter::Custom(f) => f(tag),
        }
    }
}

impl fmt::Debug for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagFilter::Dev => f.write_str("Dev"),
            TagFilter::NonDev => f.write_str("NonDev"),
            TagFilter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Keeps the tags accepted by at least one filter; no filters keeps all.
pub fn filter_tags<'a>(tags: &[&'a str], filters: &[TagFilter]) -> Vec<&'a str> {
    if filters.is_empty() {
        return tags.to_vec();
    }
    tags.iter()
        .copied()
        .filter(|tag| filters.iter().any(|f| f.accepts(tag)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVE: &[&str] = &[
        "latest", "latest-dev", "3", "3.14", "3.14.2", "3.13", "3.13.6", "v3", "v3.14",
        "v3.14.2", "v3.13", "v3.13.6",
    ];

    #[test]
    fn parses_versions() {
        let v = TagVersion::parse("v3.12.4-r1").unwrap();
        assert!(v.has_v);
        assert_eq!((v.major, v.minor, v.patch), (3, 12, 4));
        assert_eq!(v.specificity, Specificity::Patch);

        assert_eq!(TagVersion::parse("3").unwrap().specificity, Specificity::Major);
        assert_eq!(TagVersion::parse("3.1-alpine").unwrap().specificity, Specificity::Minor);
        assert_eq!(TagVersion::parse("latest"), None);
        assert_eq!(TagVersion::parse(""), None);
        assert_eq!(TagVersion::parse("3.x"), None);
    }

    #[test]
    fn best_tag_table() {
        let cases = [
            ("3.14.2", Some("3.14.2")),
            ("3.13", Some("3.13")),
            ("3", Some("3")),
            ("3.14.1", Some("3.14.2")),
            ("3.12.5", Some("3.13.6")),
            ("3.12", Some("3.13")),
            ("2", Some("3")),
            ("v3.14.2", Some("v3.14.2")),
            ("v3.13", Some("v3.13")),
            ("v3", Some("v3")),
            ("v3.14.1", Some("v3.14.2")),
            ("v3.12", Some("v3.13")),
            ("v2", Some("v3")),
            ("4", None),
            ("v4", None),
            ("3.15", None),
            ("3.14.3", None),
            ("invalid", None),
            ("", None),
            ("3.14.2-alpine", Some("3.14.2")),
            ("3.13-alpine", Some("3.13")),
            ("3-alpine", Some("3")),
            ("v3.13-alpine", Some("v3.13")),
            ("3.12.5-alpine", Some("3.13.6")),
            ("v2-alpine", Some("v3")),
            ("3.15-alpine", None),
            ("latest", Some("latest")),
            ("latest-dev", Some("latest-dev")),
        ];
        for (tag, expected) in cases {
            assert_eq!(
                best_tag(ACTIVE, tag).as_deref(),
                expected,
                "best tag for {:?}",
                tag
            );
        }
    }

    #[test]
    fn nearest_higher_patch_in_next_minor() {
        assert_eq!(best_tag(&["3.13", "3.13.6", "3.14"], "3.12.5").as_deref(), Some("3.13.6"));
    }

    #[test]
    fn never_downgrades() {
        assert_eq!(best_tag(&["1.20", "1.21"], "1.25"), None);
        assert_eq!(best_tag(&["1.24", "1.26", "1.27"], "1.25").as_deref(), Some("1.26"));
    }

    #[test]
    fn first_equal_candidate_wins() {
        assert_eq!(best_tag(&["3.13-dev", "3.13"], "3.12").as_deref(), Some("3.13-dev"));
        assert_eq!(best_tag(&["3.13", "3.13-dev"], "3.12").as_deref(), Some("3.13"));
    }

    #[test]
    fn v_marker_must_agree() {
        assert_eq!(best_tag(&["v1.3"], "1.2"), None);
        assert_eq!(best_tag(&["1.3", "v1.3"], "v1.2").as_deref(), Some("v1.3"));
    }

    #[test]
    fn filters_combine_with_or() {
        let tags = ["1.0", "1.0-dev", "latest", "latest-dev"];
        assert_eq!(filter_tags(&tags, &[]), tags.to_vec());
        assert_eq!(filter_tags(&tags, &[TagFilter::Dev]), vec!["1.0-dev", "latest-dev"]);
        assert_eq!(filter_tags(&tags, &[TagFilter::NonDev]), vec!["1.0", "latest"]);
        assert_eq!(
            filter_tags(&tags, &[TagFilter::Dev, TagFilter::custom(|t| t == "latest")]),
            vec!["1.0-dev", "latest", "latest-dev"]
        );
    }
}
