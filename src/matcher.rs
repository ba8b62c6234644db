//! Deciding whether a catalog entry corresponds to an upstream reference.
//!
//! Rules are tried in order and the first success wins. None of them look
//! at tags; tag selection happens afterwards in [`crate::tags`].

use crate::catalog::CatalogEntry;
use crate::reference::ImageReference;

/// Suffix carried by reduced-privilege variants of an image.
pub const IAMGUARDED_SUFFIX: &str = "-iamguarded";

type Rule = fn(&ImageReference, &CatalogEntry) -> bool;

const RULES: &[(&str, Rule)] = &[
    ("basename", matches_basename),
    ("dashname", matches_dashname),
    ("iamguarded", matches_iamguarded),
    ("alias", matches_alias),
];

/// Returns true when `entry` is a replacement candidate for `reference`.
pub fn matches(reference: &ImageReference, entry: &CatalogEntry) -> bool {
    for (rule, check) in RULES {
        if check(reference, entry) {
            tracing::debug!(reference = %reference, entry = %entry.name, rule, "matched");
            return true;
        }
    }
    false
}

fn name_or_fips(candidate: &str, name: &str) -> bool {
    candidate == name || name.strip_suffix("-fips") == Some(candidate)
}

/// `ghcr.io/foo/bar/nginx` matches `nginx` (or `nginx-fips`).
fn matches_basename(reference: &ImageReference, entry: &CatalogEntry) -> bool {
    name_or_fips(reference.basename(), &entry.name)
}

/// `ghcr.io/stakater/reloader` matches `stakater-reloader`.
fn matches_dashname(reference: &ImageReference, entry: &CatalogEntry) -> bool {
    name_or_fips(&reference.dashname(), &entry.name)
}

fn matches_iamguarded(reference: &ImageReference, entry: &CatalogEntry) -> bool {
    let guarded = reference.with_repository_suffix(IAMGUARDED_SUFFIX);
    matches_basename(&guarded, entry) || matches_dashname(&guarded, entry)
}

/// Compares against the entry's aliases by full context, by registry-less
/// path, or by the alias path flattened with dashes. Basenames alone are
/// too generic to count.
fn matches_alias(reference: &ImageReference, entry: &CatalogEntry) -> bool {
    let context = reference.context();
    entry.aliases.iter().any(|alias| {
        let Ok(alias) = ImageReference::parse(alias) else {
            return false;
        };
        context == alias.context()
            || reference.repository == alias.repository
            || reference.repository == alias.dashname()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(reference: &str, entry: CatalogEntry) -> bool {
        matches(&ImageReference::parse(reference).unwrap(), &entry)
    }

    fn entry(name: &str) -> CatalogEntry {
        CatalogEntry::new(name, "APPLICATION")
    }

    #[test]
    fn basename() {
        assert!(check("nginx", entry("nginx")));
        assert!(check("gcr.io/project/prometheus", entry("prometheus")));
        assert!(check("bitnami/nginx", entry("nginx")));
        assert!(check("nginx", entry("nginx-fips")));
        assert!(!check("nginx", entry("apache")));
        assert!(!check("nginx-proxy", entry("nginx")));
    }

    #[test]
    fn dashname() {
        assert!(check("ghcr.io/stakater/reloader", entry("stakater-reloader")));
        assert!(check("ghcr.io/foo/bar/baz", entry("foo-bar-baz")));
        assert!(check("stakater/reloader", entry("stakater-reloader-fips")));
        assert!(!check("nginx", entry("nginx-something")));
        assert!(!check("stakater/reloader", entry("different-reloader")));
    }

    #[test]
    fn iamguarded_variants() {
        assert!(check("nginx", entry("nginx-iamguarded")));
        assert!(check("nginx", entry("nginx-iamguarded-fips")));
        assert!(check("gcr.io/project/nginx", entry("nginx-iamguarded")));
        assert!(check("stakater/reloader", entry("stakater-reloader-iamguarded")));
        assert!(check(
            "registry.example.com/stakater/reloader",
            entry("stakater-reloader-iamguarded-fips")
        ));
    }

    #[test]
    fn alias_full_repository() {
        assert!(check("nginx", entry("nginx-something").with_aliases(&["nginx"])));
        assert!(check(
            "gcr.io/project/nginx",
            entry("web").with_aliases(&["apache", "gcr.io/project/nginx"])
        ));
    }

    #[test]
    fn alias_mirrored_path() {
        assert!(check(
            "mirror.internal/argoproj/argocli",
            entry("argo-cli").with_aliases(&["quay.io/argoproj/argocli"])
        ));
    }

    #[test]
    fn alias_flattened_path() {
        assert!(check(
            "custom.registry.com/ingress-foobar",
            entry("ingress-foobar-something").with_aliases(&["ghcr.io/ingress/foobar"])
        ));
        assert!(check(
            "registry.example.com/org-suborg-project",
            entry("project").with_aliases(&["org/suborg/project"])
        ));
    }

    #[test]
    fn alias_never_matches_on_basename() {
        assert!(!check(
            "custom.registry.com/cert-manager/controller",
            entry("nginx-something").with_aliases(&["fluxcd/controller"])
        ));
    }

    #[test]
    fn alias_no_match() {
        assert!(!check(
            "nginx",
            entry("nginx-something").with_aliases(&["apache", "gcr.io/project/httpd"])
        ));
    }

    #[test]
    fn unparseable_alias_is_skipped() {
        assert!(check(
            "quay.io/minio/mc",
            entry("minio-client").with_aliases(&["NOT::VALID", "quay.io/minio/mc"])
        ));
    }

    #[test]
    fn tags_are_not_consulted() {
        assert!(check("nginx:does-not-exist", entry("nginx").with_tags(&["1.25"])));
    }
}
