//! Rules that take catalog entries out of consideration.

use crate::catalog::CatalogEntry;
use std::fmt;

/// A predicate over catalog entries. An entry is ignored if any rule matches.
pub enum IgnoreRule {
    /// Entries in one of these tiers. Compared case-insensitively.
    Tiers(Vec<String>),
    /// Reduced-privilege `*-iamguarded` variants, FIPS ones included.
    Iamguarded,
    Custom(Box<dyn Fn(&CatalogEntry) -> bool + Send + Sync>),
}

impl IgnoreRule {
    pub fn tiers<I, S>(tiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        IgnoreRule::Tiers(
            tiers
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .collect(),
        )
    }

    pub fn custom(f: impl Fn(&CatalogEntry) -> bool + Send + Sync + 'static) -> Self {
        IgnoreRule::Custom(Box::new(f))
    }

    pub fn ignores(&self, entry: &CatalogEntry) -> bool {
        match self {
            IgnoreRule::Tiers(tiers) => {
                let tier = entry.tier.to_lowercase();
                tiers.iter().any(|t| t.to_lowercase() == tier)
            }
            IgnoreRule::Iamguarded => {
                entry.name.ends_with("iamguarded") || entry.name.ends_with("iamguarded-fips")
            }
            IgnoreRule::Custom(f) => f(entry),
        }
    }
}

impl fmt::Debug for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreRule::Tiers(tiers) => f.debug_tuple("Tiers").field(tiers).finish(),
            IgnoreRule::Iamguarded => f.write_str("Iamguarded"),
            IgnoreRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Returns true if any rule in `rules` ignores `entry`.
pub fn is_ignored(rules: &[IgnoreRule], entry: &CatalogEntry) -> bool {
    rules.iter().any(|rule| rule.ignores(entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_case_insensitive() {
        let rule = IgnoreRule::tiers(["FIPS"]);
        assert!(rule.ignores(&CatalogEntry::new("nginx-fips", "fips")));
        assert!(rule.ignores(&CatalogEntry::new("nginx-fips", "FIPS")));
        assert!(!rule.ignores(&CatalogEntry::new("nginx", "APPLICATION")));

        let literal = IgnoreRule::Tiers(vec!["Base".to_string()]);
        assert!(literal.ignores(&CatalogEntry::new("python", "BASE")));
    }

    #[test]
    fn iamguarded_names() {
        let rule = IgnoreRule::Iamguarded;
        assert!(rule.ignores(&CatalogEntry::new("redis-iamguarded", "APPLICATION")));
        assert!(rule.ignores(&CatalogEntry::new("redis-iamguarded-fips", "FIPS")));
        assert!(!rule.ignores(&CatalogEntry::new("redis", "APPLICATION")));
        assert!(!rule.ignores(&CatalogEntry::new("redis-fips", "FIPS")));
    }

    #[test]
    fn rules_combine_with_or() {
        let rules = vec![
            IgnoreRule::tiers(["fips"]),
            IgnoreRule::custom(|e| e.name.starts_with("internal-")),
        ];
        assert!(is_ignored(&rules, &CatalogEntry::new("nginx-fips", "FIPS")));
        assert!(is_ignored(&rules, &CatalogEntry::new("internal-tool", "APPLICATION")));
        assert!(!is_ignored(&rules, &CatalogEntry::new("nginx", "APPLICATION")));
        assert!(!is_ignored(&[], &CatalogEntry::new("nginx", "APPLICATION")));
    }
}
