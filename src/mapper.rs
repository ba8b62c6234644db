//! Mapping upstream images onto catalog entries.
//!
//! A [`Mapper`] borrows a [`Catalog`] snapshot and a [`MapperConfig`]. For a
//! single image it returns every non-ignored matching entry, formatted as
//! `{repository}/{name}[:{tag}]` and sorted.

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::ignore::{IgnoreRule, is_ignored};
use crate::matcher;
use crate::reference::ImageReference;
use crate::tags::{TagFilter, best_tag, filter_tags};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;

/// Repository prefix used when none is configured.
pub const DEFAULT_REPOSITORY: &str = "cgr.dev/chainguard";

/// The images one upstream reference maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub image: String,
    /// Sorted and deduplicated. Empty when nothing matched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<String>,
}

/// What to do with a matching entry when no tag qualifies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagFallback {
    /// Keep the entry as an untagged reference.
    #[default]
    Untagged,
    /// Drop the entry from the results.
    Exclude,
}

/// Mapper settings. Every field has a usable default.
#[derive(Debug)]
pub struct MapperConfig {
    /// Prefix for result references, without a trailing slash.
    pub repository: String,
    pub ignore: Vec<IgnoreRule>,
    /// Tag inclusion rules, combined with OR. Empty keeps every tag.
    pub tag_filters: Vec<TagFilter>,
    /// Also match against tags that are no longer updated.
    pub inactive_tags: bool,
    pub tag_fallback: TagFallback,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            repository: DEFAULT_REPOSITORY.to_string(),
            ignore: Vec::new(),
            tag_filters: Vec::new(),
            inactive_tags: false,
            tag_fallback: TagFallback::default(),
        }
    }
}

impl MapperConfig {
    /// Defaults for build files: skip iamguarded and FIPS entries and prefer
    /// `-dev` tags, which ship a shell and package manager.
    pub fn for_dockerfiles() -> Self {
        MapperConfig {
            ignore: vec![IgnoreRule::Iamguarded, IgnoreRule::tiers(["FIPS"])],
            tag_filters: vec![TagFilter::Dev],
            ..Default::default()
        }
    }

    /// Defaults for chart values: charts pin specific versions, so inactive
    /// tags are considered, and `-dev` tags are excluded.
    pub fn for_values() -> Self {
        MapperConfig {
            ignore: vec![IgnoreRule::Iamguarded, IgnoreRule::tiers(["FIPS"])],
            tag_filters: vec![TagFilter::NonDev],
            inactive_tags: true,
            ..Default::default()
        }
    }
}

/// Anything that can map a single image string.
///
/// The rewriters are written against this trait rather than [`Mapper`].
pub trait ImageMapper {
    fn map(&self, image: &str) -> Result<Mapping>;
}

/// Maps images against a borrowed catalog snapshot.
#[derive(Debug)]
pub struct Mapper<'a> {
    catalog: &'a Catalog,
    config: MapperConfig,
}

impl<'a> Mapper<'a> {
    pub fn new(catalog: &'a Catalog, config: MapperConfig) -> Self {
        Mapper { catalog, config }
    }

    /// Maps one image. Malformed references are an error; no match is not.
    pub fn map(&self, image: &str) -> Result<Mapping> {
        let reference = ImageReference::parse(image)?;
        let prefix = self.config.repository.trim_end_matches('/');

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for entry in self.catalog.entries() {
            // Entries without a tier aren't resolvable from the catalog.
            if entry.tier.is_empty() || is_ignored(&self.config.ignore, entry) {
                continue;
            }
            if !matcher::matches(&reference, entry) || !seen.insert(entry.name.as_str()) {
                continue;
            }

            let base = format!("{}/{}", prefix, entry.name);
            let Some(tag) = &reference.tag else {
                results.push(base);
                continue;
            };

            let tags = filter_tags(&entry.tags(self.config.inactive_tags), &self.config.tag_filters);
            match (best_tag(&tags, tag), self.config.tag_fallback) {
                (Some(best), _) => results.push(format!("{}:{}", base, best)),
                (None, TagFallback::Untagged) => results.push(base),
                (None, TagFallback::Exclude) => {
                    tracing::debug!(image, entry = %entry.name, "no qualifying tag, excluding entry");
                }
            }
        }

        results.sort();
        results.dedup();
        Ok(Mapping {
            image: image.to_string(),
            results,
        })
    }

    /// Maps every image from `images`, skipping repeats.
    ///
    /// Stops at the first error, whether it comes from the source or from
    /// [`Mapper::map`].
    pub fn map_all<I>(&self, images: I) -> Result<Vec<Mapping>>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        let mut seen = HashSet::new();
        let mut mappings = Vec::new();
        for image in images {
            let image = image?;
            if seen.contains(&image) {
                continue;
            }
            mappings.push(self.map(&image)?);
            seen.insert(image);
        }
        Ok(mappings)
    }
}

impl ImageMapper for Mapper<'_> {
    fn map(&self, image: &str) -> Result<Mapping> {
        Mapper::map(self, image)
    }
}

/// Maps `image` and returns the first result as a parsed reference.
pub fn map_image<M: ImageMapper + ?Sized>(mapper: &M, image: &str) -> Result<ImageReference> {
    let mapping = mapper.map(image)?;
    let first = mapping
        .results
        .first()
        .ok_or_else(|| Error::NoMatch(image.to_string()))?;
    ImageReference::parse(first)
}
