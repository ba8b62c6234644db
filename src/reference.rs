//! Upstream image reference parsing.
//!
//! Parses strings like `ghcr.io/org/app:1.2.3` into registry, repository,
//! tag and digest. Follows the defaulting rules registry clients use, so
//! `nginx` and `docker.io/library/nginx` resolve to the same repository:
//!
//! - no registry component → `index.docker.io`
//! - `docker.io` → `index.docker.io`
//! - single-segment Docker Hub repositories get a `library/` prefix

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Registry assumed when a reference doesn't name one.
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

static COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").unwrap());

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").unwrap());

static DIGEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[.+_-][a-z0-9]+)*:[0-9a-fA-F]{32,}$").unwrap()
});

static REGISTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9.-]*[A-Za-z0-9])?(?::[0-9]+)?$").unwrap());

/// A parsed container image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry host, e.g. `"ghcr.io"` or `"index.docker.io"`.
    pub registry: String,
    /// Repository path without the registry, e.g. `"library/nginx"`.
    pub repository: String,
    /// Tag, if one was given. No default tag is applied.
    pub tag: Option<String>,
    /// Digest such as `sha256:...`, if one was given.
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parses an image reference string.
    ///
    /// Fails on empty input, malformed tags or digests, and repository
    /// components that aren't lowercase alphanumerics joined by `.`, `_`,
    /// `__` or dashes.
    pub fn parse(reference: &str) -> Result<Self> {
        if reference.is_empty() {
            return Err(Error::invalid(reference, "empty reference"));
        }

        let (name_tag, digest) = match reference.split_once('@') {
            Some((name, digest)) => {
                if !DIGEST.is_match(digest) {
                    return Err(Error::invalid(reference, format!("malformed digest '{}'", digest)));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A colon only starts a tag if nothing after it looks like a path.
        let (name, tag) = match name_tag.rfind(':') {
            Some(pos) if !name_tag[pos + 1..].contains('/') => {
                let tag = &name_tag[pos + 1..];
                if !TAG.is_match(tag) {
                    return Err(Error::invalid(reference, format!("malformed tag '{}'", tag)));
                }
                (&name_tag[..pos], Some(tag.to_string()))
            }
            _ => (name_tag, None),
        };

        let (registry, repository) = split_registry(name);
        if !REGISTRY.is_match(&registry) {
            return Err(Error::invalid(reference, format!("malformed registry '{}'", registry)));
        }
        if repository.is_empty() {
            return Err(Error::invalid(reference, "empty repository"));
        }
        if let Some(bad) = repository.split('/').find(|c| !COMPONENT.is_match(c)) {
            return Err(Error::invalid(
                reference,
                format!("repository component '{}' must be lowercase alphanumeric", bad),
            ));
        }

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Returns `registry/repository`, the reference without tag or digest.
    pub fn context(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Returns the final repository path segment, e.g. `nginx` for `library/nginx`.
    pub fn basename(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }

    /// Returns the repository path with `/` flattened to `-`.
    pub fn dashname(&self) -> String {
        self.repository.replace('/', "-")
    }

    /// Returns a copy whose repository path has `suffix` appended to it.
    pub fn with_repository_suffix(&self, suffix: &str) -> Self {
        ImageReference {
            repository: format!("{}{}", self.repository, suffix),
            ..self.clone()
        }
    }
}

/// Splits a name into registry and repository, applying Docker Hub defaults.
fn split_registry(name: &str) -> (String, String) {
    let (registry, repository) = match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (first.to_string(), rest.to_string())
        }
        _ => (DEFAULT_REGISTRY.to_string(), name.to_string()),
    };

    let registry = if registry == "docker.io" {
        DEFAULT_REGISTRY.to_string()
    } else {
        registry
    };

    if registry == DEFAULT_REGISTRY && !repository.is_empty() && !repository.contains('/') {
        return (registry, format!("library/{}", repository));
    }

    (registry, repository)
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ImageReference::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.context())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
