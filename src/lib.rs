//! image-mapper library for mapping upstream container images to a curated
//! catalog and rewriting the files that reference them.
//!
//! The core workflow has three phases:
//!
//! 1. **Matching**: Parse an image reference, find the catalog entries that
//!    correspond to it and pick the closest tag each one publishes
//! 2. **Rewriting**: Replace the images referenced by a Dockerfile, or
//!    produce the overrides for a Helm values file or a local chart
//! 3. **Detection**: Discover such files in a project and report which of
//!    their images have a catalog counterpart
//!
//! # Example
//!
//! ```no_run
//! use image_mapper::catalog::Catalog;
//! use image_mapper::mapper::{Mapper, MapperConfig};
//! use image_mapper::dockerfile;
//! use std::path::Path;
//!
//! let catalog = Catalog::load(Path::new("catalog.json")).unwrap().with_alias_fixes();
//!
//! // Map a single image
//! let mapper = Mapper::new(&catalog, MapperConfig::default());
//! let mapping = mapper.map("nginx:1.27").unwrap();
//! println!("{:?}", mapping.results);
//!
//! // Rewrite a Dockerfile
//! let mapper = Mapper::new(&catalog, MapperConfig::for_dockerfiles());
//! let rewritten = dockerfile::rewrite(&mapper, b"FROM python:3.12\n").unwrap();
//! print!("{}", String::from_utf8_lossy(&rewritten));
//! ```

pub mod analyzer;
pub mod catalog;
pub mod chart;
pub mod dockerfile;
pub mod error;
pub mod ignore;
pub mod images;
pub mod mapper;
pub mod matcher;
pub mod reference;
pub mod rewriter;
pub mod scanner;
pub mod tags;
pub mod tree;
pub mod values;

// Re-export commonly used types at crate root
pub use catalog::{Catalog, CatalogEntry};
pub use error::{Error, Result};
pub use mapper::{ImageMapper, Mapper, MapperConfig, Mapping};
pub use reference::ImageReference;
