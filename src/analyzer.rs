//! Image detection and mapping report.
//!
//! Extracts image references from discovered Dockerfiles and values files,
//! maps each one, and summarises which images have a catalog counterpart
//! and why the others do not.

use crate::dockerfile::{self, ImageKind};
use crate::mapper::ImageMapper;
use crate::scanner::{FileKind, ScanTarget};
use crate::values;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

/// An image reference found in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageOccurrence {
    pub image: String,
    /// Source file containing the reference.
    pub file: PathBuf,
    /// Line number, 1-indexed. Values files carry no position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Instruction that referenced the image, for Dockerfiles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<ImageKind>,
}

/// An occurrence together with its mapping outcome.
#[derive(Debug, Clone, Serialize)]
pub struct DetectedImage {
    #[serde(flatten)]
    pub occurrence: ImageOccurrence,
    /// Mapped references, best first. Empty when unmapped.
    pub results: Vec<String>,
    /// Explanation when no result exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DetectedImage {
    pub fn is_mapped(&self) -> bool {
        !self.results.is_empty()
    }
}

/// A file that could not be read or parsed.
#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub file: PathBuf,
    pub error: String,
}

/// Summary statistics from a detection run.
#[derive(Debug, Default, Serialize)]
pub struct Diagnostics {
    pub files_scanned: usize,
    pub files_failed: usize,
    pub total_images: usize,
    pub mapped: usize,
    pub unmapped: usize,
}

/// Complete detection results.
#[derive(Debug, Serialize)]
pub struct DetectionResult {
    pub images: Vec<DetectedImage>,
    pub errors: Vec<FileError>,
    pub diagnostics: Diagnostics,
}

/// Mappers to use for each kind of file.
#[derive(Clone, Copy)]
pub struct Mappers<'a> {
    pub dockerfile: &'a dyn ImageMapper,
    pub values: &'a dyn ImageMapper,
}

impl<'a> Mappers<'a> {
    fn for_kind(&self, kind: FileKind) -> &'a dyn ImageMapper {
        match kind {
            FileKind::Dockerfile => self.dockerfile,
            FileKind::Values => self.values,
        }
    }
}

/// Reads `target` and lists the image references it contains.
pub fn extract_occurrences(target: &ScanTarget) -> Result<Vec<ImageOccurrence>> {
    let content = std::fs::read(&target.path)
        .with_context(|| format!("Failed to read {}", target.path.display()))?;

    let occurrences = match target.kind {
        FileKind::Dockerfile => dockerfile::extract_images(&content)
            .with_context(|| format!("Failed to parse {}", target.path.display()))?
            .into_iter()
            .map(|found| ImageOccurrence {
                image: found.image,
                file: target.path.clone(),
                line: Some(found.line),
                instruction: Some(found.kind),
            })
            .collect(),
        FileKind::Values => values::image_candidates(&content)
            .with_context(|| format!("Failed to parse {}", target.path.display()))?
            .into_iter()
            .map(|image| ImageOccurrence {
                image,
                file: target.path.clone(),
                line: None,
                instruction: None,
            })
            .collect(),
    };

    Ok(occurrences)
}

/// Maps each occurrence, recording results or the reason there are none.
///
/// Returns the detected images and how many of them mapped.
pub fn analyze(
    occurrences: &[ImageOccurrence],
    mapper: &dyn ImageMapper,
) -> (Vec<DetectedImage>, usize) {
    let mut detected = Vec::with_capacity(occurrences.len());
    let mut mapped_count = 0;

    for occurrence in occurrences {
        let (results, reason) = match mapper.map(&occurrence.image) {
            Ok(mapping) if mapping.results.is_empty() => {
                (Vec::new(), Some("No matching catalog entry".to_string()))
            }
            Ok(mapping) => (mapping.results, None),
            Err(err) => (Vec::new(), Some(err.to_string())),
        };
        if reason.is_none() {
            mapped_count += 1;
        }
        detected.push(DetectedImage {
            occurrence: occurrence.clone(),
            results,
            reason,
        });
    }

    (detected, mapped_count)
}

/// Runs extraction and analysis over every target.
///
/// Files that cannot be read or parsed are reported in
/// [`DetectionResult::errors`] and do not stop the run.
pub fn detect(targets: &[ScanTarget], mappers: Mappers<'_>) -> DetectionResult {
    let mut images = Vec::new();
    let mut errors = Vec::new();
    let mut mapped = 0;

    for target in targets {
        match extract_occurrences(target) {
            Ok(occurrences) => {
                let (detected, count) = analyze(&occurrences, mappers.for_kind(target.kind));
                mapped += count;
                images.extend(detected);
            }
            Err(err) => {
                tracing::warn!(file = %target.path.display(), "skipping file: {:#}", err);
                errors.push(FileError {
                    file: target.path.clone(),
                    error: format!("{:#}", err),
                });
            }
        }
    }

    let diagnostics = Diagnostics {
        files_scanned: targets.len(),
        files_failed: errors.len(),
        total_images: images.len(),
        mapped,
        unmapped: images.len() - mapped,
    };

    DetectionResult {
        images,
        errors,
        diagnostics,
    }
}
