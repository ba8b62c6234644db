//! Command-line interface definitions.
//!
//! Defines the argument parser and subcommands using clap's derive API.
//! Each subcommand corresponds to a distinct operation: mapping image
//! references, rewriting a Dockerfile or values file, listing scan targets,
//! or reporting the images found in a project.

use clap::{Parser, Subcommand, ValueEnum};
use image_mapper::ignore::IgnoreRule;
use image_mapper::mapper::{MapperConfig, TagFallback};
use std::path::PathBuf;

/// Map upstream container images to catalog images and rewrite references to them.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Catalog snapshot (JSON) to map against.
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    #[command(flatten)]
    pub mapper: MapperArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that maps images.
#[derive(Debug, clap::Args)]
pub struct MapperArgs {
    /// Repository prefix for mapped images.
    #[arg(long, global = true)]
    pub repository: Option<String>,

    /// Catalog tiers to leave out of the results (e.g. "FIPS,BASE").
    #[arg(long, global = true, value_delimiter = ',')]
    pub ignore_tiers: Vec<String>,

    /// Leave out iamguarded images.
    #[arg(long, global = true)]
    pub ignore_iamguarded: bool,

    /// Also consider tags that are no longer updated.
    #[arg(long, global = true)]
    pub inactive_tags: bool,

    /// Drop matches that have no suitable tag instead of returning them untagged.
    #[arg(long, global = true)]
    pub exclude_untagged: bool,
}

impl MapperArgs {
    /// Layers the flags over a preset configuration.
    pub fn apply(&self, mut config: MapperConfig) -> MapperConfig {
        if let Some(repository) = &self.repository {
            config.repository = repository.trim_end_matches('/').to_string();
        }
        if !self.ignore_tiers.is_empty() {
            config.ignore.push(IgnoreRule::tiers(&self.ignore_tiers));
        }
        if self.ignore_iamguarded {
            config.ignore.push(IgnoreRule::Iamguarded);
        }
        config.inactive_tags |= self.inactive_tags;
        if self.exclude_untagged {
            config.tag_fallback = TagFallback::Exclude;
        }
        config
    }
}

/// Output format for the `map` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One `image -> result` line per result.
    #[default]
    Text,
    /// A JSON array of mappings.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Map image references to catalog images.
    Map {
        /// Images to map. Reads one per line from stdin when empty or `-`.
        images: Vec<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Rewrite the images referenced by a Dockerfile.
    Dockerfile {
        /// Dockerfile to rewrite, or `-` for stdin.
        file: PathBuf,

        /// Write the result back to the file instead of printing it.
        #[arg(short, long)]
        write: bool,

        /// Confirm the changes before writing.
        #[arg(short, long, requires = "write")]
        interactive: bool,
    },

    /// Print the image overrides for a Helm values file.
    HelmValues {
        /// Values file to read, or `-` for stdin.
        file: PathBuf,
    },

    /// Print the image overrides for a local chart and its subcharts.
    HelmChart {
        /// Chart directory containing `Chart.yaml` and `values.yaml`.
        dir: PathBuf,
    },

    /// List files that would be scanned without processing them.
    Scan {
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Scan files and report which images map to the catalog.
    Detect {
        #[command(flatten)]
        scan: ScanArgs,

        /// Emit JSON instead of human-readable output.
        #[arg(long)]
        json: bool,

        /// Print additional diagnostics to stderr.
        #[arg(short, long)]
        verbose: bool,
    },
}

/// File discovery options.
#[derive(Debug, clap::Args)]
pub struct ScanArgs {
    /// Paths to scan. Defaults to current directory.
    #[arg(short, long)]
    pub paths: Option<Vec<PathBuf>>,

    /// Glob patterns for directories/files to exclude (e.g., "node_modules", "*.dev").
    /// By default, entries starting with `.` or `_` are excluded.
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Disable default exclusion of `.` and `_` prefixed entries.
    #[arg(long)]
    pub no_default_excludes: bool,
}

impl ScanArgs {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.clone().unwrap_or_else(|| vec![PathBuf::from(".")])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verifies_command_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_global_mapper_flags_after_subcommand() {
        let args = Args::parse_from([
            "image-mapper",
            "map",
            "nginx",
            "--catalog",
            "catalog.json",
            "--ignore-tiers",
            "fips,base",
            "--exclude-untagged",
        ]);
        assert_eq!(args.catalog, Some(PathBuf::from("catalog.json")));
        assert_eq!(args.mapper.ignore_tiers, vec!["fips", "base"]);

        let config = args.mapper.apply(MapperConfig::default());
        assert_eq!(config.ignore.len(), 1);
        assert_eq!(config.tag_fallback, TagFallback::Exclude);
        match args.command {
            Commands::Map { images, output } => {
                assert_eq!(images, vec!["nginx"]);
                assert_eq!(output, OutputFormat::Text);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn flags_extend_presets() {
        let args = Args::parse_from([
            "image-mapper",
            "--repository",
            "registry.example.com/mirror/",
            "--inactive-tags",
            "helm-values",
            "values.yaml",
        ]);
        let config = args.mapper.apply(MapperConfig::for_dockerfiles());
        assert_eq!(config.repository, "registry.example.com/mirror");
        assert!(config.inactive_tags);
        assert_eq!(config.ignore.len(), MapperConfig::for_dockerfiles().ignore.len());
    }

    #[test]
    fn parses_helm_chart_directory() {
        let args = Args::parse_from(["image-mapper", "helm-chart", "charts/app", "--catalog", "c.json"]);
        match args.command {
            Commands::HelmChart { dir } => assert_eq!(dir, PathBuf::from("charts/app")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn interactive_requires_write() {
        let result = Args::try_parse_from(["image-mapper", "dockerfile", "Dockerfile", "--interactive"]);
        assert!(result.is_err());
    }
}
