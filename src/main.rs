//! image-mapper: map upstream container images to catalog images.
//!
//! Maps image references given on the command line or stdin, rewrites
//! Dockerfiles and Helm values files to use the mapped images, and reports
//! the images referenced across a project.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, Commands, MapperArgs, OutputFormat, ScanArgs};
use colored::Colorize;
use image_mapper::analyzer::{self, DetectionResult, Mappers};
use image_mapper::catalog::Catalog;
use image_mapper::images::{ArgImages, ReaderImages};
use image_mapper::mapper::{Mapper, MapperConfig, Mapping, map_image};
use image_mapper::{chart, dockerfile, rewriter, scanner, values};
use std::io::{self, IsTerminal, Read, Write};
use std::path::Path;

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    match args.command {
        Commands::Map { images, output } => {
            cmd_map(args.catalog.as_deref(), &args.mapper, images, output)
        }
        Commands::Dockerfile {
            file,
            write,
            interactive,
        } => cmd_dockerfile(args.catalog.as_deref(), &args.mapper, &file, write, interactive),
        Commands::HelmValues { file } => {
            cmd_helm_values(args.catalog.as_deref(), &args.mapper, &file)
        }
        Commands::HelmChart { dir } => cmd_helm_chart(args.catalog.as_deref(), &args.mapper, &dir),
        Commands::Scan { scan } => cmd_scan(&scan),
        Commands::Detect {
            scan,
            json,
            verbose,
        } => cmd_detect(args.catalog.as_deref(), &args.mapper, &scan, json, verbose),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_ansi(io::stderr().is_terminal())
        .init();
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    let path = path.context("--catalog is required for this command")?;
    let catalog = Catalog::load(path)
        .with_context(|| format!("Failed to load catalog {}", path.display()))?;
    Ok(catalog.with_alias_fixes())
}

fn is_stdin(file: &Path) -> bool {
    file == Path::new("-")
}

fn read_input(file: &Path) -> Result<Vec<u8>> {
    if is_stdin(file) {
        let mut buf = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn write_output(content: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(content)?;
    stdout.flush()?;
    Ok(())
}

fn cmd_map(
    catalog: Option<&Path>,
    mapper_args: &MapperArgs,
    images: Vec<String>,
    output: OutputFormat,
) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    let mapper = Mapper::new(&catalog, mapper_args.apply(MapperConfig::default()));

    let mappings = if images.is_empty() || images == ["-"] {
        mapper.map_all(ReaderImages::new(io::stdin().lock()))
    } else {
        mapper.map_all(ArgImages::new(images))
    }
    .context("Failed to map images")?;

    match output {
        OutputFormat::Text => print_mappings(&mappings),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&mappings)?),
    }

    Ok(())
}

fn print_mappings(mappings: &[Mapping]) {
    for mapping in mappings {
        if mapping.results.is_empty() {
            println!("{} ->", mapping.image);
        }
        for result in &mapping.results {
            println!("{} -> {}", mapping.image, result);
        }
    }
}

fn cmd_dockerfile(
    catalog: Option<&Path>,
    mapper_args: &MapperArgs,
    file: &Path,
    write: bool,
    interactive: bool,
) -> Result<()> {
    if write && is_stdin(file) {
        anyhow::bail!("--write needs a file path, not stdin");
    }

    let catalog = load_catalog(catalog)?;
    let mapper = Mapper::new(&catalog, mapper_args.apply(MapperConfig::for_dockerfiles()));

    if !write {
        let input = read_input(file)?;
        let output = dockerfile::rewrite(&mapper, &input)
            .with_context(|| format!("Failed to rewrite {}", file.display()))?;
        return write_output(&output);
    }

    if interactive {
        let input = read_input(file)?;
        if !print_dockerfile_changes(&mapper, file, &input)? {
            println!("{} No changes to apply", "info:".blue().bold());
            return Ok(());
        }
        if !confirm(&format!("Apply changes to {}?", file.display()))? {
            println!("{} Skipped {}", "info:".blue().bold(), file.display());
            return Ok(());
        }
    }

    let changed = rewriter::rewrite_file(file, |content| dockerfile::rewrite(&mapper, content))
        .with_context(|| format!("Failed to rewrite {}", file.display()))?;

    if changed {
        println!("{} Updated {}", "ok:".green().bold(), file.display());
    } else {
        println!("{} No changes to apply", "info:".blue().bold());
    }

    Ok(())
}

/// Prints the image replacements a rewrite would make, returning whether
/// there are any.
fn print_dockerfile_changes(mapper: &Mapper<'_>, file: &Path, input: &[u8]) -> Result<bool> {
    let found = dockerfile::extract_images(input)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let changes: Vec<_> = found
        .iter()
        .filter_map(|image_ref| {
            let mapped = map_image(mapper, &image_ref.image).ok()?.to_string();
            (mapped != image_ref.image).then_some((image_ref, mapped))
        })
        .collect();

    if changes.is_empty() {
        return Ok(false);
    }

    println!("\n{} {}", "Would update:".yellow().bold(), file.display());
    for (image_ref, mapped) in &changes {
        println!(
            "  {}: {} {} -> {}",
            image_ref.line,
            image_ref.kind.to_string().dimmed(),
            image_ref.image.red(),
            mapped.green()
        );
    }

    Ok(true)
}

fn confirm(prompt: &str) -> Result<bool> {
    let answer = dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact_opt()?
        .unwrap_or(false);
    Ok(answer)
}

fn cmd_helm_values(catalog: Option<&Path>, mapper_args: &MapperArgs, file: &Path) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    let mapper = Mapper::new(&catalog, mapper_args.apply(MapperConfig::for_values()));

    let input = read_input(file)?;
    let output = values::rewrite(&mapper, &input)
        .with_context(|| format!("Failed to rewrite {}", file.display()))?;
    write_output(&output)
}

fn cmd_helm_chart(catalog: Option<&Path>, mapper_args: &MapperArgs, dir: &Path) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    let mapper = Mapper::new(&catalog, mapper_args.apply(MapperConfig::for_values()));

    let output = chart::rewrite(&mapper, dir)
        .with_context(|| format!("Failed to map chart {}", dir.display()))?;
    write_output(&output)
}

fn cmd_scan(scan: &ScanArgs) -> Result<()> {
    let files = scanner::collect_files(&scan.paths(), &scan.exclude, !scan.no_default_excludes)?;

    println!("Would scan {} files:", files.len());
    for file in files {
        println!("  {} {}", file.path.display(), format!("({})", file.kind).dimmed());
    }

    Ok(())
}

fn cmd_detect(
    catalog: Option<&Path>,
    mapper_args: &MapperArgs,
    scan: &ScanArgs,
    json_output: bool,
    verbose: bool,
) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    if verbose {
        eprintln!(
            "{} Catalog contains {} entries",
            "info:".blue().bold(),
            catalog.len()
        );
    }

    let files = scanner::collect_files(&scan.paths(), &scan.exclude, !scan.no_default_excludes)?;
    if verbose {
        eprintln!(
            "{} Found {} files to scan",
            "info:".blue().bold(),
            files.len()
        );
    }

    let dockerfile_mapper =
        Mapper::new(&catalog, mapper_args.apply(MapperConfig::for_dockerfiles()));
    let values_mapper = Mapper::new(&catalog, mapper_args.apply(MapperConfig::for_values()));
    let result = analyzer::detect(
        &files,
        Mappers {
            dockerfile: &dockerfile_mapper,
            values: &values_mapper,
        },
    );

    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_detection_result(&result, verbose);
    }

    Ok(())
}

fn print_detection_result(result: &DetectionResult, verbose: bool) {
    let d = &result.diagnostics;

    if verbose {
        println!(
            "\n{} Files: {} ({} failed), Images: {} ({} mapped, {} unmapped)",
            "Diagnostics:".bold(),
            d.files_scanned,
            d.files_failed,
            d.total_images,
            d.mapped,
            d.unmapped
        );
    }

    for error in &result.errors {
        eprintln!(
            "{} {}: {}",
            "warn:".yellow().bold(),
            error.file.display(),
            error.error
        );
    }

    if result.images.is_empty() {
        println!("{} No images found", "ok:".green().bold());
        return;
    }

    println!(
        "\n{} {} image reference(s), {} unmapped:\n",
        "Found".bold(),
        d.total_images,
        d.unmapped
    );

    for detected in &result.images {
        let occurrence = &detected.occurrence;
        let loc = match occurrence.line {
            Some(line) => format!("{}:{}", occurrence.file.display(), line),
            None => occurrence.file.display().to_string(),
        };

        if detected.is_mapped() {
            println!("  {} {}", loc.dimmed(), occurrence.image);
            for mapped in &detected.results {
                println!("    {} {}", "->".green(), mapped.green());
            }
        } else {
            println!(
                "  {} {} {}",
                loc.dimmed(),
                occurrence.image.red(),
                format!("({})", detected.reason.as_deref().unwrap_or("no mapping")).dimmed()
            );
        }
    }

    if d.unmapped == 0 {
        println!("\n{} All images map to the catalog", "ok:".green().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(relative: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(relative)
    }

    fn no_flags() -> MapperArgs {
        MapperArgs {
            repository: None,
            ignore_tiers: Vec::new(),
            ignore_iamguarded: false,
            inactive_tags: false,
            exclude_untagged: false,
        }
    }

    #[test]
    fn catalog_is_required() {
        let err = load_catalog(None).unwrap_err();
        assert!(err.to_string().contains("--catalog"));
    }

    #[test]
    fn loads_catalog_with_alias_fixes() {
        let catalog = load_catalog(Some(&fixture("tests/fixtures/catalog.json"))).unwrap();
        assert!(catalog.entries().iter().any(|e| e.name == "nginx"));
    }

    #[test]
    fn missing_catalog_reports_path() {
        let err = load_catalog(Some(Path::new("does-not-exist.json"))).unwrap_err();
        assert!(format!("{:#}", err).contains("does-not-exist.json"));
    }

    #[test]
    fn reads_input_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Dockerfile");
        std::fs::write(&file, "FROM nginx\n").unwrap();
        assert_eq!(read_input(&file).unwrap(), b"FROM nginx\n");
        assert!(is_stdin(Path::new("-")));
        assert!(!is_stdin(&file));
    }

    #[test]
    fn helm_chart_requires_a_chart() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = fixture("tests/fixtures/catalog.json");
        let err = cmd_helm_chart(Some(&catalog), &no_flags(), dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Chart.yaml"));
    }

    #[test]
    fn dockerfile_write_updates_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Dockerfile");
        std::fs::write(&file, "FROM python:3.12\nRUN pip install flask\n").unwrap();
        let catalog = fixture("tests/fixtures/catalog.json");

        cmd_dockerfile(Some(&catalog), &no_flags(), &file, true, false).unwrap();
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "FROM cgr.dev/chainguard/python:3.12-dev\nRUN pip install flask\n"
        );
    }
}
