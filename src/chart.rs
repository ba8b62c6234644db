//! Local chart rewriting.
//!
//! A chart directory holds a `values.yaml` next to its `Chart.yaml`, and
//! vendored subcharts under `charts/<name>/`. Every values file is mapped
//! and placed at the path a parent chart uses to override it, so
//! `charts/cache/charts/proxy/values.yaml` lands under `cache.proxy`.

use crate::error::{Error, Result};
use crate::mapper::ImageMapper;
use crate::tree::{self, Node};
use crate::values;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const CHART_FILE: &str = "Chart.yaml";
const VALUES_FILE: &str = "values.yaml";

/// Values files of the chart at `dir` and its subcharts, parents first.
pub fn values_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let chart = entry.path();
        if chart.join(CHART_FILE).is_file() && chart.join(VALUES_FILE).is_file() {
            files.push(chart.join(VALUES_FILE));
        }
    }
    Ok(files)
}

/// Keys a parent chart nests a subchart's values under, e.g.
/// `charts/a/charts/b/values.yaml` gives `["a", "b"]`.
fn values_path(relative: &Path) -> Vec<String> {
    let segments: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    segments
        .windows(2)
        .filter(|pair| pair[0] == "charts")
        .map(|pair| pair[1].clone())
        .collect()
}

/// Maps every values file of the chart at `dir` into one sparse document.
///
/// Subcharts are mapped before their parents, so a parent's override of a
/// subchart image wins. Empty values files contribute nothing.
pub fn rewrite<M: ImageMapper + ?Sized>(mapper: &M, dir: &Path) -> Result<Vec<u8>> {
    let files = values_files(dir)?;
    if files.is_empty() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no {} with a {} in {}", VALUES_FILE, CHART_FILE, dir.display()),
        )));
    }

    let mut output = Node::empty_mapping();
    for file in files.iter().rev() {
        let wrap = |source: Error| Error::ValuesFile {
            path: file.clone(),
            source: Box::new(source),
        };
        let content = std::fs::read(file).map_err(|err| wrap(err.into()))?;
        let document = match values::decode(&content) {
            Ok(document) => document,
            Err(Error::EmptyDocument) => continue,
            Err(err) => return Err(wrap(err)),
        };

        let relative = file.strip_prefix(dir).unwrap_or(file);
        let path = values_path(relative);
        tracing::debug!(file = %file.display(), path = ?path, "mapping values file");
        if let Some(node) = values::map_node(mapper, None, &document) {
            output.merge(node.nested(&path));
        }
    }

    Ok(tree::to_yaml(&output).into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::tests::FixedMapper;
    use std::fs;

    fn fixture() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/chart")
    }

    #[test]
    fn nests_subchart_values_under_chart_names() {
        assert!(values_path(Path::new("values.yaml")).is_empty());
        assert_eq!(values_path(Path::new("charts/cache/values.yaml")), vec!["cache"]);
        assert_eq!(
            values_path(Path::new("charts/cache/charts/proxy/values.yaml")),
            vec!["cache", "proxy"]
        );
    }

    #[test]
    fn finds_values_files_of_charts_only() {
        let root = fixture();
        let files: Vec<_> = values_files(&root)
            .unwrap()
            .into_iter()
            .map(|f| f.strip_prefix(&root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            files,
            vec![
                PathBuf::from("values.yaml"),
                PathBuf::from("charts/cache/values.yaml"),
                PathBuf::from("charts/cache/charts/proxy/values.yaml"),
            ]
        );
    }

    #[test]
    fn maps_chart_with_subcharts() {
        let mapper = FixedMapper::new(&[
            ("bitnami/redis:7.2", "cgr.dev/chainguard/redis:7.4"),
            ("redis:7.0", "cgr.dev/chainguard/redis:7.4"),
            ("oliver006/redis_exporter:v1.75.0", "cgr.dev/chainguard/prometheus-redis-exporter:v1.75.0"),
            ("docker.io/library/haproxy", "cgr.dev/chainguard/haproxy:latest"),
        ]);
        let output = String::from_utf8(rewrite(&mapper, &fixture()).unwrap()).unwrap();
        insta::assert_snapshot!(output, @r#"
        cache:
            proxy:
                image:
                    registry: cgr.dev # Original: docker.io
                    repository: chainguard/haproxy # Original: library/haproxy
            image:
                repository: cgr.dev/chainguard/redis # Original: bitnami/redis
                tag: "7.4" # Original: 7.2
            metrics:
                image: cgr.dev/chainguard/prometheus-redis-exporter:v1.75.0 # Original: oliver006/redis_exporter:v1.75.0
        image:
            # Failed to map: ghcr.io/example/app:1.0.0: no mapping found for ghcr.io/example/app:1.0.0
            repository: ghcr.io/example/app
        "#);
    }

    #[test]
    fn empty_values_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CHART_FILE), "name: app\n").unwrap();
        fs::write(dir.path().join(VALUES_FILE), "").unwrap();
        let sub = dir.path().join("charts/web");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join(CHART_FILE), "name: web\n").unwrap();
        fs::write(sub.join(VALUES_FILE), "image: nginx\n").unwrap();

        let mapper = FixedMapper::new(&[("nginx", "cgr.dev/chainguard/nginx:latest")]);
        let output = String::from_utf8(rewrite(&mapper, dir.path()).unwrap()).unwrap();
        insta::assert_snapshot!(output, @r"
        web:
            image: cgr.dev/chainguard/nginx:latest # Original: nginx
        ");
    }

    #[test]
    fn reports_the_failing_values_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CHART_FILE), "name: app\n").unwrap();
        fs::write(dir.path().join(VALUES_FILE), "image: [unclosed\n").unwrap();

        let err = rewrite(&FixedMapper::new(&[]), dir.path()).unwrap_err();
        assert!(matches!(err, Error::ValuesFile { .. }));
        assert!(err.to_string().contains(VALUES_FILE));
    }

    #[test]
    fn directory_without_chart_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(rewrite(&FixedMapper::new(&[]), dir.path()).is_err());
    }
}
