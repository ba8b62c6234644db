//! Values document rewriting.
//!
//! Walks a chart values document looking for image-shaped mappings:
//!
//! ```yaml
//! image:
//!   registry: ghcr.io       # optional
//!   repository: foo/bar     # or `image:` / `name:`
//!   tag: v0.0.1             # optional
//! ```
//!
//! or simply `image: ghcr.io/foo/bar:v0.0.1`. Each one is mapped and the
//! result is a new, sparse document containing only the touched paths,
//! with the previous values kept as `# Original:` comments. Callers merge
//! it over the original file.

use crate::error::{Error, Result};
use crate::mapper::{ImageMapper, map_image};
use crate::reference::ImageReference;
use crate::tree::{self, Node};
use marked_yaml::{types::MarkedMappingNode, Node as YamlNode};

/// The image-related scalar fields of one mapping.
///
/// `Some("")` means the key is present but empty or null.
#[derive(Debug, Default)]
struct ImageFields {
    registry: Option<String>,
    image: Option<String>,
    name: Option<String>,
    repository: Option<String>,
    tag: Option<String>,
}

fn has_value(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.is_empty())
}

/// Source text of a scalar, so `7.10` stays `7.10`. Null reads as empty.
fn scalar_text(value: &YamlNode) -> Option<String> {
    let YamlNode::Scalar(scalar) = value else {
        return None;
    };
    match scalar.as_str() {
        "~" | "null" | "Null" | "NULL" => Some(String::new()),
        text => Some(text.to_string()),
    }
}

impl ImageFields {
    /// Extracts the fields of `map` if it looks like an image.
    ///
    /// A `name` is too generic on its own, so a mapping with one only counts
    /// when the parent key is `image` or a `registry`/`tag` sibling exists.
    /// Otherwise the whole mapping is skipped, e.g. a container with both a
    /// `name` and an `image`.
    fn extract(parent_key: Option<&str>, map: &MarkedMappingNode) -> Option<Self> {
        let mut fields = ImageFields::default();
        for (key, value) in map.iter() {
            let slot = match key.as_str() {
                "registry" => &mut fields.registry,
                "image" => &mut fields.image,
                "name" => &mut fields.name,
                "repository" => &mut fields.repository,
                "tag" => &mut fields.tag,
                _ => continue,
            };
            *slot = scalar_text(value);
        }

        if has_value(&fields.name)
            && !(parent_key == Some("image") || fields.registry.is_some() || fields.tag.is_some())
        {
            return None;
        }
        if !(has_value(&fields.repository) || has_value(&fields.name) || has_value(&fields.image)) {
            return None;
        }
        Some(fields)
    }

    /// Builds `registry/` + (repository | image | name) + `:tag`.
    fn candidate(&self) -> String {
        let mut image = [&self.repository, &self.image, &self.name]
            .into_iter()
            .find(|f| has_value(f))
            .and_then(|f| f.clone())
            .unwrap_or_default();
        if has_value(&self.registry)
            && let Some(registry) = &self.registry
        {
            image = format!("{}/{}", registry, image);
        }
        if has_value(&self.tag)
            && let Some(tag) = &self.tag
        {
            image = format!("{}:{}", image, tag);
        }
        image
    }

    /// Field values after mapping to `mapped`.
    fn remapped(&self, mapped: &ImageReference) -> ImageFields {
        let set = |field: &Option<String>, value: &str| field.as_ref().map(|_| value.to_string());

        let mut out = ImageFields {
            registry: set(&self.registry, &mapped.registry),
            image: set(&self.image, &mapped.context()),
            name: set(&self.name, &mapped.context()),
            repository: set(&self.repository, &mapped.context()),
            tag: self.tag.clone(),
        };
        // Without a tag field, `image` is most likely a full reference.
        if self.tag.is_none() {
            out.image = set(&self.image, &mapped.to_string());
        }
        // The registry is carried separately.
        if self.registry.is_some() {
            out.image = set(&self.image, &mapped.repository);
            out.name = set(&self.name, &mapped.repository);
            out.repository = set(&self.repository, &mapped.repository);
        }
        // An untagged result means `latest`; `entries` drops it when unchanged.
        if has_value(&self.tag) {
            out.tag = Some(mapped.tag.clone().unwrap_or_else(|| "latest".to_string()));
        }
        out
    }

    /// Renders the present fields. `tag` is only included when it changed.
    fn entries(&self, original: &ImageFields) -> Vec<(String, Node)> {
        let annotate = |new: &Option<String>, old: &Option<String>| -> Option<Node> {
            let new = new.as_ref()?;
            let old = old.as_deref().unwrap_or_default();
            let comment = (new != old).then(|| {
                let shown = if old.is_empty() { "\"\"" } else { old };
                format!("Original: {}", shown)
            });
            Some(Node::Scalar {
                value: new.clone(),
                comment,
            })
        };

        let mut entries = Vec::new();
        for (key, new, old) in [
            ("registry", &self.registry, &original.registry),
            ("image", &self.image, &original.image),
            ("name", &self.name, &original.name),
            ("repository", &self.repository, &original.repository),
        ] {
            if let Some(node) = annotate(new, old) {
                entries.push((key.to_string(), node));
            }
        }
        if self.tag != original.tag
            && let Some(node) = annotate(&self.tag, &original.tag)
        {
            entries.push(("tag".to_string(), node));
        }
        entries
    }
}

/// Maps the image fields of one mapping node, returning its output entries
/// and, on failure, a head comment.
fn map_fields<M: ImageMapper + ?Sized>(
    mapper: &M,
    fields: &ImageFields,
) -> (Vec<(String, Node)>, Option<String>) {
    let image = fields.candidate();
    match map_image(mapper, &image) {
        Ok(mapped) => {
            tracing::debug!(image = %image, mapped = %mapped, "mapped image");
            (fields.remapped(&mapped).entries(fields), None)
        }
        Err(err) => {
            tracing::warn!(image = %image, "error mapping image: {}", err);
            (
                fields.entries(fields),
                Some(format!("Failed to map: {}: {}", image, err)),
            )
        }
    }
}

/// Returns the sparse output sub-tree for `value`, or `None` when nothing
/// under it was touched.
pub fn map_node<M: ImageMapper + ?Sized>(
    mapper: &M,
    parent_key: Option<&str>,
    value: &YamlNode,
) -> Option<Node> {
    match value {
        YamlNode::Mapping(map) => {
            let (mut entries, head_comment) = match ImageFields::extract(parent_key, map) {
                Some(fields) => map_fields(mapper, &fields),
                None => (Vec::new(), None),
            };

            // Scalar fields are consumed above; containers are always walked.
            for (key, child) in map.iter() {
                if matches!(child, YamlNode::Scalar(_)) {
                    continue;
                }
                if let Some(node) = map_node(mapper, Some(key.as_str()), child) {
                    entries.push((key.as_str().to_string(), node));
                }
            }

            if entries.is_empty() && head_comment.is_none() {
                return None;
            }
            Some(Node::Mapping {
                head_comment,
                entries,
            })
        }
        YamlNode::Sequence(items) => {
            let touched: Vec<Node> = items
                .iter()
                .filter_map(|item| map_node(mapper, parent_key, item))
                .collect();
            (!touched.is_empty()).then_some(Node::Sequence(touched))
        }
        YamlNode::Scalar(_) => None,
    }
}

/// Parses a values document, keeping scalars as written.
pub(crate) fn decode(input: &[u8]) -> Result<YamlNode> {
    let text = std::str::from_utf8(input).map_err(|err| Error::Yaml(err.to_string()))?;
    if text.trim().is_empty() {
        return Err(Error::EmptyDocument);
    }
    let root = marked_yaml::parse_yaml(0, text).map_err(|err| Error::Yaml(err.to_string()))?;
    if scalar_text(&root).is_some_and(|text| text.is_empty()) {
        return Err(Error::EmptyDocument);
    }
    Ok(root)
}

/// Maps every image in a values document and returns the sparse result.
///
/// Images that fail to map are kept with a `Failed to map` comment. An
/// input with nothing image-shaped produces `{}`.
pub fn rewrite<M: ImageMapper + ?Sized>(mapper: &M, input: &[u8]) -> Result<Vec<u8>> {
    let root = decode(input)?;
    let output = map_node(mapper, None, &root).unwrap_or_else(Node::empty_mapping);
    Ok(tree::to_yaml(&output).into_bytes())
}

/// Lists the candidate image references in a values document, in
/// document order, without mapping them.
pub fn image_candidates(input: &[u8]) -> Result<Vec<String>> {
    fn walk(parent_key: Option<&str>, value: &YamlNode, out: &mut Vec<String>) {
        match value {
            YamlNode::Mapping(map) => {
                if let Some(fields) = ImageFields::extract(parent_key, map) {
                    out.push(fields.candidate());
                }
                for (key, child) in map.iter() {
                    walk(Some(key.as_str()), child, out);
                }
            }
            YamlNode::Sequence(items) => {
                for item in items.iter() {
                    walk(parent_key, item, out);
                }
            }
            YamlNode::Scalar(_) => {}
        }
    }

    let root = decode(input)?;
    let mut candidates = Vec::new();
    walk(None, &root, &mut candidates);
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, CatalogEntry};
    use crate::mapper::tests::FixedMapper;
    use crate::mapper::{Mapper, MapperConfig};

    fn rewrite_str(mapper: &FixedMapper, input: &str) -> String {
        String::from_utf8(rewrite(mapper, input.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn maps_repository_and_tag() {
        let mapper = FixedMapper::new(&[("redis:7.2", "cgr.dev/chainguard/redis:7.4")]);
        let output = rewrite_str(&mapper, "image:\n  repository: redis\n  tag: \"7.2\"\n");
        insta::assert_snapshot!(output, @r#"
        image:
            repository: cgr.dev/chainguard/redis # Original: redis
            tag: "7.4" # Original: 7.2
        "#);
    }

    #[test]
    fn maps_chart_values() {
        let input = r#"
prometheus:
    image: prom/prometheus:v2.18.1
redis-example:
    exporter:
        enabled: true
        image: ghcr.io/oliver006/redis_exporter
        tag: v1.75.0
    haproxy:
        enabled: false
        image:
            repository: ecr-public.aws.com/docker/library/haproxy
    image:
        registry: ecr-public.aws.com
        repository: docker/library/redis
proxy:
  traefik:
    image:
      name: traefik
      tag: v3.6.4

global:
  revisionHistoryLimit: 3
  image:
    repository: quay.io/argoproj/argocd
    tag: ""

prometheus-example:
  admissionWebhooks:
      deployment:
          image:
              registry: "quay.io"
              repository: prometheus-operator/admission-webhook
      patch:
          image:
              registry: "ghcr.io"
              repository: jkroepke/kube-webhook-certgen
  image:
      registry: ""
      repository: prometheus-operator/prometheus-operator
      tag: ""
      sha: ""
"#;
        let mapper = FixedMapper::new(&[
            ("ecr-public.aws.com/docker/library/haproxy", "cgr.dev/chainguard/haproxy:latest"),
            ("ecr-public.aws.com/docker/library/redis", "cgr.dev/chainguard/redis:latest"),
            ("ghcr.io/jkroepke/kube-webhook-certgen", "cgr.dev/chainguard/kube-webhook-certgen:latest"),
            ("ghcr.io/oliver006/redis_exporter:v1.75.0", "cgr.dev/chainguard/prometheus-redis-exporter:v1.76.0"),
            ("quay.io/argoproj/argocd", "cgr.dev/chainguard/argocd:latest"),
            ("quay.io/prometheus-operator/admission-webhook", "cgr.dev/chainguard/prometheus-admission-webhook:latest"),
            ("prom/prometheus:v2.18.1", "cgr.dev/chainguard/prometheus:v2.56.0"),
            ("prometheus-operator/prometheus-operator", "cgr.dev/chainguard/prometheus-operator:latest"),
            ("traefik:v3.6.4", "cgr.dev/chainguard/traefik:v3.6.4"),
        ]);
        insta::assert_snapshot!(rewrite_str(&mapper, input), @r#"
        prometheus:
            image: cgr.dev/chainguard/prometheus:v2.56.0 # Original: prom/prometheus:v2.18.1
        redis-example:
            exporter:
                image: cgr.dev/chainguard/prometheus-redis-exporter # Original: ghcr.io/oliver006/redis_exporter
                tag: v1.76.0 # Original: v1.75.0
            haproxy:
                image:
                    repository: cgr.dev/chainguard/haproxy # Original: ecr-public.aws.com/docker/library/haproxy
            image:
                registry: cgr.dev # Original: ecr-public.aws.com
                repository: chainguard/redis # Original: docker/library/redis
        proxy:
            traefik:
                image:
                    name: cgr.dev/chainguard/traefik # Original: traefik
        global:
            image:
                repository: cgr.dev/chainguard/argocd # Original: quay.io/argoproj/argocd
        prometheus-example:
            admissionWebhooks:
                deployment:
                    image:
                        registry: cgr.dev # Original: quay.io
                        repository: chainguard/prometheus-admission-webhook # Original: prometheus-operator/admission-webhook
                patch:
                    image:
                        registry: cgr.dev # Original: ghcr.io
                        repository: chainguard/kube-webhook-certgen # Original: jkroepke/kube-webhook-certgen
            image:
                registry: cgr.dev # Original: ""
                repository: chainguard/prometheus-operator # Original: prometheus-operator/prometheus-operator
        "#);
    }

    #[test]
    fn failed_mapping_is_annotated() {
        let mapper = FixedMapper::new(&[]);
        let output = rewrite_str(&mapper, "sidecar:\n  image: example.com/tool\n  tag: \"1\"\n");
        insta::assert_snapshot!(output, @r"
        sidecar:
            # Failed to map: example.com/tool:1: no mapping found for example.com/tool:1
            image: example.com/tool
        ");
    }

    #[test]
    fn generic_name_is_ignored() {
        let mapper = FixedMapper::new(&[("nginx", "cgr.dev/chainguard/nginx:latest")]);
        let output = rewrite_str(&mapper, "serviceAccount:\n  name: nginx\n  create: true\n");
        assert_eq!(output, "{}\n");
    }

    #[test]
    fn walks_children_of_image_nodes_and_sequences() {
        let mapper = FixedMapper::new(&[
            ("nginx:1.25", "cgr.dev/chainguard/nginx:1.25"),
            ("busybox", "cgr.dev/chainguard/busybox:latest"),
        ]);
        let input = "\
app:
  image: nginx:1.25
  initContainers:
    - name: init
      command: [sh]
    - image: busybox
      imagePullPolicy: IfNotPresent
  env:
    - name: FOO
      value: bar
";
        insta::assert_snapshot!(rewrite_str(&mapper, input), @r"
        app:
            image: cgr.dev/chainguard/nginx:1.25 # Original: nginx:1.25
            initContainers:
                - image: cgr.dev/chainguard/busybox:latest # Original: busybox
        ");
    }

    #[test]
    fn named_containers_are_skipped() {
        let mapper = FixedMapper::new(&[("nginx", "cgr.dev/chainguard/nginx:latest")]);
        assert_eq!(rewrite_str(&mapper, "sidecar:\n  name: helper\n  image: nginx\n"), "{}\n");
        assert!(image_candidates(b"containers:\n  - name: app\n    image: nginx\n").unwrap().is_empty());
    }

    #[test]
    fn unchanged_tag_is_omitted() {
        let mapper = FixedMapper::new(&[("ghcr.io/org/app:1.2.3", "cgr.dev/chainguard/app:1.2.3")]);
        let output = rewrite_str(&mapper, "image:\n  repository: ghcr.io/org/app\n  tag: 1.2.3\n");
        let tree: serde_yaml::Value = serde_yaml::from_str(&output).unwrap();
        assert_eq!(tree["image"]["repository"], serde_yaml::Value::from("cgr.dev/chainguard/app"));
        assert!(tree["image"].get("tag").is_none());
    }

    #[test]
    fn numeric_tags_keep_their_source_text() {
        assert_eq!(
            image_candidates(b"image:\n  repository: redis\n  tag: 7.10\n").unwrap(),
            vec!["redis:7.10"]
        );

        let mapper = FixedMapper::new(&[("redis:7.10", "cgr.dev/chainguard/redis:7.10")]);
        let output = rewrite_str(&mapper, "image:\n  repository: redis\n  tag: 7.10\n");
        insta::assert_snapshot!(output, @r"
        image:
            repository: cgr.dev/chainguard/redis # Original: redis
        ");
    }

    #[test]
    fn untagged_result_sets_latest() {
        let catalog = Catalog::new(vec![CatalogEntry::new("redis", "APPLICATION").with_tags(&["7.4"])]);
        let mapper = Mapper::new(&catalog, MapperConfig::for_values());
        let output = String::from_utf8(
            rewrite(&mapper, b"image:\n  repository: redis\n  tag: \"9.0\"\n").unwrap(),
        )
        .unwrap();
        insta::assert_snapshot!(output, @r"
        image:
            repository: cgr.dev/chainguard/redis # Original: redis
            tag: latest # Original: 9.0
        ");
    }

    #[test]
    fn empty_documents_are_errors() {
        let mapper = FixedMapper::new(&[]);
        assert!(matches!(rewrite(&mapper, b""), Err(Error::EmptyDocument)));
        assert!(matches!(rewrite(&mapper, b"  \n\n"), Err(Error::EmptyDocument)));
        assert!(matches!(rewrite(&mapper, b"key: [unclosed"), Err(Error::Yaml(_))));
    }

    #[test]
    fn unrelated_documents_produce_empty_mapping() {
        let mapper = FixedMapper::new(&[]);
        assert_eq!(rewrite_str(&mapper, "replicas: 3\nservice:\n  port: 80\n"), "{}\n");
    }

    #[test]
    fn map_node_returns_sparse_subtree() {
        let mapper = FixedMapper::new(&[("redis", "cgr.dev/chainguard/redis:latest")]);
        let value = decode(b"a:\n  image: redis\nb:\n  c: 1\n").unwrap();
        let node = map_node(&mapper, None, &value).unwrap();
        insta::assert_snapshot!(tree::to_yaml(&node), @r"
        a:
            image: cgr.dev/chainguard/redis:latest # Original: redis
        ");
        assert!(map_node(&mapper, Some("b"), &decode(b"c: 1\n").unwrap()).is_none());
    }

    #[test]
    fn lists_candidates() {
        let input = b"\
image:
  registry: quay.io
  repository: argoproj/argocd
  tag: v2.9.0
workers:
  - image: redis:7
config:
  name: not-an-image
";
        assert_eq!(
            image_candidates(input).unwrap(),
            vec!["quay.io/argoproj/argocd:v2.9.0", "redis:7"]
        );
    }
}
