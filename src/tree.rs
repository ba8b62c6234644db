//! Annotated output tree and its YAML rendering.
//!
//! The values rewriter produces a sparse tree holding only the paths it
//! touched. Scalars may carry a line comment (`# Original: ...`) and
//! mappings a head comment, which `serde_yaml` has no way to emit, so the
//! tree is rendered here. Output uses four-space indentation.

use serde_yaml::Value;

const INDENT: usize = 4;

/// A node of the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Mapping {
        head_comment: Option<String>,
        entries: Vec<(String, Node)>,
    },
    Sequence(Vec<Node>),
    Scalar {
        value: String,
        comment: Option<String>,
    },
}

impl Node {
    pub fn empty_mapping() -> Self {
        Node::Mapping {
            head_comment: None,
            entries: Vec::new(),
        }
    }

    /// Wraps `self` in one single-entry mapping per key of `path`, so it
    /// ends up at that path.
    pub fn nested(self, path: &[String]) -> Node {
        path.iter().rev().fold(self, |node, key| Node::Mapping {
            head_comment: None,
            entries: vec![(key.clone(), node)],
        })
    }

    /// Merges `overlay` into `self`, with `overlay` winning.
    ///
    /// Mappings merge key by key. A mapping carrying image fields (scalars
    /// or a head comment) replaces those of the mapping it lands on rather
    /// than mixing with them. Anything else is replaced outright.
    pub fn merge(&mut self, overlay: Node) {
        match (self, overlay) {
            (
                Node::Mapping {
                    head_comment,
                    entries,
                },
                Node::Mapping {
                    head_comment: overlay_comment,
                    entries: overlay_entries,
                },
            ) => {
                let carries_fields = overlay_comment.is_some()
                    || overlay_entries
                        .iter()
                        .any(|(_, v)| matches!(v, Node::Scalar { .. }));
                if carries_fields {
                    entries.retain(|(_, v)| !matches!(v, Node::Scalar { .. }));
                    *head_comment = overlay_comment;
                }
                for (key, value) in overlay_entries {
                    match entries.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, existing)) => existing.merge(value),
                        None => entries.push((key, value)),
                    }
                }
            }
            (base, overlay) => *base = overlay,
        }
    }

    fn is_empty_container(&self) -> bool {
        match self {
            Node::Mapping { entries, .. } => entries.is_empty(),
            Node::Sequence(items) => items.is_empty(),
            Node::Scalar { .. } => false,
        }
    }
}

/// Renders `node` as a YAML document.
pub fn to_yaml(node: &Node) -> String {
    let mut out = String::new();
    match node {
        Node::Mapping { head_comment, .. } if node.is_empty_container() => {
            if let Some(comment) = head_comment {
                write_comment(&mut out, 0, comment);
            }
            out.push_str("{}\n");
        }
        Node::Sequence(_) if node.is_empty_container() => out.push_str("[]\n"),
        Node::Mapping { .. } | Node::Sequence(_) => write_block(&mut out, node, 0),
        Node::Scalar { value, comment } => {
            out.push_str(&format_scalar(value));
            write_line_comment(&mut out, comment.as_deref());
            out.push('\n');
        }
    }
    out
}

/// Writes a non-empty mapping or sequence starting at `indent`.
fn write_block(out: &mut String, node: &Node, indent: usize) {
    match node {
        Node::Mapping {
            head_comment,
            entries,
        } => {
            if let Some(comment) = head_comment {
                write_comment(out, indent, comment);
            }
            for (key, value) in entries {
                pad(out, indent);
                out.push_str(&format_scalar(key));
                out.push(':');
                write_value(out, value, indent + INDENT);
            }
        }
        Node::Sequence(items) => {
            for item in items {
                write_item(out, item, indent);
            }
        }
        Node::Scalar { .. } => {}
    }
}

/// Writes what follows `key:` for a value nested at `indent`.
fn write_value(out: &mut String, value: &Node, indent: usize) {
    match value {
        Node::Scalar { value, comment } => {
            out.push(' ');
            out.push_str(&format_scalar(value));
            write_line_comment(out, comment.as_deref());
            out.push('\n');
        }
        Node::Mapping { head_comment, .. } if value.is_empty_container() => {
            out.push_str(" {}");
            write_line_comment(out, head_comment.as_deref());
            out.push('\n');
        }
        Node::Sequence(_) if value.is_empty_container() => out.push_str(" []\n"),
        _ => {
            out.push('\n');
            write_block(out, value, indent);
        }
    }
}

/// Writes one `- item` line (and its continuation) at `indent`.
fn write_item(out: &mut String, item: &Node, indent: usize) {
    match item {
        Node::Mapping {
            head_comment,
            entries,
        } if !entries.is_empty() => {
            if let Some(comment) = head_comment {
                write_comment(out, indent, comment);
            }
            // Entries line up after the "- " marker.
            let mut body = String::new();
            let inner = Node::Mapping {
                head_comment: None,
                entries: entries.clone(),
            };
            write_block(&mut body, &inner, indent + 2);
            pad(out, indent);
            out.push_str("- ");
            out.push_str(&body[indent + 2..]);
        }
        Node::Sequence(items) if !items.is_empty() => {
            let mut body = String::new();
            write_block(&mut body, item, indent + 2);
            pad(out, indent);
            out.push_str("- ");
            out.push_str(&body[indent + 2..]);
        }
        _ => {
            pad(out, indent);
            out.push('-');
            write_value(out, item, indent + 2);
        }
    }
}

fn write_comment(out: &mut String, indent: usize, comment: &str) {
    for line in comment.lines() {
        pad(out, indent);
        out.push_str("# ");
        out.push_str(line);
        out.push('\n');
    }
}

fn write_line_comment(out: &mut String, comment: Option<&str>) {
    if let Some(comment) = comment {
        out.push_str(" # ");
        out.push_str(&comment.replace('\n', " "));
    }
}

fn pad(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat_n(' ', indent));
}

/// Renders a string as a plain scalar when that reads back as the same
/// string, and double-quoted otherwise.
pub fn format_scalar(value: &str) -> String {
    if is_plain_safe(value) {
        value.to_string()
    } else {
        quote(value)
    }
}

fn is_plain_safe(value: &str) -> bool {
    let Some(first) = value.chars().next() else {
        return false;
    };
    if value.trim() != value || value.chars().any(char::is_control) {
        return false;
    }
    if "[]{},#&*!|>'\"%@`".contains(first) {
        return false;
    }
    if "-?:".contains(first) && value.chars().nth(1).is_none_or(|c| c == ' ') {
        return false;
    }
    if value.contains(": ") || value.contains(" #") || value.ends_with(':') {
        return false;
    }
    // YAML 1.1 readers still treat these as booleans.
    let lower = value.to_ascii_lowercase();
    if matches!(lower.as_str(), "y" | "n" | "yes" | "no" | "on" | "off") {
        return false;
    }
    matches!(serde_yaml::from_str::<Value>(value), Ok(Value::String(s)) if s == value)
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
