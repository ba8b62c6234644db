//! Dockerfile parsing and image rewriting.
//!
//! The parser keeps just enough structure to locate image references:
//! every instruction records its keyword, flags and arguments together with
//! their byte offsets in the instruction's logical text (continuation lines
//! joined), plus the span of source it was read from.
//!
//! Rewriting collects the image sites of a document:
//!
//! - `FROM <image>` with `${ARG}` / `${ARG:-default}` resolved from ARGs
//!   declared before the first FROM
//! - `COPY --from=<image>`
//! - `RUN --mount=...,from=<image>,...`
//!
//! Stage names and `scratch` are never mapped. Each mapped site becomes an
//! edit on its instruction's logical text, and each changed instruction
//! replaces its source span. Everything else is emitted byte for byte.

use crate::error::{Error, Result};
use crate::mapper::{ImageMapper, map_image};
use crate::rewriter::{Edit, apply_edits};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

static DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*([a-zA-Z][a-zA-Z0-9]*)\s*=\s*(.+?)\s*$").unwrap());

static HEREDOC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^<<(-?)(["']?)([A-Za-z_][A-Za-z0-9_]*)(["']?)"#).unwrap());

static ARG_REFERENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

const DEFAULT_ESCAPE: char = '\\';

/// A whitespace-separated word of an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Raw text, quotes included.
    pub text: String,
    /// Byte offset in the instruction's logical text.
    pub offset: usize,
}

impl Token {
    fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.text.len()
    }
}

/// One parsed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Lowercased, e.g. `"from"`.
    pub keyword: String,
    /// Leading `--name[=value]` tokens.
    pub flags: Vec<Token>,
    pub args: Vec<Token>,
    /// Continuation lines joined with the escape characters removed.
    pub text: String,
    /// 1-based, inclusive. Heredoc bodies count towards `end_line`.
    pub start_line: usize,
    pub end_line: usize,
    /// Source bytes the logical text was read from, starting at the keyword.
    /// Heredoc bodies are not included.
    pub span: Range<usize>,
}

impl Instruction {
    /// Returns the value of the first `--name=value` flag together with its
    /// offset in the logical text.
    pub fn flag(&self, name: &str) -> Option<(usize, &str)> {
        let prefix = format!("--{}=", name);
        self.flags.iter().find_map(|f| {
            let value = f.text.strip_prefix(prefix.as_str())?;
            Some((f.offset + prefix.len(), value))
        })
    }
}

/// A parsed Dockerfile.
#[derive(Debug, Clone)]
pub struct Dockerfile {
    pub escape: char,
    pub instructions: Vec<Instruction>,
}

struct Line<'a> {
    /// Line content without the line terminator.
    content: &'a str,
    start: usize,
}

impl Line<'_> {
    fn end(&self) -> usize {
        self.start + self.content.len()
    }
}

fn split_lines(source: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for raw in source.split_inclusive('\n') {
        let content = raw.strip_suffix('\n').unwrap_or(raw);
        let content = content.strip_suffix('\r').unwrap_or(content);
        lines.push(Line { content, start });
        start += raw.len();
    }
    lines
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Strips a trailing escape character (and whitespace after it).
fn continuation(content: &str, escape: char) -> Option<&str> {
    content.trim_end().strip_suffix(escape)
}

/// Parses `source` into instructions.
pub fn parse(source: &str) -> Result<Dockerfile> {
    let lines = split_lines(source);
    let mut escape = DEFAULT_ESCAPE;

    // Parser directives are only recognised before anything else.
    let mut index = 0;
    while let Some(line) = lines.get(index) {
        let Some(caps) = DIRECTIVE.captures(line.content) else {
            break;
        };
        match caps[1].to_lowercase().as_str() {
            "escape" => {
                escape = match &caps[2] {
                    "\\" => '\\',
                    "`" => '`',
                    other => {
                        return Err(Error::Dockerfile(format!(
                            "invalid escape token '{}' does not match ` or \\",
                            other
                        )));
                    }
                }
            }
            "syntax" | "check" => {}
            _ => break,
        }
        index += 1;
    }

    let mut instructions = Vec::new();
    while index < lines.len() {
        let line = &lines[index];
        let trimmed = line.content.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            index += 1;
            continue;
        }

        let start_line = index + 1;
        let span_start = line.end() - trimmed.len();
        let mut span_end;
        let mut text = String::new();
        let mut current = trimmed;
        loop {
            let Some(joined) = continuation(current, escape) else {
                text.push_str(current);
                span_end = lines[index].end();
                break;
            };
            text.push_str(joined);
            span_end = lines[index].end();

            // Blank and comment lines inside a continuation are dropped.
            index += 1;
            while index < lines.len()
                && (lines[index].content.trim().is_empty() || is_comment(lines[index].content))
            {
                index += 1;
            }
            match lines.get(index) {
                Some(next) => current = next.content,
                None => {
                    index -= 1;
                    break;
                }
            }
        }
        let mut end_line = index + 1;
        index += 1;

        let tokens = tokenize(&text, escape);
        let Some((keyword, rest)) = tokens.split_first() else {
            continue;
        };
        let keyword = keyword.text.to_lowercase();
        let flag_count = rest.iter().take_while(|t| t.text.starts_with("--")).count();
        let (flags, args) = rest.split_at(flag_count);

        // Heredoc bodies are skipped so their lines are not read as instructions.
        if matches!(keyword.as_str(), "run" | "copy" | "add") {
            for token in args {
                let Some(caps) = HEREDOC.captures(&token.text) else {
                    continue;
                };
                let delimiter = &caps[3];
                let strip_tabs = &caps[1] == "-";
                while let Some(line) = lines.get(index) {
                    index += 1;
                    let candidate = if strip_tabs {
                        line.content.trim_start_matches('\t')
                    } else {
                        line.content
                    };
                    if candidate == delimiter {
                        break;
                    }
                }
                end_line = index;
            }
        }

        instructions.push(Instruction {
            keyword,
            flags: flags.to_vec(),
            args: args.to_vec(),
            text,
            start_line,
            end_line,
            span: span_start..span_end,
        });
    }

    if instructions.is_empty() {
        return Err(Error::Dockerfile("file with no instructions".to_string()));
    }

    Ok(Dockerfile {
        escape,
        instructions,
    })
}

/// Splits logical text into tokens. Quoted segments stay within one token.
fn tokenize(text: &str, escape: char) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut quote: Option<char> = None;
        let mut end = text.len();
        while let Some(&(i, c)) = chars.peek() {
            if quote.is_none() && c.is_whitespace() {
                end = i;
                break;
            }
            chars.next();
            if c == escape {
                chars.next();
            } else if quote == Some(c) {
                quote = None;
            } else if quote.is_none() && (c == '"' || c == '\'') {
                quote = Some(c);
            }
        }

        tokens.push(Token {
            text: text[start..end].to_string(),
            offset: start,
        });
    }
    tokens
}

/// Where an image reference was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageKind {
    /// `FROM <image>`
    From,
    /// `COPY --from=<image>`
    CopyFrom,
    /// `RUN --mount=...,from=<image>`
    RunMount,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageKind::From => "FROM",
            ImageKind::CopyFrom => "COPY --from",
            ImageKind::RunMount => "RUN --mount",
        })
    }
}

/// An image reference discovered in a Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    /// The image with build arguments resolved.
    pub image: String,
    pub kind: ImageKind,
    pub line: usize,
}

struct Site {
    instruction: usize,
    kind: ImageKind,
    image: String,
    /// Range of the text to replace in the instruction's logical text.
    range: Range<usize>,
}

#[derive(Default)]
struct Scope {
    stages: HashSet<String>,
    args: HashMap<String, String>,
    seen_from: bool,
}

impl Scope {
    fn is_stage(&self, name: &str) -> bool {
        // `--from=0` refers to a stage by index.
        (!name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()))
            || self.stages.contains(&name.to_lowercase())
    }

    /// Substitutes `${NAME}` and `${NAME:-default}`. Unknown names without a
    /// default are left as written.
    fn resolve(&self, expr: &str) -> String {
        ARG_REFERENCE
            .replace_all(expr, |caps: &Captures| {
                let inner = &caps[1];
                let (name, default) = match inner.split_once(":-") {
                    Some((name, default)) => (name, default),
                    None => (inner, ""),
                };
                if let Some(value) = self.args.get(name) {
                    value.clone()
                } else if !default.is_empty() {
                    default.to_string()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }
}

/// Walks the instructions top to bottom and returns every image site.
fn image_sites(dockerfile: &Dockerfile) -> Vec<Site> {
    let mut scope = Scope::default();
    let mut sites = Vec::new();

    for (index, instruction) in dockerfile.instructions.iter().enumerate() {
        match instruction.keyword.as_str() {
            // Only ARGs declared before the first FROM apply to FROM lines.
            "arg" if !scope.seen_from => {
                for arg in &instruction.args {
                    if let Some((name, value)) = arg.text.split_once('=') {
                        let value = value.trim_matches(|c| c == '"' || c == '\'');
                        scope.args.insert(name.to_string(), value.to_string());
                    }
                }
            }
            "from" => {
                scope.seen_from = true;
                let Some(image) = instruction.args.first() else {
                    continue;
                };
                let resolved = scope.resolve(&image.text);
                if resolved.eq_ignore_ascii_case("scratch") || scope.is_stage(&resolved) {
                    tracing::debug!(line = instruction.start_line, image = %resolved, "skipping stage reference");
                } else {
                    sites.push(Site {
                        instruction: index,
                        kind: ImageKind::From,
                        image: resolved,
                        range: image.range(),
                    });
                }
                if let [_, keyword, stage, ..] = instruction.args.as_slice()
                    && keyword.text.eq_ignore_ascii_case("as")
                {
                    scope.stages.insert(stage.text.to_lowercase());
                }
            }
            "copy" => {
                let Some((start, value)) = instruction.flag("from") else {
                    continue;
                };
                if scope.is_stage(value) {
                    continue;
                }
                sites.push(Site {
                    instruction: index,
                    kind: ImageKind::CopyFrom,
                    image: value.to_string(),
                    range: start..start + value.len(),
                });
            }
            "run" => {
                for flag in &instruction.flags {
                    let Some(options) = flag.text.strip_prefix("--mount=") else {
                        continue;
                    };
                    let mut offset = flag.offset + "--mount=".len();
                    for option in options.split(',') {
                        if let Some(value) = option.strip_prefix("from=")
                            && !value.is_empty()
                            && !scope.is_stage(value)
                        {
                            let start = offset + "from=".len();
                            sites.push(Site {
                                instruction: index,
                                kind: ImageKind::RunMount,
                                image: value.to_string(),
                                range: start..start + value.len(),
                            });
                        }
                        offset += option.len() + 1;
                    }
                }
            }
            _ => {}
        }
    }

    sites
}

fn decode(input: &[u8]) -> Result<&str> {
    std::str::from_utf8(input)
        .map_err(|e| Error::Dockerfile(format!("input is not valid UTF-8: {}", e)))
}

/// Lists the image references in a Dockerfile without mapping them.
pub fn extract_images(input: &[u8]) -> Result<Vec<ImageRef>> {
    let dockerfile = parse(decode(input)?)?;
    Ok(image_sites(&dockerfile)
        .into_iter()
        .map(|site| ImageRef {
            image: site.image,
            kind: site.kind,
            line: dockerfile.instructions[site.instruction].start_line,
        })
        .collect())
}

/// Maps every image in a Dockerfile and returns the rewritten document.
///
/// Images that fail to map are logged and left as they are. A rewritten
/// instruction that spanned several lines is collapsed onto one.
pub fn rewrite<M: ImageMapper + ?Sized>(mapper: &M, input: &[u8]) -> Result<Vec<u8>> {
    let source = decode(input)?;
    let dockerfile = parse(source)?;

    let mut pending: BTreeMap<usize, Vec<Edit>> = BTreeMap::new();
    for site in image_sites(&dockerfile) {
        let line = dockerfile.instructions[site.instruction].start_line;
        match map_image(mapper, &site.image) {
            Ok(mapped) => {
                tracing::debug!(line, image = %site.image, mapped = %mapped, "mapped image");
                pending
                    .entry(site.instruction)
                    .or_default()
                    .push(Edit::new(site.range.start, site.range.end, mapped.to_string()));
            }
            Err(err) => {
                tracing::warn!(line, image = %site.image, kind = %site.kind, "error mapping image: {}", err);
            }
        }
    }

    let edits = pending
        .into_iter()
        .filter_map(|(index, edits)| {
            let instruction = &dockerfile.instructions[index];
            let text = apply_edits(&instruction.text, edits);
            (text != instruction.text)
                .then(|| Edit::new(instruction.span.start, instruction.span.end, text))
        })
        .collect();

    Ok(apply_edits(source, edits).into_bytes())
}
