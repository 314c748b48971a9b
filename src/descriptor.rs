//! Form descriptors and the parser seam.
//!
//! The pipeline only needs two facts from a descriptor: the class it binds
//! to and the nested descriptors it references. [`FormParser`] pulls those
//! out of `.form` XML without building a full document tree.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::DescriptorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "at", rename_all = "lowercase")]
pub enum DescriptorOrigin {
    File(PathBuf),
    Resource(String),
}

impl std::fmt::Display for DescriptorOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Resource(name) => write!(f, "resource {name}"),
        }
    }
}

/// A parsed descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorRef {
    pub class_to_bind: Option<String>,
    pub nested_forms: Vec<String>,
    pub origin: DescriptorOrigin,
}

pub trait DescriptorParser {
    fn parse(&self, bytes: &[u8], origin: DescriptorOrigin) -> Result<DescriptorRef, DescriptorError>;

    fn parse_file(&self, path: &Path) -> Result<DescriptorRef, DescriptorError> {
        let bytes = std::fs::read(path).map_err(|source| DescriptorError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(&bytes, DescriptorOrigin::File(path.to_path_buf()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FormParser;

impl DescriptorParser for FormParser {
    fn parse(&self, bytes: &[u8], origin: DescriptorOrigin) -> Result<DescriptorRef, DescriptorError> {
        let malformed = |reason: &str| DescriptorError::Malformed {
            origin: origin.to_string(),
            reason: reason.to_string(),
        };

        let text = std::str::from_utf8(bytes).map_err(|_| malformed("not valid UTF-8"))?;
        let mut class_to_bind = None;
        let mut nested_forms = Vec::new();
        let mut saw_root = false;

        for tag in start_tags(text) {
            let (name, attrs) = split_tag(tag);
            match local_name(name) {
                "form" if !saw_root => {
                    saw_root = true;
                    class_to_bind = attribute(attrs, "bind-to-class")
                        .map(|v| v.trim().to_string())
                        .filter(|v| !v.is_empty());
                }
                "nested-form" => {
                    if let Some(file) = attribute(attrs, "form-file")
                        && !nested_forms.contains(&file)
                    {
                        nested_forms.push(file);
                    }
                }
                _ if !saw_root => return Err(malformed("root element is not <form>")),
                _ => {}
            }
        }

        if !saw_root {
            return Err(malformed("missing <form> element"));
        }
        Ok(DescriptorRef {
            class_to_bind,
            nested_forms,
            origin,
        })
    }
}

/// Contents of every start or empty-element tag, skipping the prolog,
/// comments, CDATA and end tags.
fn start_tags(text: &str) -> Vec<&str> {
    let mut tags = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('<') {
        rest = &rest[open + 1..];
        let skip_to = |rest: &str, end: &str| rest.find(end).map(|i| i + end.len());
        let consumed = if rest.starts_with("!--") {
            skip_to(rest, "-->")
        } else if rest.starts_with("![CDATA[") {
            skip_to(rest, "]]>")
        } else if rest.starts_with('?') || rest.starts_with('!') || rest.starts_with('/') {
            skip_to(rest, ">")
        } else {
            let end = tag_end(rest);
            if let Some(end) = end {
                tags.push(rest[..end].trim_end_matches('/'));
            }
            end.map(|e| e + 1)
        };
        match consumed {
            Some(n) => rest = &rest[n..],
            None => break,
        }
    }
    tags
}

// Finds the closing `>` while respecting quoted attribute values.
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in tag.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_tag(tag: &str) -> (&str, &str) {
    let tag = tag.trim();
    match tag.find(char::is_whitespace) {
        Some(i) => (&tag[..i], &tag[i..]),
        None => (tag, ""),
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn attribute(attrs: &str, wanted: &str) -> Option<String> {
    let mut rest = attrs;
    loop {
        rest = rest.trim_start();
        let eq = rest.find('=')?;
        let name = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let body = &after[1..];
        let close = body.find(quote)?;
        if name == wanted {
            return Some(unescape(&body[..close]));
        }
        rest = &body[close + 1..];
    }
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
