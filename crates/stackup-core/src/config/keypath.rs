//! Dotted / bracketed key-paths over the configuration tree
//!
//! Accepted forms: `a.b.c`, `items[0].name`, `tags["team.name"]`,
//! `tags['x']`.

use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed key-path. Keeps its source text for error messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid key path '{path}': {reason}")]
pub struct KeyPathError {
    pub path: String,
    pub reason: String,
}

impl KeyPath {
    pub fn parse(input: &str) -> Result<Self, KeyPathError> {
        let fail = |reason: &str| KeyPathError {
            path: input.to_string(),
            reason: reason.to_string(),
        };

        let text = input.trim();
        if text.is_empty() {
            return Err(fail("empty path"));
        }

        let chars: Vec<char> = text.chars().collect();
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut i = 0;
        // true right after a `]`, where only `.` or `[` may follow
        let mut after_bracket = false;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '.' => {
                    if current.is_empty() && !after_bracket {
                        return Err(fail("empty segment"));
                    }
                    if !current.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut current)));
                    }
                    after_bracket = false;
                    i += 1;
                    if i == chars.len() {
                        return Err(fail("trailing '.'"));
                    }
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut current)));
                    } else if segments.is_empty() {
                        return Err(fail("path cannot start with '['"));
                    }
                    let close = chars[i..]
                        .iter()
                        .position(|&ch| ch == ']')
                        .map(|p| p + i)
                        .ok_or_else(|| fail("unclosed '['"))?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    segments.push(Self::bracket_segment(&inner).ok_or_else(|| {
                        fail("bracket must hold an index or a quoted key")
                    })?);
                    after_bracket = true;
                    i = close + 1;
                }
                ']' => return Err(fail("unexpected ']'")),
                c if c.is_whitespace() => return Err(fail("whitespace inside path")),
                _ => {
                    if after_bracket {
                        return Err(fail("expected '.' or '[' after ']'"));
                    }
                    current.push(c);
                    i += 1;
                }
            }
        }
        if !current.is_empty() {
            segments.push(Segment::Key(current));
        }

        Ok(Self {
            raw: text.to_string(),
            segments,
        })
    }

    fn bracket_segment(inner: &str) -> Option<Segment> {
        let inner = inner.trim();
        if let Ok(index) = inner.parse::<usize>() {
            return Some(Segment::Index(index));
        }
        let quoted = (inner.starts_with('"') && inner.ends_with('"'))
            || (inner.starts_with('\'') && inner.ends_with('\''));
        if quoted && inner.len() >= 2 {
            return Some(Segment::Key(inner[1..inner.len() - 1].to_string()));
        }
        None
    }

    /// Build a path from plain keys
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<Segment> = keys.into_iter().map(|k| Segment::Key(k.into())).collect();
        let raw = segments
            .iter()
            .map(|s| match s {
                Segment::Key(k) => k.clone(),
                Segment::Index(i) => i.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".");
        Self { raw, segments }
    }

    pub fn push(&mut self, segment: Segment) {
        match &segment {
            Segment::Key(k) => {
                if !self.raw.is_empty() {
                    self.raw.push('.');
                }
                self.raw.push_str(k);
            }
            Segment::Index(i) => self.raw.push_str(&format!("[{}]", i)),
        }
        self.segments.push(segment);
    }

    /// This path extended by one key
    pub fn child(&self, key: &str) -> Self {
        let mut path = self.clone();
        path.push(Segment::Key(key.to_string()));
        path
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// First segment as a key, if it is one
    pub fn head_key(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(k)) => Some(k),
            _ => None,
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Walk `segments` from `root`. `None` means absent; a present `null` is `Some(Value::Null)`.
pub fn get_in<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |node, seg| match (node, seg) {
        (Value::Object(map), Segment::Key(k)) => map.get(k),
        (Value::Array(items), Segment::Index(i)) => items.get(*i),
        _ => None,
    })
}

/// Write `value` at `segments`, creating intermediate mappings.
/// Non-mapping intermediates are replaced; indexes must already exist.
pub fn set_in(root: &mut Value, segments: &[Segment], value: Value) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return true;
    };

    let mut node = root;
    for seg in parents {
        node = match seg {
            Segment::Key(k) => {
                if !node.is_object() {
                    *node = Value::Object(Map::new());
                }
                match node {
                    Value::Object(map) => map
                        .entry(k.clone())
                        .or_insert_with(|| Value::Object(Map::new())),
                    _ => return false,
                }
            }
            Segment::Index(i) => match node {
                Value::Array(items) => match items.get_mut(*i) {
                    Some(item) => item,
                    None => return false,
                },
                _ => return false,
            },
        };
    }

    match last {
        Segment::Key(k) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                map.insert(k.clone(), value);
                true
            } else {
                false
            }
        }
        Segment::Index(i) => match node {
            Value::Array(items) if *i < items.len() => {
                items[*i] = value;
                true
            }
            _ => false,
        },
    }
}
