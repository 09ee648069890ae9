//! Compiled JSON path locator
//!
//! Accepted forms: `$.a.b`, `a.b`, `a[0].b`, `a.0.b`. A numeric dotted
//! segment indexes arrays and also matches an object key of the same text.
//! The empty path never resolves.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let trimmed = raw.trim();
        let body = match trimmed.strip_prefix('$') {
            Some(rest) => rest.strip_prefix('.').unwrap_or(rest),
            None => trimmed,
        };
        if trimmed == "$" {
            return Err("path '$' selects the whole document, not a field".to_string());
        }

        let mut segments = Vec::new();
        if body.is_empty() {
            return Ok(Self {
                raw: raw.to_string(),
                segments,
            });
        }
        for part in body.split('.') {
            if part.is_empty() {
                return Err(format!("path '{}' has an empty segment", raw));
            }
            let (key, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }
            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .ok_or_else(|| format!("path '{}' has an unclosed '['", raw))?;
                let index = rest[1..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| format!("path '{}' has a non-numeric index", raw))?;
                segments.push(Segment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(format!("path '{}' has text after an index", raw));
                }
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Resolve against a document; `None` when any segment is missing.
    pub fn get<'a>(&self, document: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        if self.segments.is_empty() {
            return None;
        }
        let mut current = document;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), serde_json::Value::Object(map)) => map.get(key)?,
                (Segment::Key(key), serde_json::Value::Array(items)) => {
                    items.get(key.parse::<usize>().ok()?)?
                }
                (Segment::Index(idx), serde_json::Value::Array(items)) => items.get(*idx)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Normalized form used to detect two spellings of the same location.
    pub fn canonical(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Key(k) => k.clone(),
                Segment::Index(i) => i.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
