//! Structured-output extraction and validation.
//!
//! Generated text is treated as untrusted. Extraction runs in tiers:
//!
//! 1. the content of a Markdown code fence, or the whole trimmed text, parsed strictly;
//! 2. a balanced-bracket scan from each `{` / `[` in order, string-aware, first
//!    over the untouched text and then with line-level fence markers removed;
//! 3. a permissive pass that drops trailing commas and parses the widest `{...}` span.
//!
//! The first candidate that parses is checked against an [`ExpectedShape`].

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n[ \t]*```")
        .expect("valid fenced block pattern")
});

// Only fences that open or close a line; backticks inside string values stay.
static FENCE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_-]*[ \t]*|[ \t]*```[ \t]*$")
        .expect("valid fence marker pattern")
});

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid trailing comma pattern"));

static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid greedy object pattern"));

/// JSON value kinds a shape can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl ValueKind {
    /// Parse a JSON-schema type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Null => value.is_null(),
        }
    }
}

/// What an accepted value must look like.
///
/// The default accepts any JSON value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpectedShape {
    kind: Option<ValueKind>,
    required: Vec<String>,
    fields: BTreeMap<String, ValueKind>,
}

impl ExpectedShape {
    /// Accept any JSON value.
    pub fn any() -> Self {
        Self::default()
    }

    /// Require a JSON object.
    pub fn object() -> Self {
        Self {
            kind: Some(ValueKind::Object),
            ..Self::default()
        }
    }

    /// Require a field to be present on the object.
    pub fn with_required(mut self, field: impl Into<String>) -> Self {
        self.kind = Some(ValueKind::Object);
        self.required.push(field.into());
        self
    }

    /// Require a field, when present, to be of `kind`.
    pub fn with_field(mut self, field: impl Into<String>, kind: ValueKind) -> Self {
        self.kind = Some(ValueKind::Object);
        self.fields.insert(field.into(), kind);
        self
    }

    /// Read top-level `type`, `required` and `properties.*.type` from a
    /// JSON-schema-like value. Anything else in the schema is ignored.
    pub fn from_schema(schema: &Value) -> Self {
        let mut shape = Self {
            kind: schema
                .get("type")
                .and_then(Value::as_str)
                .and_then(ValueKind::parse),
            ..Self::default()
        };

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            shape.required = required
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                if let Some(kind) = property
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(ValueKind::parse)
                {
                    shape.fields.insert(name.clone(), kind);
                }
            }
        }

        if shape.kind.is_none() && !(shape.required.is_empty() && shape.fields.is_empty()) {
            shape.kind = Some(ValueKind::Object);
        }

        shape
    }

    /// Check `value`, describing the first mismatch.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if let Some(kind) = self.kind {
            if !kind.matches(value) {
                return Err(format!(
                    "expected a JSON {}, got {}",
                    kind.as_str(),
                    describe(value)
                ));
            }
        }

        let Some(object) = value.as_object() else {
            return Ok(());
        };

        if let Some(missing) = self.required.iter().find(|f| !object.contains_key(*f)) {
            return Err(format!("missing required field '{}'", missing));
        }

        for (field, kind) in &self.fields {
            if let Some(actual) = object.get(field) {
                if !kind.matches(actual) {
                    return Err(format!(
                        "field '{}' should be {}, got {}",
                        field,
                        kind.as_str(),
                        describe(actual)
                    ));
                }
            }
        }

        Ok(())
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A value accepted from generated text.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,
    /// The exact substring that parsed
    pub raw: String,
}

/// Extract the first JSON value from generated text.
pub fn extract_json(raw: &str) -> Option<Extracted> {
    strict_candidates(raw)
        .into_iter()
        .find_map(parse_candidate)
        .or_else(|| first_balanced(raw))
        .or_else(|| {
            let unfenced = FENCE_MARKER.replace_all(raw, "");
            first_balanced(&unfenced).or_else(|| permissive(&unfenced))
        })
}

/// Extract a value and check it against `shape`.
///
/// On failure returns a human-readable detail.
pub fn validate(raw: &str, shape: &ExpectedShape) -> Result<Extracted, String> {
    if raw.trim().is_empty() {
        return Err("generation returned no text".to_string());
    }

    let extracted = extract_json(raw).ok_or_else(|| "no parseable JSON value found".to_string())?;
    shape
        .check(&extracted.value)
        .map_err(|detail| format!("output does not match the expected shape: {}", detail))?;
    Ok(extracted)
}

fn strict_candidates(raw: &str) -> Vec<&str> {
    let mut candidates: Vec<&str> = FENCED_BLOCK
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .collect();
    candidates.push(raw.trim());
    candidates
}

fn parse_candidate(text: &str) -> Option<Extracted> {
    if text.is_empty() {
        return None;
    }
    serde_json::from_str::<Value>(text)
        .ok()
        .map(|value| Extracted {
            value,
            raw: text.to_string(),
        })
}

/// Try every `{` / `[` in order; return the first balanced span that parses.
fn first_balanced(text: &str) -> Option<Extracted> {
    text.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .find_map(|(start, _)| {
            balanced_end(text, start).and_then(|end| parse_candidate(&text[start..end]))
        })
}

/// Byte offset just past the bracket closing the one at `start`.
///
/// Brackets inside string literals are ignored. A mismatched closer ends the
/// scan without a match.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut expected: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => expected.push('}'),
            '[' => expected.push(']'),
            '}' | ']' => {
                if expected.pop() != Some(c) {
                    return None;
                }
                if expected.is_empty() {
                    return Some(start + offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

fn permissive(text: &str) -> Option<Extracted> {
    let cleaned = TRAILING_COMMA.replace_all(text, "$1");
    GREEDY_OBJECT
        .find(&cleaned)
        .and_then(|m| parse_candidate(m.as_str()))
}
