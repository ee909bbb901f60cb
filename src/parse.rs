//! Tolerant structured-output parsing
//!
//! Model replies arrive either as parsed JSON or as text that holds a single
//! JSON object, possibly fenced in a markdown code block or surrounded by
//! prose. Every stage that expects structured output goes through [`structured`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::backend::StructuredReply;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in reply")]
    NotFound,

    #[error("reply contains more than one JSON object")]
    Ambiguous,

    #[error("reply does not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
}

pub fn structured<T: DeserializeOwned>(reply: StructuredReply) -> Result<T, ParseError> {
    let value = match reply {
        StructuredReply::Json(value) => value,
        StructuredReply::Text(text) => extract_value(&text)?,
    };
    Ok(serde_json::from_value(value)?)
}

/// Find the JSON value carried by a text reply.
pub fn extract_value(text: &str) -> Result<Value, ParseError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(body) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(body.trim()) {
            return Ok(value);
        }
    }

    sole_object(trimmed)
}

/// Body of the first ``` fenced block, with an optional language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let tag = after[..body_start].trim();
    // The "tag" line may be the JSON itself on a single-line fence.
    let body = if tag.is_empty() || tag.chars().all(|c| c.is_ascii_alphanumeric()) {
        &after[body_start..]
    } else {
        after
    };
    let end = body.find("```")?;
    Some(&body[..end])
}

/// The only top-level `{...}` object embedded in the text.
fn sole_object(text: &str) -> Result<Value, ParseError> {
    let mut found: Option<Value> = None;
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value @ Value::Object(_))) => {
                if found.is_some() {
                    return Err(ParseError::Ambiguous);
                }
                found = Some(value);
                search_from = start + stream.byte_offset();
            }
            _ => search_from = start + 1,
        }
    }

    found.ok_or(ParseError::NotFound)
}
