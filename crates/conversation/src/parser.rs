//! Detects capability invocations embedded in model replies.
//!
//! The model asks for a capability by writing `[FUNCTION_CALL:<name>]`,
//! optionally followed by a JSON object with the arguments:
//!
//! ```text
//! Let me check. [FUNCTION_CALL:get_gas_price] {"chain": "ethereum"}
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Deserializer, Value};
use tracing::debug;
use tutor_core::Arguments;

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[FUNCTION_CALL:([^\]\s]+)\]").expect("marker pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub name: String,
    pub arguments: Arguments,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub display_text: String,
    pub invocation: Option<Invocation>,
}

/// Never fails: malformed arguments degrade to an empty map, and only the
/// first marker counts. Later markers stay in the display text.
pub fn parse(text: &str) -> ParsedResponse {
    let Some(captures) = MARKER.captures(text) else {
        return ParsedResponse {
            display_text: text.to_string(),
            invocation: None,
        };
    };

    // both groups always participate in a match
    let (Some(marker), Some(name)) = (captures.get(0), captures.get(1)) else {
        return ParsedResponse {
            display_text: text.to_string(),
            invocation: None,
        };
    };

    let after = &text[marker.end()..];
    let (arguments, consumed) = match leading_object(after) {
        Some((arguments, consumed)) => (arguments, consumed),
        None => (Arguments::new(), 0),
    };

    let mut display_text = String::with_capacity(text.len());
    display_text.push_str(&text[..marker.start()]);
    display_text.push_str(&after[consumed..]);

    debug!(function = name.as_str(), arguments = arguments.len(), "invocation marker found");

    ParsedResponse {
        display_text,
        invocation: Some(Invocation {
            name: name.as_str().to_string(),
            arguments,
        }),
    }
}

/// A JSON object at the start of `text` (after whitespace), with the number
/// of bytes it spans including that whitespace.
fn leading_object(text: &str) -> Option<(Arguments, usize)> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let skipped = text.len() - trimmed.len();

    let mut stream = Deserializer::from_str(trimmed).into_iter::<Value>();
    match stream.next() {
        Some(Ok(Value::Object(arguments))) => Some((arguments, skipped + stream.byte_offset())),
        _ => None,
    }
}
