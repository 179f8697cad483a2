//! Pluggable context-sensitive output escaping.
//!
//! The evaluator consults the installed [`AutoEscaper`] when an output
//! statement emits a value. [`Value::Safe`] strings bypass escaping
//! entirely, and with no escaper installed every value passes through
//! unmodified.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Where in the output document the value is being emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, Serialize, Deserialize)]
pub enum EscapeContext {
    #[default]
    Html,
    HtmlAttribute,
    Js,
    Css,
    Url,
    /// No escaping regardless of the installed escaper.
    Plain,
}

/// Escaping policy hook.
///
/// Implementations receive the already-coerced string form of the value and
/// the emission context. The `Safe` bypass is enforced by the evaluator, so
/// escapers never see pre-escaped content.
pub trait AutoEscaper: fmt::Debug + Send + Sync {
    fn escape(&self, value: &str, context: EscapeContext) -> String;
}

/// Escapes the five HTML-significant characters.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// Escapes a string for embedding inside a JS string literal.
#[must_use]
pub fn escape_js_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // a literal '<' could open a closing </script> tag
            '<' => out.push_str("\\u003C"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            other => out.push(other),
        }
    }
    out
}

/// Percent-encodes everything outside the URL-safe set.
#[must_use]
pub fn escape_url(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            other => {
                out.push_str(&format!("%{other:02X}"));
            }
        }
    }
    out
}

/// Hex-escapes CSS-significant characters.
#[must_use]
pub fn escape_css(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '_' {
            out.push(c);
        } else {
            out.push_str(&format!("\\{:X} ", c as u32));
        }
    }
    out
}

/// The shipped escaper: dispatches on the emission context.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEscaper;

impl AutoEscaper for DefaultEscaper {
    fn escape(&self, value: &str, context: EscapeContext) -> String {
        match context {
            EscapeContext::Html | EscapeContext::HtmlAttribute => escape_html(value),
            EscapeContext::Js => escape_js_string(value),
            EscapeContext::Css => escape_css(value),
            EscapeContext::Url => escape_url(value),
            EscapeContext::Plain => value.to_owned(),
        }
    }
}

/// Applies the escaping policy to a value in output position.
///
/// `Safe` strings and the no-escaper case pass through unmodified.
pub(crate) fn apply_escaping(
    value: &Value,
    escaper: Option<&dyn AutoEscaper>,
    context: EscapeContext,
) -> String {
    match (value, escaper) {
        (Value::Safe(s), _) => s.clone(),
        (other, Some(escaper)) => escaper.escape(&other.output_string(), context),
        (other, None) => other.output_string(),
    }
}
