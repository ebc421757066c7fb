//! Conversion between Gmail API message resources and our flat message shape.
//!
//! Reading walks the MIME tree Gmail returns (bodies arrive already
//! base64url-decoded by the API crate). Writing produces the minimal
//! RFC 822 text that is uploaded for sending.

use std::sync::OnceLock;

use base64::Engine;
use chrono::{DateTime, Utc};
use google_gmail1::api::{Message, MessagePart, MessagePartHeader};
use regex::Regex;

use super::ParsedMessage;

/// Flatten a full-format Gmail message. Returns `None` when the message has no id.
pub fn parse_message(message: &Message) -> Option<ParsedMessage> {
    let gmail_id = message.id.clone().filter(|id| !id.is_empty())?;
    let thread_id = message.thread_id.clone().unwrap_or_default();

    let headers = message
        .payload
        .as_ref()
        .and_then(|p| p.headers.as_deref())
        .unwrap_or_default();

    let subject = header_value(headers, "Subject").unwrap_or_default();
    let sender = header_value(headers, "From").unwrap_or_default();
    let recipient = header_value(headers, "To").unwrap_or_default();
    let received_at = header_value(headers, "Date")
        .as_deref()
        .map(parse_date)
        .unwrap_or_else(Utc::now);

    let (body_text, body_html) = match &message.payload {
        Some(payload) => extract_bodies(payload),
        None => (None, None),
    };

    Some(ParsedMessage {
        gmail_id,
        thread_id,
        subject,
        sender,
        recipient,
        body_text,
        body_html,
        received_at,
    })
}

/// First header with the given name, compared case-insensitively.
pub fn header_value(headers: &[MessagePartHeader], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| {
            h.name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| h.value.clone())
}

/// Collect the plain-text and HTML bodies of a message part.
///
/// A part without children is its own body. Otherwise each child is
/// examined in order: the first leaf `text/plain` and `text/html` fill their
/// slots, and any child with children of its own is walked recursively, its
/// non-empty results replacing what was found so far.
pub fn extract_bodies(part: &MessagePart) -> (Option<String>, Option<String>) {
    let Some(children) = part.parts.as_deref() else {
        return match leaf_body(part) {
            Some((true, body)) => (Some(body), None),
            Some((false, body)) => (None, Some(body)),
            None => (None, None),
        };
    };

    let mut text = None;
    let mut html = None;

    for child in children {
        if child.parts.is_some() {
            let (nested_text, nested_html) = extract_bodies(child);
            if nested_text.is_some() {
                text = nested_text;
            }
            if nested_html.is_some() {
                html = nested_html;
            }
            continue;
        }

        match leaf_body(child) {
            Some((true, body)) if text.is_none() => text = Some(body),
            Some((false, body)) if html.is_none() => html = Some(body),
            _ => {}
        }
    }

    (text, html)
}

/// Decoded body of a text leaf, tagged `true` for plain text and `false` for HTML.
fn leaf_body(part: &MessagePart) -> Option<(bool, String)> {
    let mime_type = part.mime_type.as_deref()?;
    let is_plain = if mime_type.eq_ignore_ascii_case("text/plain") {
        true
    } else if mime_type.eq_ignore_ascii_case("text/html") {
        false
    } else {
        return None;
    };

    let data = part.body.as_ref()?.data.as_deref()?;
    if data.is_empty() {
        return None;
    }

    Some((is_plain, decode_text(data)))
}

/// UTF-8 with a Latin-1 fallback; never fails.
pub fn decode_text(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(s) => s.to_string(),
        Err(_) => data.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Parse a Date header, falling back to the current time.
pub fn parse_date(raw: &str) -> DateTime<Utc> {
    try_parse_date(raw).unwrap_or_else(|| {
        tracing::debug!("Unparseable Date header {:?}, using current time", raw);
        Utc::now()
    })
}

fn try_parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // Trailing zone comments such as "(UTC)" or "(Pacific Standard Time)"
    let without_comment = match trimmed.rfind('(') {
        Some(idx) if trimmed.ends_with(')') => trimmed[..idx].trim_end(),
        _ => return None,
    };
    DateTime::parse_from_rfc2822(without_comment)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a "From" header like "John Doe <john@example.com>" into (address, name)
pub fn parse_from_header(from: &str) -> (String, Option<String>) {
    let from = from.trim();

    if let Some(bracket_start) = from.rfind('<') {
        if let Some(bracket_end) = from.rfind('>') {
            if bracket_end > bracket_start {
                let address = from[bracket_start + 1..bracket_end].trim().to_string();
                let name = from[..bracket_start].trim().trim_matches('"').trim();
                let name = if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                };
                return (address, name);
            }
        }
    }

    (from.to_string(), None)
}

fn address_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^[^\s@<>(),;:"\[\]]+@[^\s@<>(),;:"\[\]]+\.[^\s@<>(),;:"\[\]]+$"#)
            .unwrap_or_else(|e| panic!("address pattern must compile: {e}"))
    })
}

/// A bare `local@domain.tld` address.
pub fn is_valid_address(address: &str) -> bool {
    address_regex().is_match(address)
}

/// Build the RFC 822 text for a plain-text reply.
///
/// CR and LF are stripped from header values. A non-ASCII subject is sent as
/// an RFC 2047 encoded word.
pub fn build_rfc822(to: &str, subject: &str, body: &str) -> String {
    let to = strip_line_breaks(to);
    let subject = strip_line_breaks(subject);
    let subject = if subject.is_ascii() {
        subject
    } else {
        format!(
            "=?UTF-8?B?{}?=",
            base64::engine::general_purpose::STANDARD.encode(subject.as_bytes())
        )
    };

    format!(
        "To: {to}\r\nSubject: {subject}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{body}"
    )
}

fn strip_line_breaks(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}
