//! Line framing for the tag gateway protocol.
//!
//! Every message is one LF-terminated ASCII line.
//!
//! ```text
//! READ <tag>                  ->  OK <TYPE> <value>  |  ERR <status>
//! WRITE <tag> <TYPE> <value>  ->  OK                 |  ERR <status>
//! ```
//!
//! `<TYPE>` is one of `BOOL`, `DINT`, `REAL`; `<status>` is the controller's
//! status text (everything after `ERR `). Tag names may not contain whitespace.

use std::str::FromStr;

use crate::error::{LinkError, LinkResult};
use crate::tag::{TagKind, TagResponse, TagStatus, TagValue};

/// A request line sent to the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Read { tag: String },
    Write { tag: String, value: TagValue },
}

impl Request {
    /// Encode as a request line (without the trailing LF).
    pub fn encode(&self) -> String {
        match self {
            Request::Read { tag } => format!("READ {tag}"),
            Request::Write { tag, value } => {
                format!("WRITE {tag} {} {}", value.kind(), value.to_wire())
            }
        }
    }

    /// Parse a request line. Used by the gateway server side.
    pub fn parse(line: &str) -> LinkResult<Self> {
        let mut parts = line.split_whitespace();
        let invalid = || LinkError::InvalidResponse(format!("Invalid request: {}", line.trim()));

        match parts.next() {
            Some("READ") => {
                let tag = parts.next().ok_or_else(invalid)?;
                if parts.next().is_some() {
                    return Err(invalid());
                }
                Ok(Request::Read {
                    tag: tag.to_string(),
                })
            }
            Some("WRITE") => {
                let tag = parts.next().ok_or_else(invalid)?;
                let kind = parts
                    .next()
                    .and_then(|k| TagKind::from_str(k).ok())
                    .ok_or_else(invalid)?;
                let value = TagValue::parse(kind, parts.next().ok_or_else(invalid)?)?;
                if parts.next().is_some() {
                    return Err(invalid());
                }
                Ok(Request::Write {
                    tag: tag.to_string(),
                    value,
                })
            }
            _ => Err(invalid()),
        }
    }
}

/// Reject tag names that would break the line framing.
pub fn validate_tag(tag: &str) -> LinkResult<()> {
    if tag.is_empty() || tag.chars().any(char::is_whitespace) {
        return Err(LinkError::InvalidTag(tag.to_string()));
    }
    Ok(())
}

/// Parse the answer to a `READ` request.
///
/// # Example
///
/// ```
/// use plc_link::gateway::protocol::parse_read_response;
/// use plc_link::{TagStatus, TagValue};
///
/// let ok = parse_read_response("CommandPos", "OK REAL 12.5\n").unwrap();
/// assert_eq!(ok.value, Some(TagValue::Real(12.5)));
///
/// let err = parse_read_response("Nope", "ERR Path segment error\n").unwrap();
/// assert_eq!(err.status, TagStatus::PathSegmentError);
/// ```
pub fn parse_read_response(tag: &str, line: &str) -> LinkResult<TagResponse> {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(status) = line.strip_prefix("ERR ") {
        let status = TagStatus::from_str(status).unwrap_or(TagStatus::Other(status.to_string()));
        return Ok(TagResponse::failure(tag, status));
    }

    let body = line
        .strip_prefix("OK ")
        .ok_or_else(|| LinkError::InvalidResponse(format!("Unexpected READ answer: {line}")))?;
    let (kind, value) = body
        .split_once(' ')
        .ok_or_else(|| LinkError::InvalidResponse(format!("Missing value: {line}")))?;
    let kind = TagKind::from_str(kind)
        .map_err(|_| LinkError::InvalidResponse(format!("Unknown type: {kind}")))?;

    Ok(TagResponse::success(tag, TagValue::parse(kind, value)?))
}

/// Parse the answer to a `WRITE` request.
pub fn parse_write_response(tag: &str, line: &str) -> LinkResult<()> {
    let line = line.trim_end_matches(['\r', '\n']);

    if line == "OK" {
        return Ok(());
    }
    if let Some(status) = line.strip_prefix("ERR ") {
        let status = TagStatus::from_str(status).unwrap_or(TagStatus::Other(status.to_string()));
        return Err(LinkError::BadStatus {
            tag: tag.to_string(),
            status,
        });
    }
    Err(LinkError::InvalidResponse(format!(
        "Unexpected WRITE answer: {line}"
    )))
}

/// Encode a successful read answer.
pub fn encode_read_ok(value: TagValue) -> String {
    format!("OK {} {}", value.kind(), value.to_wire())
}

/// Encode a failure answer.
pub fn encode_err(status: &TagStatus) -> String {
    format!("ERR {status}")
}
