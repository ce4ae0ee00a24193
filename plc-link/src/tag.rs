//! Typed tag values and controller status codes.
//!
//! Controller tags are read and written as one of three atomic types. The
//! controller pairs every read with a status string; only the exact
//! `Success` status makes the value trustworthy.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{LinkError, LinkResult};

/// Atomic data type of a controller tag, named as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TagKind {
    /// Single bit
    Bool,
    /// 32-bit signed integer (carried as i64)
    Dint,
    /// 32-bit float (carried as f64)
    Real,
}

/// Value held by a controller tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Real(f64),
}

impl TagValue {
    /// Wire type of this value.
    pub fn kind(&self) -> TagKind {
        match self {
            TagValue::Bool(_) => TagKind::Bool,
            TagValue::Int(_) => TagKind::Dint,
            TagValue::Real(_) => TagKind::Real,
        }
    }

    /// Read as a float. Integers widen; bits do not.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            TagValue::Real(v) => Some(v),
            TagValue::Int(v) => Some(v as f64),
            TagValue::Bool(_) => None,
        }
    }

    /// Read as a bit. Integers are accepted as 0 / non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            TagValue::Bool(v) => Some(v),
            TagValue::Int(v) => Some(v != 0),
            TagValue::Real(_) => None,
        }
    }

    /// Read as an integer. Bits widen to 0/1; floats do not.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            TagValue::Int(v) => Some(v),
            TagValue::Bool(v) => Some(i64::from(v)),
            TagValue::Real(_) => None,
        }
    }

    /// Encode the value text for the gateway protocol.
    pub fn to_wire(&self) -> String {
        match *self {
            TagValue::Bool(v) => u8::from(v).to_string(),
            TagValue::Int(v) => v.to_string(),
            TagValue::Real(v) => v.to_string(),
        }
    }

    /// Decode a value of the given type from gateway text.
    ///
    /// # Example
    ///
    /// ```
    /// use plc_link::{TagKind, TagValue};
    ///
    /// assert_eq!(TagValue::parse(TagKind::Real, "12.5").unwrap(), TagValue::Real(12.5));
    /// assert_eq!(TagValue::parse(TagKind::Bool, "1").unwrap(), TagValue::Bool(true));
    /// ```
    pub fn parse(kind: TagKind, text: &str) -> LinkResult<Self> {
        let text = text.trim();
        let invalid = || LinkError::InvalidResponse(format!("Invalid {kind} value: {text}"));
        match kind {
            TagKind::Bool => match text {
                "1" => Ok(TagValue::Bool(true)),
                "0" => Ok(TagValue::Bool(false)),
                t if t.eq_ignore_ascii_case("true") => Ok(TagValue::Bool(true)),
                t if t.eq_ignore_ascii_case("false") => Ok(TagValue::Bool(false)),
                _ => Err(invalid()),
            },
            TagKind::Dint => text.parse().map(TagValue::Int).map_err(|_| invalid()),
            TagKind::Real => text.parse().map(TagValue::Real).map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(v) => write!(f, "{v}"),
            TagValue::Int(v) => write!(f, "{v}"),
            TagValue::Real(v) => write!(f, "{v:.3}"),
        }
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Real(v)
    }
}

/// Status the controller attaches to each tag exchange.
///
/// Parsing is exact: `success` in lowercase is not a success status. Text
/// that matches no named status is kept verbatim in [`TagStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Display, EnumString)]
pub enum TagStatus {
    Success,
    /// Tag name does not resolve on the controller
    #[strum(serialize = "Path segment error")]
    PathSegmentError,
    /// Controller dropped or refused the session
    #[strum(serialize = "Connection failure")]
    ConnectionFailure,
    /// Request type not accepted for this tag (e.g. write to a read-only tag)
    #[strum(serialize = "Service not supported")]
    ServiceNotSupported,
    #[strum(default)]
    Other(String),
}

impl TagStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TagStatus::Success)
    }
}

/// Result of reading one tag: the value (if any) plus the controller status.
#[derive(Debug, Clone, PartialEq)]
pub struct TagResponse {
    pub tag: String,
    pub value: Option<TagValue>,
    pub status: TagStatus,
}

impl TagResponse {
    pub fn success(tag: &str, value: TagValue) -> Self {
        Self {
            tag: tag.to_string(),
            value: Some(value),
            status: TagStatus::Success,
        }
    }

    pub fn failure(tag: &str, status: TagStatus) -> Self {
        Self {
            tag: tag.to_string(),
            value: None,
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success() && self.value.is_some()
    }

    /// Take the value, treating anything but `Success` as an error.
    pub fn into_value(self) -> LinkResult<TagValue> {
        match (self.status, self.value) {
            (TagStatus::Success, Some(value)) => Ok(value),
            (TagStatus::Success, None) => Err(LinkError::InvalidResponse(format!(
                "Tag {}: success without a value",
                self.tag
            ))),
            (status, _) => Err(LinkError::BadStatus {
                tag: self.tag,
                status,
            }),
        }
    }
}
