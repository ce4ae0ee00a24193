//! Tag client trait for controller exchanges.

use crate::error::{LinkError, LinkResult};
use crate::tag::{TagKind, TagResponse, TagValue};

/// Interface to a controller that exposes named tags.
///
/// Abstracts the transport so the polling loop can run against the TCP
/// gateway, the simulator, or a scripted client in tests.
pub trait TagClient {
    /// Read one tag.
    ///
    /// `Err` means the exchange itself failed (socket down, timeout). A
    /// controller-side rejection comes back as `Ok` with a failed status.
    fn read(&mut self, tag: &str) -> LinkResult<TagResponse>;

    /// Write one tag. A controller-side rejection is `LinkError::BadStatus`.
    fn write(&mut self, tag: &str, value: TagValue) -> LinkResult<()>;

    /// Raw "socket connected" signal from the transport.
    fn is_connected(&self) -> bool;

    /// Human-readable address of the controller, for log messages.
    fn endpoint(&self) -> String;

    /// Read a tag as a float, requiring a `Success` status.
    fn read_f64(&mut self, tag: &str) -> LinkResult<f64> {
        let value = self.read(tag)?.into_value()?;
        value.as_f64().ok_or_else(|| mismatch(tag, TagKind::Real, value))
    }

    /// Read a tag as a bit, requiring a `Success` status.
    fn read_bool(&mut self, tag: &str) -> LinkResult<bool> {
        let value = self.read(tag)?.into_value()?;
        value.as_bool().ok_or_else(|| mismatch(tag, TagKind::Bool, value))
    }

    /// Read a tag as an integer, requiring a `Success` status.
    fn read_i64(&mut self, tag: &str) -> LinkResult<i64> {
        let value = self.read(tag)?.into_value()?;
        value.as_i64().ok_or_else(|| mismatch(tag, TagKind::Dint, value))
    }
}

fn mismatch(tag: &str, expected: TagKind, value: TagValue) -> LinkError {
    LinkError::TypeMismatch {
        tag: tag.to_string(),
        expected,
        actual: value.kind(),
    }
}

impl<C: TagClient + ?Sized> TagClient for Box<C> {
    fn read(&mut self, tag: &str) -> LinkResult<TagResponse> {
        (**self).read(tag)
    }

    fn write(&mut self, tag: &str, value: TagValue) -> LinkResult<()> {
        (**self).write(tag, value)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn endpoint(&self) -> String {
        (**self).endpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::TagStatus;
    use std::collections::HashMap;

    struct FixedClient {
        tags: HashMap<String, TagResponse>,
    }

    impl TagClient for FixedClient {
        fn read(&mut self, tag: &str) -> LinkResult<TagResponse> {
            self.tags
                .get(tag)
                .cloned()
                .ok_or_else(|| LinkError::NotConnected("fixed".into()))
        }

        fn write(&mut self, _tag: &str, _value: TagValue) -> LinkResult<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn endpoint(&self) -> String {
            "fixed".into()
        }
    }

    fn client() -> FixedClient {
        let mut tags = HashMap::new();
        tags.insert(
            "pos".to_string(),
            TagResponse::success("pos", TagValue::Real(12.5)),
        );
        tags.insert(
            "bit".to_string(),
            TagResponse::success("bit", TagValue::Bool(true)),
        );
        tags.insert(
            "bad".to_string(),
            TagResponse::failure("bad", TagStatus::PathSegmentError),
        );
        FixedClient { tags }
    }

    #[test]
    fn test_typed_reads() {
        let mut c = client();
        assert_eq!(c.read_f64("pos").unwrap(), 12.5);
        assert!(c.read_bool("bit").unwrap());
        assert_eq!(c.read_i64("bit").unwrap(), 1);
    }

    #[test]
    fn test_typed_read_requires_success() {
        let mut c = client();
        assert!(matches!(
            c.read_f64("bad"),
            Err(LinkError::BadStatus { .. })
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let mut c = client();
        match c.read_f64("bit") {
            Err(LinkError::TypeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, TagKind::Real);
                assert_eq!(actual, TagKind::Bool);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_boxed_client_delegates() {
        let mut boxed: Box<dyn TagClient + Send> = Box::new(client());
        assert_eq!(boxed.read_f64("pos").unwrap(), 12.5);
        assert_eq!(boxed.endpoint(), "fixed");
    }
}
