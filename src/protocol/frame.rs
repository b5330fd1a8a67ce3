//! SockJS wire frame codec.
//!
//! Every inbound frame starts with a one byte tag:
//!
//! | Tag | Frame | Payload |
//! |-----|-------|---------|
//! | `o` | Open | none |
//! | `h` | Heartbeat | none |
//! | `a` | Data | JSON array of strings |
//! | `c` | Close | JSON array `[code, reason]` |
//!
//! Outbound batches are plain JSON arrays of strings. The codec holds no
//! state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// FrameType
// ============================================================================

/// Classification of one wire frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Unknown tag.
    Unhandled,
    /// `h` liveness frame.
    Heartbeat,
    /// `a` message batch.
    Data,
    /// `o` session open.
    Open,
    /// `c` session close.
    Close,
}

impl FrameType {
    /// Classifies a frame by its leading tag byte.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Self {
        match tag {
            b'h' => Self::Heartbeat,
            b'a' => Self::Data,
            b'o' => Self::Open,
            b'c' => Self::Close,
            _ => Self::Unhandled,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unhandled => "unhandled",
            Self::Heartbeat => "heartbeat",
            Self::Data => "data",
            Self::Open => "open",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A successfully parsed inbound frame.
///
/// Close frames never parse successfully; they surface as
/// [`Error::ClosedByRemote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Session opened.
    Open,
    /// Server is alive.
    Heartbeat,
    /// Encoded message batch, still JSON.
    Data(&'a [u8]),
}

impl Frame<'_> {
    /// Returns the frame's type.
    #[inline]
    #[must_use]
    pub const fn frame_type(&self) -> FrameType {
        match self {
            Self::Open => FrameType::Open,
            Self::Heartbeat => FrameType::Heartbeat,
            Self::Data(_) => FrameType::Data,
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses one inbound wire frame.
///
/// # Errors
///
/// - [`Error::InvalidResponse`] for an empty frame, an unknown tag, or an
///   open/heartbeat frame with trailing data
/// - [`Error::ClosedByRemote`] for every close frame
pub fn parse(frame: &[u8]) -> Result<Frame<'_>> {
    let Some((&tag, rest)) = frame.split_first() else {
        return Err(Error::invalid_response(None, "empty frame"));
    };

    match FrameType::from_tag(tag) {
        FrameType::Heartbeat => {
            expect_empty(FrameType::Heartbeat, rest)?;
            Ok(Frame::Heartbeat)
        }
        FrameType::Data => Ok(Frame::Data(rest)),
        FrameType::Open => {
            expect_empty(FrameType::Open, rest)?;
            Ok(Frame::Open)
        }
        FrameType::Close => Err(parse_close(rest)),
        FrameType::Unhandled => Err(Error::invalid_response(
            Some(FrameType::Unhandled),
            format!("unknown message type '{}'", char::from(tag)),
        )),
    }
}

/// Checks the remainder of a payload-less frame is only whitespace.
fn expect_empty(frame_type: FrameType, rest: &[u8]) -> Result<()> {
    if rest.trim_ascii().is_empty() {
        Ok(())
    } else {
        Err(Error::invalid_response(
            Some(frame_type),
            format!("unexpected data after {frame_type} frame"),
        ))
    }
}

/// Builds the error carried by a close frame.
///
/// A code that is not a `u16` is kept as text in front of the reason.
fn parse_close(rest: &[u8]) -> Error {
    match serde_json::from_slice::<Vec<Value>>(rest) {
        Ok(values) if values.len() == 2 => {
            let reason = value_text(&values[1]);
            match values[0].as_u64().and_then(|c| u16::try_from(c).ok()) {
                Some(code) => Error::closed_by_remote(Some(code), Some(reason)),
                None => Error::closed_by_remote(
                    None,
                    Some(format!("{} {reason}", value_text(&values[0]))),
                ),
            }
        }
        _ => Error::closed_by_remote(None, None),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decodes a data frame payload into its messages, in order.
///
/// # Errors
///
/// Returns [`Error::Json`] if the payload is not a JSON array of strings.
pub fn decode_messages(payload: &[u8]) -> Result<Vec<String>> {
    Ok(serde_json::from_slice(payload)?)
}

// ============================================================================
// Serialization
// ============================================================================

/// Encodes an outbound batch as a JSON array of strings.
///
/// Messages that are not valid UTF-8 are converted lossily.
///
/// # Errors
///
/// Returns [`Error::Json`] if encoding fails.
pub fn serialize<M: AsRef<[u8]>>(messages: &[M]) -> Result<String> {
    let batch: Vec<_> = messages
        .iter()
        .map(|m| String::from_utf8_lossy(m.as_ref()))
        .collect();
    Ok(serde_json::to_string(&batch)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_parse_open() {
        assert_eq!(parse(b"o").unwrap(), Frame::Open);
        assert_eq!(parse(b"o\n").unwrap(), Frame::Open);
    }

    #[test]
    fn test_parse_open_with_data_fails() {
        let err = parse(b"o[]").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidResponse {
                frame_type: Some(FrameType::Open),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_heartbeat() {
        assert_eq!(parse(b"h").unwrap(), Frame::Heartbeat);
        assert_eq!(parse(b"h \r\n\t").unwrap(), Frame::Heartbeat);
    }

    #[test]
    fn test_parse_heartbeat_with_data_fails() {
        let err = parse(b"h1").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidResponse {
                frame_type: Some(FrameType::Heartbeat),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_data() {
        let frame = parse(br#"a["x","y"]"#).unwrap();
        let Frame::Data(payload) = frame else {
            panic!("Expected data frame");
        };
        assert_eq!(decode_messages(payload).unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_parse_data_trailing_newline() {
        let Frame::Data(payload) = parse(b"a[\"hello world!\"]\n").unwrap() else {
            panic!("Expected data frame");
        };
        assert_eq!(decode_messages(payload).unwrap(), vec!["hello world!"]);
    }

    #[test]
    fn test_decode_malformed_data_fails() {
        let Frame::Data(payload) = parse(b"a[\"x\",").unwrap() else {
            panic!("Expected data frame");
        };
        assert!(matches!(decode_messages(payload), Err(Error::Json(_))));
        assert!(decode_messages(b"[1,2]").is_err());
        assert!(decode_messages(b"{}").is_err());
    }

    #[test]
    fn test_parse_close() {
        let err = parse(br#"c[3000,"Go away!"]"#).unwrap_err();
        match err {
            Error::ClosedByRemote { code, reason } => {
                assert_eq!(code, Some(3000));
                assert_eq!(reason.as_deref(), Some("Go away!"));
            }
            other => panic!("Expected ClosedByRemote, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_close_invalid_payload() {
        for frame in [&b"c"[..], &b"c[3000]"[..], &b"c{"[..], &b"c[1,2,3]"[..]] {
            let err = parse(frame).unwrap_err();
            assert!(
                matches!(
                    err,
                    Error::ClosedByRemote {
                        code: None,
                        reason: None
                    }
                ),
                "frame {:?}",
                String::from_utf8_lossy(frame)
            );
            assert!(err.to_string().contains("missing/invalid"));
        }
    }

    #[test]
    fn test_parse_close_keeps_odd_code() {
        for (frame, expected) in [
            (&br#"c[3000.5,"x"]"#[..], "3000.5 x"),
            (&br#"c["3000","x"]"#[..], "3000 x"),
            (&br#"c[70000,"x"]"#[..], "70000 x"),
        ] {
            match parse(frame).unwrap_err() {
                Error::ClosedByRemote { code, reason } => {
                    assert_eq!(code, None);
                    assert_eq!(reason.as_deref(), Some(expected));
                }
                other => panic!("Expected ClosedByRemote, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_unknown_tag() {
        let err = parse(b"x").unwrap_err();
        assert!(err.to_string().contains("unknown message type 'x'"));
        assert!(matches!(
            err,
            Error::InvalidResponse {
                frame_type: Some(FrameType::Unhandled),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(
            parse(b""),
            Err(Error::InvalidResponse {
                frame_type: None,
                ..
            })
        ));
    }

    #[test]
    fn test_serialize() {
        assert_eq!(serialize(&["m1", "m2"]).unwrap(), r#"["m1","m2"]"#);
        assert_eq!(serialize::<&str>(&[]).unwrap(), "[]");
        assert_eq!(
            serialize(&[r#"is "ack" what i'm meant to say?"#]).unwrap(),
            r#"["is \"ack\" what i'm meant to say?"]"#
        );
    }

    #[test]
    fn test_serialize_then_parse() {
        let encoded = serialize(&[b"m1".as_slice(), b"m2".as_slice()]).unwrap();
        let framed = format!("a{encoded}");
        let Frame::Data(payload) = parse(framed.as_bytes()).unwrap() else {
            panic!("Expected data frame");
        };
        assert_eq!(decode_messages(payload).unwrap(), vec!["m1", "m2"]);
    }

    #[test]
    fn test_frame_type_from_tag() {
        assert_eq!(FrameType::from_tag(b'o'), FrameType::Open);
        assert_eq!(FrameType::from_tag(b'z'), FrameType::Unhandled);
        assert_eq!(Frame::Data(b"[]").frame_type(), FrameType::Data);
    }

    proptest! {
        #[test]
        fn prop_data_frames_yield_messages(messages in prop::collection::vec(".*", 0..8)) {
            let framed = format!("a{}", serde_json::to_string(&messages).unwrap());
            let Frame::Data(payload) = parse(framed.as_bytes()).unwrap() else {
                panic!("Expected data frame");
            };
            prop_assert_eq!(decode_messages(payload).unwrap(), messages);
        }

        #[test]
        fn prop_heartbeat_rejects_trailing_data(tail in "[ \t\r\n]*[a-z0-9{}\\[\\]]+.*") {
            let framed = format!("h{tail}");
            prop_assert!(parse(framed.as_bytes()).is_err());
        }

        #[test]
        fn prop_close_never_succeeds(tail in ".*") {
            let framed = format!("c{tail}");
            let is_closed_by_remote = matches!(
                parse(framed.as_bytes()),
                Err(Error::ClosedByRemote { .. })
            );
            prop_assert!(is_closed_by_remote);
        }
    }
}
