use serde::Deserialize;
use serde_json::Value;

/// A single decoded top-level object from the inbound byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `{ "id": N, "return": {...} }` — a response to a previously sent request.
    Return { id: i64, value: Value },
    /// `{ "event": "NAME", "data": {...} }` — an asynchronous notification.
    Event(GuestEvent),
    /// Valid JSON, but neither a `return` nor an `event` shape. Dropped by
    /// the caller, not by the decoder.
    Malformed(Value),
}

/// An asynchronous event pushed by the guest outside the request/response cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct GuestEvent {
    pub name: String,
    pub data: Value,
}

#[derive(Deserialize)]
struct RawFrame {
    id: Option<i64>,
    #[serde(rename = "return")]
    return_: Option<Value>,
    event: Option<String>,
    #[serde(default)]
    data: Value,
}

impl Frame {
    /// Parse one complete top-level JSON object into a `Frame`.
    pub(crate) fn parse(raw: &[u8]) -> Result<Frame, serde_json::Error> {
        let parsed: RawFrame = serde_json::from_slice(raw)?;
        if let Some(value) = parsed.return_ {
            // A return with no id is still dispatched; the reader correlates
            // by id and treats a missing/unmatched id as a protocol violation.
            return Ok(Frame::Return {
                id: parsed.id.unwrap_or(-1),
                value,
            });
        }
        if let Some(name) = parsed.event {
            return Ok(Frame::Event(GuestEvent {
                name,
                data: parsed.data,
            }));
        }
        Ok(Frame::Malformed(serde_json::from_slice(raw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_return_frame() {
        let frame = Frame::parse(br#"{"id":2,"return":{"domain":7}}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Return {
                id: 2,
                value: serde_json::json!({"domain": 7}),
            }
        );
    }

    #[test]
    fn parses_event_frame() {
        let frame = Frame::parse(
            br#"{"event":"KBD_LEDS_UPDATE","data":{"caps":true,"num":false,"scroll":true}}"#,
        )
        .unwrap();
        match frame {
            Frame::Event(GuestEvent { name, data }) => {
                assert_eq!(name, "KBD_LEDS_UPDATE");
                assert_eq!(data, serde_json::json!({"caps":true,"num":false,"scroll":true}));
            }
            other => panic!("expected event frame, got {:?}", other),
        }
    }

    #[test]
    fn return_without_id_defaults_to_sentinel() {
        let frame = Frame::parse(br#"{"return":{}}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Return {
                id: -1,
                value: serde_json::json!({}),
            }
        );
    }

    #[test]
    fn neither_return_nor_event_is_malformed() {
        let frame = Frame::parse(br#"{"foo":"bar"}"#).unwrap();
        assert!(matches!(frame, Frame::Malformed(_)));
    }
}
