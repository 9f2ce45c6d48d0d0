use crate::response::Frame;

/// Errors produced while decoding the inbound byte stream into frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecoderError {
    #[error("malformed JSON frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Restartable, incremental decoder for line-delimited JSON objects.
///
/// Bytes are fed in as they arrive from the socket; `feed` returns every
/// complete top-level `{...}` object it can isolate, retaining any trailing
/// partial object for the next call. Object boundaries are found by
/// tracking brace depth and JSON string/escape state, not full parsing —
/// each isolated byte run is only parsed once it is known to be complete.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-read bytes and return every frame completed by them (in order).
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, FrameDecoderError> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(raw) = self.take_one_object() {
            frames.push(Frame::parse(&raw)?);
        }
        Ok(frames)
    }

    /// Pull one complete top-level JSON object out of the buffer, if present.
    /// Leading whitespace/CRLF between frames is skipped and discarded.
    fn take_one_object(&mut self) -> Option<Vec<u8>> {
        let start = self
            .buf
            .iter()
            .position(|&b| !b.is_ascii_whitespace())
            .unwrap_or(self.buf.len());
        if start > 0 {
            self.buf.drain(..start);
        }
        if self.buf.first() != Some(&b'{') {
            return None;
        }

        let mut depth = 0i32;
        let mut in_string = false;
        let mut escape = false;
        for (i, &b) in self.buf.iter().enumerate() {
            if in_string {
                if escape {
                    escape = false;
                } else if b == b'\\' {
                    escape = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let end = i + 1;
                        let raw: Vec<u8> = self.buf.drain(..end).collect();
                        return Some(raw);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::GuestEvent;

    #[test]
    fn decodes_one_frame_fed_whole() {
        let mut d = FrameDecoder::new();
        let frames = d.feed(b"{\"id\":1,\"return\":{}}\r\n").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], Frame::Return { id: 1, value: serde_json::json!({}) });
    }

    #[test]
    fn decodes_frame_fed_byte_by_byte() {
        let mut d = FrameDecoder::new();
        let msg = b"{\"id\":2,\"return\":{\"domain\":7}}\r\n";
        let mut all = Vec::new();
        for &b in msg {
            all.extend(d.feed(&[b]).unwrap());
        }
        assert_eq!(all.len(), 1);
        assert_eq!(
            all[0],
            Frame::Return { id: 2, value: serde_json::json!({"domain": 7}) }
        );
    }

    #[test]
    fn decodes_two_frames_in_one_feed() {
        let mut d = FrameDecoder::new();
        let frames = d
            .feed(b"{\"id\":1,\"return\":{}}\r\n{\"id\":2,\"return\":{}}\r\n")
            .unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn brace_inside_string_does_not_confuse_depth_tracking() {
        let mut d = FrameDecoder::new();
        let frames = d
            .feed(br#"{"event":"X","data":{"note":"a { b } c"}}"#)
            .unwrap();
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::Event(GuestEvent { name, data }) => {
                assert_eq!(name, "X");
                assert_eq!(data["note"], "a { b } c");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn escaped_quote_inside_string_does_not_end_string_early() {
        let mut d = FrameDecoder::new();
        let frames = d
            .feed(br#"{"event":"X","data":{"note":"a \" b } c"}}"#)
            .unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn partial_object_is_retained_until_complete() {
        let mut d = FrameDecoder::new();
        assert!(d.feed(b"{\"id\":1,").unwrap().is_empty());
        assert!(d.feed(b"\"return\":").unwrap().is_empty());
        let frames = d.feed(b"{}}").unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn malformed_json_inside_braces_errors_without_poisoning_the_decoder() {
        let mut d = FrameDecoder::new();
        // A complete brace-balanced run that isn't valid JSON (unquoted key).
        let err = d.feed(b"{id:1}").unwrap_err();
        assert!(matches!(err, FrameDecoderError::Json(_)));
        // The decoder consumed the bad frame and can still decode the next one.
        let frames = d.feed(b"{\"id\":2,\"return\":{}}").unwrap();
        assert_eq!(frames.len(), 1);
    }
}
