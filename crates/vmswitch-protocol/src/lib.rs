//! Line-delimited JSON control protocol: request/response framing plus the
//! decoded value shapes exchanged with a guest endpoint.
//!
//! Wire format: `{ "id": N, "execute": "...", "arguments": {...} }\r\n` for
//! requests. Responses are one JSON object per line, carrying either
//! `"return"` (correlated by `"id"`) or `"event"` + `"data"`.

mod framing;
mod request;
mod response;
mod value;

pub use framing::{FrameDecoder, FrameDecoderError};
pub use request::{Command, MouseButtons, encode_request};
pub use response::{Frame, GuestEvent};
pub use value::{
    KbdLedsReturn, MouseStatusReturn, ProcessInfoReturn, XenStatusReturn, extract,
};
