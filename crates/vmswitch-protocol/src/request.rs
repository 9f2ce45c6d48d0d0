use serde::Serialize;

/// Mouse button state carried on `send-mouse-abs`/`send-mouse-rel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MouseButtons {
    pub left: bool,
    pub middle: bool,
    pub right: bool,
}

/// One of the commands this core ever emits to a guest endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Capability handshake; always the first message on a freshly attached endpoint.
    QmpCapabilities,
    QueryXenStatus,
    QueryProcessInfo,
    QueryKbdLeds,
    QueryMouseStatus,
    /// Release-all request, sent to the departing endpoint on a focus transition.
    SendKbdReset,
    SendKeycode { keycode: i32, released: bool },
    SendMouseAbs { x: i32, y: i32, z: i32, buttons: MouseButtons },
    SendMouseRel { dx: i32, dy: i32, dz: i32, buttons: MouseButtons },
}

impl Command {
    fn execute_name(&self) -> &'static str {
        match self {
            Command::QmpCapabilities => "qmp_capabilities",
            Command::QueryXenStatus => "query-xen-status",
            Command::QueryProcessInfo => "query-process-info",
            Command::QueryKbdLeds => "query-kbd-leds",
            Command::QueryMouseStatus => "query-mouse-status",
            Command::SendKbdReset => "send-kbd-reset",
            Command::SendKeycode { .. } => "send-keycode",
            Command::SendMouseAbs { .. } => "send-mouse-abs",
            Command::SendMouseRel { .. } => "send-mouse-rel",
        }
    }

    fn arguments(&self) -> Option<serde_json::Value> {
        match self {
            Command::SendKeycode { keycode, released } => Some(serde_json::json!({
                "keycode": keycode,
                "released": released,
            })),
            Command::SendMouseAbs { x, y, z, buttons } => Some(serde_json::json!({
                "x": x, "y": y, "z": z, "buttons": buttons,
            })),
            Command::SendMouseRel { dx, dy, dz, buttons } => Some(serde_json::json!({
                "dx": dx, "dy": dy, "dz": dz, "buttons": buttons,
            })),
            _ => None,
        }
    }
}

/// Encode `command` as a CRLF-terminated request frame carrying `id`.
pub fn encode_request(id: i64, command: &Command) -> Vec<u8> {
    let mut obj = serde_json::json!({
        "id": id,
        "execute": command.execute_name(),
    });
    if let Some(arguments) = command.arguments() {
        obj["arguments"] = arguments;
    }
    let mut out = serde_json::to_vec(&obj).expect("request frame always serializes");
    out.extend_from_slice(b"\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_capability_handshake_with_no_arguments() {
        let bytes = encode_request(1, &Command::QmpCapabilities);
        assert!(bytes.ends_with(b"\r\n"));
        let value: serde_json::Value = serde_json::from_slice(&bytes[..bytes.len() - 2]).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["execute"], "qmp_capabilities");
        assert!(value.get("arguments").is_none());
    }

    #[test]
    fn encodes_send_keycode_with_arguments() {
        let bytes = encode_request(
            5,
            &Command::SendKeycode { keycode: 30, released: false },
        );
        let value: serde_json::Value = serde_json::from_slice(&bytes[..bytes.len() - 2]).unwrap();
        assert_eq!(value["execute"], "send-keycode");
        assert_eq!(value["arguments"]["keycode"], 30);
        assert_eq!(value["arguments"]["released"], false);
    }

    #[test]
    fn encodes_mouse_rel_with_buttons() {
        let bytes = encode_request(
            6,
            &Command::SendMouseRel {
                dx: 1,
                dy: -2,
                dz: 0,
                buttons: MouseButtons { left: true, middle: false, right: false },
            },
        );
        let value: serde_json::Value = serde_json::from_slice(&bytes[..bytes.len() - 2]).unwrap();
        assert_eq!(value["arguments"]["dx"], 1);
        assert_eq!(value["arguments"]["buttons"]["left"], true);
    }
}
