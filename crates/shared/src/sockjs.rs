//! SockJS framing for the raw `websocket` transport.
//!
//! The server wraps every payload in a one-letter frame type:
//! `o` (open), `h` (heartbeat), `a[...]` (message batch), `m"..."` (single
//! message) and `c[code,"reason"]` (close). Clients send a JSON array of strings.

use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close { code: u16, reason: String },
}

pub fn decode(text: &str) -> Result<SockJsFrame, ProtocolError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ProtocolError::SockJs("empty frame".to_string()))?;
    let payload = chars.as_str();

    match kind {
        'o' => Ok(SockJsFrame::Open),
        'h' => Ok(SockJsFrame::Heartbeat),
        'a' => Ok(SockJsFrame::Messages(serde_json::from_str(payload)?)),
        'm' => Ok(SockJsFrame::Messages(vec![serde_json::from_str(payload)?])),
        'c' => {
            let (code, reason): (u16, String) = serde_json::from_str(payload)?;
            Ok(SockJsFrame::Close { code, reason })
        }
        other => Err(ProtocolError::SockJs(format!("unknown frame type {other:?}"))),
    }
}

/// Wrap outgoing messages the way a SockJS client sends them.
pub fn encode_messages(messages: &[String]) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(messages)?)
}

/// Build a server-side message batch frame (`a[...]`).
pub fn encode_batch(messages: &[String]) -> Result<String, ProtocolError> {
    Ok(format!("a{}", serde_json::to_string(messages)?))
}

/// Build a server-side close frame (`c[code,"reason"]`).
pub fn encode_close(code: u16, reason: &str) -> Result<String, ProtocolError> {
    Ok(format!("c{}", serde_json::to_string(&(code, reason))?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_control_frames() {
        assert_eq!(decode("o").unwrap(), SockJsFrame::Open);
        assert_eq!(decode("h").unwrap(), SockJsFrame::Heartbeat);
        assert_eq!(
            decode("c[3000,\"Go away!\"]").unwrap(),
            SockJsFrame::Close {
                code: 3000,
                reason: "Go away!".into()
            }
        );
    }

    #[test]
    fn decodes_message_batches() {
        let frame = decode("a[\"CONNECTED\\nversion:1.2\\n\\n\\u0000\",\"x\"]").unwrap();
        assert_eq!(
            frame,
            SockJsFrame::Messages(vec!["CONNECTED\nversion:1.2\n\n\0".into(), "x".into()])
        );
        assert_eq!(
            decode("m\"single\"").unwrap(),
            SockJsFrame::Messages(vec!["single".into()])
        );
    }

    #[test]
    fn rejects_unknown_or_broken_frames() {
        assert!(decode("").is_err());
        assert!(decode("z").is_err());
        assert!(decode("a[unterminated").is_err());
    }

    #[test]
    fn encodes_outgoing_and_server_frames() {
        let out = encode_messages(&["SUBSCRIBE\nid:sub-0\n\n\0".to_string()]).unwrap();
        assert_eq!(out, "[\"SUBSCRIBE\\nid:sub-0\\n\\n\\u0000\"]");

        let batch = encode_batch(&["hi".to_string()]).unwrap();
        assert_eq!(decode(&batch).unwrap(), SockJsFrame::Messages(vec!["hi".into()]));

        let close = encode_close(1000, "Normal closure").unwrap();
        assert_eq!(close, "c[1000,\"Normal closure\"]");
    }
}
