//! WebSocket frame shapes.
//!
//! Every frame is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};

/// Frames the node sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Membership notice, e.g. `U-1 joined`.
    System { text: String },

    /// Current member count of the room.
    RoomInfo {
        #[serde(rename = "userCount")]
        user_count: usize,
    },

    /// A relayed chat message.
    Msg {
        #[serde(rename = "userId")]
        user_id: String,
        text: String,
    },

    /// Sent right before the node closes the connection.
    ErrorMsg { error: String },
}

impl ServerFrame {
    pub fn joined(user_id: &str) -> Self {
        ServerFrame::System {
            text: format!("{user_id} joined"),
        }
    }

    pub fn left(user_id: &str) -> Self {
        ServerFrame::System {
            text: format!("{user_id} left"),
        }
    }

    pub fn error(code: &str) -> Self {
        ServerFrame::ErrorMsg {
            error: code.to_string(),
        }
    }

    /// JSON text of the frame.
    pub fn to_json(&self) -> String {
        // Serializing a plain enum of strings and integers cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frames clients send. Anything that does not parse is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Msg { text: String },
}

impl ClientFrame {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_frames_wire_shape() {
        let frame: serde_json::Value =
            serde_json::from_str(&ServerFrame::RoomInfo { user_count: 3 }.to_json()).unwrap();
        assert_eq!(frame, json!({"type": "room_info", "userCount": 3}));

        let frame: serde_json::Value = serde_json::from_str(
            &ServerFrame::Msg {
                user_id: "U-1".to_string(),
                text: "hi".to_string(),
            }
            .to_json(),
        )
        .unwrap();
        assert_eq!(frame, json!({"type": "msg", "userId": "U-1", "text": "hi"}));

        let frame: serde_json::Value =
            serde_json::from_str(&ServerFrame::error("room_full").to_json()).unwrap();
        assert_eq!(frame, json!({"type": "error_msg", "error": "room_full"}));

        let frame: serde_json::Value =
            serde_json::from_str(&ServerFrame::joined("U-9").to_json()).unwrap();
        assert_eq!(frame, json!({"type": "system", "text": "U-9 joined"}));
    }

    #[test]
    fn test_client_frame_parse() {
        assert_eq!(
            ClientFrame::parse(r#"{"type":"msg","text":"hello"}"#),
            Some(ClientFrame::Msg {
                text: "hello".to_string()
            })
        );
        assert_eq!(ClientFrame::parse(r#"{"type":"msg","text":42}"#), None);
        assert_eq!(ClientFrame::parse(r#"{"type":"typing"}"#), None);
        assert_eq!(ClientFrame::parse("not json"), None);
    }
}
