use serde::{Deserialize, Serialize};

use crate::error::SharedError;

/// Identity card a peer presents during `/exchange`.
///
/// Field names follow the camelCase JSON the peers put on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub client_code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub os_name: Option<String>,
    #[serde(default)]
    pub network_type: Option<String>,
    #[serde(default)]
    pub wifi_name: Option<String>,
}

impl DeviceDescriptor {
    /// Reject descriptors that cannot be keyed.
    pub fn validate(&self) -> Result<(), SharedError> {
        if self.client_code.trim().is_empty() {
            return Err(SharedError::InvalidDescriptor(
                "clientCode must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Body of `POST /message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageParams {
    /// Id of the message on the sender's side; the receiver downloads with it.
    pub send_id: i64,
    pub client_code: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Response of `GET /downloadInfo`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadInfo {
    pub size: u64,
    pub hash: String,
}

/// Direction of a message relative to this device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Send,
    Receive,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Send => "send",
            MessageKind::Receive => "receive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "send" => Some(Self::Send),
            "receive" => Some(Self::Receive),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_uses_camel_case_keys() {
        let json = r#"{"clientCode":"abc","name":"desk","ip":"192.168.1.5","port":20001,"channelType":"desktop","osName":"Linux"}"#;
        let desc: DeviceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.client_code, "abc");
        assert_eq!(desc.port, Some(20001));
        assert_eq!(desc.wifi_name, None);

        let value = serde_json::to_value(&desc).unwrap();
        assert!(value.get("osName").is_some());
        assert!(value.get("os_name").is_none());
    }

    #[test]
    fn empty_client_code_is_rejected() {
        let desc = DeviceDescriptor {
            client_code: "  ".into(),
            ..Default::default()
        };
        assert!(desc.validate().is_err());
    }

    #[test]
    fn message_params_accept_missing_optionals() {
        let params: MessageParams =
            serde_json::from_str(r#"{"sendId":7,"clientCode":"abc"}"#).unwrap();
        assert_eq!(params.send_id, 7);
        assert!(params.filename.is_none());
    }

    #[test]
    fn message_kind_parses_wire_names() {
        assert_eq!(MessageKind::parse("send"), Some(MessageKind::Send));
        assert_eq!(MessageKind::parse("receive"), Some(MessageKind::Receive));
        assert_eq!(MessageKind::parse("other"), None);
    }
}
