//! プレイヤー設定とチャンネル / エンドポイントの値型

use alloc::format;
use alloc::string::{String, ToString};

use serde::Deserialize;

use crate::error::SessionError;
use crate::{
    DEFAULT_CHANNEL_COUNT, DEFAULT_DECODER_VERSION, DEFAULT_ENDPOINT_BASE, DEFAULT_SESSION_ID,
};

/// プレイヤー設定
///
/// ホストページから JSON で渡される。省略したフィールドは既定値になる。
///
/// ```json
/// {
///   "endpoint_base": "websocket",
///   "session_id": "0",
///   "channel_count": 27,
///   "preserve_drawing_buffer": false,
///   "decoder_token": "base64:...",
///   "decoder_version": "100.1.0"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// WebSocket エンドポイントの基底パス（例: `"websocket"`, `"wss://host/ws"`）
    pub endpoint_base: String,
    /// プレイヤー識別子（URL の 2 階層目）
    pub session_id: String,
    /// 選択可能なチャンネル数（1..=channel_count）
    pub channel_count: u32,
    /// 描画バッファを保持するか（`preserveDrawingBuffer`）
    pub preserve_drawing_buffer: bool,
    /// デコーダに渡す識別トークン（中身は解釈しない）
    pub decoder_token: String,
    /// デコーダのバージョン文字列
    pub decoder_version: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            endpoint_base: DEFAULT_ENDPOINT_BASE.to_string(),
            session_id: DEFAULT_SESSION_ID.to_string(),
            channel_count: DEFAULT_CHANNEL_COUNT,
            preserve_drawing_buffer: false,
            decoder_token: String::new(),
            decoder_version: DEFAULT_DECODER_VERSION.to_string(),
        }
    }
}

impl PlayerConfig {
    /// JSON 文字列から設定を読み込み、検証する
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let config: PlayerConfig =
            serde_json::from_str(json).map_err(|e| SessionError::Json(format!("{}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.channel_count == 0 {
            return Err(SessionError::InvalidConfig(
                "channel_count must be at least 1".to_string(),
            ));
        }
        if self.session_id.is_empty() || self.session_id.contains('/') {
            return Err(SessionError::InvalidConfig(format!(
                "session_id {:?} is not a single path segment",
                self.session_id
            )));
        }
        Ok(())
    }

    pub fn channel_range(&self) -> ChannelRange {
        ChannelRange::new(self.channel_count)
    }
}

/// 有効なチャンネル番号の範囲（1..=max）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRange {
    max: u32,
}

impl ChannelRange {
    pub fn new(max: u32) -> Self {
        ChannelRange { max }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn contains(&self, channel: u32) -> bool {
        (1..=self.max).contains(&channel)
    }

    /// 生のチャンネル番号を検証して `ChannelId` にする
    pub fn channel(&self, channel: u32) -> Result<ChannelId, SessionError> {
        if self.contains(channel) {
            Ok(ChannelId(channel))
        } else {
            Err(SessionError::ChannelOutOfRange {
                channel,
                max: self.max,
            })
        }
    }
}

/// 検証済みのチャンネル番号
///
/// `ChannelRange::channel` を通してのみ生成できる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u32);

impl ChannelId {
    pub fn get(self) -> u32 {
        self.0
    }

    /// 制御メッセージで使うチャンネル名（例: `"ch5"`）
    pub fn label(self) -> String {
        format!("ch{}", self.0)
    }
}

impl core::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 1 セッション分の接続先
///
/// `<endpoint_base>/<session_id>/<channel>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
}

impl Endpoint {
    pub fn new(base: &str, session_id: &str, channel: ChannelId) -> Self {
        let base = base.trim_end_matches('/');
        Endpoint {
            url: format!("{}/{}/{}", base, session_id, channel),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl core::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.endpoint_base, "websocket");
        assert_eq!(config.session_id, "0");
        assert_eq!(config.channel_count, 27);
        assert!(!config.preserve_drawing_buffer);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = PlayerConfig::from_json(r#"{"session_id":"42","channel_count":8}"#).unwrap();
        assert_eq!(config.session_id, "42");
        assert_eq!(config.channel_count, 8);
        assert_eq!(config.endpoint_base, "websocket");
        assert_eq!(config.decoder_version, "100.1.0");
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        assert!(matches!(
            PlayerConfig::from_json(r#"{"channel_count":0}"#),
            Err(SessionError::InvalidConfig(_))
        ));
        assert!(matches!(
            PlayerConfig::from_json(r#"{"session_id":"a/b"}"#),
            Err(SessionError::InvalidConfig(_))
        ));
        assert!(matches!(
            PlayerConfig::from_json("not json"),
            Err(SessionError::Json(_))
        ));
    }

    #[test]
    fn test_channel_range_bounds() {
        let range = ChannelRange::new(27);
        assert!(range.channel(1).is_ok());
        assert!(range.channel(27).is_ok());
        assert_eq!(
            range.channel(0),
            Err(SessionError::ChannelOutOfRange { channel: 0, max: 27 })
        );
        assert_eq!(
            range.channel(30),
            Err(SessionError::ChannelOutOfRange { channel: 30, max: 27 })
        );
    }

    #[test]
    fn test_endpoint_and_label() {
        let ch = ChannelRange::new(27).channel(5).unwrap();
        assert_eq!(ch.label(), "ch5");
        assert_eq!(Endpoint::new("websocket", "0", ch).url(), "websocket/0/5");
        assert_eq!(
            Endpoint::new("wss://cam.example/websocket/", "12", ch).url(),
            "wss://cam.example/websocket/12/5"
        );
    }
}
