//! チャンネル制御メッセージ
//!
//! 接続確立直後に 1 回だけ送るテキストフレーム:
//!
//! ```json
//! {"t":"open","c":"ch5"}
//! ```

use alloc::format;
use alloc::string::String;

use serde::Serialize;

use crate::config::ChannelId;
use crate::error::SessionError;

/// サーバーへの制御メッセージ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlMessage {
    /// 種別（現状 `"open"` のみ）
    t: &'static str,
    /// 対象チャンネル名
    c: String,
}

impl ControlMessage {
    /// チャンネルの配信開始要求
    pub fn open(channel: ChannelId) -> Self {
        ControlMessage {
            t: "open",
            c: channel.label(),
        }
    }

    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Json(format!("{}", e)))
    }
}
