//! 再生統計

use alloc::format;
use alloc::string::String;

use serde::Serialize;

use crate::error::SessionError;
use crate::session::SessionState;

/// 受信・デコード投入側の累計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// 受信したバイナリチャンク数
    pub chunks_received: u64,
    /// 受信したバイト数
    pub bytes_received: u64,
    /// バイナリでないため無視したフレーム数
    pub frames_ignored: u64,
    /// デコーダに投入したユニット数
    pub units_submitted: u64,
    /// そのうち IDR ユニット数
    pub keyframes_submitted: u64,
    /// そのうち SPS / PPS ユニット数
    pub parameter_sets_submitted: u64,
    /// デコーダが受け付けられず捨てたユニット数
    pub units_dropped: u64,
}

/// 描画側の累計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PresentationStats {
    /// 描画したピクチャ数
    pub pictures_painted: u64,
    /// セッション停止後に届き、捨てたピクチャ数
    pub pictures_discarded: u64,
    /// 描画面未準備・描画失敗の回数
    pub faults: u64,
}

/// `PlayerContext` 全体の統計スナップショット
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerStats {
    pub state: SessionState,
    pub channel: Option<u32>,
    pub sessions_started: u64,
    /// デコーダ未初期化などのライフサイクル順序の不具合
    pub sequencing_faults: u64,
    pub ingest: IngestStats,
    pub presentation: PresentationStats,
}

impl PlayerStats {
    /// JSON 文字列に変換する
    ///
    /// ```json
    /// {
    ///   "state": "open",
    ///   "channel": 5,
    ///   "sessions_started": 2,
    ///   "sequencing_faults": 0,
    ///   "ingest": { "chunks_received": 120, "bytes_received": 482133, ... },
    ///   "presentation": { "pictures_painted": 87, ... }
    /// }
    /// ```
    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Json(format!("{}", e)))
    }
}
