//! livecast-session エラー型
//!
//! 外部コラボレータ（トランスポート・デコーダ・描画面）ごとに型を分け、
//! `PlayerError` に `#[from]` で集約する。

use alloc::string::String;

use thiserror::Error;

/// トランスポート（WebSocket）のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// 接続を確立できなかった
    #[error("Failed to open transport to {url}: {reason}")]
    ConnectFailed { url: String, reason: String },
    /// 送信に失敗した
    #[error("Failed to send on transport: {0}")]
    SendFailed(String),
}

/// デコーダのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderError {
    /// 初期化完了前にユニットが投入された（ライフサイクル順序のバグ）
    #[error("Decoder is not initialized")]
    NotReady,
    /// 初期化に失敗した
    #[error("Decoder initialization failed: {0}")]
    InitFailed(String),
    /// ユニット投入に失敗した
    #[error("Decoder rejected unit: {0}")]
    SubmitFailed(String),
}

/// 描画面のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// 描画面のセットアップに失敗した
    #[error("Failed to attach presentation surface: {0}")]
    AttachFailed(String),
    /// 描画に失敗した
    #[error("Failed to paint picture: {0}")]
    PaintFailed(String),
}

/// セッション・設定のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// チャンネル番号が設定範囲外
    #[error("Channel {channel} is outside 1..={max}")]
    ChannelOutOfRange { channel: u32, max: u32 },
    /// 設定値が不正
    #[error("Invalid player configuration: {0}")]
    InvalidConfig(String),
    /// JSON のエンコード/デコードに失敗した
    #[error("JSON error: {0}")]
    Json(String),
}

/// 描画パイプのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// 描画面のセットアップ前にピクチャが届いた（ライフサイクル順序のバグ）
    #[error("Presentation surface is not attached")]
    SurfaceNotReady,
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// `PlayerContext` の操作が返すエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decoder(#[from] DecoderError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl PlayerError {
    /// ライフサイクル順序の不具合（運用者に通知すべきもの）か
    pub fn is_sequencing_fault(&self) -> bool {
        matches!(
            self,
            PlayerError::Decoder(DecoderError::NotReady)
                | PlayerError::Pipeline(PipelineError::SurfaceNotReady)
        )
    }
}
