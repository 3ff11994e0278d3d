//! # livecast-session
//!
//! チャンネル単位のストリームセッション状態機械と、
//! バイト列 → ユニット → デコード → 描画 のパイプライン。
//!
//! ## パイプライン
//!
//! ```text
//! Transport ──chunk──▶ StreamSession ──bytes──▶ UnitExtractor
//!                          │                        │
//!                          │◀──────── CodedUnit ────┘
//!                          ▼
//!                     UnitDecoder ──(非同期)──▶ PresentationPipe ──▶ PresentationSurface
//! ```
//!
//! ## セッションの状態遷移
//!
//! ```text
//! Idle ─connect─▶ Connecting ─open─▶ Open ─stop / リモート切断 / 置き換え─▶ Closed
//!                     │                                                    ▲
//!                     └──────────────── 接続失敗 ──────────────────────────┘
//! ```
//!
//! `Closed` は終端。チャンネルを切り替えるたびに新しい `StreamSession` を作る。
//! 同時に `Open` なセッションは `PlayerContext` ごとに高々 1 つ。
//!
//! ## スレッドモデル
//!
//! ブラウザのイベントループ（シングルスレッド）前提。
//! 共有状態は `Rc<RefCell<..>>` で持ち、ロックは使わない。

#![no_std]
extern crate alloc;

pub mod config;
pub mod contract;
pub mod control;
pub mod error;
pub mod pipe;
pub mod player;
pub mod queue;
pub mod session;
pub mod stats;

pub use config::{ChannelId, ChannelRange, Endpoint, PlayerConfig};
pub use contract::{
    Connector, DecodedPicture, FrameCallback, PresentationSurface, SurfaceOptions, Transport,
    UnitDecoder,
};
pub use control::ControlMessage;
pub use error::{
    DecoderError, PipelineError, PlayerError, SessionError, SurfaceError, TransportError,
};
pub use pipe::{PaintOutcome, PresentationPipe};
pub use player::PlayerContext;
pub use queue::{ChunkQueue, ChunkTicket, ReadyChunk};
pub use session::{ChunkDisposition, InboundFrame, SessionId, SessionState, StreamSession};
pub use stats::{IngestStats, PlayerStats, PresentationStats};

/// 既定のチャンネル数（1..=27）
pub const DEFAULT_CHANNEL_COUNT: u32 = 27;

/// 既定の WebSocket エンドポイント（ページからの相対パス）
pub const DEFAULT_ENDPOINT_BASE: &str = "websocket";

/// 既定のプレイヤー識別子（クエリ `id` が無いときの値）
pub const DEFAULT_SESSION_ID: &str = "0";

/// 既定のデコーダバージョン
pub const DEFAULT_DECODER_VERSION: &str = "100.1.0";
