//! # livecast-framing
//!
//! WebSocket から届く生バイトストリームを、デコーダに渡せる完全な
//! コード化ユニット（H.264 NAL ユニット）に切り出すフレーミング層。
//!
//! ## 入力と出力
//!
//! ```text
//! チャンク境界（トランスポート都合、ユニット境界とは無関係）
//!   |<---- chunk 1 ---->|<------ chunk 2 ------>|<--- chunk 3 --->|
//!   [00 00 00 01 67 ..][.. 00 00 01 68 .. 00 00][00 01 65 .......]
//!   |<-- unit (SPS) ---->|<-- unit (PPS) ---->|<--- unit (IDR) ...
//! ```
//!
//! - スタートコードは `00 00 01`（3 バイト）または `00 00 00 01`（4 バイト）
//! - チャンクをまたいだスタートコードも、残りのバイトが届いた時点で検出する
//! - 最初のスタートコードより前のバイトはそれ単体で 1 ユニットとして出す
//!   （全ユニットを連結すると入力と完全に一致する）
//!
//! ## 使い方
//!
//! ```
//! use livecast_framing::{AnnexBExtractor, UnitExtractor};
//!
//! let mut extractor = AnnexBExtractor::new();
//! extractor.append_bytes(&[0, 0, 0, 1, 0x67, 0x42, 0, 0, 1, 0x68]);
//! while let Some(unit) = extractor.next_unit() {
//!     // デコーダへ投入
//!     assert_eq!(unit.as_bytes(), &[0, 0, 0, 1, 0x67, 0x42]);
//! }
//! ```

#![no_std]
extern crate alloc;

pub mod error;
pub mod extractor;
pub mod nal;

pub use error::FramingError;
pub use extractor::{AnnexBExtractor, CodedUnit, UnitExtractor};
pub use nal::NalUnitType;

/// 3 バイトの Annex B スタートコード
pub const START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// 4 バイトの Annex B スタートコード（zero_byte 付き）
pub const START_CODE_LONG: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
