//! livecast-framing エラー型

use thiserror::Error;

/// フレーミング層のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// ユニットがスタートコードで始まっていない
    #[error("Unit does not begin with an Annex B start code")]
    MissingStartCode,
    /// スタートコードの後に NAL ヘッダーがない
    #[error("Unit ends before its NAL header byte")]
    TruncatedHeader,
}
