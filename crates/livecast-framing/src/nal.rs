//! NAL ユニット種別の判定
//!
//! 切り出したユニットの先頭（スタートコード直後）の 1 バイトから
//! `nal_unit_type`（下位 5 ビット）を読む。デコード自体は行わない。

use crate::error::FramingError;
use crate::{START_CODE, START_CODE_LONG};

/// H.264 の NAL ユニット種別
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NalUnitType {
    Slice,
    SliceA,
    SliceB,
    SliceC,
    Idr,
    Sei,
    Sps,
    Pps,
    Aud,
    EndSeq,
    EndStream,
    FillerData,
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(header: u8) -> Self {
        match header & 0x1F {
            1 => Self::Slice,
            2 => Self::SliceA,
            3 => Self::SliceB,
            4 => Self::SliceC,
            5 => Self::Idr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndSeq,
            11 => Self::EndStream,
            12 => Self::FillerData,
            other => Self::Other(other),
        }
    }
}

impl NalUnitType {
    /// スタートコード付きのユニットから種別を読む
    ///
    /// # エラー
    /// - スタートコードで始まらない（ストリーム先頭のゴミなど）
    /// - スタートコードだけでヘッダーバイトがない
    pub fn of_unit(unit: &[u8]) -> Result<Self, FramingError> {
        let offset = start_code_len(unit).ok_or(FramingError::MissingStartCode)?;
        unit.get(offset)
            .copied()
            .map(Self::from)
            .ok_or(FramingError::TruncatedHeader)
    }

    /// IDR（ランダムアクセス可能なキーフレーム）か
    pub fn is_keyframe(self) -> bool {
        self == Self::Idr
    }

    /// SPS / PPS（デコーダ設定）か
    pub fn is_parameter_set(self) -> bool {
        matches!(self, Self::Sps | Self::Pps)
    }
}

/// 先頭のスタートコード長（4 / 3）。スタートコードがなければ `None`
pub fn start_code_len(bytes: &[u8]) -> Option<usize> {
    if bytes.starts_with(&START_CODE_LONG) {
        Some(START_CODE_LONG.len())
    } else if bytes.starts_with(&START_CODE) {
        Some(START_CODE.len())
    } else {
        None
    }
}
