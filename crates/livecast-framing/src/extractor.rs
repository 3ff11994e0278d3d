//! ユニット抽出器（バイトストリーム → コード化ユニット）
//!
//! ## 契約
//!
//! ```text
//! append_bytes(chunk)            チャンクを内部バッファに積む
//! while let Some(u) = next_unit() 完成したユニットを尽きるまで取り出す
//! flush()                        ストリーム終端で残りを 1 ユニットとして取り出す
//! ```
//!
//! 次のスタートコードが見えるまでユニットの終端は確定しないため、
//! 最後のユニットは常に内部に持ち越される。

use alloc::vec::Vec;

use crate::error::FramingError;
use crate::nal::NalUnitType;
use crate::START_CODE;

/// デコーダにそのまま渡せる 1 つの完全なユニット（先頭のスタートコードを含む）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedUnit(Vec<u8>);

impl CodedUnit {
    pub fn new(bytes: Vec<u8>) -> Self {
        CodedUnit(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// NAL ユニット種別
    pub fn nal_type(&self) -> Result<NalUnitType, FramingError> {
        NalUnitType::of_unit(&self.0)
    }
}

impl AsRef<[u8]> for CodedUnit {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// ユニット抽出器の契約
///
/// チャンク境界をまたぐ持ち越し状態は実装側が保持する。
/// `append_bytes` の後は必ず `next_unit` が `None` を返すまで呼び出すこと。
pub trait UnitExtractor {
    /// 受信チャンクを到着順に積む
    fn append_bytes(&mut self, bytes: &[u8]);

    /// 完成したユニットを 1 つ取り出す。完成したものがなければ `None`
    fn next_unit(&mut self) -> Option<CodedUnit>;

    /// 持ち越し中のバイトを最後のユニットとして取り出す（ストリーム終端用）
    fn flush(&mut self) -> Option<CodedUnit>;

    /// まだユニットとして出していないバイト数
    fn buffered_len(&self) -> usize;
}

/// Annex B（スタートコード区切り）ストリームの抽出器
///
/// ## 内部状態
///
/// ```text
/// buffer: [ 出力済み | 組み立て中ユニット ............ ]
///                    ^head               ^scan_from
/// ```
///
/// - `head`: 組み立て中ユニットの先頭
/// - `scan_from`: 次にスタートコードを探し始める位置（走査済み部分は再走査しない）
///
/// 出力済み領域は `next_unit` が `None` を返すタイミングでまとめて詰める。
pub struct AnnexBExtractor {
    buffer: Vec<u8>,
    head: usize,
    scan_from: usize,
    /// 受け取った総バイト数（統計用）
    total_in: u64,
    /// ユニットとして出力した総バイト数（統計用）
    total_out: u64,
}

impl AnnexBExtractor {
    /// 空の抽出器を生成する
    pub fn new() -> Self {
        AnnexBExtractor {
            buffer: Vec::new(),
            head: 0,
            scan_from: 0,
            total_in: 0,
            total_out: 0,
        }
    }

    /// 受け取った総バイト数
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// ユニットとして出力した総バイト数
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// 組み立て中ユニットの次のユニット境界を探す
    ///
    /// 4 バイトのスタートコードでは先頭の 0x00 を次のユニット側に含める。
    /// 境界が `head` と一致する（組み立て中ユニット自身のスタートコード）場合は読み飛ばす。
    fn find_boundary(&mut self) -> Option<usize> {
        let mut i = self.scan_from.max(self.head + 1);
        while i + START_CODE.len() <= self.buffer.len() {
            if self.buffer[i..i + START_CODE.len()] == START_CODE {
                let boundary = if self.buffer[i - 1] == 0 { i - 1 } else { i };
                if boundary > self.head {
                    return Some(boundary);
                }
            }
            i += 1;
        }
        // 末尾 2 バイトはスタートコードの前半かもしれないので次回また見る
        self.scan_from = i;
        None
    }

    /// 出力済み領域を捨ててバッファを詰める
    fn compact(&mut self) {
        if self.head == 0 {
            return;
        }
        self.buffer.drain(..self.head);
        self.scan_from = self.scan_from.saturating_sub(self.head);
        self.head = 0;
    }

    fn take_until(&mut self, end: usize) -> CodedUnit {
        let unit = self.buffer[self.head..end].to_vec();
        self.head = end;
        self.scan_from = end + 1;
        self.total_out += unit.len() as u64;
        CodedUnit(unit)
    }
}

impl UnitExtractor for AnnexBExtractor {
    fn append_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        self.total_in += bytes.len() as u64;
    }

    fn next_unit(&mut self) -> Option<CodedUnit> {
        match self.find_boundary() {
            Some(end) => Some(self.take_until(end)),
            None => {
                self.compact();
                None
            }
        }
    }

    fn flush(&mut self) -> Option<CodedUnit> {
        if self.head >= self.buffer.len() {
            self.buffer.clear();
            self.head = 0;
            self.scan_from = 0;
            return None;
        }
        let end = self.buffer.len();
        let unit = self.take_until(end);
        self.buffer.clear();
        self.head = 0;
        self.scan_from = 0;
        log::debug!("flushed trailing unit of {} bytes", unit.len());
        Some(unit)
    }

    fn buffered_len(&self) -> usize {
        self.buffer.len() - self.head
    }
}

impl Default for AnnexBExtractor {
    fn default() -> Self {
        Self::new()
    }
}
