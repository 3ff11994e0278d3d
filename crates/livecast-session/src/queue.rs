//! 到着順を保証するチャンクキュー
//!
//! WebSocket の Blob ペイロードはバイト列への変換（`Blob.arrayBuffer()`）が非同期で、
//! 変換完了の順序は到着順と一致するとは限らない。
//! 到着時にチケットを発行し、変換済みチャンクはチケット順にのみ取り出せるようにする。
//!
//! ```text
//! 到着:   reserve() → #0   reserve() → #1   reserve() → #2
//! 完了:   fulfil(#1)       fulfil(#0)       fulfil(#2)
//! 取出:                    #0, #1           #2
//! ```

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// チャンクの到着順を表すチケット
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkTicket {
    /// 発行したキューの世代（`clear` のたびに進む）
    epoch: u32,
    /// 到着順の通し番号
    seq: u64,
}

impl ChunkTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// 取り出し可能になったチャンク
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyChunk {
    /// 変換済みのバイト列
    Bytes(Vec<u8>),
    /// 変換に失敗した（順番だけ消費する）
    Skipped,
}

/// 1 セッション分のチャンクキュー
pub struct ChunkQueue {
    epoch: u32,
    /// 次に発行する通し番号
    next_seq: u64,
    /// 次に取り出す通し番号
    next_ready: u64,
    /// 変換が完了したが、まだ順番が来ていないチャンク
    arrived: BTreeMap<u64, Option<Vec<u8>>>,
}

impl ChunkQueue {
    pub fn new() -> Self {
        ChunkQueue {
            epoch: 0,
            next_seq: 0,
            next_ready: 0,
            arrived: BTreeMap::new(),
        }
    }

    /// 到着したチャンクにチケットを発行する
    pub fn reserve(&mut self) -> ChunkTicket {
        let ticket = ChunkTicket {
            epoch: self.epoch,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        ticket
    }

    /// チケットに変換結果を結びつける（`None` は変換失敗）
    ///
    /// # 戻り値
    /// - `true`: 受け付けた
    /// - `false`: 別世代のチケット、または既に完了済み（破棄）
    pub fn fulfil(&mut self, ticket: ChunkTicket, bytes: Option<Vec<u8>>) -> bool {
        if ticket.epoch != self.epoch
            || ticket.seq < self.next_ready
            || ticket.seq >= self.next_seq
            || self.arrived.contains_key(&ticket.seq)
        {
            return false;
        }
        self.arrived.insert(ticket.seq, bytes);
        true
    }

    /// 順番が来ているチャンクを 1 つ取り出す
    pub fn pop_ready(&mut self) -> Option<ReadyChunk> {
        let bytes = self.arrived.remove(&self.next_ready)?;
        self.next_ready += 1;
        Some(match bytes {
            Some(bytes) => ReadyChunk::Bytes(bytes),
            None => ReadyChunk::Skipped,
        })
    }

    /// 発行済みで、まだ取り出されていないチャンク数
    pub fn pending(&self) -> usize {
        (self.next_seq - self.next_ready) as usize
    }

    /// 未処理のチャンクをすべて捨て、発行済みチケットを無効にする
    pub fn clear(&mut self) {
        self.arrived.clear();
        self.next_ready = self.next_seq;
        self.epoch = self.epoch.wrapping_add(1);
    }
}

impl Default for ChunkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_in_order_completion() {
        let mut q = ChunkQueue::new();
        let t0 = q.reserve();
        assert!(q.fulfil(t0, Some(vec![1])));
        assert_eq!(q.pop_ready(), Some(ReadyChunk::Bytes(vec![1])));
        assert_eq!(q.pop_ready(), None);
        assert_eq!(q.pending(), 0);
    }

    #[test]
    fn test_out_of_order_completion_is_released_in_order() {
        let mut q = ChunkQueue::new();
        let t0 = q.reserve();
        let t1 = q.reserve();
        let t2 = q.reserve();

        assert!(q.fulfil(t2, Some(vec![2])));
        assert!(q.fulfil(t1, Some(vec![1])));
        // #0 がまだなので何も出ない
        assert_eq!(q.pop_ready(), None);
        assert_eq!(q.pending(), 3);

        assert!(q.fulfil(t0, Some(vec![0])));
        assert_eq!(q.pop_ready(), Some(ReadyChunk::Bytes(vec![0])));
        assert_eq!(q.pop_ready(), Some(ReadyChunk::Bytes(vec![1])));
        assert_eq!(q.pop_ready(), Some(ReadyChunk::Bytes(vec![2])));
        assert_eq!(q.pop_ready(), None);
    }

    #[test]
    fn test_failed_materialization_does_not_stall() {
        let mut q = ChunkQueue::new();
        let t0 = q.reserve();
        let t1 = q.reserve();
        assert!(q.fulfil(t1, Some(vec![9])));
        assert!(q.fulfil(t0, None));

        assert_eq!(q.pop_ready(), Some(ReadyChunk::Skipped));
        assert_eq!(q.pop_ready(), Some(ReadyChunk::Bytes(vec![9])));
    }

    #[test]
    fn test_duplicate_and_unknown_tickets_rejected() {
        let mut q = ChunkQueue::new();
        let t0 = q.reserve();
        assert!(q.fulfil(t0, Some(vec![1])));
        assert!(!q.fulfil(t0, Some(vec![2])), "同じチケットの二重完了");
        q.pop_ready();
        assert!(!q.fulfil(t0, Some(vec![3])), "取り出し済みチケット");

        let mut other = ChunkQueue::new();
        other.reserve();
        let foreign = other.reserve();
        assert!(!q.fulfil(foreign, Some(vec![4])), "未発行の通し番号");
    }

    #[test]
    fn test_clear_invalidates_outstanding_tickets() {
        let mut q = ChunkQueue::new();
        let t0 = q.reserve();
        let t1 = q.reserve();
        assert!(q.fulfil(t1, Some(vec![1])));

        q.clear();
        assert_eq!(q.pending(), 0);
        assert!(!q.fulfil(t0, Some(vec![0])));
        assert_eq!(q.pop_ready(), None);

        let t2 = q.reserve();
        assert!(q.fulfil(t2, Some(vec![2])));
        assert_eq!(q.pop_ready(), Some(ReadyChunk::Bytes(vec![2])));
    }
}
