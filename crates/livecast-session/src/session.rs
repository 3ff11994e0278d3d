//! ストリームセッション状態機械
//!
//! 1 本のトランスポートを 1 つのチャンネルに結びつけ、
//! 受信チャンク → ユニット抽出 → デコーダ投入 を駆動する。

use alloc::string::String;

use livecast_framing::{AnnexBExtractor, CodedUnit, UnitExtractor};
use serde::Serialize;

use crate::config::{ChannelId, Endpoint};
use crate::contract::{Connector, Transport, UnitDecoder};
use crate::control::ControlMessage;
use crate::error::{DecoderError, TransportError};
use crate::queue::{ChunkQueue, ChunkTicket, ReadyChunk};
use crate::stats::IngestStats;

/// プレイヤー内でセッションを識別する世代番号
///
/// トランスポートイベントや非同期のチャンク変換完了は必ずこの ID を伴って届き、
/// 現在のセッションと一致しないものは古いイベントとして捨てられる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        SessionId(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    /// 終端状態
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closed => "closed",
        }
    }
}

/// トランスポートから届いたメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// 既にバイト列になっているペイロード（ArrayBuffer）
    Binary(alloc::vec::Vec<u8>),
    /// バイト列への変換が非同期なペイロード（Blob）。完了は `complete_chunk` で届ける
    Deferred,
    /// バイナリでないペイロード（無視する）
    Text(String),
}

/// `on_chunk_received` の処理結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkDisposition {
    /// 処理した（投入したユニット数）
    Processed { units: usize },
    /// 変換待ち。完了したらこのチケットで `complete_chunk` を呼ぶ
    Deferred(ChunkTicket),
    /// 無視した（非バイナリ、またはセッションが Open でない）
    Ignored,
}

/// 1 チャンネル分のストリームセッション
///
/// ## 責任
/// - トランスポートの所有（close はこのセッションが 1 回だけ行う）
/// - 接続直後の制御メッセージ送信（1 回だけ）
/// - チャンクを到着順にユニット抽出器へ渡し、抽出したユニットを順にデコーダへ投入
///
/// デコーダと描画面はプレイヤー側の所有で、呼び出しごとに借りる。
pub struct StreamSession<T, E = AnnexBExtractor> {
    id: SessionId,
    channel: ChannelId,
    endpoint: Endpoint,
    state: SessionState,
    transport: Option<T>,
    extractor: E,
    queue: ChunkQueue,
    /// 制御メッセージを送ったか
    announced: bool,
}

impl<T: Transport, E: UnitExtractor> StreamSession<T, E> {
    /// `Idle` 状態のセッションを生成する
    pub fn new(id: SessionId, channel: ChannelId, endpoint: Endpoint, extractor: E) -> Self {
        StreamSession {
            id,
            channel,
            endpoint,
            state: SessionState::Idle,
            transport: None,
            extractor,
            queue: ChunkQueue::new(),
            announced: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// 変換待ちのチャンク数
    pub fn pending_chunks(&self) -> usize {
        self.queue.pending()
    }

    /// トランスポートを生成して `Connecting` に入る
    ///
    /// 生成に失敗した場合は直接 `Closed` に遷移する（自動リトライはしない）。
    pub fn connect<C>(&mut self, connector: &mut C) -> Result<(), TransportError>
    where
        C: Connector<Transport = T>,
    {
        if self.state != SessionState::Idle {
            return Ok(());
        }
        match connector.connect(&self.endpoint, self.id) {
            Ok(transport) => {
                self.transport = Some(transport);
                self.state = SessionState::Connecting;
                log::debug!("session {} connecting to {}", self.id, self.endpoint);
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Closed;
                Err(e)
            }
        }
    }

    /// トランスポートの open 通知
    ///
    /// `Open` に遷移し、チャンネルの制御メッセージを 1 回だけ送る。
    /// 送信に失敗した場合はセッションを閉じる。
    pub fn on_open(&mut self) -> Result<(), TransportError> {
        if self.state != SessionState::Connecting {
            log::debug!("session {} ignoring open in state {:?}", self.id, self.state);
            return Ok(());
        }
        self.state = SessionState::Open;

        if self.announced {
            return Ok(());
        }
        let result = ControlMessage::open(self.channel)
            .to_json()
            .map_err(|e| TransportError::SendFailed(alloc::format!("{}", e)))
            .and_then(|json| match self.transport.as_mut() {
                Some(transport) => transport.send_text(&json),
                None => Err(TransportError::SendFailed(String::from("no transport"))),
            });

        match result {
            Ok(()) => {
                self.announced = true;
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    /// 受信メッセージの処理
    ///
    /// - `Binary`: その場でチケットを発行・完了し、順番が来ているチャンクをすべて処理
    /// - `Deferred`: チケットだけ発行して返す
    /// - `Text`: 無視
    pub fn on_chunk_received<D: UnitDecoder>(
        &mut self,
        frame: InboundFrame,
        decoder: &mut D,
        stats: &mut IngestStats,
    ) -> Result<ChunkDisposition, DecoderError> {
        if !self.is_open() {
            return Ok(ChunkDisposition::Ignored);
        }
        match frame {
            InboundFrame::Binary(bytes) => {
                let ticket = self.queue.reserve();
                let units = self.complete_chunk(ticket, Some(bytes), decoder, stats)?;
                Ok(ChunkDisposition::Processed { units })
            }
            InboundFrame::Deferred => Ok(ChunkDisposition::Deferred(self.queue.reserve())),
            InboundFrame::Text(text) => {
                stats.frames_ignored += 1;
                log::debug!(
                    "session {} ignoring non-binary frame ({} bytes)",
                    self.id,
                    text.len()
                );
                Ok(ChunkDisposition::Ignored)
            }
        }
    }

    /// 非同期変換の完了を届け、順番が来ているチャンクをすべて処理する
    ///
    /// `bytes` が `None` の場合は変換失敗として順番だけ消費する。
    ///
    /// # 戻り値
    /// この呼び出しでデコーダに投入したユニット数
    ///
    /// # エラー
    /// デコーダが受け付けなかった場合、最初のエラーを返す。
    /// その場合も受信済みチャンクの処理は最後まで進める（抽出器の状態を壊さない）。
    pub fn complete_chunk<D: UnitDecoder>(
        &mut self,
        ticket: ChunkTicket,
        bytes: Option<alloc::vec::Vec<u8>>,
        decoder: &mut D,
        stats: &mut IngestStats,
    ) -> Result<usize, DecoderError> {
        if !self.is_open() {
            return Ok(0);
        }
        if !self.queue.fulfil(ticket, bytes) {
            log::debug!("session {} dropping stale chunk {}", self.id, ticket.seq());
            return Ok(0);
        }

        let mut submitted = 0;
        let mut first_error = None;
        while let Some(ready) = self.queue.pop_ready() {
            let bytes = match ready {
                ReadyChunk::Bytes(bytes) => bytes,
                ReadyChunk::Skipped => {
                    log::warn!("session {} skipped a chunk that failed to materialize", self.id);
                    continue;
                }
            };
            stats.chunks_received += 1;
            stats.bytes_received += bytes.len() as u64;
            self.extractor.append_bytes(&bytes);

            while let Some(unit) = self.extractor.next_unit() {
                match submit(decoder, &unit, stats) {
                    Ok(()) => submitted += 1,
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(submitted),
        }
    }

    /// セッションを閉じる（冪等）
    ///
    /// # 戻り値
    /// - `true`: この呼び出しで閉じた
    /// - `false`: 既に `Closed` だった
    pub fn stop(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = SessionState::Closed;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.discard_buffers();
        true
    }

    /// リモート側からの切断通知
    ///
    /// 既に閉じているトランスポートに close は送らない。
    /// トランスポート自体はセッションが破棄されるまで保持する
    /// （このイベントを配送しているコールバックを自分で破棄しないため）。
    pub fn on_remote_close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = SessionState::Closed;
        self.discard_buffers();
        true
    }

    fn discard_buffers(&mut self) {
        self.queue.clear();
        if let Some(rest) = self.extractor.flush() {
            log::debug!(
                "session {} discarded {} carried-over bytes",
                self.id,
                rest.len()
            );
        }
    }
}

/// ユニットを 1 つデコーダに投入する
fn submit<D: UnitDecoder>(
    decoder: &mut D,
    unit: &CodedUnit,
    stats: &mut IngestStats,
) -> Result<(), DecoderError> {
    if !decoder.is_ready() {
        stats.units_dropped += 1;
        return Err(DecoderError::NotReady);
    }
    if let Err(e) = decoder.submit_unit(unit) {
        stats.units_dropped += 1;
        return Err(e);
    }
    stats.units_submitted += 1;
    match unit.nal_type() {
        Ok(nal) => {
            if nal.is_keyframe() {
                stats.keyframes_submitted += 1;
            } else if nal.is_parameter_set() {
                stats.parameter_sets_submitted += 1;
            }
            log::trace!("submitted {:?} unit ({} bytes)", nal, unit.len());
        }
        Err(e) => log::debug!("submitted unclassified unit ({} bytes): {}", unit.len(), e),
    }
    Ok(())
}
