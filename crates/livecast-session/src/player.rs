//! プレイヤーコンテキスト
//!
//! 1 つのページ（canvas）に対応するプレイヤーの全状態を明示的に所有する:
//!
//! ```text
//! PlayerContext
//!   ├── Connector          トランスポート生成器
//!   ├── UnitDecoder        プレイヤーごとに 1 つ、セッションをまたいで再利用
//!   ├── PresentationPipe   Rc<RefCell<..>>。デコーダのコールバックと共有
//!   └── StreamSession      現在のセッション（高々 1 つ）
//! ```
//!
//! トランスポートイベントと非同期のチャンク変換完了はすべて `SessionId` 付きで届く。
//! 現在のセッションと一致しない ID のイベントは古いものとして捨てる。

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use livecast_framing::{AnnexBExtractor, UnitExtractor};

use crate::config::{ChannelId, ChannelRange, Endpoint, PlayerConfig};
use crate::contract::{Connector, DecodedPicture, PresentationSurface, UnitDecoder};
use crate::error::{PipelineError, PlayerError};
use crate::pipe::PresentationPipe;
use crate::queue::ChunkTicket;
use crate::session::{ChunkDisposition, InboundFrame, SessionId, SessionState, StreamSession};
use crate::stats::{IngestStats, PlayerStats, PresentationStats};

/// プレイヤーコンテキスト
pub struct PlayerContext<C, D, S, E = AnnexBExtractor>
where
    C: Connector,
    D: UnitDecoder,
    S: PresentationSurface + 'static,
    E: UnitExtractor + Default,
{
    config: PlayerConfig,
    range: ChannelRange,
    connector: C,
    decoder: D,
    pipe: Rc<RefCell<PresentationPipe<S>>>,
    session: Option<StreamSession<C::Transport, E>>,
    next_session_id: u64,
    sessions_started: u64,
    sequencing_faults: u64,
    ingest: IngestStats,
}

impl<C, D, S, E> PlayerContext<C, D, S, E>
where
    C: Connector,
    D: UnitDecoder,
    S: PresentationSurface + 'static,
    E: UnitExtractor + Default,
{
    /// プレイヤーを組み立てる
    ///
    /// `pipe` は描画面のセットアップ（`attach`）を済ませていること。
    /// その後でデコーダにフレームコールバックを登録し、初期化を開始する。
    ///
    /// # エラー
    /// - 設定値が不正
    /// - 描画面が未セットアップ（`PipelineError::SurfaceNotReady`）
    /// - デコーダの初期化開始に失敗
    pub fn new(
        config: PlayerConfig,
        connector: C,
        mut decoder: D,
        pipe: PresentationPipe<S>,
    ) -> Result<Self, PlayerError> {
        config.validate()?;
        if !pipe.is_attached() {
            log::error!("decoder initialization requested before the presentation surface was attached");
            return Err(PipelineError::SurfaceNotReady.into());
        }

        let pipe = Rc::new(RefCell::new(pipe));
        let sink = Rc::clone(&pipe);
        decoder.register_frame_callback(Box::new(move |picture: &DecodedPicture<'_>| {
            deliver(&sink, picture);
        }))?;
        decoder.initialize()?;

        let range = config.channel_range();
        log::info!(
            "player ready: endpoint {}/{}/<1..={}>",
            config.endpoint_base.trim_end_matches('/'),
            config.session_id,
            range.max()
        );

        Ok(PlayerContext {
            config,
            range,
            connector,
            decoder,
            pipe,
            session: None,
            next_session_id: 1,
            sessions_started: 0,
            sequencing_faults: 0,
            ingest: IngestStats::default(),
        })
    }

    pub fn channel_range(&self) -> ChannelRange {
        self.range
    }

    /// 現在のセッションの状態（セッションがなければ `Idle`）
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, |s| s.state())
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id())
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.session.as_ref().map(|s| s.channel())
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// トランスポート生成器への可変参照（WASM 側で自身への弱参照を後から結びつける）
    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// 指定チャンネルの再生を開始する
    ///
    /// 1. チャンネル番号を検証（範囲外ならトランスポートを作らずに拒否）
    /// 2. 現在のセッションが `Closed` でなければ閉じる
    /// 3. 新しい `SessionId` でセッションを作り、トランスポートを生成する
    ///
    /// 成功は後続のデコード済みピクチャで観測する。
    ///
    /// # エラー
    /// - `SessionError::ChannelOutOfRange`
    /// - `TransportError::ConnectFailed`（セッションは `Closed` のまま残る。自動リトライなし）
    pub fn start(&mut self, channel: u32) -> Result<SessionId, PlayerError> {
        let channel = self.range.channel(channel)?;

        self.stop();

        let id = SessionId::new(self.next_session_id);
        self.next_session_id += 1;
        self.sessions_started += 1;

        let endpoint = Endpoint::new(&self.config.endpoint_base, &self.config.session_id, channel);
        let mut session = StreamSession::new(id, channel, endpoint, E::default());
        let result = session.connect(&mut self.connector);
        // 以前のセッション（トランスポートを含む）はここで破棄される
        self.session = Some(session);

        match result {
            Ok(()) => {
                log::info!("session {} started for channel {}", id, channel);
                Ok(id)
            }
            Err(e) => {
                log::warn!("session {} failed to connect: {}", id, e);
                Err(e.into())
            }
        }
    }

    /// 再生を停止する（冪等）
    pub fn stop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.stop() {
                log::info!("session {} stopped", session.id());
            }
        }
        self.set_accepting(false);
    }

    /// トランスポートの open 通知
    pub fn on_transport_open(&mut self, id: SessionId) {
        let Some(session) = self.session_mut(id) else {
            log::debug!("open event for stale session {}", id);
            return;
        };
        match session.on_open() {
            Ok(()) if session.is_open() => {
                log::info!("session {} open on channel {}", id, session.channel());
                self.set_accepting(true);
            }
            Ok(()) => {}
            Err(e) => {
                log::warn!("session {} closed: control message not sent: {}", id, e);
                self.set_accepting(false);
            }
        }
    }

    /// トランスポートのリモート切断通知
    pub fn on_transport_closed(&mut self, id: SessionId) {
        let Some(session) = self.session_mut(id) else {
            return;
        };
        if session.on_remote_close() {
            log::info!("session {} closed by transport", id);
            self.set_accepting(false);
        }
    }

    /// トランスポートのエラー通知（切断は後続の close 通知で扱う）
    pub fn on_transport_error(&mut self, id: SessionId, detail: &str) {
        if self.session_mut(id).is_some() {
            log::warn!("session {} transport error: {}", id, detail);
        }
    }

    /// 受信メッセージの処理
    ///
    /// `InboundFrame::Deferred` の場合は返されたチケットで後から `complete_chunk` を呼ぶ。
    pub fn on_message(
        &mut self,
        id: SessionId,
        frame: InboundFrame,
    ) -> Result<ChunkDisposition, PlayerError> {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.id() == id && s.is_open())
        else {
            log::debug!("message for inactive session {}", id);
            return Ok(ChunkDisposition::Ignored);
        };
        let result = session.on_chunk_received(frame, &mut self.decoder, &mut self.ingest);
        self.report_decoder(result)
    }

    /// 非同期変換が完了したチャンクを届ける
    ///
    /// `bytes` が `None` の場合は変換失敗（順番だけ消費する）。
    pub fn complete_chunk(
        &mut self,
        id: SessionId,
        ticket: ChunkTicket,
        bytes: Option<Vec<u8>>,
    ) -> Result<usize, PlayerError> {
        let Some(session) = self.session.as_mut().filter(|s| s.id() == id) else {
            log::debug!("chunk completion for stale session {}", id);
            return Ok(0);
        };
        let result = session.complete_chunk(ticket, bytes, &mut self.decoder, &mut self.ingest);
        self.report_decoder(result)
    }

    /// 統計スナップショット
    pub fn stats(&self) -> PlayerStats {
        PlayerStats {
            state: self.state(),
            channel: self.channel().map(ChannelId::get),
            sessions_started: self.sessions_started,
            sequencing_faults: self.sequencing_faults,
            ingest: self.ingest,
            presentation: self
                .pipe
                .try_borrow()
                .map(|p| p.stats())
                .unwrap_or_else(|_| PresentationStats::default()),
        }
    }

    fn session_mut(&mut self, id: SessionId) -> Option<&mut StreamSession<C::Transport, E>> {
        self.session.as_mut().filter(|s| s.id() == id)
    }

    fn set_accepting(&self, accepting: bool) {
        match self.pipe.try_borrow_mut() {
            Ok(mut pipe) => pipe.set_accepting(accepting),
            Err(_) => log::error!("presentation pipe busy; accepting={} not applied", accepting),
        }
    }

    /// デコーダ側のエラーを記録して呼び出し元に返す
    fn report_decoder<T>(
        &mut self,
        result: Result<T, crate::error::DecoderError>,
    ) -> Result<T, PlayerError> {
        result.map_err(|e| {
            let err = PlayerError::from(e);
            if err.is_sequencing_fault() {
                self.sequencing_faults += 1;
            }
            log::error!("decode dispatch failed: {}", err);
            err
        })
    }
}

/// デコーダのフレームコールバック本体
///
/// デコーダが `submit_unit` の中から同期的に呼んでも、パイプは別の `RefCell` なので
/// プレイヤー本体を再借用しない。
fn deliver<S: PresentationSurface>(pipe: &Rc<RefCell<PresentationPipe<S>>>, picture: &DecodedPicture<'_>) {
    match pipe.try_borrow_mut() {
        // 失敗はパイプ側でログと fault 計上済み
        Ok(mut pipe) => {
            let _ = pipe.on_decoded(picture);
        }
        Err(_) => log::error!("presentation pipe re-entered; picture dropped"),
    }
}
