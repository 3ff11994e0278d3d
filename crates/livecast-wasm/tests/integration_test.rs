//! livecast-wasm 統合テスト
//!
//! framing + session + pipe の完全なパイプラインを native で検証する。
//! WebSocket・JS デコーダ・描画エンジンはそれぞれモックに置き換え、
//! ブラウザでのイベント順序をテスト側で再現する。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use livecast_framing::{AnnexBExtractor, CodedUnit, NalUnitType, UnitExtractor};
use livecast_session::{
    ChunkDisposition, Connector, DecodedPicture, DecoderError, Endpoint, FrameCallback,
    InboundFrame, PlayerConfig, PlayerContext, PlayerError, PresentationPipe,
    PresentationSurface, SessionError, SessionId, SessionState, SurfaceError, SurfaceOptions,
    Transport, TransportError, UnitDecoder,
};

// ==============================================================
// ヘルパー: ブラウザ側コラボレータのモック
// ==============================================================

/// トランスポート操作の記録（"connect #1 websocket/0/5" のような行）
type Wire = Rc<RefCell<Vec<String>>>;

/// テスト側から切り替える接続・送信の失敗
#[derive(Default)]
struct Faults {
    refuse_connect: Cell<bool>,
    refuse_send: Cell<bool>,
}

struct MockSocket {
    session: SessionId,
    wire: Wire,
    faults: Rc<Faults>,
}

impl Transport for MockSocket {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if self.faults.refuse_send.get() {
            return Err(TransportError::SendFailed("socket not writable".into()));
        }
        self.wire
            .borrow_mut()
            .push(format!("send {} {}", self.session, text));
        Ok(())
    }

    fn close(&mut self) {
        self.wire.borrow_mut().push(format!("close {}", self.session));
    }
}

struct MockConnector {
    wire: Wire,
    faults: Rc<Faults>,
}

impl Connector for MockConnector {
    type Transport = MockSocket;

    fn connect(&mut self, endpoint: &Endpoint, session: SessionId) -> Result<MockSocket, TransportError> {
        if self.faults.refuse_connect.get() {
            return Err(TransportError::ConnectFailed {
                url: endpoint.url().to_string(),
                reason: "refused".into(),
            });
        }
        self.wire
            .borrow_mut()
            .push(format!("connect {} {}", session, endpoint));
        Ok(MockSocket {
            session,
            wire: Rc::clone(&self.wire),
            faults: Rc::clone(&self.faults),
        })
    }
}

/// テスト側から操作できるデコーダの共有状態
#[derive(Default)]
struct DecoderProbe {
    /// `initFinish` 相当（テスト側で立てる）
    ready: Cell<bool>,
    /// 投入されたユニット
    submitted: RefCell<Vec<Vec<u8>>>,
    /// 登録されたフレームコールバック
    callback: RefCell<Option<FrameCallback>>,
}

impl DecoderProbe {
    /// デコーダの外から 1 枚分のピクチャを届ける（遅れて届いたピクチャの再現）
    fn emit_picture(&self) {
        if let Some(callback) = self.callback.borrow_mut().as_mut() {
            emit(callback);
        }
    }
}

/// スライス系ユニットを受け取るたびにピクチャを同期的に返すデコーダ
struct MockDecoder {
    probe: Rc<DecoderProbe>,
    ready_on_init: bool,
}

impl UnitDecoder for MockDecoder {
    fn initialize(&mut self) -> Result<(), DecoderError> {
        if self.ready_on_init {
            self.probe.ready.set(true);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.probe.ready.get()
    }

    fn register_frame_callback(&mut self, callback: FrameCallback) -> Result<(), DecoderError> {
        *self.probe.callback.borrow_mut() = Some(callback);
        Ok(())
    }

    fn submit_unit(&mut self, unit: &CodedUnit) -> Result<(), DecoderError> {
        self.probe.submitted.borrow_mut().push(unit.as_bytes().to_vec());
        let picture_unit = matches!(unit.nal_type(), Ok(NalUnitType::Idr) | Ok(NalUnitType::Slice));
        if picture_unit {
            self.probe.emit_picture();
        }
        Ok(())
    }
}

fn emit(callback: &mut FrameCallback) {
    let luma = [0x80u8; 4];
    let chroma = [0x10u8; 1];
    callback(&DecodedPicture {
        luma: &luma,
        cb: &chroma,
        cr: &chroma,
        luma_stride: 2,
        cb_stride: 1,
        cr_stride: 1,
        width: 2,
        height: 2,
    });
}

/// 描画したピクチャの (width, height) を記録する描画面
struct RecordingSurface {
    painted: Rc<RefCell<Vec<(u32, u32)>>>,
}

impl PresentationSurface for RecordingSurface {
    type Handle = &'static str;
    type Context = String;

    fn attach(&mut self, canvas: &'static str, _options: SurfaceOptions) -> Result<String, SurfaceError> {
        Ok(format!("ctx:{}", canvas))
    }

    fn paint(&mut self, _context: &String, picture: &DecodedPicture<'_>) -> Result<(), SurfaceError> {
        self.painted.borrow_mut().push((picture.width, picture.height));
        Ok(())
    }
}

type TestPlayer = PlayerContext<MockConnector, MockDecoder, RecordingSurface>;

/// 組み立て済みのプレイヤーと観測用ハンドル
struct Harness {
    player: TestPlayer,
    wire: Wire,
    faults: Rc<Faults>,
    probe: Rc<DecoderProbe>,
    painted: Rc<RefCell<Vec<(u32, u32)>>>,
}

impl Harness {
    fn new(ready_on_init: bool) -> Self {
        let wire: Wire = Rc::new(RefCell::new(Vec::new()));
        let faults = Rc::new(Faults::default());
        let probe = Rc::new(DecoderProbe::default());
        let painted = Rc::new(RefCell::new(Vec::new()));

        let mut pipe = PresentationPipe::new(RecordingSurface {
            painted: Rc::clone(&painted),
        });
        pipe.attach("videoCanvas", SurfaceOptions::default()).unwrap();

        let player = PlayerContext::new(
            PlayerConfig::default(),
            MockConnector {
                wire: Rc::clone(&wire),
                faults: Rc::clone(&faults),
            },
            MockDecoder {
                probe: Rc::clone(&probe),
                ready_on_init,
            },
            pipe,
        )
        .expect("プレイヤーの組み立てに失敗");

        Harness {
            player,
            wire,
            faults,
            probe,
            painted,
        }
    }

    /// 再生開始 → open 通知まで進める
    fn open(&mut self, channel: u32) -> SessionId {
        let id = self.player.start(channel).expect("再生開始に失敗");
        self.player.on_transport_open(id);
        id
    }

    fn wire(&self) -> Vec<String> {
        self.wire.borrow().clone()
    }
}

/// SPS, PPS, IDR, スライス, AUD からなるストリーム
///
/// 末尾の AUD は次のスタートコードが来るまで確定しない。
fn sample_stream() -> Vec<u8> {
    vec![
        0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1f, // SPS
        0, 0, 0, 1, 0x68, 0xce, 0x3c, 0x80, // PPS
        0, 0, 0, 1, 0x65, 0x88, 0x84, 0x21, // IDR
        0, 0, 1, 0x41, 0x9a, 0x02, // スライス（3 バイトのスタートコード）
        0, 0, 0, 1, 0x09, 0xf0, // AUD
    ]
}

/// ストリームをまとめて切り出したユニット列（flush 分を含む）
fn units_of(chunks: &[&[u8]]) -> Vec<Vec<u8>> {
    let mut extractor = AnnexBExtractor::new();
    let mut units = Vec::new();
    for chunk in chunks {
        extractor.append_bytes(chunk);
        while let Some(unit) = extractor.next_unit() {
            units.push(unit.into_bytes());
        }
    }
    if let Some(rest) = extractor.flush() {
        units.push(rest.into_bytes());
    }
    units
}

// ==============================================================
// テスト: フレーミング
// ==============================================================

/// どの分割位置でもユニット列が変わらず、バイトが失われない
#[test]
fn test_framing_is_chunking_independent() {
    let stream = sample_stream();
    let expected = units_of(&[stream.as_slice()]);
    assert_eq!(expected.len(), 5, "ユニット数が一致しない");

    for split in 1..stream.len() {
        let (a, b) = stream.split_at(split);
        assert_eq!(units_of(&[a, b]), expected, "分割位置 {} で結果が変わった", split);
    }

    let bytewise: Vec<&[u8]> = stream.chunks(1).collect();
    assert_eq!(units_of(&bytewise), expected, "1 バイトずつの投入で結果が変わった");
    assert_eq!(expected.concat(), stream, "ユニットを連結しても元のストリームにならない");
}

/// ユニットの途中で分かれたチャンク（A1 / A2）から元のユニットが復元される
#[test]
fn test_unit_split_across_chunks() {
    let a1: &[u8] = &[0, 0, 0, 1, 0x65, 0x88];
    let a2: &[u8] = &[0x84, 0x21, 0, 0, 0, 1, 0x41, 0x9a];

    let mut extractor = AnnexBExtractor::new();
    extractor.append_bytes(a1);
    assert!(extractor.next_unit().is_none(), "A1 だけではユニットは確定しない");

    extractor.append_bytes(a2);
    let unit = extractor.next_unit().expect("A2 の後に IDR が確定するはず");
    assert_eq!(unit.as_bytes(), &[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x21]);
    assert_eq!(unit.nal_type(), Ok(NalUnitType::Idr));
    assert!(extractor.next_unit().is_none());

    let rest = extractor.flush().expect("残りのスライスが flush されるはず");
    assert_eq!(rest.as_bytes(), &[0, 0, 0, 1, 0x41, 0x9a]);
}

// ==============================================================
// テスト: セッションのライフサイクル
// ==============================================================

/// open 後に制御メッセージがちょうど 1 回、チャンクより先に送られる
#[test]
fn test_control_message_sent_once_on_open() {
    let mut h = Harness::new(true);
    let id = h.player.start(5).unwrap();
    assert_eq!(h.player.state(), SessionState::Connecting);

    // open 前のチャンクは処理しない
    let early = h.player.on_message(id, InboundFrame::Binary(sample_stream())).unwrap();
    assert_eq!(early, ChunkDisposition::Ignored);

    h.player.on_transport_open(id);
    h.player.on_transport_open(id);
    assert_eq!(h.player.state(), SessionState::Open);
    assert_eq!(
        h.wire(),
        vec![
            "connect #1 websocket/0/5".to_string(),
            r#"send #1 {"t":"open","c":"ch5"}"#.to_string(),
        ]
    );
    assert!(h.probe.submitted.borrow().is_empty(), "open 前のバイトが投入された");
}

/// 範囲外のチャンネルは拒否され、再生中のセッションはそのまま
#[test]
fn test_out_of_range_channel_keeps_current_session() {
    let mut h = Harness::new(true);
    let id = h.open(3);

    let err = h.player.start(30).unwrap_err();
    assert_eq!(
        err,
        PlayerError::Session(SessionError::ChannelOutOfRange { channel: 30, max: 27 })
    );
    assert_eq!(h.player.current_session(), Some(id));
    assert_eq!(h.player.state(), SessionState::Open);
    assert!(h.player.start(0).is_err(), "チャンネル 0 は範囲外");
    assert_eq!(h.wire().len(), 2, "拒否時にトランスポートが作られた");
}

/// チャンネル切り替えでは前のセッションを閉じてから接続する
#[test]
fn test_switch_closes_previous_before_connecting() {
    let mut h = Harness::new(true);
    let first = h.open(1);
    let second = h.open(2);
    assert_ne!(first, second);

    assert_eq!(
        h.wire(),
        vec![
            "connect #1 websocket/0/1".to_string(),
            r#"send #1 {"t":"open","c":"ch1"}"#.to_string(),
            "close #1".to_string(),
            "connect #2 websocket/0/2".to_string(),
            r#"send #2 {"t":"open","c":"ch2"}"#.to_string(),
        ]
    );
    assert_eq!(h.player.channel().map(|c| c.get()), Some(2));
    assert_eq!(h.player.stats().sessions_started, 2);
}

/// 置き換えられたセッションのイベントは何も起こさない
#[test]
fn test_stale_session_events_are_ignored() {
    let mut h = Harness::new(true);
    let old = h.open(1);
    let current = h.open(2);

    let stale = h.player.on_message(old, InboundFrame::Binary(sample_stream())).unwrap();
    assert_eq!(stale, ChunkDisposition::Ignored);
    h.player.on_transport_closed(old);
    h.player.on_transport_error(old, "error");

    assert_eq!(h.player.current_session(), Some(current));
    assert_eq!(h.player.state(), SessionState::Open);
    assert!(h.probe.submitted.borrow().is_empty());
}

/// stop は何度呼んでも close は 1 回
#[test]
fn test_stop_is_idempotent() {
    let mut h = Harness::new(true);
    h.open(4);
    h.player.stop();
    h.player.stop();
    assert_eq!(h.player.state(), SessionState::Closed);

    let closes = h.wire().iter().filter(|l| l.starts_with("close")).count();
    assert_eq!(closes, 1, "close が重複した");
}

/// リモート切断後は close を送らず、次の再生で新しいセッションが始まる
#[test]
fn test_remote_close_then_restart() {
    let mut h = Harness::new(true);
    let first = h.open(7);
    h.player.on_transport_closed(first);
    assert_eq!(h.player.state(), SessionState::Closed);

    h.player.stop();
    let second = h.open(7);
    assert_ne!(first, second);
    assert!(
        !h.wire().iter().any(|l| l == "close #1"),
        "リモート切断済みのトランスポートに close を送った"
    );
    assert_eq!(h.player.state(), SessionState::Open);
}

/// 制御メッセージを送れなかったセッションは閉じ、描画も止まる
#[test]
fn test_control_send_failure_closes_session() {
    let mut h = Harness::new(true);
    h.faults.refuse_send.set(true);
    let id = h.open(5);

    assert_eq!(h.player.state(), SessionState::Closed);
    assert_eq!(
        h.wire(),
        vec!["connect #1 websocket/0/5".to_string(), "close #1".to_string()],
        "close はちょうど 1 回のはず"
    );

    // 閉じたセッションのチャンクは処理しない
    let late = h.player.on_message(id, InboundFrame::Binary(sample_stream())).unwrap();
    assert_eq!(late, ChunkDisposition::Ignored);

    h.probe.emit_picture();
    assert!(h.painted.borrow().is_empty(), "閉じたセッションのピクチャが描画された");
    assert_eq!(h.player.stats().presentation.pictures_discarded, 1);

    h.player.stop();
    let closes = h.wire().iter().filter(|l| l.starts_with("close")).count();
    assert_eq!(closes, 1, "close が重複した");
}

/// 接続確立前の切断（ハンドシェイク失敗）で Closed になり、遅れた open は無視される
#[test]
fn test_remote_close_while_connecting() {
    let mut h = Harness::new(true);
    let id = h.player.start(5).unwrap();
    assert_eq!(h.player.state(), SessionState::Connecting);

    h.player.on_transport_closed(id);
    assert_eq!(h.player.state(), SessionState::Closed);

    h.player.on_transport_open(id);
    assert_eq!(h.player.state(), SessionState::Closed, "Closed は終端のはず");
    assert_eq!(
        h.wire(),
        vec!["connect #1 websocket/0/5".to_string()],
        "close も制御メッセージも送ってはいけない"
    );

    h.probe.emit_picture();
    assert!(h.painted.borrow().is_empty());
}

/// 接続に失敗した再生はエラーを返して Closed に留まり、次の再生は普通に始まる
#[test]
fn test_connect_failure_leaves_session_closed() {
    let mut h = Harness::new(true);
    h.faults.refuse_connect.set(true);

    let err = h.player.start(5).unwrap_err();
    assert!(
        matches!(err, PlayerError::Transport(TransportError::ConnectFailed { ref url, .. }) if url == "websocket/0/5"),
        "想定外のエラー: {:?}",
        err
    );
    assert_eq!(h.player.state(), SessionState::Closed);
    assert!(h.wire().is_empty(), "自動リトライしてはいけない");

    h.faults.refuse_connect.set(false);
    let id = h.open(6);
    assert_eq!(h.player.current_session(), Some(id));
    assert_eq!(h.player.state(), SessionState::Open);
    assert_eq!(
        h.wire(),
        vec![
            "connect #2 websocket/0/6".to_string(),
            r#"send #2 {"t":"open","c":"ch6"}"#.to_string(),
        ]
    );
}

// ==============================================================
// テスト: デコード投入と描画
// ==============================================================

/// 受信 → 切り出し → 投入 → 同期コールバック → 描画 の完全なフロー
#[test]
fn test_full_pipeline_paints_pictures() {
    let mut h = Harness::new(true);
    let id = h.open(5);

    let stream = sample_stream();
    let (a, b) = stream.split_at(13);
    h.player.on_message(id, InboundFrame::Binary(a.to_vec())).unwrap();
    h.player.on_message(id, InboundFrame::Binary(b.to_vec())).unwrap();
    h.player.on_message(id, InboundFrame::Text("keepalive".into())).unwrap();

    // AUD は次のスタートコード待ちで残る
    assert_eq!(h.probe.submitted.borrow().len(), 4);
    assert_eq!(*h.painted.borrow(), vec![(2, 2), (2, 2)], "IDR とスライスの 2 枚が描画されるはず");

    let stats = h.player.stats();
    assert_eq!(stats.ingest.chunks_received, 2);
    assert_eq!(stats.ingest.bytes_received, stream.len() as u64);
    assert_eq!(stats.ingest.units_submitted, 4);
    assert_eq!(stats.ingest.keyframes_submitted, 1);
    assert_eq!(stats.ingest.parameter_sets_submitted, 2);
    assert_eq!(stats.ingest.frames_ignored, 1);
    assert_eq!(stats.presentation.pictures_painted, 2);
    assert_eq!(stats.presentation.faults, 0);
}

/// 非同期変換（Blob）の完了順が入れ替わってもチケット順に処理される
#[test]
fn test_deferred_chunks_are_processed_in_arrival_order() {
    let mut h = Harness::new(true);
    let id = h.open(5);

    let stream = sample_stream();
    let (a, b) = stream.split_at(20);

    let first = match h.player.on_message(id, InboundFrame::Deferred).unwrap() {
        ChunkDisposition::Deferred(ticket) => ticket,
        other => panic!("チケットが発行されなかった: {:?}", other),
    };
    let second = match h.player.on_message(id, InboundFrame::Deferred).unwrap() {
        ChunkDisposition::Deferred(ticket) => ticket,
        other => panic!("チケットが発行されなかった: {:?}", other),
    };

    // 後のチャンクが先に完了しても、先のチャンクが揃うまで待つ
    assert_eq!(h.player.complete_chunk(id, second, Some(b.to_vec())).unwrap(), 0);
    assert!(h.probe.submitted.borrow().is_empty());

    assert_eq!(h.player.complete_chunk(id, first, Some(a.to_vec())).unwrap(), 4);
    let expected: Vec<Vec<u8>> = units_of(&[stream.as_slice()]).into_iter().take(4).collect();
    assert_eq!(*h.probe.submitted.borrow(), expected, "投入順が受信順と一致しない");
}

/// 変換に失敗したチャンクは順番だけ消費し、後続を止めない
#[test]
fn test_failed_materialization_does_not_stall_queue() {
    let mut h = Harness::new(true);
    let id = h.open(5);

    let lost = match h.player.on_message(id, InboundFrame::Deferred).unwrap() {
        ChunkDisposition::Deferred(ticket) => ticket,
        other => panic!("チケットが発行されなかった: {:?}", other),
    };
    let next = match h.player.on_message(id, InboundFrame::Deferred).unwrap() {
        ChunkDisposition::Deferred(ticket) => ticket,
        other => panic!("チケットが発行されなかった: {:?}", other),
    };

    h.player.complete_chunk(id, next, Some(sample_stream())).unwrap();
    assert!(h.probe.submitted.borrow().is_empty());
    h.player.complete_chunk(id, lost, None).unwrap();
    assert_eq!(h.probe.submitted.borrow().len(), 4);
}

/// デコーダの初期化完了前に届いたユニットは投入せず、順序違反として数える
#[test]
fn test_units_before_decoder_ready_are_sequencing_faults() {
    let mut h = Harness::new(false);
    let id = h.open(5);

    let err = h
        .player
        .on_message(id, InboundFrame::Binary(sample_stream()))
        .unwrap_err();
    assert_eq!(err, PlayerError::Decoder(DecoderError::NotReady));
    assert!(h.probe.submitted.borrow().is_empty());

    let stats = h.player.stats();
    assert_eq!(stats.sequencing_faults, 1);
    assert_eq!(stats.ingest.units_dropped, 4);

    // initFinish 後は通常どおり投入される
    h.probe.ready.set(true);
    h.player
        .on_message(id, InboundFrame::Binary(vec![0, 0, 0, 1, 0x65, 0x11]))
        .unwrap();
    assert_eq!(h.probe.submitted.borrow().len(), 1, "保留中の AUD が投入されるはず");
}

/// 停止後に届いたピクチャは描画されない
#[test]
fn test_picture_after_stop_is_discarded() {
    let mut h = Harness::new(true);
    h.open(5);
    h.probe.emit_picture();
    assert_eq!(h.painted.borrow().len(), 1);

    h.player.stop();
    h.probe.emit_picture();
    assert_eq!(h.painted.borrow().len(), 1, "停止後のピクチャが描画された");

    let stats = h.player.stats();
    assert_eq!(stats.presentation.pictures_painted, 1);
    assert_eq!(stats.presentation.pictures_discarded, 1);
}

/// 統計 JSON にセッション状態と累計が含まれる
#[test]
fn test_stats_json_reflects_session() {
    let mut h = Harness::new(true);
    let id = h.open(9);
    h.player.on_message(id, InboundFrame::Binary(sample_stream())).unwrap();

    let json = h.player.stats().to_json().unwrap();
    assert!(json.contains(r#""state":"open""#), "{}", json);
    assert!(json.contains(r#""channel":9"#), "{}", json);
    assert!(json.contains(r#""units_submitted":4"#), "{}", json);
}
