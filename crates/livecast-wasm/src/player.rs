//! LivePlayer wasm-bindgen エクスポート
//!
//! プレイヤーページから呼び出すライブ再生クライアントの主エントリポイント。
//! WebSocket 受信・NAL ユニット切り出し・デコーダ投入・描画を統合する。

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use web_sys::HtmlCanvasElement;

use livecast_session::{PlayerConfig, PlayerContext, PresentationPipe, SurfaceOptions, UnitDecoder};

use crate::bridge::{JsDecoder, JsSurface};
use crate::transport::WsConnector;

/// ブラウザ上で組み立てた `PlayerContext`
pub(crate) type Inner = PlayerContext<WsConnector, JsDecoder, JsSurface>;

/// ライブ映像プレイヤー
///
/// ## 内部アーキテクチャ
///
/// ```text
/// LivePlayer
///   └── Rc<RefCell<PlayerContext>>
///         ├── WsConnector       (transport) - チャンネルごとの WebSocket
///         ├── JsDecoder         (bridge)    - JS デコーダ
///         ├── PresentationPipe  (livecast-session) - 描画面
///         └── StreamSession     (livecast-session) - 現在のセッション
/// ```
///
/// WebSocket のイベントハンドラは `PlayerContext` への弱参照を持つ。
/// `LivePlayer` が破棄されるとハンドラは何もしなくなる。
#[wasm_bindgen]
pub struct LivePlayer {
    inner: Rc<RefCell<Inner>>,
}

#[wasm_bindgen]
impl LivePlayer {
    /// プレイヤーを組み立てる
    ///
    /// 描画面のセットアップ、デコーダの生成、フレームコールバックの登録、
    /// デコーダ初期化の順に行う。
    ///
    /// # 引数
    /// - `canvas`: 描画先の canvas 要素
    /// - `decoder_module`: `CMissileDecoder` クラスを持つデコーダモジュール
    /// - `render_engine`: `setupCanvas` / `renderFrame` を持つ描画エンジン
    /// - `config_json`: 設定（JSON 文字列）。省略時はすべて既定値
    ///
    /// # エラー
    /// - 設定 JSON の解析失敗・値が不正
    /// - 描画面のセットアップ失敗
    /// - デコーダの生成・初期化開始に失敗
    #[wasm_bindgen(constructor)]
    pub fn new(
        canvas: HtmlCanvasElement,
        decoder_module: JsValue,
        render_engine: JsValue,
        config_json: Option<String>,
    ) -> Result<LivePlayer, JsError> {
        let config = match config_json.as_deref() {
            Some(json) => PlayerConfig::from_json(json)
                .map_err(|e| JsError::new(&format!("Invalid player config: {}", e)))?,
            None => PlayerConfig::default(),
        };

        let mut pipe = PresentationPipe::new(JsSurface::new(render_engine));
        pipe.attach(
            canvas,
            SurfaceOptions {
                preserve_buffer: config.preserve_drawing_buffer,
            },
        )
        .map_err(|e| JsError::new(&format!("Canvas setup failed: {}", e)))?;

        let decoder = JsDecoder::construct(&decoder_module, &config.decoder_token, &config.decoder_version)
            .map_err(|e| JsError::new(&format!("Decoder construction failed: {}", e)))?;

        let context = PlayerContext::new(config, WsConnector::new(), decoder, pipe)
            .map_err(|e| JsError::new(&format!("Player setup failed: {}", e)))?;

        let inner = Rc::new(RefCell::new(context));
        inner.borrow_mut().connector_mut().bind(Rc::downgrade(&inner));

        Ok(LivePlayer { inner })
    }

    /// チャンネルの再生を開始する
    ///
    /// 再生中のセッションがあれば先に閉じる。
    ///
    /// # 引数
    /// - `channel`: 1..=channelCount
    ///
    /// # エラー
    /// - チャンネル番号が範囲外（既存セッションはそのまま）
    /// - WebSocket の生成に失敗
    #[wasm_bindgen]
    pub fn play(&self, channel: u32) -> Result<(), JsError> {
        let mut inner = self
            .inner
            .try_borrow_mut()
            .map_err(|_| JsError::new("Player is busy"))?;
        inner
            .start(channel)
            .map(|_| ())
            .map_err(|e| JsError::new(&format!("Play failed: {}", e)))
    }

    /// 再生を停止する（何度呼んでもよい）
    #[wasm_bindgen]
    pub fn stop(&self) {
        match self.inner.try_borrow_mut() {
            Ok(mut inner) => inner.stop(),
            Err(_) => log::error!("player is busy; stop ignored"),
        }
    }

    /// セッション状態（`"idle"` / `"connecting"` / `"open"` / `"closed"`）
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        match self.inner.try_borrow() {
            Ok(inner) => inner.state().as_str().to_string(),
            Err(_) => String::from("busy"),
        }
    }

    /// 現在のチャンネル番号
    #[wasm_bindgen]
    pub fn channel(&self) -> Option<u32> {
        self.inner
            .try_borrow()
            .ok()
            .and_then(|inner| inner.channel().map(|c| c.get()))
    }

    /// 選択可能なチャンネル数
    #[wasm_bindgen(js_name = "channelCount")]
    pub fn channel_count(&self) -> u32 {
        self.inner
            .try_borrow()
            .map(|inner| inner.channel_range().max())
            .unwrap_or(0)
    }

    /// デコーダの初期化が完了しているか
    #[wasm_bindgen(js_name = "isDecoderReady")]
    pub fn is_decoder_ready(&self) -> bool {
        self.inner
            .try_borrow()
            .map(|inner| inner.decoder().is_ready())
            .unwrap_or(false)
    }

    /// 再生統計を JSON 文字列で返す
    ///
    /// # 戻り値
    /// JSON 文字列:
    /// ```json
    /// {
    ///   "state": "open",
    ///   "channel": 5,
    ///   "sessions_started": 1,
    ///   "sequencing_faults": 0,
    ///   "ingest": { "chunks_received": 120, "bytes_received": 482133, ... },
    ///   "presentation": { "pictures_painted": 87, "pictures_discarded": 0, "faults": 0 }
    /// }
    /// ```
    #[wasm_bindgen(js_name = "getStats")]
    pub fn get_stats(&self) -> Result<String, JsError> {
        let inner = self
            .inner
            .try_borrow()
            .map_err(|_| JsError::new("Player is busy"))?;
        inner
            .stats()
            .to_json()
            .map_err(|e| JsError::new(&format!("Stats serialization failed: {}", e)))
    }
}

impl Drop for LivePlayer {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.stop();
        }
    }
}
