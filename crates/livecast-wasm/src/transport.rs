//! WebSocket トランスポート
//!
//! 各イベントハンドラはセッション ID とプレイヤーへの弱参照だけを持つ。
//! プレイヤーが破棄された後やセッションが置き換えられた後のイベントは何もしない。
//!
//! ## Blob ペイロード
//!
//! `binaryType = "blob"` のとき、バイナリフレームは Blob として届く。
//! バイト列への変換（`Blob.arrayBuffer()`）は非同期なので、到着時にチケットを取り、
//! 変換完了後に `complete_chunk` で届ける（処理順はチケット順に保証される）。

use std::cell::RefCell;
use std::rc::Weak;

use js_sys::{ArrayBuffer, Uint8Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{BinaryType, Blob, CloseEvent, Event, MessageEvent, WebSocket};

use livecast_session::{
    ChunkDisposition, ChunkTicket, Connector, Endpoint, InboundFrame, SessionId, Transport,
    TransportError,
};

use crate::player::Inner;

/// WebSocket 1 本と、そのイベントハンドラ
pub struct WsTransport {
    socket: WebSocket,
    _on_open: Closure<dyn FnMut(Event)>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_close: Closure<dyn FnMut(CloseEvent)>,
    _on_error: Closure<dyn FnMut(Event)>,
}

impl Transport for WsTransport {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.socket
            .send_with_str(text)
            .map_err(|e| TransportError::SendFailed(format!("{:?}", e)))
    }

    fn close(&mut self) {
        match self.socket.ready_state() {
            WebSocket::CLOSING | WebSocket::CLOSED => {}
            _ => {
                if let Err(e) = self.socket.close() {
                    log::warn!("websocket close failed: {:?}", e);
                }
            }
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        // ハンドラを外してからクロージャを解放する
        self.socket.set_onopen(None);
        self.socket.set_onmessage(None);
        self.socket.set_onclose(None);
        self.socket.set_onerror(None);
    }
}

/// WebSocket を生成する `Connector`
///
/// プレイヤー自身への弱参照は、プレイヤーを `Rc` に包んだ後で `bind` する。
pub struct WsConnector {
    player: Weak<RefCell<Inner>>,
}

impl WsConnector {
    pub fn new() -> Self {
        WsConnector { player: Weak::new() }
    }

    pub fn bind(&mut self, player: Weak<RefCell<Inner>>) {
        self.player = player;
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for WsConnector {
    type Transport = WsTransport;

    fn connect(&mut self, endpoint: &Endpoint, session: SessionId) -> Result<WsTransport, TransportError> {
        let socket = WebSocket::new(endpoint.url()).map_err(|e| TransportError::ConnectFailed {
            url: endpoint.url().to_string(),
            reason: format!("{:?}", e),
        })?;
        socket.set_binary_type(BinaryType::Blob);

        let player = self.player.clone();
        let on_open = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
            with_player(&player, |p| p.on_transport_open(session));
        });

        let player = self.player.clone();
        let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            on_message(&player, session, event.data());
        });

        let player = self.player.clone();
        let on_close = Closure::<dyn FnMut(CloseEvent)>::new(move |event: CloseEvent| {
            log::debug!(
                "session {} websocket closed (code={}, reason={:?})",
                session,
                event.code(),
                event.reason()
            );
            with_player(&player, |p| p.on_transport_closed(session));
        });

        let player = self.player.clone();
        let on_error = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let detail = event.type_();
            with_player(&player, |p| p.on_transport_error(session, &detail));
        });

        socket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
        socket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        socket.set_onclose(Some(on_close.as_ref().unchecked_ref()));
        socket.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        Ok(WsTransport {
            socket,
            _on_open: on_open,
            _on_message: on_message,
            _on_close: on_close,
            _on_error: on_error,
        })
    }
}

/// プレイヤーが生きていて借用できれば `f` を呼ぶ
fn with_player<R>(player: &Weak<RefCell<Inner>>, f: impl FnOnce(&mut Inner) -> R) -> Option<R> {
    let player = player.upgrade()?;
    let Ok(mut inner) = player.try_borrow_mut() else {
        log::error!("player is busy; transport event dropped");
        return None;
    };
    Some(f(&mut inner))
}

/// 受信ペイロードを種類ごとに振り分ける
fn on_message(player: &Weak<RefCell<Inner>>, session: SessionId, data: JsValue) {
    if let Some(blob) = data.dyn_ref::<Blob>() {
        let disposition = with_player(player, |p| p.on_message(session, InboundFrame::Deferred));
        if let Some(Ok(ChunkDisposition::Deferred(ticket))) = disposition {
            let blob = blob.clone();
            let player = player.clone();
            wasm_bindgen_futures::spawn_local(async move {
                materialize(player, session, ticket, blob).await;
            });
        }
    } else if let Some(buffer) = data.dyn_ref::<ArrayBuffer>() {
        let bytes = Uint8Array::new(buffer).to_vec();
        // デコーダ側のエラーは PlayerContext がログと統計に記録済み
        let _ = with_player(player, |p| p.on_message(session, InboundFrame::Binary(bytes)));
    } else if let Some(text) = data.as_string() {
        let _ = with_player(player, |p| p.on_message(session, InboundFrame::Text(text)));
    } else {
        log::debug!("session {} ignoring unsupported payload", session);
    }
}

/// Blob をバイト列に変換し、チケットに結びつけて届ける
async fn materialize(player: Weak<RefCell<Inner>>, session: SessionId, ticket: ChunkTicket, blob: Blob) {
    let bytes = match JsFuture::from(blob.array_buffer()).await {
        Ok(buffer) => Some(Uint8Array::new(&buffer).to_vec()),
        Err(e) => {
            log::warn!("session {} failed to read blob: {:?}", session, e);
            None
        }
    };
    let _ = with_player(&player, |p| p.complete_chunk(session, ticket, bytes));
}
