//! # livecast-wasm
//!
//! wasm-bindgen エクスポート：プレイヤーページ（ブラウザ）から呼び出す公開 API。
//!
//! ## 使用方法（JavaScript）
//!
//! ```javascript
//! import init, { LivePlayer, initPanicHook, initLogging } from './pkg/livecast_wasm';
//! import MissileEngineDecoder from './index';
//! import RenderEngine420P from './render-yuv420p';
//!
//! await init();
//! initPanicHook();
//! initLogging("info");
//!
//! // 描画面のセットアップ → デコーダ初期化 の順で組み立てられる
//! const player = new LivePlayer(
//!     document.getElementById('videoCanvas'),
//!     MissileEngineDecoder,
//!     RenderEngine420P,
//!     JSON.stringify({ session_id: playerId, decoder_token: token }),
//! );
//!
//! // チャンネル選択 → 再生（前のセッションは自動的に閉じる）
//! player.play(Number(channelSelect.value));
//!
//! // 停止
//! player.stop();
//!
//! // 統計（JSON 文字列）
//! console.log(player.getStats());
//! ```

use wasm_bindgen::prelude::*;

pub mod bridge;
pub mod logger;
pub mod player;
pub mod transport;

pub use player::LivePlayer;

/// パニック時にブラウザコンソールにスタックトレースを出力する
///
/// 開発時に必ず呼び出すこと。本番ビルドでは feature flag で無効化可能。
#[wasm_bindgen(js_name = "initPanicHook")]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// コンソールへのログ出力を有効にする
///
/// # 引数
/// - `level`: `"error"` / `"warn"` / `"info"` / `"debug"` / `"trace"` / `"off"`。省略時は `"info"`
#[wasm_bindgen(js_name = "initLogging")]
pub fn init_logging(level: Option<String>) {
    logger::init(level.as_deref());
}
