//! 外部コラボレータとの契約
//!
//! トランスポート・デコーダ・描画面はこのクレートの外（ブラウザ / JS モジュール）にある。
//! ここではそれらに求める最小限の操作だけを trait として定義する。
//! WASM 実装は `livecast-wasm`、テスト用のモックは各テストモジュールにある。

use alloc::boxed::Box;

use livecast_framing::CodedUnit;

use crate::config::Endpoint;
use crate::error::{DecoderError, SurfaceError, TransportError};
use crate::session::SessionId;

/// 1 本の確立済み（または確立中の）トランスポート接続
pub trait Transport {
    /// テキストフレームを送る（制御メッセージ用）
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// 接続を閉じる。既に閉じていても何もしない
    fn close(&mut self);
}

/// トランスポートの生成器
///
/// 生成したトランスポートは以後のイベント（open / message / close）を
/// `session` の ID 付きで `PlayerContext` に届ける責任を持つ。
pub trait Connector {
    type Transport: Transport;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
        session: SessionId,
    ) -> Result<Self::Transport, TransportError>;
}

/// デコード済みピクチャ（YUV 4:2:0 プレーン）
///
/// プレーンはデコーダからの借用。描画呼び出しの間だけ有効で、
/// コールバックが戻った後にデコーダが再利用してよい。
#[derive(Debug, Clone, Copy)]
pub struct DecodedPicture<'a> {
    pub luma: &'a [u8],
    pub cb: &'a [u8],
    pub cr: &'a [u8],
    pub luma_stride: u32,
    pub cb_stride: u32,
    pub cr_stride: u32,
    pub width: u32,
    pub height: u32,
}

/// デコード完了ごとに 1 回呼ばれるコールバック
pub type FrameCallback = Box<dyn FnMut(&DecodedPicture<'_>)>;

/// ユニットデコーダ
pub trait UnitDecoder {
    /// 初期化を開始する。完了は非同期でもよい（完了までは `is_ready` が false）
    fn initialize(&mut self) -> Result<(), DecoderError>;

    /// ユニットを受け付けられる状態か
    fn is_ready(&self) -> bool;

    /// ピクチャ完成時のコールバックを登録する（プレイヤーごとに 1 回）
    fn register_frame_callback(&mut self, callback: FrameCallback) -> Result<(), DecoderError>;

    /// ユニットを 1 つ投入する。デコード結果はコールバックで非同期に届く
    fn submit_unit(&mut self, unit: &CodedUnit) -> Result<(), DecoderError>;
}

/// 描画面のセットアップオプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceOptions {
    /// 描画後もバッファ内容を保持するか
    pub preserve_buffer: bool,
}

/// YUV プレーンを画面に描画する面
pub trait PresentationSurface {
    /// 描画先のハンドル（canvas 要素など）
    type Handle;
    /// `attach` が返す描画コンテキスト
    type Context;

    fn attach(
        &mut self,
        handle: Self::Handle,
        options: SurfaceOptions,
    ) -> Result<Self::Context, SurfaceError>;

    /// 1 枚描画する。`picture` の参照を呼び出し後に保持してはならない
    fn paint(
        &mut self,
        context: &Self::Context,
        picture: &DecodedPicture<'_>,
    ) -> Result<(), SurfaceError>;
}
