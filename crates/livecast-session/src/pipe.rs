//! 描画パイプ（デコード完了 → 描画面）
//!
//! デコーダのフレームコールバックから呼ばれ、ピクチャを 1 枚ずつ描画面に渡す。
//! バッファリングやフレーム間引きはしない。描画レートはデコーダの出力レートそのもの。

use crate::contract::{DecodedPicture, PresentationSurface, SurfaceOptions};
use crate::error::{PipelineError, SurfaceError};
use crate::stats::PresentationStats;

/// `on_decoded` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOutcome {
    Painted,
    /// 再生中のセッションがないため捨てた
    Discarded,
}

/// 描画パイプ
///
/// 描画面はプレイヤーが 1 つだけ持ち、セッションをまたいで再利用する。
pub struct PresentationPipe<S: PresentationSurface> {
    surface: S,
    context: Option<S::Context>,
    /// 再生中のセッションがあるか（なければ届いたピクチャは捨てる）
    accepting: bool,
    stats: PresentationStats,
}

impl<S: PresentationSurface> PresentationPipe<S> {
    /// 未接続（`attach` 前）のパイプを生成する
    pub fn new(surface: S) -> Self {
        PresentationPipe {
            surface,
            context: None,
            accepting: false,
            stats: PresentationStats::default(),
        }
    }

    /// 描画面をセットアップする。デコーダの初期化より前に完了していること
    pub fn attach(&mut self, handle: S::Handle, options: SurfaceOptions) -> Result<(), SurfaceError> {
        let context = self.surface.attach(handle, options)?;
        self.context = Some(context);
        log::debug!(
            "presentation surface attached (preserve_buffer={})",
            options.preserve_buffer
        );
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.context.is_some()
    }

    pub fn set_accepting(&mut self, accepting: bool) {
        self.accepting = accepting;
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn stats(&self) -> PresentationStats {
        self.stats
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// デコード済みピクチャを 1 枚描画する
    ///
    /// # エラー
    /// - `SurfaceNotReady`: `attach` 前に届いた（ライフサイクル順序のバグ）
    /// - `Surface`: 描画面が描画に失敗した
    ///
    /// どちらも error ログに出し、fault として数える。
    pub fn on_decoded(&mut self, picture: &DecodedPicture<'_>) -> Result<PaintOutcome, PipelineError> {
        let context = match self.context.as_ref() {
            Some(context) => context,
            None => {
                self.stats.faults += 1;
                log::error!(
                    "decoded {}x{} picture before presentation surface was attached",
                    picture.width,
                    picture.height
                );
                return Err(PipelineError::SurfaceNotReady);
            }
        };

        if !self.accepting {
            self.stats.pictures_discarded += 1;
            log::debug!("discarding picture delivered after session close");
            return Ok(PaintOutcome::Discarded);
        }

        match self.surface.paint(context, picture) {
            Ok(()) => {
                self.stats.pictures_painted += 1;
                Ok(PaintOutcome::Painted)
            }
            Err(e) => {
                self.stats.faults += 1;
                log::error!("paint failed: {}", e);
                Err(e.into())
            }
        }
    }
}
