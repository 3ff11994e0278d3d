//! JS 製デコーダ / YUV 描画エンジンへのブリッジ
//!
//! どちらも外部モジュールで、メソッド名だけが契約になっている。
//!
//! ```text
//! decoder = new module.CMissileDecoder(token, version)
//! decoder.initFinish = () => { ... }            // 初期化完了通知
//! decoder.bindCallback((y, u, v, strideY, strideU, strideV, width, height) => { ... })
//! decoder.initDecoder()
//! decoder.decodeNalu(Uint8Array)
//!
//! ctx = engine.setupCanvas(canvas, { preserveDrawingBuffer })
//! engine.renderFrame(ctx, y, u, v, strideY, height)
//! ```

use std::cell::Cell;
use std::rc::Rc;

use js_sys::{Array, Function, Object, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::HtmlCanvasElement;

use livecast_framing::CodedUnit;
use livecast_session::{
    DecodedPicture, DecoderError, FrameCallback, PresentationSurface, SurfaceError,
    SurfaceOptions, UnitDecoder,
};

/// デコーダクラス名
const DECODER_CLASS: &str = "CMissileDecoder";

/// フレームコールバックの JS 側シグネチャ
type JsFrameCallback = dyn FnMut(JsValue, JsValue, JsValue, f64, f64, f64, f64, f64);

/// `target[name](...args)` を呼ぶ
fn call_method(target: &JsValue, name: &str, args: &Array) -> Result<JsValue, JsValue> {
    let method: Function = Reflect::get(target, &JsValue::from_str(name))?.dyn_into()?;
    method.apply(target, args)
}

fn describe(value: &JsValue) -> String {
    value
        .as_string()
        .unwrap_or_else(|| format!("{:?}", value))
}

/// プレーンを `Uint8Array` として受け取る（配列ライクならここで型付き配列にする）
fn plane_array(value: JsValue) -> Uint8Array {
    match value.dyn_into::<Uint8Array>() {
        Ok(array) => array,
        Err(other) => Uint8Array::new(&other),
    }
}

/// フレームコールバックで使い回すプレーン用バッファ
///
/// ピクチャごとの確保をなくし、JS からのコピーは 1 プレーンにつき 1 回だけにする。
#[derive(Debug, Default)]
struct PlaneScratch {
    luma: Vec<u8>,
    cb: Vec<u8>,
    cr: Vec<u8>,
}

impl PlaneScratch {
    /// 各プレーンをちょうど `lens` の長さに揃えて返す（容量は縮めない）
    fn planes_mut(&mut self, lens: [usize; 3]) -> (&mut [u8], &mut [u8], &mut [u8]) {
        self.luma.resize(lens[0], 0);
        self.cb.resize(lens[1], 0);
        self.cr.resize(lens[2], 0);
        (&mut self.luma, &mut self.cb, &mut self.cr)
    }
}

/// JS デコーダ
///
/// デコーダはプレイヤーごとに 1 つ。セッションを切り替えても作り直さない。
pub struct JsDecoder {
    inner: JsValue,
    ready: Rc<Cell<bool>>,
    /// `initFinish` に渡したクロージャ（JS 側が呼ぶ間は保持し続ける）
    _on_ready: Closure<dyn FnMut()>,
    _on_frame: Option<Closure<JsFrameCallback>>,
}

impl JsDecoder {
    /// `new module.CMissileDecoder(token, version)` でデコーダを生成する
    pub fn construct(module: &JsValue, token: &str, version: &str) -> Result<Self, DecoderError> {
        let class: Function = Reflect::get(module, &JsValue::from_str(DECODER_CLASS))
            .and_then(|c| c.dyn_into())
            .map_err(|e| {
                DecoderError::InitFailed(format!("{} not found: {}", DECODER_CLASS, describe(&e)))
            })?;
        let args = Array::of2(&JsValue::from_str(token), &JsValue::from_str(version));
        let inner = Reflect::construct(&class, &args)
            .map_err(|e| DecoderError::InitFailed(describe(&e)))?;

        let ready = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ready);
        let on_ready = Closure::<dyn FnMut()>::new(move || {
            flag.set(true);
            log::info!("decoder initialized");
        });
        Reflect::set(&inner, &JsValue::from_str("initFinish"), on_ready.as_ref())
            .map_err(|e| DecoderError::InitFailed(describe(&e)))?;

        Ok(JsDecoder {
            inner,
            ready,
            _on_ready: on_ready,
            _on_frame: None,
        })
    }
}

impl UnitDecoder for JsDecoder {
    fn initialize(&mut self) -> Result<(), DecoderError> {
        call_method(&self.inner, "initDecoder", &Array::new())
            .map(|_| ())
            .map_err(|e| DecoderError::InitFailed(describe(&e)))
    }

    fn is_ready(&self) -> bool {
        self.ready.get()
    }

    fn register_frame_callback(&mut self, mut callback: FrameCallback) -> Result<(), DecoderError> {
        let mut scratch = PlaneScratch::default();
        let closure = Closure::<JsFrameCallback>::new(
            move |y: JsValue,
                  u: JsValue,
                  v: JsValue,
                  stride_y: f64,
                  stride_u: f64,
                  stride_v: f64,
                  width: f64,
                  height: f64| {
                // プレーンはデコーダが再利用するので、コールバック内でコピーして使い切る
                let (y, u, v) = (plane_array(y), plane_array(u), plane_array(v));
                let (luma, cb, cr) = scratch.planes_mut([
                    y.length() as usize,
                    u.length() as usize,
                    v.length() as usize,
                ]);
                y.copy_to(luma);
                u.copy_to(cb);
                v.copy_to(cr);
                let picture = DecodedPicture {
                    luma,
                    cb,
                    cr,
                    luma_stride: stride_y as u32,
                    cb_stride: stride_u as u32,
                    cr_stride: stride_v as u32,
                    width: width as u32,
                    height: height as u32,
                };
                callback(&picture);
            },
        );
        call_method(&self.inner, "bindCallback", &Array::of1(closure.as_ref()))
            .map_err(|e| DecoderError::InitFailed(format!("bindCallback: {}", describe(&e))))?;
        self._on_frame = Some(closure);
        Ok(())
    }

    fn submit_unit(&mut self, unit: &CodedUnit) -> Result<(), DecoderError> {
        let bytes = Uint8Array::from(unit.as_bytes());
        call_method(&self.inner, "decodeNalu", &Array::of1(&bytes))
            .map(|_| ())
            .map_err(|e| DecoderError::SubmitFailed(describe(&e)))
    }
}

/// JS の YUV420P 描画エンジン
pub struct JsSurface {
    engine: JsValue,
}

impl JsSurface {
    pub fn new(engine: JsValue) -> Self {
        JsSurface { engine }
    }
}

impl PresentationSurface for JsSurface {
    type Handle = HtmlCanvasElement;
    type Context = JsValue;

    fn attach(
        &mut self,
        canvas: HtmlCanvasElement,
        options: SurfaceOptions,
    ) -> Result<JsValue, SurfaceError> {
        let opts = Object::new();
        Reflect::set(
            &opts,
            &JsValue::from_str("preserveDrawingBuffer"),
            &JsValue::from_bool(options.preserve_buffer),
        )
        .map_err(|e| SurfaceError::AttachFailed(describe(&e)))?;

        let canvas = JsValue::from(canvas);
        call_method(&self.engine, "setupCanvas", &Array::of2(&canvas, &opts))
            .map_err(|e| SurfaceError::AttachFailed(describe(&e)))
    }

    fn paint(&mut self, context: &JsValue, picture: &DecodedPicture<'_>) -> Result<(), SurfaceError> {
        let args = Array::new();
        args.push(context);
        // SAFETY: ビューは wasm メモリを直接指す。生成から renderFrame の呼び出しが戻るまで
        // Rust 側の確保は起きず、描画エンジンは呼び出しの中でプレーンを読み終える。
        unsafe {
            args.push(&Uint8Array::view(picture.luma));
            args.push(&Uint8Array::view(picture.cb));
            args.push(&Uint8Array::view(picture.cr));
        }
        args.push(&JsValue::from_f64(f64::from(picture.luma_stride)));
        args.push(&JsValue::from_f64(f64::from(picture.height)));

        call_method(&self.engine, "renderFrame", &args)
            .map(|_| ())
            .map_err(|e| SurfaceError::PaintFailed(describe(&e)))
    }
}
