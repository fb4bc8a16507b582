//! 画像処理エンジンの境界ABIの定義と実装群.
//!
//! エンジンは、メモリ的に隔離された(不透明な)計算モジュールであり、
//! ホストからは以下のエクスポート関数経由でのみ操作される:
//!
//! | 関数 | シグネチャ | 契約 |
//! |---|---|---|
//! | allocate | `(size) -> offset` | アリーナ内のオフセットを返す. 呼び出し側はそれを記録する必要がある |
//! | free | `(offset)` | 呼び出し側は、その前後で解放を記録する必要がある |
//! | compute | `(image, params, datatype, nx, ny, nz, nt, dx, dy, dz, dt, command) -> status` | `0`なら成功、それ以外は致命的な失敗 |
//!
//! いずれの関数も、副作用としてアリーナ(線形メモリ)を伸長し得る.
pub use self::mock::MockEngine;
#[cfg(feature = "wasm")]
pub use self::wasm::{WasmEngine, WasmMemory};

use crate::memory::LinearMemory;
use crate::Result;

mod mock;
#[cfg(feature = "wasm")]
mod wasm;

/// 画像処理エンジンを表すトレイト.
///
/// エンジンは、自身が読み書きする線形メモリ(`Self::Memory`)を所有しておらず、
/// 各呼び出しの際に引数として受け取る.
/// 線形メモリの所有者は[`SharedArena`]である.
///
/// [`SharedArena`]: ../arena/struct.SharedArena.html
pub trait Engine {
    /// エンジンが操作する線形メモリの型.
    type Memory: LinearMemory;

    /// エンジン側のアロケータを用いて`size`バイトの領域を割り当てる.
    ///
    /// 割当の結果は、呼び出し側が[`SharedArena::record_allocation`]で記録する必要がある.
    ///
    /// [`SharedArena::record_allocation`]: ../arena/struct.SharedArena.html#method.record_allocation
    fn allocate(&mut self, memory: &mut Self::Memory, size: u32) -> Result<u32>;

    /// エンジン側のアロケータを用いて`offset`から始まる領域を解放する.
    fn free(&mut self, memory: &mut Self::Memory, offset: u32) -> Result<()>;

    /// エンジンの計算関数を呼び出す.
    ///
    /// 計算関数が返したステータスコードがそのまま返される(`0`が成功).
    ///
    /// # Errors
    ///
    /// エンジンの実行自体が異常終了した場合には、種類が`ErrorKind::EngineTrapped`のエラーが返される.
    fn compute(&mut self, memory: &mut Self::Memory, call: &ComputeCall) -> Result<i32>;
}

/// 計算関数の呼び出し引数.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeCall {
    /// ボクセル列の領域の開始位置.
    pub image: u32,

    /// 較正パラメータの領域の開始位置.
    pub params: u32,

    /// 要素型コード.
    pub datatype: i32,

    /// 各軸の要素数.
    pub dims: [i32; 4],

    /// 各軸の間隔.
    pub pix_dims: [f32; 4],

    /// ゼロ終端されたコマンド文字列の領域の開始位置.
    pub command: u32,
}
