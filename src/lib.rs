//! Volume Bridge.
//!
//! `voxbridge`は、呼び出し側が保持するボリューム画像(e.g., NIfTI由来のボクセル列)を、
//! メモリ的に隔離された画像処理エンジン(典型的にはwasmモジュール)に受け渡すためのブリッジ.
//!
//! # 特徴
//!
//! - エンジンとのデータ交換は、全て一つの共有線形メモリ([arena])を経由して行われる
//! - アリーナ上の領域の割当自体はエンジン側のアロケータが行い、
//!   このクレートはその結果を[verifier]に記録して、割当規律の違反(アライメント違反・重複割当・二重解放)を即座に検知する
//! - 一回の処理呼び出し([Bridge::process])で確保した領域は、成功・失敗に関わらず全て解放される
//! - エンジン呼び出し中にアリーナが拡張される可能性があるため、
//!   生のビューは保持せず、必要になる度に(オフセットと長さから)再導出する
//!
//! # モジュールの依存関係
//!
//! ```text
//! bridge => arena => verifier => granule
//!        => engine => memory
//! ```
//!
//! - [bridge]モジュール:
//!   - 主に[Bridge]構造体を提供
//!   - `voxbridge`の利用者が直接触るのはこの構造体
//! - [arena]モジュール:
//!   - 伸長可能な線形メモリと、その最大容量分の[HeapVerifier]を保持する
//! - [engine]モジュール:
//!   - エンジンの境界ABI(allocate/free/compute)を表現する[Engine]トレイトとその実装群を提供
//! - [memory]モジュール:
//!   - アリーナの実体となる[LinearMemory]トレイトとその実装群を提供
//!
//! [arena]: ./arena/index.html
//! [verifier]: ./verifier/index.html
//! [bridge]: ./bridge/index.html
//! [engine]: ./engine/index.html
//! [memory]: ./memory/index.html
//! [Bridge]: ./bridge/struct.Bridge.html
//! [Bridge::process]: ./bridge/struct.Bridge.html#method.process
//! [HeapVerifier]: ./verifier/struct.HeapVerifier.html
//! [Engine]: ./engine/trait.Engine.html
//! [LinearMemory]: ./memory/trait.LinearMemory.html
#![warn(missing_docs)]
extern crate byteorder;
extern crate prometrics;
#[macro_use]
extern crate trackable;
#[macro_use]
extern crate slog;
#[cfg(feature = "wasm")]
extern crate wasmtime;

pub use crate::error::{EngineFailure, Error, ErrorKind};

#[cfg(feature = "wasm")]
macro_rules! track_wasm {
    ($expr:expr) => {
        $expr.map_err(|e: ::wasmtime::Error| {
            track!(crate::Error::from(::trackable::error::ErrorKindExt::cause(
                crate::ErrorKind::EngineTrapped,
                e.to_string()
            )))
        })
    };
}

pub mod arena;
pub mod bridge;
pub mod engine;
pub mod granule;
pub mod memory;
pub mod metrics;
pub mod verifier;
pub mod volume;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
