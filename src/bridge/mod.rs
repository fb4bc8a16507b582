//! エンジン呼び出しの境界プロトコル.
//!
//! 一回の処理([`Bridge::process`])は、以下の手順で行われる:
//!
//! 1. 要素型の検証 (サポート対象外なら、割当を一切行わずに失敗する)
//! 2. コマンド文字列の領域(ゼロ終端込み)の割当と書き込み
//! 3. 較正パラメータの領域の割当と書き込み
//! 4. ボクセル列の領域の割当と書き込み
//! 5. エンジンの計算関数の呼び出し
//! 6. ステータスの検査 (非ゼロなら、領域を解放した上で失敗する)
//! 7. 較正パラメータとボクセル列のビューの再導出
//! 8. 呼び出し側のバッファへの書き戻し
//! 9. 全領域の解放
//!
//! 割当済みの領域は[`RegionScope`]によって管理されるため、途中で失敗した場合でも解放漏れは発生しない.
//!
//! [`Bridge::process`]: struct.Bridge.html#method.process
//! [`RegionScope`]: struct.RegionScope.html
use slog::Logger;
use std::fmt;
use std::time::Instant;

pub use self::builder::BridgeBuilder;
pub use self::scope::{RegionId, RegionScope};

use crate::arena::SharedArena;
use crate::engine::{ComputeCall, Engine};
use crate::error::EngineFailure;
use crate::metrics::BridgeMetrics;
use crate::volume::{Calibration, Volume};
use crate::{Error, ErrorKind, Result};

mod builder;
mod scope;

/// ホストとエンジンの間のブリッジ.
///
/// エンジン・アリーナ・ロガー・メトリクスを一つにまとめたコンテキストオブジェクト.
/// 処理の呼び出しには`&mut self`が必要なため、同時に複数の処理が走ることは無い.
pub struct Bridge<E: Engine> {
    logger: Logger,
    engine: E,
    arena: SharedArena<E::Memory>,
    metrics: BridgeMetrics,
}
impl<E: Engine> Bridge<E> {
    pub(crate) fn new(
        logger: Logger,
        engine: E,
        arena: SharedArena<E::Memory>,
        metrics: BridgeMetrics,
    ) -> Self {
        Bridge {
            logger,
            engine,
            arena,
            metrics,
        }
    }

    /// `command`を指定して、エンジンに`volume`を処理させる.
    ///
    /// 成功した場合には、`volume`のボクセル列と較正パラメータが、エンジンによる処理結果で上書きされる.
    ///
    /// 成功・失敗に関わらず、この呼び出しの中で割り当てた領域は全て解放される.
    ///
    /// # Errors
    ///
    /// - 要素型がサポート対象外: `ErrorKind::UnsupportedDatatype` (アリーナ上の割当は一切行われない)
    /// - ボクセル列の長さがヘッダと一致しない、またはコマンドにゼロバイトが含まれる: `ErrorKind::InvalidInput`
    /// - エンジンが非ゼロのステータスを返した: `ErrorKind::EngineFailed`
    /// - 割当規律の違反: `ErrorKind::{Misaligned, AlreadyAllocated, UnknownRelease, OutOfRange}`
    ///
    /// `ErrorKind::EngineFailed`の場合には、`volume`は呼び出し前の状態のままとなる.
    /// ステータスとコマンドは[`Error::engine_failure`]で取得可能.
    ///
    /// [`Error::engine_failure`]: ../struct.Error.html#method.engine_failure
    pub fn process(&mut self, volume: &mut Volume, command: &str) -> Result<()> {
        self.metrics.calls.increment();
        let header = volume.header().clone();
        let datatype = match header.datatype() {
            Ok(datatype) => datatype,
            Err(e) => {
                self.metrics.unsupported_datatypes.increment();
                warn!(self.logger, "Unsupported datatype"; "datatype" => header.datatype_code);
                return Err(track!(e));
            }
        };

        let bytes_per_voxel = datatype.bytes_per_voxel();
        let image_len = header.voxel_count() * u64::from(bytes_per_voxel);
        track_assert_eq!(
            volume.image().len() as u64,
            image_len,
            ErrorKind::InvalidInput
        );
        track_assert!(
            image_len <= u64::from(u32::max_value()),
            ErrorKind::InvalidInput; image_len
        );
        track_assert!(
            command.len() < u32::max_value() as usize,
            ErrorKind::InvalidInput; command.len()
        );
        track_assert!(
            !command.as_bytes().contains(&0),
            ErrorKind::InvalidInput,
            "Command must not contain NUL: {:?}",
            command
        );
        let mut dims = [0; 4];
        for (d, &n) in dims.iter_mut().zip(header.dims.iter()) {
            track_assert!(n <= i32::max_value() as u32, ErrorKind::InvalidInput; header.dims);
            *d = n as i32;
        }
        let [nx, ny, nz, nt] = header.dims;
        info!(
            self.logger,
            "dims: {}x{}x{}x{} nbyper: {}", nx, ny, nz, nt, bytes_per_voxel
        );

        let mut scope = RegionScope::new(&self.logger, &mut self.engine, &mut self.arena);

        let command_region = track!(scope.allocate(command.len() as u32 + 1))?;
        {
            let view = track!(scope.view_mut(command_region))?;
            view[..command.len()].copy_from_slice(command.as_bytes());
            view[command.len()] = 0;
        }

        let params_region = track!(scope.allocate(Calibration::SIZE as u32))?;
        header
            .calibration
            .write_to(track!(scope.view_mut(params_region))?);

        let image_region = track!(scope.allocate(image_len as u32))?;
        track!(scope.view_mut(image_region))?.copy_from_slice(volume.image());

        let call = ComputeCall {
            image: track!(scope.region(image_region))?.offset(),
            params: track!(scope.region(params_region))?.offset(),
            datatype: i32::from(datatype.code()),
            dims,
            pix_dims: header.pix_dims,
            command: track!(scope.region(command_region))?.offset(),
        };
        let size_before = scope.arena().size();
        let started_at = Instant::now();
        let status = track!(scope.compute(&call))?;
        let elapsed = started_at.elapsed();
        let size_after = scope.arena().size();

        self.metrics.arena_size_bytes.set(size_after as f64);
        if size_after != size_before {
            self.metrics.arena_growths.increment();
            debug!(self.logger, "Arena grown during compute";
                   "before" => size_before, "after" => size_after);
        }

        if status != 0 {
            self.metrics.engine_failures.increment();
            let failure = EngineFailure {
                status,
                command: command.to_owned(),
            };
            error!(self.logger, "{}", failure);

            // 解放時のエラーはスコープの破棄時にログ出力される
            drop(scope);
            return Err(track!(Error::from(failure)));
        }

        // 計算中にアリーナが伸長されている可能性があるので、ビューは必ず再導出する
        let calibration = Calibration::read_from(track!(scope.view(params_region))?);
        volume
            .image_mut()
            .copy_from_slice(track!(scope.view(image_region))?);
        volume.header_mut().calibration = calibration;
        track!(scope.release())?;

        self.metrics.succeeded_calls.increment();
        info!(self.logger, "'{}' required {} ms", command, elapsed.as_millis();
              "slope" => calibration.slope, "intercept" => calibration.intercept,
              "cal_min" => calibration.cal_min, "cal_max" => calibration.cal_max);
        Ok(())
    }

    /// 領域の割当と解放を管理するスコープを開始する.
    ///
    /// `process`では表現できない呼び出し手順を組み立てる際に使用する.
    pub fn scope(&mut self) -> RegionScope<'_, E> {
        RegionScope::new(&self.logger, &mut self.engine, &mut self.arena)
    }

    /// アリーナへの参照を返す.
    pub fn arena(&self) -> &SharedArena<E::Memory> {
        &self.arena
    }

    /// エンジンへの参照を返す.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// ブリッジのメトリクスを返す.
    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }
}
impl<E> fmt::Debug for Bridge<E>
where
    E: Engine + fmt::Debug,
    E::Memory: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("engine", &self.engine)
            .field("arena", &self.arena)
            .field("metrics", &self.metrics)
            .finish()
    }
}
