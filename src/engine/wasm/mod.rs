//! wasmモジュールとして実装されたエンジン.
use slog::Logger;
use std::fmt;
use wasmtime::{Linker, Memory, MemoryType, Module, Store, TypedFunc};

pub use self::memory::WasmMemory;

use self::host::HostState;
use crate::engine::{ComputeCall, Engine};
use crate::memory::MAX_PAGES;
use crate::{ErrorKind, Result};

mod host;
mod memory;

type ComputeParams = (u32, u32, i32, i32, i32, i32, i32, f32, f32, f32, f32, u32);

/// wasmモジュールとして実装されたエンジン.
///
/// モジュールは以下を満たしている必要がある:
///
/// - インポート:
///   - `env.memory`: 線形メモリ
///   - `env.wasm_log(offset: i32)`: 診断メッセージの出力
///   - `env.wasm_log_i(offset: i32, value: i32)`: 整数値付きの診断メッセージの出力
/// - エクスポート:
///   - `walloc(size: i32) -> i32`
///   - `wfree(offset: i32)`
///   - `niimathx(image, params, datatype, nx, ny, nz, nt, dx, dy, dz, dt, command) -> i32`
///
/// 診断メッセージは、`"wasm log: ..."`という形式で`info`レベルのログとして出力される.
pub struct WasmEngine {
    walloc: TypedFunc<u32, u32>,
    wfree: TypedFunc<u32, ()>,
    compute: TypedFunc<ComputeParams, i32>,
}
impl WasmEngine {
    /// wasmモジュールを読み込み、エンジンとその線形メモリを生成する.
    ///
    /// `wasm`はバイナリ形式ないしテキスト形式のモジュール.
    /// 線形メモリの初期サイズは`initial_pages`、最大サイズは`maximum_pages`となる.
    ///
    /// # Errors
    ///
    /// モジュールのコンパイルやインスタンス化に失敗した場合には、
    /// 種類が`ErrorKind::EngineTrapped`のエラーが返される.
    pub fn load(
        logger: Logger,
        wasm: &[u8],
        initial_pages: u32,
        maximum_pages: u32,
    ) -> Result<(Self, WasmMemory)> {
        track_assert!(
            initial_pages <= maximum_pages && maximum_pages <= MAX_PAGES,
            ErrorKind::InvalidInput;
            initial_pages,
            maximum_pages
        );
        let engine = wasmtime::Engine::default();
        let module = track_wasm!(Module::new(&engine, wasm))?;

        let mut store = Store::new(&engine, HostState::new(logger.clone()));
        let ty = MemoryType::new(initial_pages, Some(maximum_pages));
        let memory = track_wasm!(Memory::new(&mut store, ty))?;
        store.data_mut().memory = Some(memory);

        let mut linker = Linker::new(&engine);
        track!(host::register(&mut linker))?;
        track_wasm!(linker.define(&store, "env", "memory", memory))?;
        let instance = track_wasm!(linker.instantiate(&mut store, &module))?;

        let walloc = track_wasm!(instance.get_typed_func(&mut store, "walloc"))?;
        let wfree = track_wasm!(instance.get_typed_func(&mut store, "wfree"))?;
        let compute = track_wasm!(instance.get_typed_func(&mut store, "niimathx"))?;
        info!(logger, "Engine loaded";
              "initial_pages" => initial_pages, "maximum_pages" => maximum_pages);

        let engine = WasmEngine {
            walloc,
            wfree,
            compute,
        };
        Ok((engine, WasmMemory::new(store, memory)))
    }
}
impl Engine for WasmEngine {
    type Memory = WasmMemory;

    fn allocate(&mut self, memory: &mut WasmMemory, size: u32) -> Result<u32> {
        let offset = track_wasm!(self.walloc.call(&mut memory.store, size))?;
        track_assert_ne!(offset, 0, ErrorKind::OutOfRange, "walloc({}) failed", size);
        Ok(offset)
    }

    fn free(&mut self, memory: &mut WasmMemory, offset: u32) -> Result<()> {
        track_wasm!(self.wfree.call(&mut memory.store, offset))
    }

    fn compute(&mut self, memory: &mut WasmMemory, call: &ComputeCall) -> Result<i32> {
        let [nx, ny, nz, nt] = call.dims;
        let [dx, dy, dz, dt] = call.pix_dims;
        let params = (
            call.image,
            call.params,
            call.datatype,
            nx,
            ny,
            nz,
            nt,
            dx,
            dy,
            dz,
            dt,
            call.command,
        );
        track_wasm!(self.compute.call(&mut memory.store, params))
    }
}
impl fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "WasmEngine {{ .. }}")
    }
}

#[cfg(test)]
mod tests {
    use slog::Discard;
    use trackable::result::TestResult;

    use super::*;
    use crate::bridge::{Bridge, BridgeBuilder};
    use crate::memory::{LinearMemory, PAGE_SIZE};
    use crate::volume::{Datatype, Volume, VolumeHeader};

    /// テスト用のエンジン.
    ///
    /// - `walloc`: 8バイト境界に揃えたバンプアロケータ(必要に応じてメモリを伸長する)
    /// - `wfree`: 何もしない
    /// - `niimathx`: `uint8`のボクセル全てに`1`を加算し、`cal_max`を`255`にする.
    ///   コマンドの先頭が`x`なら失敗(`1`)、`t`ならトラップ、`g`なら処理前にメモリを一ページ伸長する.
    const TEST_ENGINE_WAT: &str = r#"
(module
  (import "env" "memory" (memory 1))
  (import "env" "wasm_log" (func $log (param i32)))
  (import "env" "wasm_log_i" (func $log_i (param i32 i32)))
  (data (i32.const 16) "datatype\00")
  (global $next (mut i32) (i32.const 1024))

  (func (export "walloc") (param $size i32) (result i32)
    (local $ptr i32) (local $end i32)
    (local.set $ptr (global.get $next))
    (local.set $end
      (i32.and (i32.add (i32.add (local.get $ptr) (local.get $size)) (i32.const 8))
               (i32.const -8)))
    (block $done
      (loop $grow
        (br_if $done
          (i32.le_u (local.get $end) (i32.shl (memory.size) (i32.const 16))))
        (if (i32.eq (memory.grow (i32.const 1)) (i32.const -1))
          (then (return (i32.const 0))))
        (br $grow)))
    (global.set $next (local.get $end))
    (local.get $ptr))

  (func (export "wfree") (param $ptr i32))

  (func (export "niimathx")
    (param $img i32) (param $params i32) (param $datatype i32)
    (param $nx i32) (param $ny i32) (param $nz i32) (param $nt i32)
    (param $dx f32) (param $dy f32) (param $dz f32) (param $dt f32)
    (param $cmd i32) (result i32)
    (local $op i32) (local $n i32) (local $i i32)
    (call $log_i (i32.const 16) (local.get $datatype))
    (local.set $op (i32.load8_u (local.get $cmd)))
    (if (i32.eq (local.get $op) (i32.const 120)) (then (return (i32.const 1))))
    (if (i32.eq (local.get $op) (i32.const 116)) (then unreachable))
    (if (i32.eq (local.get $op) (i32.const 103))
      (then (drop (memory.grow (i32.const 1)))))
    (local.set $n
      (i32.mul (i32.mul (local.get $nx) (local.get $ny))
               (i32.mul (local.get $nz) (local.get $nt))))
    (block $done
      (loop $next
        (br_if $done (i32.ge_u (local.get $i) (local.get $n)))
        (i32.store8 (i32.add (local.get $img) (local.get $i))
          (i32.add (i32.load8_u (i32.add (local.get $img) (local.get $i))) (i32.const 1)))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $next)))
    (f32.store offset=12 (local.get $params) (f32.const 255))
    (call $log (local.get $cmd))
    (i32.const 0))
)
"#;

    #[test]
    fn it_works() -> TestResult {
        let logger = Logger::root(Discard, o!());
        let (mut engine, mut memory) =
            track!(WasmEngine::load(logger, TEST_ENGINE_WAT.as_bytes(), 1, 4))?;
        assert_eq!(memory.pages(), 1);
        assert_eq!(memory.maximum_pages(), 4);

        let command = track!(engine.allocate(&mut memory, 3))?;
        let params = track!(engine.allocate(&mut memory, 16))?;
        let image = track!(engine.allocate(&mut memory, 4))?;
        assert_eq!(command, 1024);
        assert_eq!(params % 8, 0);
        assert!(params > command);
        assert!(image > params);

        let c = command as usize;
        memory.as_bytes_mut()[c..c + 3].copy_from_slice(b"g1\0");
        let call = ComputeCall {
            image,
            params,
            datatype: 2,
            dims: [2, 2, 1, 1],
            pix_dims: [1.0; 4],
            command,
        };
        assert_eq!(track!(engine.compute(&mut memory, &call))?, 0);
        assert_eq!(memory.pages(), 2);
        let i = image as usize;
        assert_eq!(&memory.as_bytes()[i..i + 4], &[1, 1, 1, 1]);

        track!(engine.free(&mut memory, image))?;
        Ok(())
    }

    #[test]
    fn allocation_grows_memory() -> TestResult {
        let logger = Logger::root(Discard, o!());
        let (mut engine, mut memory) =
            track!(WasmEngine::load(logger, TEST_ENGINE_WAT.as_bytes(), 1, 2))?;

        track!(engine.allocate(&mut memory, PAGE_SIZE as u32))?;
        assert_eq!(memory.pages(), 2);
        assert_eq!(
            engine
                .allocate(&mut memory, PAGE_SIZE as u32)
                .err()
                .map(|e| *e.kind()),
            Some(ErrorKind::OutOfRange)
        );
        assert_eq!(
            memory.grow(1).err().map(|e| *e.kind()),
            Some(ErrorKind::OutOfRange)
        );
        Ok(())
    }

    #[test]
    fn trap_is_reported() -> TestResult {
        let logger = Logger::root(Discard, o!());
        let (mut engine, mut memory) =
            track!(WasmEngine::load(logger, TEST_ENGINE_WAT.as_bytes(), 1, 1))?;
        let command = track!(engine.allocate(&mut memory, 2))?;
        memory.as_bytes_mut()[command as usize] = b't';
        let call = ComputeCall {
            image: 0,
            params: 0,
            datatype: 2,
            dims: [0; 4],
            pix_dims: [1.0; 4],
            command,
        };
        assert_eq!(
            engine.compute(&mut memory, &call).err().map(|e| *e.kind()),
            Some(ErrorKind::EngineTrapped)
        );
        Ok(())
    }

    #[test]
    fn invalid_module_is_rejected() {
        let logger = Logger::root(Discard, o!());
        let result = WasmEngine::load(logger.clone(), b"(module)", 1, 1);
        assert_eq!(result.err().map(|e| *e.kind()), Some(ErrorKind::EngineTrapped));

        let result = WasmEngine::load(logger, TEST_ENGINE_WAT.as_bytes(), 2, 1);
        assert_eq!(result.err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    }

    fn bridge() -> Result<Bridge<WasmEngine>> {
        track!(BridgeBuilder::new()
            .initial_pages(1)
            .maximum_pages(4)
            .load_wasm(TEST_ENGINE_WAT.as_bytes()))
    }

    fn uint8_volume() -> Volume {
        let header = VolumeHeader::new(Datatype::Uint8, [4, 4, 4, 1]);
        Volume::new(header, (0..64).collect())
    }

    #[test]
    fn bridge_works() -> TestResult {
        let mut bridge = track!(bridge())?;
        let mut volume = uint8_volume();

        track!(bridge.process(&mut volume, "-add 1"))?;
        assert_eq!(volume.image(), &(1..65).collect::<Vec<u8>>()[..]);
        assert_eq!(volume.header().calibration.cal_max, 255.0);
        assert_eq!(volume.header().calibration.slope, 1.0);
        assert!(bridge.arena().verifier().is_empty());
        assert_eq!(bridge.arena().verifier().metrics().acquired_regions(), 3);
        assert_eq!(bridge.metrics().arena_growths(), 0);
        Ok(())
    }

    #[test]
    fn bridge_handles_growth() -> TestResult {
        let mut bridge = track!(bridge())?;
        let mut volume = uint8_volume();

        track!(bridge.process(&mut volume, "grow"))?;
        assert_eq!(bridge.arena().size(), 2 * PAGE_SIZE);
        assert_eq!(bridge.arena().memory().pages(), 2);
        assert_eq!(volume.image()[63], 64);
        assert_eq!(bridge.metrics().arena_growths(), 1);
        assert!(bridge.arena().verifier().is_empty());
        Ok(())
    }

    #[test]
    fn bridge_reports_engine_failure() -> TestResult {
        let mut bridge = track!(bridge())?;
        let mut volume = uint8_volume();
        let original = volume.clone();

        let e = bridge.process(&mut volume, "xyz").err().expect("engine failure");
        assert_eq!(*e.kind(), ErrorKind::EngineFailed);
        assert_eq!(e.engine_failure().map(|f| f.status), Some(1));
        assert_eq!(volume, original);
        assert!(bridge.arena().verifier().is_empty());

        let e = bridge.process(&mut volume, "trap").err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::EngineTrapped));
        assert_eq!(volume, original);
        assert!(bridge.arena().verifier().is_empty());

        track!(bridge.process(&mut volume, "-add 1"))?;
        assert_eq!(volume.image()[0], 1);
        Ok(())
    }
}
