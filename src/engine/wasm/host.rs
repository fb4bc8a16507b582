use slog::Logger;
use wasmtime::{Caller, Linker, Memory};

use crate::arena::read_c_string;
use crate::Result;

/// エンジンのインポート関数群から参照されるホスト側の状態.
#[derive(Debug)]
pub struct HostState {
    pub(crate) logger: Logger,
    pub(crate) memory: Option<Memory>,
}
impl HostState {
    pub(crate) fn new(logger: Logger) -> Self {
        HostState {
            logger,
            memory: None,
        }
    }
}

/// `env`名前空間の診断用インポート関数群を登録する.
///
/// - `wasm_log(offset)`
/// - `wasm_log_i(offset, value)`
pub(crate) fn register(linker: &mut Linker<HostState>) -> Result<()> {
    track_wasm!(linker.func_wrap(
        "env",
        "wasm_log",
        |caller: Caller<'_, HostState>, offset: u32| {
            let message = read_message(&caller, offset);
            info!(caller.data().logger, "wasm log: {}", message);
        }
    ))?;
    track_wasm!(linker.func_wrap(
        "env",
        "wasm_log_i",
        |caller: Caller<'_, HostState>, offset: u32, value: i32| {
            let message = read_message(&caller, offset);
            info!(caller.data().logger, "wasm log: {}: {}", message, value);
        }
    ))?;
    Ok(())
}

fn read_message(caller: &Caller<'_, HostState>, offset: u32) -> String {
    let memory = if let Some(memory) = caller.data().memory {
        memory
    } else {
        return String::new();
    };
    let bytes = memory.data(caller);
    let start = (offset as usize).min(bytes.len());
    read_c_string(&bytes[start..]).into_owned()
}
