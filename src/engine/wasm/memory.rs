use std::fmt;
use wasmtime::{Memory, Store};

use super::host::HostState;
use crate::memory::{LinearMemory, MAX_PAGES};
use crate::{ErrorKind, Result};

/// wasmモジュールにインポートされる線形メモリ.
///
/// wasmの線形メモリは`Store`に属しているため、この構造体は`Store`自体も所有している.
pub struct WasmMemory {
    pub(crate) store: Store<HostState>,
    pub(crate) memory: Memory,
}
impl WasmMemory {
    pub(crate) fn new(store: Store<HostState>, memory: Memory) -> Self {
        WasmMemory { store, memory }
    }
}
impl LinearMemory for WasmMemory {
    fn as_bytes(&self) -> &[u8] {
        self.memory.data(&self.store)
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut(&mut self.store)
    }

    fn maximum_pages(&self) -> u32 {
        self.memory
            .ty(&self.store)
            .maximum()
            .map_or(MAX_PAGES, |n| n.min(u64::from(MAX_PAGES)) as u32)
    }

    fn grow(&mut self, delta: u32) -> Result<u32> {
        let pages = self.pages();
        let old = track_assert_some!(
            self.memory.grow(&mut self.store, u64::from(delta)).ok(),
            ErrorKind::OutOfRange,
            "pages={}, delta={}, maximum_pages={}",
            pages,
            delta,
            self.maximum_pages()
        );
        Ok(old as u32)
    }
}
impl fmt::Debug for WasmMemory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WasmMemory")
            .field("pages", &self.pages())
            .field("maximum_pages", &self.maximum_pages())
            .finish()
    }
}
