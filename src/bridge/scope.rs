use slog::Logger;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::arena::{Region, SharedArena};
use crate::engine::{ComputeCall, Engine};
use crate::{ErrorKind, Result};

static NEXT_SCOPE_SERIAL: AtomicU64 = AtomicU64::new(0);

/// [`RegionScope`]内の領域を識別するためのID.
///
/// IDは発行元のスコープでのみ有効であり、他のスコープに渡した場合にはエラーとなる.
///
/// [`RegionScope`]: struct.RegionScope.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId {
    scope: u64,
    index: usize,
}

/// 一回のエンジン呼び出しの間に確保された領域群を管理するスコープ.
///
/// スコープを通して割り当てた領域は、エンジン側のアロケータでの割当直後にアリーナに記録される.
/// 記録済みの領域は、スコープの破棄時に(確保とは逆の順番で)必ず解放される.
/// その際に発生したエラーは、伝播されずにログに出力される.
///
/// 解放時のエラーを呼び出し元で扱いたい場合には、明示的に[`release`]を呼び出すこと.
///
/// [`release`]: #method.release
pub struct RegionScope<'a, E: Engine> {
    logger: &'a Logger,
    engine: &'a mut E,
    arena: &'a mut SharedArena<E::Memory>,
    serial: u64,
    regions: Vec<Region>,
}
impl<'a, E: Engine> RegionScope<'a, E> {
    pub(crate) fn new(
        logger: &'a Logger,
        engine: &'a mut E,
        arena: &'a mut SharedArena<E::Memory>,
    ) -> Self {
        RegionScope {
            logger,
            engine,
            arena,
            serial: NEXT_SCOPE_SERIAL.fetch_add(1, Ordering::Relaxed),
            regions: Vec::new(),
        }
    }

    /// エンジン側のアロケータを用いて`len`バイトの領域を割り当てる.
    ///
    /// # Errors
    ///
    /// 割当結果の記録に失敗した場合(e.g., アライメント違反、重複割当)には、
    /// [`SharedArena::record_allocation`]のエラーがそのまま返される.
    /// この場合、そのポインタはエンジンに返却されない.
    ///
    /// [`SharedArena::record_allocation`]: ../arena/struct.SharedArena.html#method.record_allocation
    pub fn allocate(&mut self, len: u32) -> Result<RegionId> {
        let offset = track!(self.engine.allocate(self.arena.memory_mut(), len))?;
        let region = track!(self.arena.record_allocation(offset, len))?;
        self.regions.push(region);
        Ok(RegionId {
            scope: self.serial,
            index: self.regions.len() - 1,
        })
    }

    /// `id`に対応する領域を返す.
    ///
    /// # Errors
    ///
    /// `id`がこのスコープで発行されたものではない場合には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn region(&self, id: RegionId) -> Result<&Region> {
        track_assert_eq!(id.scope, self.serial, ErrorKind::InvalidInput, "Foreign region id");
        let region = track_assert_some!(
            self.regions.get(id.index),
            ErrorKind::InvalidInput,
            "Unknown region id: {:?}",
            id
        );
        Ok(region)
    }

    /// `id`に対応する領域のビューを、現在の線形メモリから導出する.
    ///
    /// # Errors
    ///
    /// `id`が不正な場合には`region`と同様のエラーが返される.
    /// 領域が現在の線形メモリを超えている場合には、種類が`ErrorKind::OutOfRange`のエラーが返される.
    pub fn view(&self, id: RegionId) -> Result<&[u8]> {
        let region = track!(self.region(id))?;
        track!(self.arena.region(region))
    }

    /// `view`の変更可能版.
    pub fn view_mut(&mut self, id: RegionId) -> Result<&mut [u8]> {
        track_assert_eq!(id.scope, self.serial, ErrorKind::InvalidInput, "Foreign region id");
        let region = track_assert_some!(
            self.regions.get(id.index),
            ErrorKind::InvalidInput,
            "Unknown region id: {:?}",
            id
        );
        track!(self.arena.region_mut(region))
    }

    /// エンジンの計算関数を呼び出す.
    ///
    /// 呼び出しの前に導出したビューは、全て無効になっている可能性がある.
    pub fn compute(&mut self, call: &ComputeCall) -> Result<i32> {
        track!(self.engine.compute(self.arena.memory_mut(), call))
    }

    /// アリーナへの参照を返す.
    pub fn arena(&self) -> &SharedArena<E::Memory> {
        &*self.arena
    }

    /// スコープ内の全ての領域を解放する.
    ///
    /// # Errors
    ///
    /// いずれかの領域の解放に失敗した場合には、そのエラーが返される.
    /// 残りの領域はスコープの破棄時に解放される.
    pub fn release(mut self) -> Result<()> {
        while let Some(region) = self.regions.pop() {
            track!(self.release_region(&region))?;
        }
        Ok(())
    }

    fn release_region(&mut self, region: &Region) -> Result<()> {
        track!(self.arena.record_deallocation(region.offset()))?;
        track!(self.engine.free(self.arena.memory_mut(), region.offset()))?;
        Ok(())
    }
}
impl<'a, E: Engine> Drop for RegionScope<'a, E> {
    fn drop(&mut self) {
        while let Some(region) = self.regions.pop() {
            if let Err(e) = self.release_region(&region) {
                crit!(self.logger, "Cannot release region";
                      "offset" => region.offset(), "len" => region.len(), "error" => %e);
            }
        }
    }
}
