use std::collections::BTreeMap;
use std::fmt;

use crate::arena::read_c_string;
use crate::engine::{ComputeCall, Engine};
use crate::memory::{LinearMemory, VecMemory, PAGE_SIZE};
use crate::volume::{Calibration, Datatype};
use crate::{ErrorKind, Result};

/// 計算関数の代わりに呼び出されるフック.
///
/// 引数はコマンド文字列・ボクセル列・較正パラメータで、返り値はステータスコード.
pub type ComputeHook = Box<dyn FnMut(&str, &mut [u8], &mut Calibration) -> i32 + Send>;

/// 単純なバンプアロケータと差し替え可能な計算関数を持つ、プロセス内の`Engine`実装.
///
/// 割当の際に線形メモリの容量が足りない場合には、実際のエンジンと同様にメモリを伸長する.
/// 解放された領域は、同じサイズ以下の割当に再利用される.
///
/// # 注意
///
/// これは主にテストや性能計測用途を意図した実装であり、画像処理は一切行わない.
pub struct MockEngine {
    alignment: u32,
    offset_skew: u32,
    next: u32,
    live: BTreeMap<u32, u32>,
    free_blocks: Vec<(u32, u32)>,
    status: i32,
    scratch_bytes: u32,
    fail_frees: bool,
    hook: Option<ComputeHook>,
    commands: Vec<String>,
}
impl MockEngine {
    /// 割当が開始される位置.
    ///
    /// `0`(ヌルポインタ)を返さないように、先頭の一部は使用しない.
    pub const HEAP_BASE: u32 = 1024;

    /// 新しい`MockEngine`インスタンスを生成する.
    ///
    /// 計算関数は常に`0`を返し、ボクセル列には触れない.
    pub fn new() -> Self {
        MockEngine {
            alignment: 8,
            offset_skew: 0,
            next: Self::HEAP_BASE,
            live: BTreeMap::new(),
            free_blocks: Vec::new(),
            status: 0,
            scratch_bytes: 0,
            fail_frees: false,
            hook: None,
            commands: Vec::new(),
        }
    }

    /// 計算関数が返すステータスコードを設定する.
    pub fn with_status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    /// 計算関数の実行中に、内部的に割り当てる一時領域のサイズを設定する.
    ///
    /// 一時領域の割当によって、線形メモリが伸長されることがある.
    pub fn with_scratch(mut self, bytes: u32) -> Self {
        self.scratch_bytes = bytes;
        self
    }

    /// 以後の解放要求を全て失敗させる.
    ///
    /// 失敗した解放の対象領域は、割当済みのまま残る.
    pub fn with_free_failure(mut self) -> Self {
        self.fail_frees = true;
        self
    }

    /// 割当結果に加えるずれを設定する.
    ///
    /// アライメントされていないポインタを返すアロケータを模倣するために使用する.
    pub fn with_offset_skew(mut self, skew: u32) -> Self {
        self.offset_skew = skew;
        self
    }

    /// 計算関数の代わりに呼び出されるフックを設定する.
    ///
    /// フックが設定されている場合には、`with_status`の値ではなく、フックの返り値がステータスとなる.
    pub fn on_compute<F>(mut self, f: F) -> Self
    where
        F: FnMut(&str, &mut [u8], &mut Calibration) -> i32 + Send + 'static,
    {
        self.hook = Some(Box::new(f));
        self
    }

    /// これまでに計算関数に渡されたコマンド文字列の一覧を返す.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// エンジン側のアロケータ上で、未解放の割当の数を返す.
    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    fn allocate_block(&mut self, memory: &mut VecMemory, size: u32) -> Result<u32> {
        let alignment = u64::from(self.alignment);
        let len = (u64::from(size.max(1)) + alignment - 1) / alignment * alignment;
        if let Some(i) = self
            .free_blocks
            .iter()
            .position(|&(_, block_len)| u64::from(block_len) >= len)
        {
            let (offset, block_len) = self.free_blocks.remove(i);
            self.live.insert(offset, block_len);
            return Ok(offset);
        }

        let offset = self.next;
        let end = u64::from(offset) + len;
        if end > memory.size() {
            let delta = (end - memory.size() + PAGE_SIZE - 1) / PAGE_SIZE;
            track!(memory.grow(delta as u32))?;
        }
        self.next = end as u32;
        self.live.insert(offset, len as u32);
        Ok(offset)
    }

    fn free_block(&mut self, offset: u32) -> Result<()> {
        let len = track_assert_some!(
            self.live.remove(&offset),
            ErrorKind::InvalidInput,
            "Unknown pointer: {}",
            offset
        );
        self.free_blocks.push((offset, len));
        Ok(())
    }
}
impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}
impl fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MockEngine")
            .field("alignment", &self.alignment)
            .field("offset_skew", &self.offset_skew)
            .field("next", &self.next)
            .field("live", &self.live)
            .field("free_blocks", &self.free_blocks)
            .field("status", &self.status)
            .field("scratch_bytes", &self.scratch_bytes)
            .field("fail_frees", &self.fail_frees)
            .field("hook", &self.hook.as_ref().map(|_| "..."))
            .field("commands", &self.commands)
            .finish()
    }
}
impl Engine for MockEngine {
    type Memory = VecMemory;

    fn allocate(&mut self, memory: &mut VecMemory, size: u32) -> Result<u32> {
        let offset = track!(self.allocate_block(memory, size))?;
        Ok(offset + self.offset_skew)
    }

    fn free(&mut self, _memory: &mut VecMemory, offset: u32) -> Result<()> {
        track_assert!(
            !self.fail_frees,
            ErrorKind::EngineTrapped,
            "wfree({}) failed",
            offset
        );
        track!(self.free_block(offset - self.offset_skew))
    }

    fn compute(&mut self, memory: &mut VecMemory, call: &ComputeCall) -> Result<i32> {
        let command = {
            let bytes = memory.as_bytes();
            let start = (call.command as usize).min(bytes.len());
            read_c_string(&bytes[start..]).into_owned()
        };
        self.commands.push(command.clone());

        if self.scratch_bytes > 0 {
            let scratch = track!(self.allocate_block(memory, self.scratch_bytes))?;
            track!(self.free_block(scratch))?;
        }

        let hook = if let Some(hook) = self.hook.as_mut() {
            hook
        } else {
            return Ok(self.status);
        };
        let datatype = if let Ok(datatype) = Datatype::from_code(call.datatype as i16) {
            datatype
        } else {
            return Ok(-1);
        };
        let voxels: u64 = call.dims.iter().map(|&n| n.max(0) as u64).product();
        let image_len = voxels * u64::from(datatype.bytes_per_voxel());

        let params = call.params as usize;
        let image = call.image as usize;
        let bytes = memory.as_bytes_mut();
        track_assert!(
            (params + Calibration::SIZE) as u64 <= bytes.len() as u64
                && image as u64 + image_len <= bytes.len() as u64,
            ErrorKind::EngineTrapped,
            "Out of bounds memory access"
        );
        let mut calibration = Calibration::read_from(&bytes[params..]);
        let status = hook(
            &command,
            &mut bytes[image..image + image_len as usize],
            &mut calibration,
        );
        calibration.write_to(&mut bytes[params..]);
        Ok(status)
    }
}
