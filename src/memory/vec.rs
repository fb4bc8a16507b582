use crate::memory::{LinearMemory, MAX_PAGES, PAGE_SIZE};
use crate::{ErrorKind, Result};

/// `Vec<u8>`ベースの`LinearMemory`の実装.
///
/// 伸長時には内部バッファの再アロケートが行われるため、
/// (wasmの線形メモリと同様に)伸長前に取得したポインタは無効となる.
///
/// # 注意
///
/// これは主にテストや性能計測用途を意図した実装であり、
/// 実際のエンジンとの間で共有されるメモリではない.
#[derive(Debug, Clone)]
pub struct VecMemory {
    bytes: Vec<u8>,
    maximum_pages: u32,
}
impl VecMemory {
    /// 新しい`VecMemory`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される:
    ///
    /// - `initial_pages`が`maximum_pages`を超えている
    /// - `maximum_pages`が`MAX_PAGES`を超えている
    pub fn new(initial_pages: u32, maximum_pages: u32) -> Result<Self> {
        track_assert!(
            initial_pages <= maximum_pages,
            ErrorKind::InvalidInput; initial_pages, maximum_pages
        );
        track_assert!(maximum_pages <= MAX_PAGES, ErrorKind::InvalidInput; maximum_pages);
        Ok(VecMemory {
            bytes: vec![0; (u64::from(initial_pages) * PAGE_SIZE) as usize],
            maximum_pages,
        })
    }
}
impl LinearMemory for VecMemory {
    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
    fn maximum_pages(&self) -> u32 {
        self.maximum_pages
    }
    fn grow(&mut self, delta: u32) -> Result<u32> {
        let old_pages = self.pages();
        let new_pages = u64::from(old_pages) + u64::from(delta);
        track_assert!(
            new_pages <= u64::from(self.maximum_pages),
            ErrorKind::OutOfRange,
            "pages={}, delta={}, maximum={}",
            old_pages,
            delta,
            self.maximum_pages
        );

        // 既存バッファを拡張するのではなく、新規バッファに移し替える
        let mut bytes = vec![0; (new_pages * PAGE_SIZE) as usize];
        bytes[..self.bytes.len()].copy_from_slice(&self.bytes);
        self.bytes = bytes;
        Ok(old_pages)
    }
}
