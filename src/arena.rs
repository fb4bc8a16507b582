//! ホストとエンジンの間で共有されるアリーナ.
//!
//! アリーナは、伸長可能な[線形メモリ]と、その最大容量分のアドレス空間を追跡する[検証器]の組である.
//!
//! アリーナ自身が領域の割当を行うことは無い.
//! 割当はエンジン側のアロケータが行い、アリーナはその結果を検証器に写し取る(ミラーリングする)だけである.
//!
//! [線形メモリ]: ../memory/trait.LinearMemory.html
//! [検証器]: ../verifier/struct.HeapVerifier.html
use slog::Logger;
use std::borrow::Cow;

use crate::memory::{LinearMemory, PAGE_SIZE};
use crate::verifier::HeapVerifier;
use crate::{ErrorKind, Result};

/// アリーナ上の一つの割当を表す記述子.
///
/// 保持しているのは開始位置と長さのみで、メモリへの参照は持たない.
/// 実際の読み書きの際には、その都度[`SharedArena::view`]等でビューを再導出する必要がある.
///
/// [`SharedArena::view`]: struct.SharedArena.html#method.view
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Region {
    offset: u32,
    len: u32,
}
#[allow(clippy::len_without_is_empty)]
impl Region {
    /// 領域の開始位置を返す.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// 領域の長さ(バイト単位)を返す.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// 領域の終端位置(排他的)を返す.
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.len)
    }
}

/// ホストとエンジンの間で共有されるアリーナ.
///
/// # ビューの無効化
///
/// 線形メモリは、エンジン内部のアロケータによって任意のタイミングで伸長され得る.
/// 伸長が発生すると、それ以前に導出したビューは全て無効となる.
///
/// そのため、ビュー(`&[u8]`)は保持せずに、伸長を引き起こし得る呼び出しの後には、
/// 必ず[`Region`]から再導出すること.
///
/// [`Region`]: struct.Region.html
#[derive(Debug)]
pub struct SharedArena<M> {
    logger: Logger,
    memory: M,
    verifier: HeapVerifier,
}
impl<M> SharedArena<M>
where
    M: LinearMemory,
{
    /// 新しい`SharedArena`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// `verifier`が追跡するアドレス空間が、`memory`の最大容量に満たない場合には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn new(logger: Logger, memory: M, verifier: HeapVerifier) -> Result<Self> {
        let maximum_bytes = u64::from(memory.maximum_pages()) * PAGE_SIZE;
        track_assert!(
            maximum_bytes <= verifier.capacity(),
            ErrorKind::InvalidInput,
            "maximum_bytes={}, verifier_capacity={}",
            maximum_bytes,
            verifier.capacity()
        );
        Ok(SharedArena {
            logger,
            memory,
            verifier,
        })
    }

    /// 外部アロケータが返した割当を記録する.
    ///
    /// 外部アロケータから結果を受け取った直後に、そのポインタと要求サイズを指定して呼び出すこと.
    ///
    /// # Errors
    ///
    /// 以下の場合にはエラーが返され、アリーナの状態は変化しない:
    ///
    /// - 領域が現在の線形メモリの範囲外にある: `ErrorKind::OutOfRange`
    /// - その他、[`HeapVerifier::acquire`]が失敗した場合
    ///
    /// [`HeapVerifier::acquire`]: ../verifier/struct.HeapVerifier.html#method.acquire
    pub fn record_allocation(&mut self, offset: u32, len: u32) -> Result<Region> {
        let region = Region { offset, len };
        track_assert!(
            region.end() <= self.memory.size(),
            ErrorKind::OutOfRange,
            "offset={}, len={}, arena_size={}",
            offset,
            len,
            self.memory.size()
        );
        track!(self.verifier.acquire(offset, len))?;
        debug!(self.logger, "Allocation recorded"; "offset" => offset, "len" => len);
        Ok(region)
    }

    /// 外部アロケータに対する解放を記録する.
    ///
    /// 成功した場合には、解放された領域の長さが返される.
    ///
    /// # Errors
    ///
    /// `offset`から始まる割当が記録されていない場合には、
    /// 種類が`ErrorKind::UnknownRelease`のエラーが返される.
    pub fn record_deallocation(&mut self, offset: u32) -> Result<u32> {
        let len = track!(self.verifier.release(offset))?;
        debug!(self.logger, "Deallocation recorded"; "offset" => offset, "len" => len);
        Ok(len)
    }

    /// 現在の線形メモリ上の`[offset, offset + len)`に対するビューを導出する.
    ///
    /// # Errors
    ///
    /// 範囲が現在の線形メモリを超えている場合には、
    /// 種類が`ErrorKind::OutOfRange`のエラーが返される.
    pub fn view(&self, offset: u32, len: u32) -> Result<&[u8]> {
        let bytes = self.memory.as_bytes();
        let size = bytes.len();
        let range = offset as usize..offset as usize + len as usize;
        let view = track_assert_some!(
            bytes.get(range),
            ErrorKind::OutOfRange,
            "offset={}, len={}, arena_size={}",
            offset,
            len,
            size
        );
        Ok(view)
    }

    /// `view`の変更可能版.
    pub fn view_mut(&mut self, offset: u32, len: u32) -> Result<&mut [u8]> {
        let bytes = self.memory.as_bytes_mut();
        let size = bytes.len();
        let range = offset as usize..offset as usize + len as usize;
        let view = track_assert_some!(
            bytes.get_mut(range),
            ErrorKind::OutOfRange,
            "offset={}, len={}, arena_size={}",
            offset,
            len,
            size
        );
        Ok(view)
    }

    /// `region`に対するビューを導出する.
    pub fn region(&self, region: &Region) -> Result<&[u8]> {
        track!(self.view(region.offset, region.len))
    }

    /// `region`に対する変更可能なビューを導出する.
    pub fn region_mut(&mut self, region: &Region) -> Result<&mut [u8]> {
        track!(self.view_mut(region.offset, region.len))
    }

    /// `offset`から始まるゼロ終端のバイト列を読み込む.
    ///
    /// 主にエンジンからの診断メッセージの取得に使用される.
    /// 終端が見つからない場合には、線形メモリの末尾までが対象となる.
    /// UTF-8として不正なバイト列は置換文字に変換される.
    ///
    /// # Errors
    ///
    /// `offset`が線形メモリの範囲外の場合には、種類が`ErrorKind::OutOfRange`のエラーが返される.
    pub fn read_string(&self, offset: u32) -> Result<String> {
        let bytes = self.memory.as_bytes();
        track_assert!(
            offset as usize <= bytes.len(),
            ErrorKind::OutOfRange; offset, bytes.len()
        );
        Ok(read_c_string(&bytes[offset as usize..]).into_owned())
    }

    /// 線形メモリの現在のサイズ(バイト単位)を返す.
    pub fn size(&self) -> u64 {
        self.memory.size()
    }

    /// 線形メモリへの参照を返す.
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// 線形メモリへの可変参照を返す.
    ///
    /// エンジン呼び出しの際に使用される.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// 検証器への参照を返す.
    pub fn verifier(&self) -> &HeapVerifier {
        &self.verifier
    }
}

/// `bytes`の先頭からゼロ終端までを文字列として解釈する.
pub(crate) fn read_c_string(bytes: &[u8]) -> Cow<str> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end])
}

#[cfg(test)]
mod tests {
    use prometrics::metrics::MetricBuilder;
    use slog::Discard;
    use trackable::result::TestResult;

    use super::*;
    use crate::granule::GranuleSize;
    use crate::memory::VecMemory;
    use crate::metrics::VerifierMetrics;

    #[test]
    fn it_works() -> TestResult {
        let mut arena = track!(arena(1, 4))?;
        let region = track!(arena.record_allocation(64, 5))?;
        track!(arena.region_mut(&region))?.copy_from_slice(b"hello");
        assert_eq!(track!(arena.view(64, 5))?, b"hello");
        assert_eq!(track!(arena.read_string(64))?, "hello");

        assert_eq!(track!(arena.record_deallocation(region.offset()))?, 5);
        assert!(arena.verifier().is_empty());
        Ok(())
    }

    #[test]
    fn allocation_outside_memory_fails() -> TestResult {
        let mut arena = track!(arena(1, 4))?;
        let size = arena.size() as u32;
        assert_eq!(
            arena.record_allocation(size - 8, 16).err().map(|e| *e.kind()),
            Some(ErrorKind::OutOfRange)
        );
        assert!(arena.verifier().is_empty());

        track!(arena.memory_mut().grow(1))?;
        track!(arena.record_allocation(size - 8, 16))?;
        Ok(())
    }

    #[test]
    fn view_after_growth() -> TestResult {
        let mut arena = track!(arena(1, 4))?;
        let size = arena.size() as u32;
        assert_eq!(
            arena.view(size, 1).err().map(|e| *e.kind()),
            Some(ErrorKind::OutOfRange)
        );

        track!(arena.memory_mut().grow(2))?;
        assert_eq!(arena.size(), 3 * PAGE_SIZE);
        assert_eq!(track!(arena.view(0, arena.size() as u32))?.len(), 3 * PAGE_SIZE as usize);
        assert_eq!(track!(arena.view(size, 1))?, &[0]);
        Ok(())
    }

    #[test]
    fn read_string_works() -> TestResult {
        let mut arena = track!(arena(1, 1))?;
        let size = arena.size() as u32;
        track!(arena.view_mut(0, 9))?.copy_from_slice(b"foo\0bar\xffx");
        assert_eq!(track!(arena.read_string(0))?, "foo");
        assert_eq!(track!(arena.read_string(4))?, "bar\u{fffd}x");
        assert_eq!(track!(arena.read_string(3))?, "");

        // 終端が無い場合は末尾まで
        track!(arena.view_mut(size - 2, 2))?.copy_from_slice(b"ok");
        assert_eq!(track!(arena.read_string(size - 2))?, "ok");
        assert_eq!(track!(arena.read_string(size))?, "");
        assert_eq!(
            arena.read_string(size + 1).err().map(|e| *e.kind()),
            Some(ErrorKind::OutOfRange)
        );
        Ok(())
    }

    #[test]
    fn verifier_must_cover_maximum() -> TestResult {
        let memory = track!(VecMemory::new(1, 2))?;
        let metrics = VerifierMetrics::new(&MetricBuilder::new(), PAGE_SIZE, GranuleSize::default());
        let verifier = track!(HeapVerifier::new(metrics))?;
        let logger = Logger::root(Discard, o!());
        assert_eq!(
            SharedArena::new(logger, memory, verifier).err().map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );
        Ok(())
    }

    fn arena(initial: u32, maximum: u32) -> Result<SharedArena<VecMemory>> {
        let memory = track!(VecMemory::new(initial, maximum))?;
        let capacity = u64::from(maximum) * PAGE_SIZE;
        let metrics = VerifierMetrics::new(&MetricBuilder::new(), capacity, GranuleSize::default());
        let verifier = track!(HeapVerifier::new(metrics))?;
        track!(SharedArena::new(Logger::root(Discard, o!()), memory, verifier))
    }
}
