//! Heap Verifier.
use std::collections::BTreeMap;

use super::GranuleBitmap;
use crate::granule::GranuleSize;
use crate::metrics::VerifierMetrics;
use crate::{ErrorKind, Result};

/// 外部アロケータによる割当・解放を記録し、その規律違反を検知するための検証器.
///
/// 論理的なアドレス空間`[0, capacity)`をグラニュール単位に分割し、
/// 各グラニュールの使用状況をビットマップで保持している.
///
/// 加えて「割当の開始位置 => 長さ」の対応表(割当記録)を保持しており、
/// 解放時には、この表から長さを取得する.
/// そのため解放時に、利用者が長さを指定することはない.
///
/// # 不変条件
///
/// - ビットマップ上で使用中となっているグラニュール群は、割当記録中のいずれかのエントリに必ず対応する
/// - 割当記録中のエントリ同士が、グラニュールを共有することはない
/// - 失敗した操作は、ビットマップおよび割当記録に一切の影響を与えない
///
/// この実装自体は、完全にメモリ上のデータ構造であり、実際のメモリの読み書き等を行うことは無い.
#[derive(Debug)]
pub struct HeapVerifier {
    bitmap: GranuleBitmap,
    allocations: BTreeMap<u32, u32>,
    metrics: VerifierMetrics,
}
impl HeapVerifier {
    /// 検証器を構築する.
    ///
    /// アドレス空間の大きさおよびグラニュールサイズの情報は、`metrics`から取得される.
    ///
    /// # Errors
    ///
    /// アドレス空間の大きさがグラニュールサイズの倍数ではない場合には、
    /// 種類が`ErrorKind::InvalidInput`のエラーが返される.
    pub fn new(metrics: VerifierMetrics) -> Result<Self> {
        let granule_size = metrics.granule_size;
        track_assert!(
            granule_size.is_aligned(metrics.capacity_bytes),
            ErrorKind::InvalidInput,
            "capacity={}, granule_size={}",
            metrics.capacity_bytes,
            granule_size.as_u32()
        );
        Ok(HeapVerifier {
            bitmap: GranuleBitmap::new(granule_size.index_of(metrics.capacity_bytes)),
            allocations: BTreeMap::new(),
            metrics,
        })
    }

    /// `offset`から始まる`len`バイトの領域の割当を記録する.
    ///
    /// 長さが`0`の割当も許容される.
    /// その場合、ビットマップは変化しないが、割当記録は作成されるので、
    /// 以後の`release(offset)`呼び出しは成功する.
    ///
    /// 末尾のグラニュールが部分的にしか使われない場合でも、そのグラニュール全体が使用中となる.
    ///
    /// # Errors
    ///
    /// 以下の場合にはエラーが返され、検証器の状態は一切変化しない:
    ///
    /// - `offset`がグラニュール境界ではない: `ErrorKind::Misaligned`
    /// - 領域がアドレス空間を超えている: `ErrorKind::OutOfRange`
    /// - 領域内に使用中のグラニュールが存在する、ないし`offset`を開始位置とする割当が既に存在する:
    ///   `ErrorKind::AlreadyAllocated`
    pub fn acquire(&mut self, offset: u32, len: u32) -> Result<()> {
        let granule_size = self.metrics.granule_size;
        if !granule_size.is_aligned(u64::from(offset)) {
            self.metrics.misaligned_failures.increment();
            track_panic!(
                ErrorKind::Misaligned,
                "bad alignment: {} % {}",
                offset,
                granule_size.as_u32()
            );
        }

        let end = u64::from(offset) + u64::from(len);
        if end > self.capacity() {
            self.metrics.out_of_range_failures.increment();
            track_panic!(
                ErrorKind::OutOfRange,
                "offset={}, len={}, capacity={}",
                offset,
                len,
                self.capacity()
            );
        }

        let start = granule_size.index_of(u64::from(offset));
        let count = granule_size.count(u64::from(len));
        let used = self.bitmap.first_used(start, count);
        if used.is_some() || self.allocations.contains_key(&offset) {
            self.metrics.overlap_failures.increment();
            track_panic!(
                ErrorKind::AlreadyAllocated,
                "word in use: offset={}, len={}, conflict={:?}",
                offset,
                len,
                used.map(|i| i * u64::from(granule_size.as_u32()))
            );
        }

        self.bitmap.set_range(start, count);
        self.allocations.insert(offset, len);
        self.metrics.count_acquisition(len);
        Ok(())
    }

    /// `offset`から始まる割当の解放を記録する.
    ///
    /// 成功した場合には、解放された領域の長さが返される.
    ///
    /// # Errors
    ///
    /// `offset`を開始位置とする割当が記録されていない場合には、
    /// 種類が`ErrorKind::UnknownRelease`のエラーが返され、検証器の状態は変化しない.
    pub fn release(&mut self, offset: u32) -> Result<u32> {
        let len = if let Some(len) = self.allocations.remove(&offset) {
            len
        } else {
            self.metrics.unknown_release_failures.increment();
            track_panic!(ErrorKind::UnknownRelease, "offset={}", offset);
        };

        let granule_size = self.metrics.granule_size;
        let start = granule_size.index_of(u64::from(offset));
        let count = granule_size.count(u64::from(len));
        self.bitmap.clear_range(start, count);
        self.metrics.count_release(len);
        Ok(len)
    }

    /// `offset`から始まる割当が記録されている場合には、その長さを返す.
    pub fn allocation_len(&self, offset: u32) -> Option<u32> {
        self.allocations.get(&offset).cloned()
    }

    /// 記録中の割当を、開始位置の昇順で返す.
    pub fn allocations(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.allocations.iter().map(|(&offset, &len)| (offset, len))
    }

    /// 記録中の割当の数を返す.
    pub fn allocation_count(&self) -> usize {
        self.allocations.len()
    }

    /// 記録中の割当が存在しないかどうかを返す.
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// グラニュール毎の使用状況を返す.
    pub fn bitmap(&self) -> &GranuleBitmap {
        &self.bitmap
    }

    /// 追跡対象のアドレス空間の大きさ(バイト単位)を返す.
    pub fn capacity(&self) -> u64 {
        self.metrics.capacity_bytes
    }

    /// グラニュールサイズを返す.
    pub fn granule_size(&self) -> GranuleSize {
        self.metrics.granule_size
    }

    /// 検証器のメトリクスを返す.
    pub fn metrics(&self) -> &VerifierMetrics {
        &self.metrics
    }
}
