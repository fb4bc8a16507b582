//! アリーナの割当追跡の最小単位(グラニュール)関連の構成要素.
use crate::{ErrorKind, Result};

/// [`HeapVerifier`]が割当状況を追跡する際の最小単位(グラニュール)のサイズ.
///
/// 外部アロケータが返す割当の開始位置は、全てこのサイズの境界に揃っている必要がある.
///
/// グラニュールサイズは常に2の冪であり、そのことは構築時に一度だけ検査される.
///
/// [`HeapVerifier`]: ../verifier/struct.HeapVerifier.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GranuleSize(u32);
impl GranuleSize {
    /// デフォルトのグラニュールサイズ.
    ///
    /// エンジン側のアロケータ(`walloc`)の割当単位に合わせている.
    pub const DEFAULT: u32 = 8;

    /// 指定された値のグラニュールサイズを表現する`GranuleSize`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// `size`が2の冪ではない場合には、種類が`ErrorKind::InvalidInput`のエラーが返される.
    ///
    /// # Examples
    ///
    /// ```
    /// use voxbridge::ErrorKind;
    /// use voxbridge::granule::GranuleSize;
    ///
    /// assert_eq!(GranuleSize::new(8).ok().map(|g| g.as_u32()), Some(8));
    /// assert_eq!(GranuleSize::new(1).ok().map(|g| g.as_u32()), Some(1));
    ///
    /// assert_eq!(GranuleSize::new(0).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// assert_eq!(GranuleSize::new(12).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// ```
    #[allow(clippy::new_ret_no_self)]
    pub fn new(size: u32) -> Result<Self> {
        track_assert!(
            size.is_power_of_two(),
            ErrorKind::InvalidInput,
            "not power of two: {}",
            size
        );
        Ok(GranuleSize(size))
    }

    /// グラニュールサイズ値を`u32`に変換して返す.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// 指定位置がグラニュール境界に沿っているかどうかを判定する.
    ///
    /// # Examples
    ///
    /// ```
    /// use voxbridge::granule::GranuleSize;
    ///
    /// let granule = GranuleSize::default();
    /// assert!(granule.is_aligned(0));
    /// assert!(granule.is_aligned(8));
    /// assert!(granule.is_aligned(1024));
    ///
    /// assert!(!granule.is_aligned(7));
    /// assert!(!granule.is_aligned(9));
    /// ```
    pub fn is_aligned(self, position: u64) -> bool {
        position & u64::from(self.0 - 1) == 0
    }

    /// 指定位置より後方の最初のグラニュール境界位置を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use voxbridge::granule::GranuleSize;
    ///
    /// let granule = GranuleSize::default();
    /// assert_eq!(granule.ceil_align(0), 0);
    /// assert_eq!(granule.ceil_align(1), 8);
    /// assert_eq!(granule.ceil_align(8), 8);
    /// ```
    pub fn ceil_align(self, position: u64) -> u64 {
        let mask = u64::from(self.0 - 1);
        (position + mask) & !mask
    }

    /// `position`を含むグラニュールの番号を返す.
    pub fn index_of(self, position: u64) -> u64 {
        position >> self.0.trailing_zeros()
    }

    /// `len`バイトをカバーするのに必要なグラニュールの数を返す.
    ///
    /// 末尾のグラニュールが部分的にしか使われない場合でも、一つ分として数える.
    ///
    /// # Examples
    ///
    /// ```
    /// use voxbridge::granule::GranuleSize;
    ///
    /// let granule = GranuleSize::default();
    /// assert_eq!(granule.count(0), 0);
    /// assert_eq!(granule.count(1), 1);
    /// assert_eq!(granule.count(8), 1);
    /// assert_eq!(granule.count(9), 2);
    /// ```
    pub fn count(self, len: u64) -> u64 {
        self.index_of(self.ceil_align(len))
    }
}
impl Default for GranuleSize {
    fn default() -> Self {
        GranuleSize(Self::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        let granule = GranuleSize::new(16).unwrap();
        assert_eq!(granule.index_of(0), 0);
        assert_eq!(granule.index_of(15), 0);
        assert_eq!(granule.index_of(16), 1);
        assert_eq!(granule.count(33), 3);
        assert!(granule.is_aligned(48));
        assert!(!granule.is_aligned(40));

        let unit = GranuleSize::new(1).unwrap();
        assert!(unit.is_aligned(3));
        assert_eq!(unit.count(3), 3);
    }
}
