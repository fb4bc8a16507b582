//! Granule Bitmap

/// 一バイトあたりのビット数.
const BITS_PER_BYTE: u64 = 8;

/// グラニュール毎の使用状況を、一グラニュール一ビットで保持するビット集合.
///
/// ワード幅に依存しないように、内部的には`u8`の配列として表現している.
/// 長さは構築時に固定され、以後変化することはない.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GranuleBitmap {
    bytes: Vec<u8>,
    len: u64,
}
#[allow(clippy::len_without_is_empty)]
impl GranuleBitmap {
    /// `len`個のグラニュールを表現する(全て未使用の)ビットマップを生成する.
    pub fn new(len: u64) -> Self {
        let byte_len = (len + BITS_PER_BYTE - 1) / BITS_PER_BYTE;
        GranuleBitmap {
            bytes: vec![0; byte_len as usize],
            len,
        }
    }

    /// 表現可能なグラニュールの数を返す.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// `index`番目のグラニュールが使用中かどうかを返す.
    ///
    /// # Panics
    ///
    /// `index`が`self.len()`以上の場合には、現在のスレッドがパニックする.
    pub fn get(&self, index: u64) -> bool {
        assert!(index < self.len, "index={}, len={}", index, self.len);
        let (byte, mask) = Self::locate(index);
        self.bytes[byte] & mask != 0
    }

    /// `[start, start + count)`の範囲で最初に見つかった使用中のグラニュールの番号を返す.
    ///
    /// 範囲内が全て未使用の場合には`None`が返される.
    pub fn first_used(&self, start: u64, count: u64) -> Option<u64> {
        assert!(start + count <= self.len, "start={}, count={}", start, count);
        let end = start + count;
        let mut index = start;
        while index < end {
            let (byte, mask) = Self::locate(index);
            if mask == 1 && end - index >= BITS_PER_BYTE && self.bytes[byte] == 0 {
                // バイト境界から始まる全ビット未使用のバイトは纏めて飛ばす
                index += BITS_PER_BYTE;
                continue;
            }
            if self.bytes[byte] & mask != 0 {
                return Some(index);
            }
            index += 1;
        }
        None
    }

    /// `[start, start + count)`の範囲のグラニュールを使用中にする.
    pub fn set_range(&mut self, start: u64, count: u64) {
        assert!(start + count <= self.len, "start={}, count={}", start, count);
        for index in start..start + count {
            let (byte, mask) = Self::locate(index);
            self.bytes[byte] |= mask;
        }
    }

    /// `[start, start + count)`の範囲のグラニュールを未使用にする.
    pub fn clear_range(&mut self, start: u64, count: u64) {
        assert!(start + count <= self.len, "start={}, count={}", start, count);
        for index in start..start + count {
            let (byte, mask) = Self::locate(index);
            self.bytes[byte] &= !mask;
        }
    }

    /// 使用中のグラニュールの数を返す.
    pub fn count_used(&self) -> u64 {
        self.bytes.iter().map(|b| u64::from(b.count_ones())).sum()
    }

    /// 全てのグラニュールが未使用かどうかを返す.
    pub fn is_clear(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    /// ビットマップの内部表現を返す.
    ///
    /// 先頭バイトの最下位ビットが、番号`0`のグラニュールに対応する.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn locate(index: u64) -> (usize, u8) {
        let byte = (index / BITS_PER_BYTE) as usize;
        let mask = 1 << (index % BITS_PER_BYTE);
        (byte, mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        let mut bitmap = GranuleBitmap::new(20);
        assert_eq!(bitmap.len(), 20);
        assert_eq!(bitmap.as_bytes().len(), 3);
        assert!(bitmap.is_clear());

        bitmap.set_range(3, 6);
        assert!(!bitmap.get(2));
        assert!(bitmap.get(3));
        assert!(bitmap.get(8));
        assert!(!bitmap.get(9));
        assert_eq!(bitmap.count_used(), 6);
        assert_eq!(bitmap.as_bytes(), &[0b1111_1000, 0b0000_0001, 0][..]);

        bitmap.clear_range(3, 6);
        assert!(bitmap.is_clear());
    }

    #[test]
    fn first_used_works() {
        let mut bitmap = GranuleBitmap::new(64);
        assert_eq!(bitmap.first_used(0, 64), None);

        bitmap.set_range(37, 1);
        assert_eq!(bitmap.first_used(0, 64), Some(37));
        assert_eq!(bitmap.first_used(0, 37), None);
        assert_eq!(bitmap.first_used(36, 2), Some(37));
        assert_eq!(bitmap.first_used(38, 26), None);
        assert_eq!(bitmap.first_used(5, 0), None);
    }

    #[test]
    #[should_panic]
    fn out_of_range() {
        let bitmap = GranuleBitmap::new(8);
        bitmap.get(8);
    }
}
