//! エンジンに受け渡されるボリューム画像関連の構成要素.
//!
//! ファイル形式(e.g., NIfTI)の解析や書き出しは、このクレートの対象外である.
//! 利用者は、別途読み込んだヘッダ情報を[VolumeHeader]に詰めた上で、ボクセル列と共に渡す必要がある.
//!
//! [VolumeHeader]: struct.VolumeHeader.html
use byteorder::{ByteOrder, LittleEndian};

use crate::{ErrorKind, Result};

/// エンジンがサポートしているボクセルの要素型.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    /// 符号なし8bit整数 (コード`2`).
    Uint8,

    /// 符号付き16bit整数 (コード`4`).
    Int16,

    /// 32bit浮動小数点数 (コード`16`).
    Float32,
}
impl Datatype {
    /// 要素型コードに対応する`Datatype`を返す.
    ///
    /// # Errors
    ///
    /// サポート対象外のコードが指定された場合には、
    /// 種類が`ErrorKind::UnsupportedDatatype`のエラーが返される.
    ///
    /// # Examples
    ///
    /// ```
    /// use voxbridge::ErrorKind;
    /// use voxbridge::volume::Datatype;
    ///
    /// assert_eq!(Datatype::from_code(4).ok(), Some(Datatype::Int16));
    /// assert_eq!(Datatype::from_code(64).err().map(|e| *e.kind()), Some(ErrorKind::UnsupportedDatatype));
    /// ```
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            2 => Ok(Datatype::Uint8),
            4 => Ok(Datatype::Int16),
            16 => Ok(Datatype::Float32),
            _ => track_panic!(
                ErrorKind::UnsupportedDatatype,
                "Only datatypes 2,4,16 supported: {}",
                code
            ),
        }
    }

    /// 要素型コードを返す.
    pub fn code(self) -> i16 {
        match self {
            Datatype::Uint8 => 2,
            Datatype::Int16 => 4,
            Datatype::Float32 => 16,
        }
    }

    /// 一ボクセルあたりのビット数を返す.
    pub fn bits_per_voxel(self) -> u32 {
        match self {
            Datatype::Uint8 => 8,
            Datatype::Int16 => 16,
            Datatype::Float32 => 32,
        }
    }

    /// 一ボクセルあたりのバイト数を返す.
    pub fn bytes_per_voxel(self) -> u32 {
        self.bits_per_voxel() / 8
    }
}

/// ボクセル値の較正パラメータ.
///
/// エンジンに渡される際には、リトルエンディアンの`f32`四つ
/// (`slope`, `intercept`, `cal_min`, `cal_max`の順)としてエンコードされる.
/// エンジンはこれらの値を更新することがある.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// 傾き(`scl_slope`).
    pub slope: f32,

    /// 切片(`scl_inter`).
    pub intercept: f32,

    /// 表示範囲の下限(`cal_min`).
    pub cal_min: f32,

    /// 表示範囲の上限(`cal_max`).
    pub cal_max: f32,
}
impl Calibration {
    /// エンコード後のサイズ(バイト単位).
    pub const SIZE: usize = 4 * 4;

    /// 恒等変換となる較正パラメータを返す.
    pub fn identity() -> Self {
        Calibration {
            slope: 1.0,
            intercept: 0.0,
            cal_min: 0.0,
            cal_max: 0.0,
        }
    }

    pub(crate) fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_f32_into(
            &[self.slope, self.intercept, self.cal_min, self.cal_max],
            &mut buf[..Self::SIZE],
        );
    }

    pub(crate) fn read_from(buf: &[u8]) -> Self {
        let mut values = [0.0; 4];
        LittleEndian::read_f32_into(&buf[..Self::SIZE], &mut values);
        Calibration {
            slope: values[0],
            intercept: values[1],
            cal_min: values[2],
            cal_max: values[3],
        }
    }
}
impl Default for Calibration {
    fn default() -> Self {
        Self::identity()
    }
}

/// ボリューム画像のヘッダ情報.
///
/// エンジンの呼び出しに必要な項目のみを保持している.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeHeader {
    /// 要素型コード.
    ///
    /// サポート対象外の値も保持可能だが、その場合の処理は必ず失敗する.
    pub datatype_code: i16,

    /// 各軸の要素数(列数・行数・スライス数・ボリューム数).
    pub dims: [u32; 4],

    /// 各軸の間隔(列間・行間・スライス間・ボリューム間).
    pub pix_dims: [f32; 4],

    /// 較正パラメータ.
    pub calibration: Calibration,
}
impl VolumeHeader {
    /// 新しい`VolumeHeader`インスタンスを生成する.
    ///
    /// 各軸の間隔は`1.0`、較正パラメータは恒等変換となる.
    pub fn new(datatype: Datatype, dims: [u32; 4]) -> Self {
        VolumeHeader {
            datatype_code: datatype.code(),
            dims,
            pix_dims: [1.0; 4],
            calibration: Calibration::identity(),
        }
    }

    /// 要素型を返す.
    ///
    /// # Errors
    ///
    /// 要素型がサポート対象外の場合には、
    /// 種類が`ErrorKind::UnsupportedDatatype`のエラーが返される.
    pub fn datatype(&self) -> Result<Datatype> {
        track!(Datatype::from_code(self.datatype_code))
    }

    /// ボクセルの総数を返す.
    pub fn voxel_count(&self) -> u64 {
        self.dims.iter().map(|&n| u64::from(n)).product()
    }

    /// ボクセル列全体のバイト数を返す.
    ///
    /// # Errors
    ///
    /// 要素型がサポート対象外の場合には、
    /// 種類が`ErrorKind::UnsupportedDatatype`のエラーが返される.
    pub fn image_bytes(&self) -> Result<u64> {
        let datatype = track!(self.datatype())?;
        Ok(self.voxel_count() * u64::from(datatype.bytes_per_voxel()))
    }
}

/// 呼び出し側が所有するボリューム画像.
///
/// ヘッダ情報と、ボクセル列のバイト表現(エンジンのネイティブエンディアン、すなわちリトルエンディアン)の組.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    header: VolumeHeader,
    image: Vec<u8>,
}
impl Volume {
    /// 新しい`Volume`インスタンスを生成する.
    ///
    /// ヘッダとボクセル列の整合性は、処理の呼び出し時に検証される.
    pub fn new(header: VolumeHeader, image: Vec<u8>) -> Self {
        Volume { header, image }
    }

    /// ヘッダ情報を返す.
    pub fn header(&self) -> &VolumeHeader {
        &self.header
    }

    /// ヘッダ情報への可変参照を返す.
    pub fn header_mut(&mut self) -> &mut VolumeHeader {
        &mut self.header
    }

    /// ボクセル列を返す.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// ボクセル列への可変参照を返す.
    pub fn image_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    /// ヘッダ情報とボクセル列に分解する.
    pub fn into_parts(self) -> (VolumeHeader, Vec<u8>) {
        (self.header, self.image)
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn datatype_works() {
        for &datatype in &[Datatype::Uint8, Datatype::Int16, Datatype::Float32] {
            assert_eq!(Datatype::from_code(datatype.code()).ok(), Some(datatype));
        }
        assert_eq!(Datatype::Int16.bytes_per_voxel(), 2);
        assert_eq!(Datatype::Float32.bytes_per_voxel(), 4);

        for &code in &[0, 1, 8, 64, 256, 512, -4] {
            assert_eq!(
                Datatype::from_code(code).err().map(|e| *e.kind()),
                Some(ErrorKind::UnsupportedDatatype)
            );
        }
    }

    #[test]
    fn calibration_layout() {
        let c = Calibration {
            slope: 2.0,
            intercept: -1.5,
            cal_min: 0.0,
            cal_max: 255.0,
        };
        let mut buf = [0; Calibration::SIZE];
        c.write_to(&mut buf);
        assert_eq!(&buf[..4], &2.0f32.to_le_bytes());
        assert_eq!(&buf[4..8], &(-1.5f32).to_le_bytes());
        assert_eq!(Calibration::read_from(&buf), c);
    }

    #[test]
    fn header_works() -> TestResult {
        let header = VolumeHeader::new(Datatype::Int16, [4, 4, 4, 1]);
        assert_eq!(header.voxel_count(), 64);
        assert_eq!(track!(header.image_bytes())?, 128);

        let mut header = header;
        header.datatype_code = 128;
        assert_eq!(
            header.image_bytes().err().map(|e| *e.kind()),
            Some(ErrorKind::UnsupportedDatatype)
        );
        Ok(())
    }

    #[test]
    fn volume_works() {
        let header = VolumeHeader::new(Datatype::Uint8, [2, 1, 1, 1]);
        let mut volume = Volume::new(header.clone(), vec![1, 2]);
        volume.image_mut()[1] = 3;
        volume.header_mut().calibration.cal_max = 3.0;

        let (h, image) = volume.into_parts();
        assert_eq!(image, [1, 3]);
        assert_eq!(h.dims, header.dims);
        assert_eq!(h.calibration.cal_max, 3.0);
    }
}
