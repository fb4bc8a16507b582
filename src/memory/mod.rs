//! アリーナの実体となる線形メモリのインターフェース定義と実装群.
//!
//! このモジュールは[SharedArena](../arena/struct.SharedArena.html)が
//! エンジンとのデータ交換に使用するメモリ領域を提供する.
pub use self::vec::VecMemory;

use crate::Result;

mod vec;

/// 線形メモリのページサイズ(バイト単位).
///
/// wasmの線形メモリの伸長単位に合わせている.
pub const PAGE_SIZE: u64 = 64 * 1024;

/// 取り得るページ数の最大値.
///
/// 32bitのアドレス空間全体(4GB)に相当する.
pub const MAX_PAGES: u32 = 65536;

/// 伸長可能な線形メモリを表すトレイト.
///
/// "線形メモリ"は「ホストとエンジンの双方から読み書き可能な、連続したバイト列」を意味し、
/// サイズはページ単位で単調に増加する(縮小することは無い).
///
/// 伸長はエンジン内部のアロケータによって、ホストの関知しないタイミングで行われ得る.
/// 伸長の前後で内部バッファの位置が変わり得るため、
/// `as_bytes`等で取得したスライスを、伸長を引き起こし得る呼び出しを跨いで保持してはならない.
/// (借用規則上、そのようなコードはコンパイルエラーとなる)
pub trait LinearMemory {
    /// メモリの現在の内容を返す.
    fn as_bytes(&self) -> &[u8];

    /// メモリの現在の内容を、変更可能な形式で返す.
    fn as_bytes_mut(&mut self) -> &mut [u8];

    /// 最大ページ数を返す.
    fn maximum_pages(&self) -> u32;

    /// メモリを`delta`ページ分だけ伸長する.
    ///
    /// 成功した場合には、伸長前のページ数が返される.
    ///
    /// # Errors
    ///
    /// 伸長後のページ数が`maximum_pages()`を超える場合には、
    /// 種類が`ErrorKind::OutOfRange`のエラーが返される.
    fn grow(&mut self, delta: u32) -> Result<u32>;

    /// メモリの現在のサイズ(バイト単位)を返す.
    fn size(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    /// メモリの現在のページ数を返す.
    fn pages(&self) -> u32 {
        (self.size() / PAGE_SIZE) as u32
    }
}
