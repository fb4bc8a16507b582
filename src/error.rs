use std::fmt;
use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl Error {
    /// エンジンが非ゼロのステータスを返したことによるエラーの場合には、その詳細を返す.
    pub fn engine_failure(&self) -> Option<&EngineFailure> {
        self.concrete_cause::<EngineFailure>()
    }
}
impl From<EngineFailure> for Error {
    fn from(f: EngineFailure) -> Self {
        ErrorKind::EngineFailed.cause(f).into()
    }
}

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 割当の開始位置がグラニュール境界に揃っていない.
    ///
    /// 外部アロケータとの統合に誤りがあることを示している.
    ///
    /// # 典型的な対応策
    ///
    /// - バグ修正を行ってプログラムを更新する
    Misaligned,

    /// 既に使用中のグラニュールを含む領域が割り当てられた.
    ///
    /// ポインタのリークや、解放前の再利用が発生していることを示している.
    ///
    /// # 典型的な対応策
    ///
    /// - バグ修正を行ってプログラムを更新する
    AlreadyAllocated,

    /// 記録されていないオフセットが解放された.
    ///
    /// 二重解放ないし、アリーナ外のポインタの誤用を示している.
    ///
    /// # 典型的な対応策
    ///
    /// - バグ修正を行ってプログラムを更新する
    UnknownRelease,

    /// 指定された範囲がアドレス空間(ないし現在のアリーナのサイズ)を超えている.
    OutOfRange,

    /// 入力画像の要素型がサポート対象外.
    ///
    /// この場合、アリーナ上の割当は一切行われない.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者が別の入力で再試行する
    UnsupportedDatatype,

    /// エンジンの計算関数が非ゼロのステータスを返した.
    ///
    /// エラーの原因として`EngineFailure`が保持されている.
    ///
    /// # 典型的な対応策
    ///
    /// - コマンド文字列を見直す (自動的なリトライは行われない)
    EngineFailed,

    /// エンジンの実行が異常終了した(e.g., wasmのトラップ、エクスポート関数の欠如).
    EngineTrapped,

    /// 入力が不正.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// その他エラー.
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}

/// エンジンの計算関数が返した失敗の詳細.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    /// 計算関数が返したステータスコード(非ゼロ).
    pub status: i32,

    /// 失敗した呼び出しのコマンド文字列.
    pub command: String,
}
impl fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "'{}' generated a fatal error: {}",
            self.command, self.status
        )
    }
}
impl std::error::Error for EngineFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_failure_is_retrievable() {
        let e = Error::from(EngineFailure {
            status: 3,
            command: "-sqr".to_owned(),
        });
        assert_eq!(*e.kind(), ErrorKind::EngineFailed);
        assert_eq!(e.engine_failure().map(|f| f.status), Some(3));

        let e: Error = ErrorKind::Other.cause("foo").into();
        assert!(e.engine_failure().is_none());
    }
}
