//! アリーナ上の割当規律の検証器.
//!
//! 検証器は、外部アロケータ(エンジン側の`walloc`/`wfree`)が行った割当・解放を記録し、
//! その都度、規律違反(アライメント違反・重複割当・未知の領域の解放)を検知する責務を負っている.
//!
//! 検証器自体がアドレスを選ぶことは無く、特定のメモリ実装にも依存しない.
pub use self::bitmap::GranuleBitmap;
pub use self::heap_verifier::HeapVerifier;

mod bitmap;
mod heap_verifier;
