use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};

use crate::arena::SharedArena;
use crate::bridge::Bridge;
#[cfg(feature = "wasm")]
use crate::engine::WasmEngine;
use crate::engine::Engine;
use crate::granule::GranuleSize;
use crate::memory::{LinearMemory, VecMemory, MAX_PAGES, PAGE_SIZE};
use crate::metrics::{BridgeMetrics, VerifierMetrics};
use crate::verifier::HeapVerifier;
use crate::{ErrorKind, Result};

/// `Bridge`のビルダ.
#[derive(Debug, Clone)]
pub struct BridgeBuilder {
    initial_pages: u32,
    maximum_pages: u32,
    granule_size: GranuleSize,
    logger: Logger,
    metrics: MetricBuilder,
}
impl BridgeBuilder {
    /// 新しい`BridgeBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        BridgeBuilder {
            initial_pages: 256,
            maximum_pages: 2048,
            granule_size: GranuleSize::default(),
            logger: Logger::root(Discard, o!()),
            metrics: MetricBuilder::new(),
        }
    }

    /// アリーナの初期ページ数を設定する.
    ///
    /// デフォルト値は`256`(16MiB).
    pub fn initial_pages(&mut self, pages: u32) -> &mut Self {
        self.initial_pages = pages;
        self
    }

    /// アリーナの最大ページ数を設定する.
    ///
    /// 検証器が追跡するアドレス空間の大きさも、この値から決定される.
    /// 最大値は`MAX_PAGES`で、デフォルト値は`2048`(128MiB).
    pub fn maximum_pages(&mut self, pages: u32) -> &mut Self {
        self.maximum_pages = pages;
        self
    }

    /// 検証器のグラニュールサイズを設定する.
    ///
    /// エンジン側のアロケータが返すポインタは、この値の倍数である必要がある.
    ///
    /// デフォルト値は`GranuleSize::default()`.
    pub fn granule_size(&mut self, granule_size: GranuleSize) -> &mut Self {
        self.granule_size = granule_size;
        self
    }

    /// ロガーを設定する.
    ///
    /// デフォルトでは、ログは一切出力されない.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// `engine`と、それが操作する線形メモリを用いて`Bridge`を構築する.
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される:
    ///
    /// - 初期ページ数が最大ページ数を超えている
    /// - 最大ページ数が`MAX_PAGES`を超えている
    /// - `memory`の最大ページ数が、設定された最大ページ数を超えている
    pub fn finish<E>(&self, engine: E, memory: E::Memory) -> Result<Bridge<E>>
    where
        E: Engine,
    {
        track!(self.check_sizing())?;
        track_assert!(
            memory.maximum_pages() <= self.maximum_pages,
            ErrorKind::InvalidInput;
            memory.maximum_pages(),
            self.maximum_pages
        );

        let capacity = u64::from(self.maximum_pages) * PAGE_SIZE;
        let verifier_metrics = VerifierMetrics::new(&self.metrics, capacity, self.granule_size);
        let verifier = track!(HeapVerifier::new(verifier_metrics.clone()))?;
        let arena = track!(SharedArena::new(self.logger.clone(), memory, verifier))?;
        let metrics = BridgeMetrics::new(&self.metrics, verifier_metrics);
        metrics.arena_size_bytes.set(arena.size() as f64);
        info!(self.logger, "Bridge created";
              "arena_size" => arena.size(), "maximum_pages" => self.maximum_pages,
              "granule_size" => self.granule_size.as_u32());
        Ok(Bridge::new(self.logger.clone(), engine, arena, metrics))
    }

    /// プロセス内の線形メモリ(`VecMemory`)を生成し、`engine`と組み合わせて`Bridge`を構築する.
    pub fn in_memory<E>(&self, engine: E) -> Result<Bridge<E>>
    where
        E: Engine<Memory = VecMemory>,
    {
        track!(self.check_sizing())?;
        let memory = track!(VecMemory::new(self.initial_pages, self.maximum_pages))?;
        track!(self.finish(engine, memory))
    }

    /// wasmモジュールをエンジンとして読み込み、`Bridge`を構築する.
    ///
    /// `wasm`はバイナリ形式ないしテキスト形式のモジュール.
    #[cfg(feature = "wasm")]
    pub fn load_wasm(&self, wasm: &[u8]) -> Result<Bridge<WasmEngine>> {
        track!(self.check_sizing())?;
        let (engine, memory) = track!(WasmEngine::load(
            self.logger.clone(),
            wasm,
            self.initial_pages,
            self.maximum_pages
        ))?;
        track!(self.finish(engine, memory))
    }

    fn check_sizing(&self) -> Result<()> {
        track_assert!(
            self.initial_pages <= self.maximum_pages,
            ErrorKind::InvalidInput;
            self.initial_pages,
            self.maximum_pages
        );
        track_assert!(
            self.maximum_pages <= MAX_PAGES,
            ErrorKind::InvalidInput;
            self.maximum_pages
        );
        Ok(())
    }
}
impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
