//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

use crate::granule::GranuleSize;

/// 割当検証器のメトリクス.
#[derive(Debug, Clone)]
pub struct VerifierMetrics {
    pub(crate) acquired_regions: Counter,
    pub(crate) acquired_bytes: Counter,
    pub(crate) released_regions: Counter,
    pub(crate) released_bytes: Counter,
    pub(crate) misaligned_failures: Counter,
    pub(crate) overlap_failures: Counter,
    pub(crate) unknown_release_failures: Counter,
    pub(crate) out_of_range_failures: Counter,
    pub(crate) granule_size: GranuleSize,
    pub(crate) capacity_bytes: u64,
}
impl VerifierMetrics {
    /// 検証器が追跡するアドレス空間の大きさ(バイト単位).
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// 検証器のグラニュールサイズ.
    pub fn granule_size(&self) -> GranuleSize {
        self.granule_size
    }

    /// 記録された割当の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_verifier_acquired_regions_total <COUNTER>
    /// ```
    pub fn acquired_regions(&self) -> u64 {
        self.acquired_regions.value() as u64
    }

    /// 記録された割当のバイト数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_verifier_acquired_bytes_total <COUNTER>
    /// ```
    pub fn acquired_bytes(&self) -> u64 {
        self.acquired_bytes.value() as u64
    }

    /// 記録された解放の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_verifier_released_regions_total <COUNTER>
    /// ```
    pub fn released_regions(&self) -> u64 {
        self.released_regions.value() as u64
    }

    /// 記録された解放のバイト数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_verifier_released_bytes_total <COUNTER>
    /// ```
    pub fn released_bytes(&self) -> u64 {
        self.released_bytes.value() as u64
    }

    /// 現在使用中の(i.e., 未解放の)バイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_verifier_acquired_bytes_total - voxbridge_verifier_released_bytes_total
    /// ```
    pub fn usage_bytes(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_bytes();
        let inc = self.acquired_bytes();
        inc - dec
    }

    /// アライメント違反の検知回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_verifier_failures_total { reason="misaligned" } <COUNTER>
    /// ```
    pub fn misaligned_failures(&self) -> u64 {
        self.misaligned_failures.value() as u64
    }

    /// 重複割当の検知回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_verifier_failures_total { reason="overlap" } <COUNTER>
    /// ```
    pub fn overlap_failures(&self) -> u64 {
        self.overlap_failures.value() as u64
    }

    /// 未知の領域の解放(二重解放を含む)の検知回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_verifier_failures_total { reason="unknown_release" } <COUNTER>
    /// ```
    pub fn unknown_release_failures(&self) -> u64 {
        self.unknown_release_failures.value() as u64
    }

    /// アドレス空間外への割当の検知回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_verifier_failures_total { reason="out_of_range" } <COUNTER>
    /// ```
    pub fn out_of_range_failures(&self) -> u64 {
        self.out_of_range_failures.value() as u64
    }

    /// 新しい`VerifierMetrics`インスタンスを生成する.
    pub fn new(builder: &MetricBuilder, capacity_bytes: u64, granule_size: GranuleSize) -> Self {
        let mut builder = builder.clone();
        builder.namespace("voxbridge").subsystem("verifier");
        let failures = |reason| {
            builder
                .counter("failures_total")
                .help("Number of allocation discipline violations")
                .label("reason", reason)
                .finish()
                .expect("Never fails")
        };
        VerifierMetrics {
            misaligned_failures: failures("misaligned"),
            overlap_failures: failures("overlap"),
            unknown_release_failures: failures("unknown_release"),
            out_of_range_failures: failures("out_of_range"),
            acquired_regions: builder
                .counter("acquired_regions_total")
                .help("Number of recorded allocations")
                .finish()
                .expect("Never fails"),
            acquired_bytes: builder
                .counter("acquired_bytes_total")
                .help("Number of bytes of recorded allocations")
                .finish()
                .expect("Never fails"),
            released_regions: builder
                .counter("released_regions_total")
                .help("Number of recorded releases")
                .finish()
                .expect("Never fails"),
            released_bytes: builder
                .counter("released_bytes_total")
                .help("Number of bytes of recorded releases")
                .finish()
                .expect("Never fails"),
            granule_size,
            capacity_bytes,
        }
    }

    pub(crate) fn count_acquisition(&self, len: u32) {
        self.acquired_regions.increment();
        self.acquired_bytes.add_u64(u64::from(len));
    }

    pub(crate) fn count_release(&self, len: u32) {
        self.released_regions.increment();
        self.released_bytes.add_u64(u64::from(len));
    }
}

/// ブリッジ(境界呼び出し)のメトリクス.
#[derive(Debug, Clone)]
pub struct BridgeMetrics {
    pub(crate) calls: Counter,
    pub(crate) succeeded_calls: Counter,
    pub(crate) engine_failures: Counter,
    pub(crate) unsupported_datatypes: Counter,
    pub(crate) arena_growths: Counter,
    pub(crate) arena_size_bytes: Gauge,
    verifier: VerifierMetrics,
}
impl BridgeMetrics {
    /// 処理の呼び出し回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_bridge_calls_total <COUNTER>
    /// ```
    pub fn calls(&self) -> u64 {
        self.calls.value() as u64
    }

    /// 成功した処理の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_bridge_succeeded_calls_total <COUNTER>
    /// ```
    pub fn succeeded_calls(&self) -> u64 {
        self.succeeded_calls.value() as u64
    }

    /// エンジンが非ゼロのステータスを返した回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_bridge_engine_failures_total <COUNTER>
    /// ```
    pub fn engine_failures(&self) -> u64 {
        self.engine_failures.value() as u64
    }

    /// サポート対象外の要素型により拒否された回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_bridge_unsupported_datatypes_total <COUNTER>
    /// ```
    pub fn unsupported_datatypes(&self) -> u64 {
        self.unsupported_datatypes.value() as u64
    }

    /// エンジン呼び出し中にアリーナが拡張された回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_bridge_arena_growths_total <COUNTER>
    /// ```
    pub fn arena_growths(&self) -> u64 {
        self.arena_growths.value() as u64
    }

    /// 直近に観測したアリーナのサイズ(バイト単位).
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// voxbridge_bridge_arena_size_bytes <GAUGE>
    /// ```
    pub fn arena_size_bytes(&self) -> u64 {
        self.arena_size_bytes.value() as u64
    }

    /// 検証器のメトリクスを返す.
    pub fn verifier(&self) -> &VerifierMetrics {
        &self.verifier
    }

    pub(crate) fn new(builder: &MetricBuilder, verifier: VerifierMetrics) -> Self {
        let mut builder = builder.clone();
        builder.namespace("voxbridge").subsystem("bridge");
        BridgeMetrics {
            calls: builder
                .counter("calls_total")
                .help("Number of boundary calls")
                .finish()
                .expect("Never fails"),
            succeeded_calls: builder
                .counter("succeeded_calls_total")
                .help("Number of boundary calls completed successfully")
                .finish()
                .expect("Never fails"),
            engine_failures: builder
                .counter("engine_failures_total")
                .help("Number of non-zero statuses returned by the engine")
                .finish()
                .expect("Never fails"),
            unsupported_datatypes: builder
                .counter("unsupported_datatypes_total")
                .help("Number of calls rejected due to unsupported datatypes")
                .finish()
                .expect("Never fails"),
            arena_growths: builder
                .counter("arena_growths_total")
                .help("Number of arena growths observed across engine calls")
                .finish()
                .expect("Never fails"),
            arena_size_bytes: builder
                .gauge("arena_size_bytes")
                .help("Size of the arena backing storage")
                .finish()
                .expect("Never fails"),
            verifier,
        }
    }
}
