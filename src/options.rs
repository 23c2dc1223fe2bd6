use crate::localize::OutlierFilter;
use crate::model::DEFAULT_MASK_THRESHOLD;
use crate::stereo::StereoGate;
use crate::sync::watchdog::{DEFAULT_DESYNC_RATIO, DEFAULT_WATCHDOG_PERIOD};
use crate::sync::SyncPolicy;
use crate::trackers::TrackingAlgorithm;
use crate::Errors;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Coordinate frame of the published clouds
pub const DEFAULT_FRAME_ID: &str = "camera_bottom_left_optical";

fn invalid(reason: &str) -> Result<()> {
    Err(Errors::InvalidOptions(reason.to_string()).into())
}

/// Class that is used to configure the node.
///
/// Every setter consumes and returns the options so they can be chained. The options may also be
/// read from YAML, where every missing field keeps its default:
///
/// ```yaml
/// frame_id: camera_bottom_left_optical
/// sync_policy:
///   type: approximate
///   queue_size: 100
///   max_interval_ns: 50000000
/// algorithm: camshift
/// outlier_filter:
///   mean_k: 50
///   std_dev_mul: 1.0
/// models: /etc/hueblob/models.yaml
/// ```
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HueBlobOptions {
    frame_id: String,
    sync_policy: SyncPolicy,
    watchdog_period_ms: u64,
    desync_ratio: usize,
    algorithm: TrackingAlgorithm,
    stereo_gate: StereoGate,
    outlier_filter: OutlierFilter,
    knn_threads: usize,
    models: Option<PathBuf>,
    mask_threshold: u8,
}

impl Default for HueBlobOptions {
    fn default() -> Self {
        Self {
            frame_id: DEFAULT_FRAME_ID.to_string(),
            sync_policy: SyncPolicy::default(),
            watchdog_period_ms: DEFAULT_WATCHDOG_PERIOD.as_millis() as u64,
            desync_ratio: DEFAULT_DESYNC_RATIO,
            algorithm: TrackingAlgorithm::default(),
            stereo_gate: StereoGate::default(),
            outlier_filter: OutlierFilter::default(),
            knn_threads: num_cpus::get(),
            models: None,
            mask_threshold: DEFAULT_MASK_THRESHOLD,
        }
    }
}

impl HueBlobOptions {
    pub fn from_yaml_str(doc: &str) -> Result<Self> {
        let opts: HueBlobOptions = serde_yaml::from_str(doc)?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml_str(&fs::read_to_string(path)?)
    }

    /// Checks that the options describe a working configuration
    ///
    pub fn validate(&self) -> Result<()> {
        if self.sync_policy.queue_size() == 0 {
            return invalid("synchronization queue size must be positive");
        }
        if self.watchdog_period_ms == 0 {
            return invalid("watchdog period must be positive");
        }
        if self.desync_ratio == 0 {
            return invalid("desynchronization ratio must be positive");
        }
        if self.outlier_filter.mean_k == 0 {
            return invalid("outlier filter neighbour count must be positive");
        }
        let mul = self.outlier_filter.std_dev_mul;
        if mul.is_nan() || mul < 0.0 {
            return invalid("outlier filter deviation multiplier must not be negative");
        }
        let gate = &self.stereo_gate;
        if gate.max_vertical_offset.is_nan() || gate.max_vertical_offset < 0.0 {
            return invalid("stereo gate vertical offset must not be negative");
        }
        if gate.min_width_ratio.is_nan()
            || gate.min_width_ratio <= 0.0
            || gate.min_width_ratio > gate.max_width_ratio
        {
            return invalid("stereo gate width ratio bounds are inverted or not positive");
        }
        if self.knn_threads == 0 {
            return invalid("neighbour search needs at least one thread");
        }
        Ok(())
    }

    pub fn frame_id(mut self, frame_id: &str) -> Self {
        self.frame_id = frame_id.to_string();
        self
    }

    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    /// How often the synchronization counters are compared, millisecond granularity
    ///
    pub fn watchdog_period(mut self, period: Duration) -> Self {
        self.watchdog_period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// A substream that received more than `ratio` messages per synchronized tuple is reported
    ///
    pub fn desync_ratio(mut self, ratio: usize) -> Self {
        self.desync_ratio = ratio;
        self
    }

    pub fn algorithm(mut self, algorithm: TrackingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn stereo_gate(mut self, gate: StereoGate) -> Self {
        self.stereo_gate = gate;
        self
    }

    pub fn outlier_filter(mut self, filter: OutlierFilter) -> Self {
        self.outlier_filter = filter;
        self
    }

    pub fn knn_threads(mut self, n: usize) -> Self {
        self.knn_threads = n;
        self
    }

    /// Objects registered at startup, see [preload](crate::preload)
    ///
    pub fn models<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.models = Some(path.into());
        self
    }

    /// Sample pixels with the gray level at or below the threshold are background
    ///
    pub fn mask_threshold(mut self, threshold: u8) -> Self {
        self.mask_threshold = threshold;
        self
    }

    pub fn get_frame_id(&self) -> &str {
        &self.frame_id
    }

    pub fn get_sync_policy(&self) -> SyncPolicy {
        self.sync_policy
    }

    pub fn get_watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog_period_ms)
    }

    pub fn get_desync_ratio(&self) -> usize {
        self.desync_ratio
    }

    pub fn get_algorithm(&self) -> TrackingAlgorithm {
        self.algorithm
    }

    pub fn get_stereo_gate(&self) -> StereoGate {
        self.stereo_gate
    }

    pub fn get_outlier_filter(&self) -> OutlierFilter {
        self.outlier_filter
    }

    pub fn get_knn_threads(&self) -> usize {
        self.knn_threads
    }

    pub fn get_models(&self) -> Option<&Path> {
        self.models.as_deref()
    }

    pub fn get_mask_threshold(&self) -> u8 {
        self.mask_threshold
    }
}

#[cfg(test)]
mod tests {
    use crate::localize::OutlierFilter;
    use crate::options::{HueBlobOptions, DEFAULT_FRAME_ID};
    use crate::stereo::StereoGate;
    use crate::sync::SyncPolicy;
    use crate::trackers::TrackingAlgorithm;
    use crate::Errors;
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn defaults() {
        let o = HueBlobOptions::default();
        assert_eq!(o.get_frame_id(), DEFAULT_FRAME_ID);
        assert_eq!(o.get_sync_policy(), SyncPolicy::Exact { queue_size: 3 });
        assert_eq!(o.get_watchdog_period(), Duration::from_secs(30));
        assert_eq!(o.get_desync_ratio(), 3);
        assert_eq!(o.get_algorithm(), TrackingAlgorithm::Camshift);
        assert_eq!(o.get_outlier_filter().mean_k, 50);
        assert_eq!(o.get_stereo_gate().max_width_ratio, 1.5);
        assert!(o.get_knn_threads() > 0);
        assert!(o.get_models().is_none());
        assert_eq!(o.get_mask_threshold(), 5);
        o.validate().unwrap();
    }

    #[test]
    fn builder() {
        let o = HueBlobOptions::default()
            .frame_id("base_link")
            .algorithm(TrackingAlgorithm::Naive)
            .sync_policy(SyncPolicy::approximate())
            .watchdog_period(Duration::from_secs(5))
            .knn_threads(2)
            .models("/tmp/models.yaml")
            .mask_threshold(10);
        assert_eq!(o.get_frame_id(), "base_link");
        assert_eq!(o.get_algorithm(), TrackingAlgorithm::Naive);
        assert_eq!(o.get_watchdog_period(), Duration::from_secs(5));
        assert_eq!(o.get_models(), Some(Path::new("/tmp/models.yaml")));
        assert_eq!(o.get_mask_threshold(), 10);
        o.validate().unwrap();
    }

    #[test]
    fn sub_second_watchdog_period() {
        let o = HueBlobOptions::default().watchdog_period(Duration::from_millis(500));
        assert_eq!(o.get_watchdog_period(), Duration::from_millis(500));
        o.validate().unwrap();

        let o = HueBlobOptions::from_yaml_str("watchdog_period_ms: 250\n").unwrap();
        assert_eq!(o.get_watchdog_period(), Duration::from_millis(250));

        let o = HueBlobOptions::default().watchdog_period(Duration::from_micros(10));
        assert!(o.validate().is_err());
    }

    #[test]
    fn partial_yaml() {
        let o = HueBlobOptions::from_yaml_str(
            "frame_id: left\nalgorithm: naive\nsync_policy:\n  type: approximate\n  queue_size: 10\n  max_interval_ns: 1000\noutlier_filter:\n  mean_k: 20\n",
        )
        .unwrap();
        assert_eq!(o.get_frame_id(), "left");
        assert_eq!(o.get_algorithm(), TrackingAlgorithm::Naive);
        assert_eq!(
            o.get_sync_policy(),
            SyncPolicy::Approximate {
                queue_size: 10,
                max_interval_ns: 1000
            }
        );
        assert_eq!(o.get_outlier_filter().mean_k, 20);
        assert_eq!(o.get_outlier_filter().std_dev_mul, 1.0);
        assert_eq!(o.get_watchdog_period(), Duration::from_secs(30));
    }

    #[test]
    fn invalid_options() {
        let cases = [
            HueBlobOptions::default().sync_policy(SyncPolicy::Exact { queue_size: 0 }),
            HueBlobOptions::default().outlier_filter(OutlierFilter {
                mean_k: 0,
                std_dev_mul: 1.0,
            }),
            HueBlobOptions::default().outlier_filter(OutlierFilter {
                mean_k: 5,
                std_dev_mul: -1.0,
            }),
            HueBlobOptions::default().stereo_gate(StereoGate {
                max_vertical_offset: 10.0,
                min_width_ratio: 2.0,
                max_width_ratio: 1.5,
            }),
            HueBlobOptions::default().knn_threads(0),
            HueBlobOptions::default().desync_ratio(0),
        ];
        for o in cases {
            let err = o.validate().unwrap_err();
            assert!(matches!(
                err.downcast::<Errors>().unwrap(),
                Errors::InvalidOptions(_)
            ));
        }
        assert!(HueBlobOptions::from_yaml_str("knn_threads: 0\n").is_err());
        assert!(HueBlobOptions::from_yaml_str("- not a mapping\n").is_err());
    }
}
