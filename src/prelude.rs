use crate::pipeline;
use crate::registry;

pub use crate::localize::{OutlierFilter, RobustLocalizer};
pub use crate::model::AppearanceModel;
pub use crate::node::HueBlob;
pub use crate::options::HueBlobOptions;
pub use crate::preload::PreloadList;
pub use crate::stereo::{CameraInfo, DisparityImage, StereoGate};
pub use crate::sync::{SensorMessage, Stamped, SyncPolicy};
pub use crate::trackers::TrackingAlgorithm;
pub use pipeline::{Blob, BlobOutcome, ChannelSink, NoopSink, ResultSink, TrackingOrchestrator};
pub use registry::service::{RegistryClient, RegistryService};
pub use registry::ObjectRegistry;
