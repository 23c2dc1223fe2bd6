//! Synchronized stereo colour-blob tracking.
//!
//! Every synchronized stereo frame is run through a per-object pipeline: colour
//! tracking in both images, stereo reconstruction of the tracked region, and
//! statistical outlier filtering of the reconstructed points. The result is one
//! [Blob](pipeline::Blob) per registered object.
//!
use thiserror::Error;

/// Building blocks: rectangles, colour conversion, histograms, mean-shift, neighbour search
pub mod utils;

/// Learned per-object colour appearance
pub mod model;

/// Single image object trackers (CAMShift and naive hue band)
pub mod trackers;

/// Alignment of the five sensor substreams into frame tuples
pub mod sync;

/// Stereo geometry: calibration, disparity, triangulation
pub mod stereo;

/// Outlier-robust centroid and extent estimation
pub mod localize;

/// Object registry and the request service in front of it
pub mod registry;

/// Per-frame orchestration and result publication
pub mod pipeline;

/// Runtime configuration
pub mod options;

/// Startup list of objects to register
pub mod preload;

/// Standalone region-of-interest to point cloud projector
pub mod projector;

/// Ready to run node tying synchronizer, orchestrator and registry service together
pub mod node;

/// Commonly used types
pub mod prelude;

/// Synthetic scenes and helpers for tests, benches and demos
pub mod test_stuff;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Errors {
    #[error("Sample image for object `{0}` has zero size.")]
    EmptySampleImage(String),
    #[error("Frame inputs are missing: {0:?}")]
    InputUnavailable(Vec<&'static str>),
    #[error("Object `{0}` is not registered.")]
    UnknownObject(String),
    #[error("Preload document cannot be parsed: {0}")]
    PreloadDocument(String),
    #[error("Preload entry #{index} is malformed: {reason}")]
    PreloadEntry { index: usize, reason: String },
    #[error("Sample image `{path}` cannot be read: {reason}")]
    SampleImageUnreadable { path: String, reason: String },
    #[error("Registry service is not running.")]
    RegistryServiceStopped,
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Region of interest does not match the inputs: {0}")]
    RoiMismatch(String),
}

pub(crate) const EPS: f32 = 0.00001;
