use crate::localize::{depth_density, RobustLocalizer};
use crate::options::HueBlobOptions;
use crate::registry::{SharedRegistry, StereoObject};
use crate::stereo::{CameraInfo, DisparityImage, PointCloud, StereoReconstructor};
use crate::sync::{FrameTuple, Substream, Timestamp};
use crate::trackers::{tracker_for, ObjectTracker};
use crate::utils::bbox::{BoundingBox3D, Rect};
use crate::warn_throttle;
use crate::Errors;
use anyhow::Result;
use crossbeam::channel::{unbounded, Receiver, Sender};
use image::RgbImage;
use log::{debug, info};
use nalgebra::Point3;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Annotated copy of the left image
pub mod annotate;


use annotate::AnnotatedFrame;

/// Tracking failures are reported at most once per this many seconds
const TRACKING_FAILURE_LOG_PERIOD: u64 = 20;

/// Missing inputs are reported at most once per this many seconds
const MISSING_INPUT_LOG_PERIOD: u64 = 1;

/// How far the per-object processing went
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobOutcome {
    /// 2D and 3D fields are set
    Localized,
    LeftTrackingFailed,
    RightTrackingFailed,
    /// the tracked region has no pixels inside the image
    InvalidWindow,
    /// no pixel of the box has a valid disparity, only the 2D fields are set
    EmptyReconstruction,
}

/// Result of one object for one frame
///
#[derive(Clone, Debug, PartialEq)]
pub struct Blob {
    pub name: String,
    pub timestamp: Timestamp,
    /// left image box, zero when the tracking failed
    pub bounding_box_2d: Rect,
    pub bounding_box_3d: Option<BoundingBox3D>,
    /// filtered centroid plus the object anchor
    pub centroid: Option<Point3<f32>>,
    /// single point triangulation, the origin if the left and right boxes don't match
    pub point_estimate: Point3<f32>,
    /// share of the box pixels with a valid disparity
    pub depth_density: f32,
    pub outcome: BlobOutcome,
}

impl Blob {
    /// Blob with the zero box and without 3D fields
    ///
    pub fn degenerate(name: &str, timestamp: Timestamp, outcome: BlobOutcome) -> Self {
        Self {
            name: name.to_string(),
            timestamp,
            bounding_box_2d: Rect::default(),
            bounding_box_3d: None,
            centroid: None,
            point_estimate: Point3::origin(),
            depth_density: 0.0,
            outcome,
        }
    }

    pub fn is_localized(&self) -> bool {
        self.outcome == BlobOutcome::Localized
    }
}

/// Filtered points of one object
///
#[derive(Clone, Debug)]
pub struct StampedCloud {
    pub name: String,
    pub timestamp: Timestamp,
    pub frame_id: String,
    pub points: PointCloud,
}

/// Results of one frame
///
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub timestamp: Timestamp,
    pub blobs: Vec<Blob>,
}

/// Frame inputs as delivered by a transport that may lack some of them
///
#[derive(Clone, Debug, Default)]
pub struct FrameInputs {
    pub timestamp: Timestamp,
    pub left_image: Option<Arc<RgbImage>>,
    pub left_camera_info: Option<Arc<CameraInfo>>,
    pub right_image: Option<Arc<RgbImage>>,
    pub right_camera_info: Option<Arc<CameraInfo>>,
    pub disparity: Option<Arc<DisparityImage>>,
}

impl From<FrameTuple> for FrameInputs {
    fn from(t: FrameTuple) -> Self {
        Self {
            timestamp: t.timestamp,
            left_image: Some(t.left_image),
            left_camera_info: Some(t.left_camera_info),
            right_image: Some(t.right_image),
            right_camera_info: Some(t.right_camera_info),
            disparity: Some(t.disparity),
        }
    }
}

impl FrameInputs {
    pub fn missing(&self) -> Vec<&'static str> {
        let present = [
            self.left_image.is_some(),
            self.left_camera_info.is_some(),
            self.right_image.is_some(),
            self.right_camera_info.is_some(),
            self.disparity.is_some(),
        ];
        Substream::ALL
            .into_iter()
            .zip(present)
            .filter(|(_, p)| !p)
            .map(|(s, _)| s.name())
            .collect()
    }

    /// The complete tuple or [InputUnavailable](Errors::InputUnavailable) listing the missing inputs
    ///
    pub fn complete(&self) -> Result<FrameTuple> {
        match (
            &self.left_image,
            &self.left_camera_info,
            &self.right_image,
            &self.right_camera_info,
            &self.disparity,
        ) {
            (Some(li), Some(lc), Some(ri), Some(rc), Some(d)) => Ok(FrameTuple {
                timestamp: self.timestamp,
                left_image: li.clone(),
                left_camera_info: lc.clone(),
                right_image: ri.clone(),
                right_camera_info: rc.clone(),
                disparity: d.clone(),
            }),
            _ => Err(Errors::InputUnavailable(self.missing()).into()),
        }
    }
}

/// Receiver of the pipeline results
///
pub trait ResultSink: Send + Sync {
    fn publish_blob(&self, blob: &Blob);

    /// Number of objects processed for the frame, published after the blobs
    ///
    fn publish_count(&self, timestamp: Timestamp, count: usize);

    fn publish_cloud(&self, cloud: StampedCloud);

    /// The annotated image is built only when this is positive
    ///
    fn annotation_observers(&self) -> usize {
        0
    }

    fn publish_annotated(&self, _frame: AnnotatedFrame) {}
}

/// Sink that discards everything
///
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl ResultSink for NoopSink {
    fn publish_blob(&self, _blob: &Blob) {}

    fn publish_count(&self, _timestamp: Timestamp, _count: usize) {}

    fn publish_cloud(&self, _cloud: StampedCloud) {}
}

/// Receiving ends of a [ChannelSink](ChannelSink)
///
pub struct SinkReceivers {
    pub blobs: Receiver<Blob>,
    pub counts: Receiver<(Timestamp, usize)>,
    pub clouds: Receiver<StampedCloud>,
    pub annotated: Receiver<AnnotatedFrame>,
}

/// Sink that forwards the results to crossbeam channels
///
pub struct ChannelSink {
    blobs: Sender<Blob>,
    counts: Sender<(Timestamp, usize)>,
    clouds: Sender<StampedCloud>,
    annotated: Sender<AnnotatedFrame>,
    observers: AtomicUsize,
}

impl ChannelSink {
    pub fn new() -> (Self, SinkReceivers) {
        let (blobs, blobs_rx) = unbounded();
        let (counts, counts_rx) = unbounded();
        let (clouds, clouds_rx) = unbounded();
        let (annotated, annotated_rx) = unbounded();
        (
            Self {
                blobs,
                counts,
                clouds,
                annotated,
                observers: AtomicUsize::new(0),
            },
            SinkReceivers {
                blobs: blobs_rx,
                counts: counts_rx,
                clouds: clouds_rx,
                annotated: annotated_rx,
            },
        )
    }

    pub fn set_annotation_observers(&self, n: usize) {
        self.observers.store(n, Ordering::Relaxed);
    }

    fn report_closed(what: &str) {
        warn_throttle!(
            TRACKING_FAILURE_LOG_PERIOD,
            "Unable to publish {}, the receiver is closed.",
            what
        );
    }
}

impl ResultSink for ChannelSink {
    fn publish_blob(&self, blob: &Blob) {
        if self.blobs.send(blob.clone()).is_err() {
            Self::report_closed("blob");
        }
    }

    fn publish_count(&self, timestamp: Timestamp, count: usize) {
        if self.counts.send((timestamp, count)).is_err() {
            Self::report_closed("count");
        }
    }

    fn publish_cloud(&self, cloud: StampedCloud) {
        if self.clouds.send(cloud).is_err() {
            Self::report_closed("cloud");
        }
    }

    fn annotation_observers(&self) -> usize {
        self.observers.load(Ordering::Relaxed)
    }

    fn publish_annotated(&self, frame: AnnotatedFrame) {
        if self.annotated.send(frame).is_err() {
            Self::report_closed("annotated image");
        }
    }
}

/// Runs the per-object pipeline for every frame.
///
/// For every registered object: tracking in the left image, tracking in the right image, stereo
/// reconstruction of the left box, outlier removal and localization. The registry write lock is
/// held for the whole frame so that concurrent registry requests are applied between frames.
///
pub struct TrackingOrchestrator<S: ResultSink> {
    registry: SharedRegistry,
    tracker: Box<dyn ObjectTracker>,
    reconstructor: StereoReconstructor,
    localizer: RobustLocalizer,
    frame_id: String,
    sink: S,
}

impl<S: ResultSink> TrackingOrchestrator<S> {
    pub fn new(options: &HueBlobOptions, registry: SharedRegistry, sink: S) -> Result<Self> {
        options.validate()?;
        info!(
            "Tracking with {:?}, stereo gate {:?}, outlier filter {:?}",
            options.get_algorithm(),
            options.get_stereo_gate(),
            options.get_outlier_filter()
        );
        Ok(Self {
            registry,
            tracker: tracker_for(options.get_algorithm()),
            reconstructor: StereoReconstructor::new(options.get_stereo_gate()),
            localizer: RobustLocalizer::with_threads(
                options.get_outlier_filter(),
                options.get_knn_threads(),
            )?,
            frame_id: options.get_frame_id().to_string(),
            sink,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Processes a frame whose inputs may be incomplete.
    ///
    /// Missing inputs abort the frame for all the objects: nothing is published and
    /// [InputUnavailable](Errors::InputUnavailable) is returned.
    ///
    pub fn process(&self, inputs: &FrameInputs) -> Result<FrameReport> {
        let tuple = match inputs.complete() {
            Ok(t) => t,
            Err(e) => {
                warn_throttle!(MISSING_INPUT_LOG_PERIOD, "{} Aborting tracking.", e);
                return Err(e);
            }
        };
        Ok(self.process_tuple(&tuple))
    }

    pub fn process_tuple(&self, tuple: &FrameTuple) -> FrameReport {
        let (blobs, clouds): (Vec<_>, Vec<_>) = {
            let mut registry = self
                .registry
                .write()
                .expect("Access to registry must always succeed");
            registry
                .iter_mut()
                .map(|(name, object)| self.track_object(tuple, name, object))
                .unzip()
        };

        for cloud in clouds.into_iter().flatten() {
            self.sink.publish_cloud(cloud);
        }
        for blob in &blobs {
            self.sink.publish_blob(blob);
        }
        self.sink.publish_count(tuple.timestamp, blobs.len());

        if self.sink.annotation_observers() > 0 && !blobs.is_empty() {
            self.sink.publish_annotated(AnnotatedFrame::draw(
                &tuple.left_image,
                tuple.timestamp,
                &blobs,
            ));
        }

        FrameReport {
            timestamp: tuple.timestamp,
            blobs,
        }
    }

    fn track_object(
        &self,
        tuple: &FrameTuple,
        name: &str,
        object: &mut StereoObject,
    ) -> (Blob, Option<StampedCloud>) {
        let ts = tuple.timestamp;

        let left = match self
            .tracker
            .track(&tuple.left_image, &object.left.model, object.left.window)
        {
            Some(res) => res,
            None => {
                object.left.window = Rect::default();
                warn_throttle!(
                    TRACKING_FAILURE_LOG_PERIOD,
                    "Failed to track object {} in the left image",
                    name
                );
                return (Blob::degenerate(name, ts, BlobOutcome::LeftTrackingFailed), None);
            }
        };
        object.left.window = left.window;

        let right = match self
            .tracker
            .track(&tuple.right_image, &object.right.model, object.right.window)
        {
            Some(res) => res,
            None => {
                object.right.window = Rect::default();
                warn_throttle!(
                    TRACKING_FAILURE_LOG_PERIOD,
                    "Failed to track object {} in the right image",
                    name
                );
                return (Blob::degenerate(name, ts, BlobOutcome::RightTrackingFailed), None);
            }
        };
        object.right.window = right.window;

        let left_box = left.bounding_rect(tuple.left_image.width(), tuple.left_image.height());
        let right_box = right.bounding_rect(tuple.right_image.width(), tuple.right_image.height());
        if left_box.is_empty() || right_box.is_empty() {
            warn_throttle!(
                TRACKING_FAILURE_LOG_PERIOD,
                "Failed to track object {} (invalid tracking window)",
                name
            );
            return (Blob::degenerate(name, ts, BlobOutcome::InvalidWindow), None);
        }

        let reconstruction = self.reconstructor.reconstruct(tuple, &left_box, &right_box);
        let density = depth_density(reconstruction.cloud.len(), &left_box);
        debug!(
            "Object {}: left={:?}, right={:?}, points={}",
            name,
            left_box,
            right_box,
            reconstruction.cloud.len()
        );

        let mut blob = Blob {
            name: name.to_string(),
            timestamp: ts,
            bounding_box_2d: left_box,
            bounding_box_3d: None,
            centroid: None,
            point_estimate: reconstruction.point_estimate,
            depth_density: density,
            outcome: BlobOutcome::EmptyReconstruction,
        };

        match self.localizer.localize(&reconstruction.cloud) {
            Some(loc) => {
                blob.bounding_box_3d = Some(loc.bounding_box);
                blob.centroid = Some(loc.centroid + object.anchor);
                blob.outcome = BlobOutcome::Localized;
                let cloud = StampedCloud {
                    name: name.to_string(),
                    timestamp: ts,
                    frame_id: self.frame_id.clone(),
                    points: loc.filtered,
                };
                (blob, Some(cloud))
            }
            None => (blob, None),
        }
    }
}
