use crate::stereo::{CameraInfo, DisparityImage};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Exact timestamp matching
pub mod exact;

/// Best aligned group within a slack window
pub mod approximate;

/// Receive/emit counters and the periodic desynchronization check
pub mod watchdog;

use approximate::ApproximateTimeFilter;
use exact::ExactTimeFilter;
use watchdog::SyncCounters;

/// Message time, nanoseconds
pub type Timestamp = u64;

pub const DEFAULT_EXACT_QUEUE_SIZE: usize = 3;
pub const DEFAULT_APPROXIMATE_QUEUE_SIZE: usize = 100;
pub const DEFAULT_MAX_INTERVAL_NS: u64 = 50_000_000;

/// Time tagged message payload
///
#[derive(Debug)]
pub struct Stamped<T> {
    pub stamp: Timestamp,
    pub data: Arc<T>,
}

impl<T> Clone for Stamped<T> {
    fn clone(&self) -> Self {
        Self {
            stamp: self.stamp,
            data: self.data.clone(),
        }
    }
}

impl<T> Stamped<T> {
    pub fn new(stamp: Timestamp, data: T) -> Self {
        Self {
            stamp,
            data: Arc::new(data),
        }
    }

    pub fn shared(stamp: Timestamp, data: Arc<T>) -> Self {
        Self { stamp, data }
    }
}

/// The five inputs of the pipeline
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Substream {
    LeftImage,
    LeftCameraInfo,
    RightImage,
    RightCameraInfo,
    Disparity,
}

impl Substream {
    pub const ALL: [Substream; 5] = [
        Substream::LeftImage,
        Substream::LeftCameraInfo,
        Substream::RightImage,
        Substream::RightCameraInfo,
        Substream::Disparity,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Substream::LeftImage => "left_image",
            Substream::LeftCameraInfo => "left_camera_info",
            Substream::RightImage => "right_image",
            Substream::RightCameraInfo => "right_camera_info",
            Substream::Disparity => "disparity",
        }
    }
}

/// One message of one of the substreams
///
#[derive(Clone, Debug)]
pub enum SensorMessage {
    LeftImage(Stamped<RgbImage>),
    LeftCameraInfo(Stamped<CameraInfo>),
    RightImage(Stamped<RgbImage>),
    RightCameraInfo(Stamped<CameraInfo>),
    Disparity(Stamped<DisparityImage>),
}

impl SensorMessage {
    pub fn substream(&self) -> Substream {
        match self {
            SensorMessage::LeftImage(_) => Substream::LeftImage,
            SensorMessage::LeftCameraInfo(_) => Substream::LeftCameraInfo,
            SensorMessage::RightImage(_) => Substream::RightImage,
            SensorMessage::RightCameraInfo(_) => Substream::RightCameraInfo,
            SensorMessage::Disparity(_) => Substream::Disparity,
        }
    }

    pub fn stamp(&self) -> Timestamp {
        match self {
            SensorMessage::LeftImage(m) | SensorMessage::RightImage(m) => m.stamp,
            SensorMessage::LeftCameraInfo(m) | SensorMessage::RightCameraInfo(m) => m.stamp,
            SensorMessage::Disparity(m) => m.stamp,
        }
    }
}

/// Synchronized group of the five inputs. The timestamp is the one of the left image.
///
#[derive(Clone, Debug)]
pub struct FrameTuple {
    pub timestamp: Timestamp,
    pub left_image: Arc<RgbImage>,
    pub left_camera_info: Arc<CameraInfo>,
    pub right_image: Arc<RgbImage>,
    pub right_camera_info: Arc<CameraInfo>,
    pub disparity: Arc<DisparityImage>,
}

/// Messages collected for one group, one slot per substream
///
#[derive(Clone, Debug, Default)]
pub(crate) struct PartialTuple {
    slots: [Option<SensorMessage>; 5],
}

impl PartialTuple {
    pub(crate) fn set(&mut self, msg: SensorMessage) {
        let idx = msg.substream().index();
        self.slots[idx] = Some(msg);
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub(crate) fn stamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.slots.iter().flatten().map(SensorMessage::stamp)
    }

    pub(crate) fn into_tuple(self) -> Option<FrameTuple> {
        let [li, lc, ri, rc, d] = self.slots;
        match (li?, lc?, ri?, rc?, d?) {
            (
                SensorMessage::LeftImage(li),
                SensorMessage::LeftCameraInfo(lc),
                SensorMessage::RightImage(ri),
                SensorMessage::RightCameraInfo(rc),
                SensorMessage::Disparity(d),
            ) => Some(FrameTuple {
                timestamp: li.stamp,
                left_image: li.data,
                left_camera_info: lc.data,
                right_image: ri.data,
                right_camera_info: rc.data,
                disparity: d.data,
            }),
            _ => None,
        }
    }
}

/// Synchronization policy
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SyncPolicy {
    /// all five timestamps are identical
    Exact { queue_size: usize },
    /// all five timestamps lie within `max_interval_ns`
    Approximate {
        queue_size: usize,
        max_interval_ns: u64,
    },
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::Exact {
            queue_size: DEFAULT_EXACT_QUEUE_SIZE,
        }
    }
}

impl SyncPolicy {
    pub fn approximate() -> Self {
        SyncPolicy::Approximate {
            queue_size: DEFAULT_APPROXIMATE_QUEUE_SIZE,
            max_interval_ns: DEFAULT_MAX_INTERVAL_NS,
        }
    }

    pub fn queue_size(&self) -> usize {
        match self {
            SyncPolicy::Exact { queue_size } | SyncPolicy::Approximate { queue_size, .. } => {
                *queue_size
            }
        }
    }
}

/// Groups incoming messages into frame tuples
///
pub trait MessageFilter {
    /// Accepts the next message; returns the tuple completed by it, if any
    ///
    fn push(&mut self, msg: SensorMessage) -> Option<FrameTuple>;
}

/// Single threaded front end of the synchronization: feeds the filter of the configured policy
/// and maintains the counters read by the [watchdog](watchdog::DesyncWatchdog)
///
pub struct Synchronizer {
    filter: Box<dyn MessageFilter + Send>,
    counters: Arc<SyncCounters>,
}

impl Synchronizer {
    pub fn new(policy: SyncPolicy) -> Self {
        let filter: Box<dyn MessageFilter + Send> = match policy {
            SyncPolicy::Exact { queue_size } => Box::new(ExactTimeFilter::new(queue_size)),
            SyncPolicy::Approximate {
                queue_size,
                max_interval_ns,
            } => Box::new(ApproximateTimeFilter::new(queue_size, max_interval_ns)),
        };
        Self {
            filter,
            counters: Arc::new(SyncCounters::default()),
        }
    }

    pub fn push(&mut self, msg: SensorMessage) -> Option<FrameTuple> {
        self.counters.record_received(msg.substream());
        let res = self.filter.push(msg);
        if res.is_some() {
            self.counters.record_emitted();
        }
        res
    }

    pub fn counters(&self) -> Arc<SyncCounters> {
        self.counters.clone()
    }
}
