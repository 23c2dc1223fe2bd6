use crate::model::{AppearanceModel, DEFAULT_MASK_THRESHOLD};
use crate::utils::bbox::Rect;
use crate::Errors;
use anyhow::Result;
use image::RgbImage;
use log::{info, warn};
use nalgebra::Vector3;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Request/response service in front of a shared registry
pub mod service;

/// Registry shared by the frame processing and the request service
pub type SharedRegistry = Arc<RwLock<ObjectRegistry>>;

/// Appearance model and search window of an object for one camera
///
#[derive(Clone, Debug, Default)]
pub struct ObjectState {
    pub model: AppearanceModel,
    /// last successfully tracked window, empty when the object must be searched in the whole frame
    pub window: Rect,
}

impl ObjectState {
    fn new(mask_threshold: u8) -> Self {
        Self {
            model: AppearanceModel::new(mask_threshold),
            window: Rect::default(),
        }
    }
}

/// Registered object: the left and the right camera state under one key
///
#[derive(Clone, Debug)]
pub struct StereoObject {
    pub anchor: Vector3<f32>,
    pub left: ObjectState,
    pub right: ObjectState,
}

impl StereoObject {
    fn new(mask_threshold: u8) -> Self {
        Self {
            anchor: Vector3::zeros(),
            left: ObjectState::new(mask_threshold),
            right: ObjectState::new(mask_threshold),
        }
    }

    fn add_view(&mut self, image: &RgbImage) {
        self.left.model.add_view(image);
        self.right.model.add_view(image);
    }

    pub fn views(&self) -> usize {
        self.left.model.views()
    }
}

/// Named objects ordered by name
///
#[derive(Clone, Debug)]
pub struct ObjectRegistry {
    objects: BTreeMap<String, StereoObject>,
    mask_threshold: u8,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MASK_THRESHOLD)
    }
}

impl ObjectRegistry {
    pub fn new(mask_threshold: u8) -> Self {
        Self {
            objects: BTreeMap::default(),
            mask_threshold,
        }
    }

    pub fn shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Creates the object or overwrites its anchor, then learns `image` as one more view.
    ///
    /// Overwriting an object with a non-zero anchor is permitted but reported.
    ///
    pub fn register(&mut self, name: &str, anchor: Vector3<f32>, image: &RgbImage) -> Result<()> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Errors::EmptySampleImage(name.to_string()).into());
        }
        let mask_threshold = self.mask_threshold;
        let object = self
            .objects
            .entry(name.to_string())
            .or_insert_with(|| StereoObject::new(mask_threshold));
        if object.anchor != Vector3::zeros() {
            warn!("Overwriting the object {}", name);
        }
        object.anchor = anchor;
        object.add_view(image);
        info!(
            "Object {} registered with anchor {:?}, views: {}",
            name,
            anchor.as_slice(),
            object.views()
        );
        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }

    /// Returns `true` if the object existed
    ///
    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self.objects.remove(name).is_some();
        if removed {
            info!("Object {} removed", name);
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<&StereoObject> {
        self.objects.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut StereoObject> {
        self.objects.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StereoObject)> {
        self.objects.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut StereoObject)> {
        self.objects.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
