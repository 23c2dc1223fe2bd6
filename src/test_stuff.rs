use crate::stereo::{CameraInfo, DisparityImage, DisparityMap, PointCloud};
use crate::sync::{FrameTuple, SensorMessage, Stamped, Timestamp};
use crate::utils::bbox::Rect;
use image::{Luma, Rgb, RgbImage};
use nalgebra::Point3;
use rand::distributions::Uniform;
use rand::Rng;
use std::sync::Arc;

pub const GREEN: Rgb<u8> = Rgb([0, 200, 0]);
pub const RED: Rgb<u8> = Rgb([200, 30, 30]);
pub const BLUE: Rgb<u8> = Rgb([20, 20, 220]);

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Sample view of a uniformly coloured object: a `side` x `side` square on a 2 pixel black border
///
pub fn sample_image(color: Rgb<u8>, side: u32) -> RgbImage {
    let mut img = RgbImage::new(side + 4, side + 4);
    for y in 2..side + 2 {
        for x in 2..side + 2 {
            img.put_pixel(x, y, color);
        }
    }
    img
}

/// Coloured square seen by the rig
///
#[derive(Clone, Copy, Debug)]
pub struct SceneObject {
    pub color: Rgb<u8>,
    /// side of the square in pixels
    pub side: u32,
    /// center of the object in the left camera frame, meters
    pub position: Point3<f32>,
}

/// Synthetic rectified stereo rig with fronto-parallel squares on a black background
///
#[derive(Clone, Debug)]
pub struct StereoScene {
    pub width: u32,
    pub height: u32,
    pub focal_length: f64,
    pub cx: f64,
    pub cy: f64,
    pub baseline: f32,
    pub objects: Vec<SceneObject>,
}

impl StereoScene {
    /// 640x480 rig with a 500 px focal length and a 10 cm baseline, no objects
    ///
    pub fn standard() -> Self {
        Self {
            width: 640,
            height: 480,
            focal_length: 500.0,
            cx: 320.0,
            cy: 240.0,
            baseline: 0.1,
            objects: Vec::default(),
        }
    }

    pub fn with_object(mut self, color: Rgb<u8>, side: u32, position: Point3<f32>) -> Self {
        self.objects.push(SceneObject {
            color,
            side,
            position,
        });
        self
    }

    pub fn camera_info(&self) -> CameraInfo {
        CameraInfo::from_intrinsics(
            self.width,
            self.height,
            self.focal_length,
            self.focal_length,
            self.cx,
            self.cy,
        )
    }

    /// Disparity of the object, pixels
    ///
    pub fn disparity_of(&self, idx: usize) -> f32 {
        self.focal_length as f32 * self.baseline / self.objects[idx].position.z
    }

    /// Square of the object in the left image
    ///
    pub fn left_box(&self, idx: usize) -> Rect {
        let o = &self.objects[idx];
        let p = o.position;
        let half = (o.side as f64 - 1.0) * 0.5;
        let u = self.focal_length * p.x as f64 / p.z as f64 + self.cx;
        let v = self.focal_length * p.y as f64 / p.z as f64 + self.cy;
        Rect::new(
            (u - half).round() as i32,
            (v - half).round() as i32,
            o.side as i32,
            o.side as i32,
        )
    }

    /// Square of the object in the right image, shifted by the rounded disparity
    ///
    pub fn right_box(&self, idx: usize) -> Rect {
        let mut r = self.left_box(idx);
        r.x -= self.disparity_of(idx).round() as i32;
        r
    }

    fn paint(image: &mut RgbImage, rect: &Rect, color: Rgb<u8>) {
        let rect = rect.clamp_to(image.width(), image.height());
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }

    pub fn left_image(&self) -> RgbImage {
        let mut img = RgbImage::new(self.width, self.height);
        for (i, o) in self.objects.iter().enumerate() {
            Self::paint(&mut img, &self.left_box(i), o.color);
        }
        img
    }

    pub fn right_image(&self) -> RgbImage {
        let mut img = RgbImage::new(self.width, self.height);
        for (i, o) in self.objects.iter().enumerate() {
            Self::paint(&mut img, &self.right_box(i), o.color);
        }
        img
    }

    /// Disparity of the object on its left image pixels, NaN elsewhere
    ///
    pub fn disparity(&self) -> DisparityImage {
        let mut map = DisparityMap::from_pixel(self.width, self.height, Luma([f32::NAN]));
        for i in 0..self.objects.len() {
            let rect = self.left_box(i).clamp_to(self.width, self.height);
            let d = self.disparity_of(i);
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    map.put_pixel(x as u32, y as u32, Luma([d]));
                }
            }
        }
        DisparityImage::new(
            map,
            self.focal_length as f32,
            self.baseline,
            0.0,
            128.0,
        )
    }

    pub fn tuple(&self, timestamp: Timestamp) -> FrameTuple {
        let camera = Arc::new(self.camera_info());
        FrameTuple {
            timestamp,
            left_image: Arc::new(self.left_image()),
            left_camera_info: camera.clone(),
            right_image: Arc::new(self.right_image()),
            right_camera_info: camera,
            disparity: Arc::new(self.disparity()),
        }
    }

    /// The five messages of one frame in the order left image, left camera, right image, right
    /// camera, disparity
    ///
    pub fn messages(&self, timestamp: Timestamp) -> Vec<SensorMessage> {
        let t = self.tuple(timestamp);
        vec![
            SensorMessage::LeftImage(Stamped::shared(timestamp, t.left_image)),
            SensorMessage::LeftCameraInfo(Stamped::shared(timestamp, t.left_camera_info)),
            SensorMessage::RightImage(Stamped::shared(timestamp, t.right_image)),
            SensorMessage::RightCameraInfo(Stamped::shared(timestamp, t.right_camera_info)),
            SensorMessage::Disparity(Stamped::shared(timestamp, t.disparity)),
        ]
    }
}

/// Tiny frame with the five messages stamped by `stamps`, in substream order
///
pub fn frame_messages_with_stamps(stamps: [Timestamp; 5]) -> Vec<SensorMessage> {
    let camera = CameraInfo::from_intrinsics(8, 8, 10.0, 10.0, 4.0, 4.0);
    let disparity = DisparityImage::new(DisparityMap::new(8, 8), 10.0, 0.1, 0.0, 8.0);
    vec![
        SensorMessage::LeftImage(Stamped::new(stamps[0], RgbImage::new(8, 8))),
        SensorMessage::LeftCameraInfo(Stamped::new(stamps[1], camera.clone())),
        SensorMessage::RightImage(Stamped::new(stamps[2], RgbImage::new(8, 8))),
        SensorMessage::RightCameraInfo(Stamped::new(stamps[3], camera)),
        SensorMessage::Disparity(Stamped::new(stamps[4], disparity)),
    ]
}

pub fn frame_messages(stamp: Timestamp) -> Vec<SensorMessage> {
    frame_messages_with_stamps([stamp; 5])
}

/// Regular grid of `dims[0] x dims[1] x dims[2]` points starting at `origin`
///
pub fn grid_cluster(origin: Point3<f32>, dims: [usize; 3], step: f32) -> PointCloud {
    let mut cloud = PointCloud::default();
    for i in 0..dims[0] {
        for j in 0..dims[1] {
            for k in 0..dims[2] {
                cloud.push(Point3::new(
                    origin.x + i as f32 * step,
                    origin.y + j as f32 * step,
                    origin.z + k as f32 * step,
                ));
            }
        }
    }
    cloud
}

/// `n` points uniformly spread in a cube of half size `spread` around `center`
///
pub fn noisy_cluster(center: Point3<f32>, spread: f32, n: usize) -> PointCloud {
    let mut rng = rand::thread_rng();
    let spread = spread.max(f32::EPSILON);
    let dist = Uniform::new(-spread, spread);
    (0..n)
        .map(|_| {
            Point3::new(
                center.x + rng.sample(dist),
                center.y + rng.sample(dist),
                center.z + rng.sample(dist),
            )
        })
        .collect()
}

/// Cluster with a share of far away points mixed in
///
pub fn cluster_with_outliers(center: Point3<f32>, n: usize, outliers: usize) -> PointCloud {
    let mut cloud = noisy_cluster(center, 0.05, n);
    let mut rng = rand::thread_rng();
    let dist = Uniform::new(1.0_f32, 3.0);
    for _ in 0..outliers {
        cloud.push(Point3::new(
            center.x + rng.sample(dist),
            center.y - rng.sample(dist),
            center.z + rng.sample(dist),
        ));
    }
    cloud
}
