use crate::pipeline::Blob;
use crate::sync::Timestamp;
use crate::utils::bbox::Rect;
use image::{Rgb, RgbImage};

/// Outline colour of the tracked boxes
pub const ANNOTATION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Object name attached to the top-left corner of its box
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub x: i32,
    pub y: i32,
}

/// Copy of the left image with the tracked boxes drawn
///
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub timestamp: Timestamp,
    pub image: RgbImage,
    pub labels: Vec<Label>,
}

impl AnnotatedFrame {
    /// Draws the 2D boxes of `blobs` onto a copy of `image`; blobs without a box are skipped
    ///
    pub fn draw(image: &RgbImage, timestamp: Timestamp, blobs: &[Blob]) -> Self {
        let mut canvas = image.clone();
        let mut labels = Vec::default();
        for blob in blobs {
            let rect = blob.bounding_box_2d;
            if rect.is_empty() {
                continue;
            }
            draw_outline(&mut canvas, &rect, ANNOTATION_COLOR);
            labels.push(Label {
                name: blob.name.clone(),
                x: rect.x,
                y: rect.y,
            });
        }
        Self {
            timestamp,
            image: canvas,
            labels,
        }
    }
}

fn put(canvas: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}

/// One pixel wide outline from `(x, y)` to `(x + width, y + height)` inclusive
///
pub fn draw_outline(canvas: &mut RgbImage, rect: &Rect, color: Rgb<u8>) {
    let (x0, y0, x1, y1) = (rect.x, rect.y, rect.right(), rect.bottom());
    for x in x0..=x1 {
        put(canvas, x, y0, color);
        put(canvas, x, y1, color);
    }
    for y in y0..=y1 {
        put(canvas, x0, y, color);
        put(canvas, x1, y, color);
    }
}
