use geo::{BoundingRect, LineString, Polygon};
use nalgebra::{Point2, Point3};

/// Upright rectangle in the format (x, y, width, height), pixel units
///
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width` x `height` image
    ///
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new(
            self.x as f32 + self.width as f32 * 0.5,
            self.y as f32 + self.height as f32 * 0.5,
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Intersection of two rectangles; the empty default rectangle when they don't overlap
    ///
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            Rect::default()
        } else {
            Rect::new(x, y, right - x, bottom - y)
        }
    }

    /// Clamps the rectangle to the bounds of a `width` x `height` image
    ///
    pub fn clamp_to(&self, width: u32, height: u32) -> Rect {
        self.intersect(&Rect::full(width, height))
    }

    /// Grows the rectangle by `dx` on the left and right sides and `dy` on the top and bottom
    ///
    pub fn inflate(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.x - dx,
            self.y - dy,
            self.width + 2 * dx,
            self.height + 2 * dy,
        )
    }

    pub fn as_array(&self) -> [i32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// Rotated rectangle: center, size and angle in degrees
///
#[derive(Clone, Copy, Default, Debug, PartialEq)]
pub struct RotatedRect {
    pub center: Point2<f32>,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
}

impl RotatedRect {
    pub fn new(center: Point2<f32>, width: f32, height: f32, angle: f32) -> Self {
        Self {
            center,
            width,
            height,
            angle,
        }
    }

    /// Axis aligned rotated rectangle that covers `rect`
    ///
    pub fn upright(rect: &Rect) -> Self {
        Self::new(rect.center(), rect.width as f32, rect.height as f32, 0.0)
    }

    /// Corner points, in the order bottom-left, top-left, top-right, bottom-right for zero angle
    ///
    pub fn points(&self) -> [Point2<f32>; 4] {
        let angle = self.angle.to_radians();
        let b = angle.cos() * 0.5;
        let a = angle.sin() * 0.5;
        let (cx, cy) = (self.center.x, self.center.y);
        let p0 = Point2::new(
            cx - a * self.height - b * self.width,
            cy + b * self.height - a * self.width,
        );
        let p1 = Point2::new(
            cx + a * self.height - b * self.width,
            cy - b * self.height - a * self.width,
        );
        let p2 = Point2::new(2.0 * cx - p0.x, 2.0 * cy - p0.y);
        let p3 = Point2::new(2.0 * cx - p1.x, 2.0 * cy - p1.y);
        [p0, p1, p2, p3]
    }

    /// Minimal upright integer rectangle that contains every corner
    ///
    pub fn bounding_rect(&self) -> Rect {
        let polygon = Polygon::from(self);
        match polygon.bounding_rect() {
            None => Rect::default(),
            Some(r) => {
                let x = r.min().x.floor() as i32;
                let y = r.min().y.floor() as i32;
                let right = r.max().x.ceil() as i32;
                let bottom = r.max().y.ceil() as i32;
                Rect::new(x, y, right - x + 1, bottom - y + 1)
            }
        }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

impl From<&RotatedRect> for Polygon<f64> {
    fn from(r: &RotatedRect) -> Self {
        let points = r.points();
        Polygon::new(
            LineString::from(
                points
                    .iter()
                    .map(|p| (p.x as f64, p.y as f64))
                    .collect::<Vec<_>>(),
            ),
            vec![],
        )
    }
}

/// Axis aligned 3D box in the format (min_x, min_y, min_z, max_x, max_y, max_z)
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox3D {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl BoundingBox3D {
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    pub fn as_array(&self) -> [f32; 6] {
        [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }

    pub fn contains(&self, p: &Point3<f32>) -> bool {
        (self.min.x..=self.max.x).contains(&p.x)
            && (self.min.y..=self.max.y).contains(&p.y)
            && (self.min.z..=self.max.z).contains(&p.z)
    }
}
