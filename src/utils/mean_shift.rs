use crate::utils::bbox::{Rect, RotatedRect};
use crate::utils::histogram::BackProjection;
use nalgebra::Point2;
use std::f64::consts::PI;

/// Inflation of the converged mean-shift window before the CAMShift size estimation
pub const CAMSHIFT_TOLERANCE: i32 = 10;

const MOMENT_EPS: f64 = f64::EPSILON;

/// Stop conditions of the window convergence
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TermCriteria {
    pub max_iterations: usize,
    pub epsilon: f64,
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            epsilon: 1.0,
        }
    }
}

/// Raw and central moments of the likelihood inside a window; the coordinates are relative to the
/// window origin
///
#[derive(Clone, Copy, Debug, Default)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m20: f64,
    pub m11: f64,
    pub m02: f64,
}

impl Moments {
    pub fn of(prob: &BackProjection, window: &Rect) -> Self {
        let mut m = Moments::default();
        let area = window.intersect(&prob.roi());
        for y in area.y..area.bottom() {
            let dy = (y - window.y) as f64;
            for x in area.x..area.right() {
                let w = prob.get(x, y) as f64;
                if w == 0.0 {
                    continue;
                }
                let dx = (x - window.x) as f64;
                m.m00 += w;
                m.m10 += w * dx;
                m.m01 += w * dy;
                m.m20 += w * dx * dx;
                m.m11 += w * dx * dy;
                m.m02 += w * dy * dy;
            }
        }
        m
    }

    pub fn is_degenerate(&self) -> bool {
        self.m00.abs() < MOMENT_EPS
    }

    pub fn centroid(&self) -> (f64, f64) {
        (self.m10 / self.m00, self.m01 / self.m00)
    }

    pub fn mu20(&self) -> f64 {
        let (xc, _) = self.centroid();
        self.m20 - xc * self.m10
    }

    pub fn mu02(&self) -> f64 {
        let (_, yc) = self.centroid();
        self.m02 - yc * self.m01
    }

    pub fn mu11(&self) -> f64 {
        let (xc, _) = self.centroid();
        self.m11 - xc * self.m01
    }
}

/// Moves `window` to the local likelihood maximum without changing its size.
///
/// The window is kept inside `bounds`. Returns the converged window.
///
pub fn mean_shift(
    prob: &BackProjection,
    window: Rect,
    bounds: Rect,
    criteria: TermCriteria,
) -> Rect {
    let mut cur = window.intersect(&bounds);
    if cur.is_empty() {
        cur = Rect::new(
            bounds.x + bounds.width / 2,
            bounds.y + bounds.height / 2,
            1,
            1,
        );
    }
    let eps = criteria.epsilon * criteria.epsilon;

    for _ in 0..criteria.max_iterations {
        let m = Moments::of(prob, &cur);
        if m.is_degenerate() {
            break;
        }
        let (xc, yc) = m.centroid();
        let dx = (xc - cur.width as f64 * 0.5).round() as i32;
        let dy = (yc - cur.height as f64 * 0.5).round() as i32;

        let nx = (cur.x + dx).clamp(bounds.x, bounds.right() - cur.width);
        let ny = (cur.y + dy).clamp(bounds.y, bounds.bottom() - cur.height);
        let (dx, dy) = (nx - cur.x, ny - cur.y);
        cur.x = nx;
        cur.y = ny;

        if ((dx * dx + dy * dy) as f64) < eps {
            break;
        }
    }
    cur
}

/// Continuously adaptive mean-shift.
///
/// Converges `window` with [mean_shift](mean_shift), then estimates the size and the orientation
/// of the object from the second order moments around the converged window. Returns the rotated
/// object region and the search window for the next frame, or `None` when there is no likelihood
/// mass around the window.
///
pub fn cam_shift(
    prob: &BackProjection,
    window: Rect,
    bounds: Rect,
    criteria: TermCriteria,
) -> Option<(RotatedRect, Rect)> {
    let converged = mean_shift(prob, window, bounds, criteria);
    let area = converged
        .inflate(CAMSHIFT_TOLERANCE, CAMSHIFT_TOLERANCE)
        .intersect(&bounds);
    if area.is_empty() {
        return None;
    }

    let m = Moments::of(prob, &area);
    if m.is_degenerate() {
        return None;
    }

    let inv_m00 = 1.0 / m.m00;
    let (cx, cy) = m.centroid();
    let xc = (cx + area.x as f64).round() as i32;
    let yc = (cy + area.y as f64).round() as i32;

    let (mu20, mu11, mu02) = (m.mu20(), m.mu11(), m.mu02());
    let a = mu20 * inv_m00;
    let b = mu11 * inv_m00;
    let c = mu02 * inv_m00;

    let square = (4.0 * b * b + (a - c) * (a - c)).sqrt();
    let mut theta = (2.0 * b).atan2(a - c + square);
    let mut cs = theta.cos();
    let mut sn = theta.sin();

    let rotate_a = cs * cs * mu20 + 2.0 * cs * sn * mu11 + sn * sn * mu02;
    let rotate_c = sn * sn * mu20 - 2.0 * cs * sn * mu11 + cs * cs * mu02;
    let mut length = (rotate_a * inv_m00).max(0.0).sqrt() * 4.0;
    let mut width = (rotate_c * inv_m00).max(0.0).sqrt() * 4.0;

    if length < width {
        std::mem::swap(&mut length, &mut width);
        std::mem::swap(&mut cs, &mut sn);
        theta = PI * 0.5 - theta;
    }

    let t0 = (length * cs).abs().round() as i32;
    let t1 = (width * sn).abs().round() as i32;
    let comp_width = (t0.max(t1) + 2).min((bounds.right() - xc) * 2);

    let t0 = (length * sn).abs().round() as i32;
    let t1 = (width * cs).abs().round() as i32;
    let comp_height = (t0.max(t1) + 2).min((bounds.bottom() - yc) * 2);

    let comp_x = (xc - comp_width / 2).max(bounds.x);
    let comp_y = (yc - comp_height / 2).max(bounds.y);
    let next = Rect::new(
        comp_x,
        comp_y,
        comp_width.min(bounds.right() - comp_x),
        comp_height.min(bounds.bottom() - comp_y),
    );
    if next.is_empty() {
        return None;
    }

    let mut angle = ((PI * 0.5 + theta) * 180.0 / PI) as f32;
    while angle < 0.0 {
        angle += 180.0;
    }
    while angle >= 180.0 {
        angle -= 180.0;
    }

    let region = RotatedRect::new(
        Point2::new(
            next.x as f32 + next.width as f32 * 0.5,
            next.y as f32 + next.height as f32 * 0.5,
        ),
        width as f32,
        length as f32,
        angle,
    );
    Some((region, next))
}
