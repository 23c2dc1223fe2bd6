use crate::stereo::PointCloud;
use crate::utils::bbox::{BoundingBox3D, Rect};
use crate::utils::knn::{GridNeighbors, NeighborSearch};
use anyhow::Result;
use itertools::{Itertools, MinMaxResult};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Number of neighbours used to estimate the local density of a point
pub const DEFAULT_MEAN_K: usize = 50;

/// Multiplier of the standard deviation of the mean neighbour distances
pub const DEFAULT_STD_DEV_MUL: f32 = 1.0;

/// Statistical outlier removal parameters
///
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierFilter {
    pub mean_k: usize,
    pub std_dev_mul: f32,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self {
            mean_k: DEFAULT_MEAN_K,
            std_dev_mul: DEFAULT_STD_DEV_MUL,
        }
    }
}

/// Filtered position and extent of an object
///
#[derive(Clone, Debug)]
pub struct Localization {
    pub centroid: Point3<f32>,
    pub bounding_box: BoundingBox3D,
    /// points that survived the outlier removal
    pub filtered: PointCloud,
    /// number of points before the outlier removal
    pub raw_count: usize,
}

/// Outlier-robust centroid and bounding box estimation
///
#[derive(Clone)]
pub struct RobustLocalizer {
    filter: OutlierFilter,
    search: Arc<dyn NeighborSearch>,
}

impl RobustLocalizer {
    pub fn new(filter: OutlierFilter, search: Arc<dyn NeighborSearch>) -> Self {
        Self { filter, search }
    }

    /// Localizer with the voxel grid neighbour search running on `threads` threads
    ///
    pub fn with_threads(filter: OutlierFilter, threads: usize) -> Result<Self> {
        Ok(Self::new(filter, Arc::new(GridNeighbors::new(threads)?)))
    }

    pub fn outlier_filter(&self) -> &OutlierFilter {
        &self.filter
    }

    /// Indices of the points whose mean distance to their `mean_k` neighbours does not exceed
    /// `mean + std_dev_mul * std_dev` computed over the whole set
    ///
    pub fn inlier_indices(&self, cloud: &[Point3<f32>]) -> Vec<usize> {
        if cloud.len() < 2 || self.filter.mean_k == 0 {
            return (0..cloud.len()).collect();
        }
        let distances = self
            .search
            .mean_neighbor_distances(cloud, self.filter.mean_k);

        let n = distances.len() as f64;
        let (sum, sq_sum) = distances.iter().fold((0.0_f64, 0.0_f64), |(s, sq), d| {
            let d = *d as f64;
            (s + d, sq + d * d)
        });
        let mean = sum / n;
        let variance = ((sq_sum - sum * sum / n) / (n - 1.0)).max(0.0);
        let threshold = mean + self.filter.std_dev_mul as f64 * variance.sqrt();

        distances
            .iter()
            .enumerate()
            .filter(|(_, d)| **d as f64 <= threshold)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn filter(&self, cloud: &[Point3<f32>]) -> PointCloud {
        self.inlier_indices(cloud)
            .into_iter()
            .map(|i| cloud[i])
            .collect()
    }

    /// Filters the cloud and computes the centroid and the bounding box of the remaining points;
    /// `None` for an empty cloud
    ///
    pub fn localize(&self, cloud: &[Point3<f32>]) -> Option<Localization> {
        if cloud.is_empty() {
            return None;
        }
        let filtered = self.filter(cloud);
        Some(Localization {
            centroid: centroid(&filtered)?,
            bounding_box: min_max(&filtered)?,
            filtered,
            raw_count: cloud.len(),
        })
    }
}

pub fn centroid(points: &[Point3<f32>]) -> Option<Point3<f32>> {
    if points.is_empty() {
        return None;
    }
    let sum = points
        .iter()
        .fold(Vector3::<f64>::zeros(), |acc, p| acc + p.coords.cast::<f64>());
    Some(Point3::from((sum / points.len() as f64).cast::<f32>()))
}

fn axis_range(values: impl Iterator<Item = f32>) -> Option<(f32, f32)> {
    match values.minmax_by(|a, b| a.total_cmp(b)) {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v, v)),
        MinMaxResult::MinMax(min, max) => Some((min, max)),
    }
}

/// Axis aligned extent of the points
///
pub fn min_max(points: &[Point3<f32>]) -> Option<BoundingBox3D> {
    let (min_x, max_x) = axis_range(points.iter().map(|p| p.x))?;
    let (min_y, max_y) = axis_range(points.iter().map(|p| p.y))?;
    let (min_z, max_z) = axis_range(points.iter().map(|p| p.z))?;
    Some(BoundingBox3D::new(
        Point3::new(min_x, min_y, min_z),
        Point3::new(max_x, max_y, max_z),
    ))
}

/// Share of the box pixels that produced a 3D point
///
pub fn depth_density(point_count: usize, rect: &Rect) -> f32 {
    let area = rect.area();
    if area <= 0 {
        return 0.0;
    }
    (point_count as f64 / area as f64).clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use crate::localize::{centroid, depth_density, min_max, OutlierFilter, RobustLocalizer};
    use crate::test_stuff::{cluster_with_outliers, grid_cluster, noisy_cluster};
    use crate::utils::bbox::Rect;
    use crate::utils::knn::BruteForceNeighbors;
    use crate::EPS;
    use nalgebra::Point3;
    use std::sync::Arc;

    fn localizer() -> RobustLocalizer {
        RobustLocalizer::with_threads(OutlierFilter::default(), 2).unwrap()
    }

    #[test]
    fn far_point_is_removed() {
        let mut cloud = grid_cluster(Point3::new(1.0, 2.0, 3.0), [5, 5, 4], 0.01);
        cloud.push(Point3::new(5.0, 5.0, 5.0));
        let filtered = localizer().filter(&cloud);
        assert_eq!(filtered.len(), 100);
        assert!(filtered.iter().all(|p| p.x < 2.0));
    }

    #[test]
    fn localization_of_cluster() {
        let mut cloud = grid_cluster(Point3::new(1.0, 2.0, 3.0), [5, 5, 4], 0.01);
        cloud.push(Point3::new(-4.0, 0.0, 9.0));
        let res = localizer().localize(&cloud).unwrap();
        assert_eq!(res.raw_count, 101);
        assert_eq!(res.filtered.len(), 100);
        assert!((res.centroid - Point3::new(1.02, 2.02, 3.015)).norm() < 1e-4);
        let b = res.bounding_box;
        assert!((b.min - Point3::new(1.0, 2.0, 3.0)).norm() < 1e-5);
        assert!((b.max - Point3::new(1.04, 2.04, 3.03)).norm() < 1e-5);
    }

    #[test]
    fn filtering_never_grows() {
        let l = localizer();
        for seed_size in [0, 1, 2, 10, 120] {
            let cloud = noisy_cluster(Point3::new(0.0, 0.0, 2.0), 0.05, seed_size);
            let filtered = l.filter(&cloud);
            assert!(filtered.len() <= cloud.len());
            if cloud.len() < 2 {
                assert_eq!(filtered.len(), cloud.len());
            }
        }
    }

    #[test]
    fn empty_cloud_has_no_localization() {
        let l = localizer();
        assert!(l.filter(&[]).is_empty());
        assert!(l.localize(&[]).is_none());
        assert!(centroid(&[]).is_none());
        assert!(min_max(&[]).is_none());
    }

    #[test]
    fn single_point() {
        let p = Point3::new(0.5, -0.5, 2.0);
        let res = localizer().localize(&[p]).unwrap();
        assert_eq!(res.centroid, p);
        assert_eq!(res.bounding_box.min, p);
        assert_eq!(res.bounding_box.max, p);
    }

    #[test]
    fn density_bounds() {
        assert!((depth_density(25, &Rect::new(0, 0, 10, 10)) - 0.25).abs() < EPS);
        assert_eq!(depth_density(0, &Rect::new(0, 0, 10, 10)), 0.0);
        assert_eq!(depth_density(10, &Rect::default()), 0.0);
        assert_eq!(depth_density(500, &Rect::new(0, 0, 10, 10)), 1.0);
    }

    #[test]
    fn neighbour_search_does_not_change_inliers() {
        let cloud = cluster_with_outliers(Point3::new(0.2, 0.1, 2.0), 800, 40);
        let exhaustive = RobustLocalizer::new(
            OutlierFilter::default(),
            Arc::new(BruteForceNeighbors::new(2).unwrap()),
        );
        let a = exhaustive.inlier_indices(&cloud);
        let b = localizer().inlier_indices(&cloud);
        // float summation order may flip a point sitting on the threshold
        let differing = a.iter().filter(|i| !b.contains(i)).count()
            + b.iter().filter(|i| !a.contains(i)).count();
        assert!(differing <= 1, "{} vs {}", a.len(), b.len());
        assert!(a.iter().all(|i| *i < 800) && b.iter().all(|i| *i < 800));
    }

    #[test]
    fn large_flat_region_is_filtered() {
        let cloud = grid_cluster(Point3::new(-0.2, -0.2, 1.0), [200, 200, 1], 0.002);
        let loc = localizer().localize(&cloud).unwrap();
        assert_eq!(loc.raw_count, 40_000);
        assert!(!loc.filtered.is_empty());
        assert!((loc.centroid - Point3::new(-0.001, -0.001, 1.0)).norm() < 0.01);
    }
}
