use anyhow::Result;
use nalgebra::Point3;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use ultraviolet::{f32x8, Vec3, Vec3x8};

/// Number of SIMD lanes used to compare points
const LANES: usize = 8;

/// Coordinate of the lanes that do not hold a point
const PAD: f32 = 1.0e18;

/// Upper bound of the voxel grid size along one axis
const MAX_CELLS_PER_AXIS: f32 = 1024.0;

/// Neighbour statistics used by the statistical outlier removal
///
pub trait NeighborSearch: Send + Sync {
    /// Mean Euclidean distance from every point to its `k` nearest neighbours, the point itself
    /// excluded. When the set has fewer than `k + 1` points all the other points are used.
    ///
    fn mean_neighbor_distances(&self, points: &[Point3<f32>], k: usize) -> Vec<f32>;
}

fn query_pool(threads: usize) -> Result<Arc<ThreadPool>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("hueblob-knn-{}", i))
        .build()?;
    Ok(Arc::new(pool))
}

/// Mean of the square roots of the `k` smallest squared distances
fn mean_of_smallest(sq_distances: &mut [f32], k: usize) -> f32 {
    sq_distances.select_nth_unstable_by(k - 1, |a, b| a.total_cmp(b));
    sq_distances[..k].iter().map(|d| d.sqrt()).sum::<f32>() / k as f32
}

/// Exhaustive neighbour search: every point is compared to every other one, eight points at a
/// time, with the queries spread across a dedicated thread pool
///
#[derive(Clone)]
pub struct BruteForceNeighbors {
    pool: Arc<ThreadPool>,
}

impl BruteForceNeighbors {
    /// # Parameters
    /// * `threads` - number of threads of the pool; `0` is treated as `1`
    ///
    pub fn new(threads: usize) -> Result<Self> {
        Ok(Self {
            pool: query_pool(threads)?,
        })
    }

    fn pack(points: &[Point3<f32>]) -> Vec<Vec3x8> {
        points
            .chunks(LANES)
            .map(|chunk| {
                let mut xs = [PAD; LANES];
                let mut ys = [PAD; LANES];
                let mut zs = [PAD; LANES];
                for (i, p) in chunk.iter().enumerate() {
                    xs[i] = p.x;
                    ys[i] = p.y;
                    zs[i] = p.z;
                }
                Vec3x8::new(f32x8::from(xs), f32x8::from(ys), f32x8::from(zs))
            })
            .collect()
    }
}

impl NeighborSearch for BruteForceNeighbors {
    fn mean_neighbor_distances(&self, points: &[Point3<f32>], k: usize) -> Vec<f32> {
        let n = points.len();
        let k = k.min(n.saturating_sub(1));
        if k == 0 {
            return vec![0.0; n];
        }
        let packed = Self::pack(points);

        self.pool.install(|| {
            points
                .par_iter()
                .enumerate()
                .map_init(
                    || Vec::with_capacity(n),
                    |distances: &mut Vec<f32>, (i, p)| {
                        distances.clear();
                        let query = Vec3x8::splat(Vec3::new(p.x, p.y, p.z));
                        for (c, block) in packed.iter().enumerate() {
                            let sq = (*block - query).mag_sq();
                            for (lane, d) in sq.as_array_ref().iter().enumerate() {
                                let j = c * LANES + lane;
                                if j < n && j != i {
                                    distances.push(*d);
                                }
                            }
                        }
                        mean_of_smallest(distances, k)
                    },
                )
                .collect()
        })
    }
}

/// Uniform voxel grid over a point set, cells sized to hold about `k` points each
///
struct VoxelGrid<'a> {
    points: &'a [Point3<f32>],
    origin: Point3<f32>,
    cell: f32,
    dims: [i32; 3],
    cells: HashMap<[i32; 3], Vec<usize>>,
}

impl<'a> VoxelGrid<'a> {
    /// `None` when the points do not span any axis
    ///
    fn build(points: &'a [Point3<f32>], k: usize) -> Option<Self> {
        let first = points.first()?;
        let (min, max) = points.iter().fold((*first, *first), |(lo, hi), p| {
            (
                Point3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
                Point3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
            )
        });
        let extent = max - min;
        let spanned = extent
            .iter()
            .copied()
            .filter(|e| *e > f32::EPSILON)
            .collect::<Vec<_>>();
        if spanned.is_empty() {
            return None;
        }
        let volume = spanned.iter().map(|e| *e as f64).product::<f64>();
        let cell = (volume * k as f64 / points.len() as f64).powf(1.0 / spanned.len() as f64) as f32;
        let cell = cell.max(extent.max() / MAX_CELLS_PER_AXIS);
        if !cell.is_finite() || cell <= 0.0 {
            return None;
        }

        let mut grid = Self {
            points,
            origin: min,
            cell,
            dims: [0; 3],
            cells: HashMap::default(),
        };
        let top = grid.cell_of(&max);
        grid.dims = [top[0] + 1, top[1] + 1, top[2] + 1];
        for (i, p) in points.iter().enumerate() {
            grid.cells.entry(grid.cell_of(p)).or_default().push(i);
        }
        Some(grid)
    }

    fn cell_of(&self, p: &Point3<f32>) -> [i32; 3] {
        let d = (p - self.origin) / self.cell;
        [d.x as i32, d.y as i32, d.z as i32]
    }

    /// Adds the squared distances to the points of the cell `key`
    ///
    fn visit(&self, key: [i32; 3], query: usize, out: &mut Vec<f32>) {
        if (0..3).any(|a| key[a] < 0 || key[a] >= self.dims[a]) {
            return;
        }
        if let Some(members) = self.cells.get(&key) {
            let p = &self.points[query];
            out.extend(
                members
                    .iter()
                    .filter(|j| **j != query)
                    .map(|j| (p - self.points[*j]).norm_squared()),
            );
        }
    }

    /// Visits the cells at Chebyshev distance `r` from `center`; returns the number of cells
    /// looked at
    ///
    fn visit_ring(&self, center: [i32; 3], r: i32, query: usize, out: &mut Vec<f32>) -> usize {
        let mut looked = 0;
        for dx in -r..=r {
            for dy in -r..=r {
                let [x, y, z] = [center[0] + dx, center[1] + dy, center[2]];
                if dx.abs() == r || dy.abs() == r {
                    for dz in -r..=r {
                        self.visit([x, y, z + dz], query, out);
                        looked += 1;
                    }
                } else {
                    self.visit([x, y, z - r], query, out);
                    self.visit([x, y, z + r], query, out);
                    looked += 2;
                }
            }
        }
        looked
    }

    fn mean_distance(&self, query: usize, k: usize, out: &mut Vec<f32>) -> f32 {
        out.clear();
        let n = self.points.len();
        let center = self.cell_of(&self.points[query]);
        let max_ring = self.dims.iter().copied().max().unwrap_or(0);
        let mut looked = 0;

        for r in 0..=max_ring {
            looked += self.visit_ring(center, r, query, out);
            if out.len() >= k {
                let covered = r as f32 * self.cell;
                out.select_nth_unstable_by(k - 1, |a, b| a.total_cmp(b));
                if out[k - 1] <= covered * covered {
                    break;
                }
            }
            if looked > n {
                out.clear();
                let p = &self.points[query];
                out.extend(
                    self.points
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != query)
                        .map(|(_, q)| (p - q).norm_squared()),
                );
                break;
            }
        }
        mean_of_smallest(out, k)
    }
}

/// Exact neighbour search over a voxel grid.
///
/// The points are bucketed into cubic cells holding about `k` points each; a query scans rings of
/// cells around its own until the `k`-th distance found is covered by the scanned rings. Far
/// away points whose rings get too wide are compared to the whole set instead. Sets that do not
/// span any axis are handled by [BruteForceNeighbors](BruteForceNeighbors).
///
#[derive(Clone)]
pub struct GridNeighbors {
    pool: Arc<ThreadPool>,
}

impl GridNeighbors {
    /// # Parameters
    /// * `threads` - number of threads of the pool; `0` is treated as `1`
    ///
    pub fn new(threads: usize) -> Result<Self> {
        Ok(Self {
            pool: query_pool(threads)?,
        })
    }
}

impl NeighborSearch for GridNeighbors {
    fn mean_neighbor_distances(&self, points: &[Point3<f32>], k: usize) -> Vec<f32> {
        let n = points.len();
        let k = k.min(n.saturating_sub(1));
        if k == 0 {
            return vec![0.0; n];
        }
        let Some(grid) = VoxelGrid::build(points, k) else {
            return BruteForceNeighbors {
                pool: self.pool.clone(),
            }
            .mean_neighbor_distances(points, k);
        };

        self.pool.install(|| {
            (0..n)
                .into_par_iter()
                .map_init(
                    || Vec::with_capacity(4 * k),
                    |scratch: &mut Vec<f32>, i| grid.mean_distance(i, k, scratch),
                )
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::test_stuff::{cluster_with_outliers, grid_cluster, noisy_cluster};
    use crate::utils::knn::{BruteForceNeighbors, GridNeighbors, NeighborSearch};
    use crate::EPS;
    use nalgebra::Point3;

    fn scalar_mean_distances(points: &[Point3<f32>], k: usize) -> Vec<f32> {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let mut d = points
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, q)| (p - q).norm())
                    .collect::<Vec<_>>();
                d.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let k = k.min(d.len());
                d[..k].iter().sum::<f32>() / k as f32
            })
            .collect()
    }

    #[test]
    fn line_of_points() {
        let points = (0..5)
            .map(|i| Point3::new(i as f32, 0.0, 0.0))
            .collect::<Vec<_>>();
        let search = BruteForceNeighbors::new(2).unwrap();
        let d = search.mean_neighbor_distances(&points, 2);
        assert_eq!(d.len(), 5);
        assert!((d[0] - 1.5).abs() < EPS);
        assert!((d[2] - 1.0).abs() < EPS);
        assert!((d[4] - 1.5).abs() < EPS);
    }

    #[test]
    fn matches_scalar_computation() {
        let points = (0..37)
            .map(|i| {
                let f = i as f32;
                Point3::new(f.sin() * 3.0, (f * 0.7).cos(), f * 0.05)
            })
            .collect::<Vec<_>>();
        let search = BruteForceNeighbors::new(4).unwrap();
        let simd = search.mean_neighbor_distances(&points, 5);
        let scalar = scalar_mean_distances(&points, 5);
        for (a, b) in simd.iter().zip(scalar.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn small_sets() {
        let search = BruteForceNeighbors::new(1).unwrap();
        assert!(search.mean_neighbor_distances(&[], 50).is_empty());
        let single = search.mean_neighbor_distances(&[Point3::new(1.0, 2.0, 3.0)], 50);
        assert_eq!(single, vec![0.0]);
        let pair = search.mean_neighbor_distances(
            &[Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 3.0, 4.0)],
            50,
        );
        assert!((pair[0] - 5.0).abs() < EPS);
        assert!((pair[1] - 5.0).abs() < EPS);
    }

    fn assert_same(expected: &[f32], actual: &[f32]) {
        assert_eq!(expected.len(), actual.len());
        for (a, b) in expected.iter().zip(actual.iter()) {
            assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
        }
    }

    #[test]
    fn grid_matches_exhaustive_search() {
        let brute = BruteForceNeighbors::new(2).unwrap();
        let grid = GridNeighbors::new(2).unwrap();
        let clouds = [
            noisy_cluster(Point3::new(0.5, -0.2, 2.0), 0.1, 700),
            cluster_with_outliers(Point3::new(0.0, 0.0, 3.0), 600, 30),
            grid_cluster(Point3::new(-0.1, 0.0, 1.5), [30, 25, 1], 0.004),
            grid_cluster(Point3::new(0.0, 0.0, 1.0), [8, 8, 8], 0.01),
        ];
        for cloud in clouds.iter() {
            for k in [1, 8, 50] {
                assert_same(
                    &brute.mean_neighbor_distances(cloud, k),
                    &grid.mean_neighbor_distances(cloud, k),
                );
            }
        }
    }

    #[test]
    fn grid_handles_degenerate_sets() {
        let grid = GridNeighbors::new(1).unwrap();
        assert!(grid.mean_neighbor_distances(&[], 50).is_empty());

        let same = vec![Point3::new(1.0, 1.0, 1.0); 20];
        assert_eq!(grid.mean_neighbor_distances(&same, 5), vec![0.0; 20]);

        let line = (0..5)
            .map(|i| Point3::new(0.0, i as f32, 0.0))
            .collect::<Vec<_>>();
        let d = grid.mean_neighbor_distances(&line, 2);
        assert!((d[0] - 1.5).abs() < EPS);
        assert!((d[2] - 1.0).abs() < EPS);

        let mut doubled = noisy_cluster(Point3::new(0.0, 0.0, 2.0), 0.05, 100);
        doubled.extend(doubled.clone());
        let d = grid.mean_neighbor_distances(&doubled, 1);
        assert!(d.iter().all(|v| v.abs() < EPS));
    }
}
