#![feature(test)]

extern crate test;

use hueblob::localize::{OutlierFilter, RobustLocalizer};
use hueblob::test_stuff::{cluster_with_outliers, grid_cluster};
use hueblob::utils::knn::BruteForceNeighbors;
use nalgebra::Point3;
use std::sync::Arc;
use test::Bencher;

#[bench]
fn bench_outlier_removal_00500(b: &mut Bencher) {
    bench_outlier_removal(500, false, b);
}

#[bench]
fn bench_outlier_removal_05000(b: &mut Bencher) {
    bench_outlier_removal(5000, false, b);
}

#[bench]
fn bench_outlier_removal_exhaustive_00500(b: &mut Bencher) {
    bench_outlier_removal(500, true, b);
}

#[bench]
fn bench_outlier_removal_exhaustive_05000(b: &mut Bencher) {
    bench_outlier_removal(5000, true, b);
}

#[bench]
fn bench_outlier_removal_flat_40000(b: &mut Bencher) {
    let localizer = RobustLocalizer::with_threads(OutlierFilter::default(), num_cpus::get())
        .expect("Thread pool must be created");
    let cloud = grid_cluster(Point3::new(-0.2, -0.2, 1.0), [200, 200, 1], 0.002);
    b.iter(|| {
        let res = localizer.localize(&cloud);
        assert!(res.is_some());
    });
}

fn bench_outlier_removal(points: usize, exhaustive: bool, b: &mut Bencher) {
    let localizer = if exhaustive {
        RobustLocalizer::new(
            OutlierFilter::default(),
            Arc::new(
                BruteForceNeighbors::new(num_cpus::get()).expect("Thread pool must be created"),
            ),
        )
    } else {
        RobustLocalizer::with_threads(OutlierFilter::default(), num_cpus::get())
            .expect("Thread pool must be created")
    };
    let cloud = cluster_with_outliers(Point3::new(0.0, 0.0, 2.0), points, points / 20);
    b.iter(|| {
        let res = localizer.localize(&cloud);
        assert!(res.is_some());
    });
}
