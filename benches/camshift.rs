#![feature(test)]

extern crate test;

use hueblob::model::AppearanceModel;
use hueblob::test_stuff::{sample_image, StereoScene, GREEN};
use hueblob::trackers::camshift::CamshiftTracker;
use hueblob::trackers::ObjectTracker;
use hueblob::utils::bbox::Rect;
use nalgebra::Point3;
use test::Bencher;

#[bench]
fn bench_camshift_acquire_020(b: &mut Bencher) {
    bench_camshift(20, false, b);
}

#[bench]
fn bench_camshift_acquire_080(b: &mut Bencher) {
    bench_camshift(80, false, b);
}

#[bench]
fn bench_camshift_follow_020(b: &mut Bencher) {
    bench_camshift(20, true, b);
}

#[bench]
fn bench_camshift_follow_080(b: &mut Bencher) {
    bench_camshift(80, true, b);
}

fn bench_camshift(side: u32, follow: bool, b: &mut Bencher) {
    let mut model = AppearanceModel::default();
    model.add_view(&sample_image(GREEN, 16));
    let tracker = CamshiftTracker::default();
    let mut z = 2.0;
    let mut window = Rect::default();
    b.iter(|| {
        z += 0.001;
        let scene = StereoScene::standard().with_object(GREEN, side, Point3::new(0.1, 0.0, z));
        let res = tracker.track(&scene.left_image(), &model, window);
        if follow {
            window = res.map(|r| r.window).unwrap_or_default();
        }
    });
}
