use hueblob::node::HueBlob;
use hueblob::options::HueBlobOptions;
use hueblob::pipeline::ChannelSink;
use hueblob::sync::SyncPolicy;
use hueblob::test_stuff::{sample_image, StereoScene, BLUE, GREEN};
use nalgebra::{Point3, Vector3};
use std::thread;

fn main() {
    env_logger::init();

    let (sink, receivers) = ChannelSink::new();
    sink.set_annotation_observers(1);
    let mut node = HueBlob::new(
        HueBlobOptions::default().sync_policy(SyncPolicy::approximate()),
        sink,
    )
    .unwrap();

    let client = node.client();
    let registration = thread::spawn(move || {
        client
            .register("ball", Vector3::zeros(), sample_image(GREEN, 24))
            .unwrap();
        client
            .register("box", Vector3::new(0.0, 0.0, 0.05), sample_image(BLUE, 24))
            .unwrap();
        client.list().unwrap()
    });
    println!("Registered: {:?}", registration.join().unwrap());

    for frame in 0..20_u64 {
        let t = frame as f32 * 0.05;
        let scene = StereoScene::standard()
            .with_object(GREEN, 40, Point3::new(-0.3 + t * 0.2, 0.05, 2.0))
            .with_object(BLUE, 30, Point3::new(0.4, -0.1 + t * 0.1, 2.5 + t));
        let stamp = 1_000_000_000 + frame * 33_000_000;
        for msg in scene.messages(stamp) {
            if let Some(report) = node.on_message(msg) {
                for blob in &report.blobs {
                    println!(
                        "{} {}: {:?} box={:?} centroid={:?} density={:.3}",
                        report.timestamp,
                        blob.name,
                        blob.outcome,
                        blob.bounding_box_2d.as_array(),
                        blob.centroid.map(|c| [c.x, c.y, c.z]),
                        blob.depth_density
                    );
                }
            }
        }
    }

    let clouds = receivers.clouds.try_iter().count();
    let annotated = receivers.annotated.try_iter().count();
    println!(
        "Clouds published: {}, annotated frames: {}, sync: {:?}",
        clouds,
        annotated,
        node.sync_snapshot()
    );
}
