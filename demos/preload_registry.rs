use hueblob::preload::PreloadList;
use hueblob::registry::ObjectRegistry;
use hueblob::test_stuff::{sample_image, BLUE, GREEN, RED};
use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    env_logger::init();

    let path = match env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let dir = env::temp_dir().join("hueblob-preload-demo");
            fs::create_dir_all(&dir).unwrap();
            sample_image(GREEN, 32).save(dir.join("ball.png")).unwrap();
            sample_image(BLUE, 32).save(dir.join("box.png")).unwrap();
            sample_image(RED, 32).save(dir.join("cup.png")).unwrap();
            fs::write(
                dir.join("models.yaml"),
                "- name: ball\n  path: ball.png\n- name: box\n  path: box.png\n  anchor: [0.0, 0.0, 0.05]\n- name: cup\n  path: cup.png\n- name: missing\n  path: missing.png\n",
            )
            .unwrap();
            dir.join("models.yaml")
        }
    };

    let list = PreloadList::from_yaml_file(&path).unwrap();
    let mut registry = ObjectRegistry::default();
    let report = list.apply_to_registry(&mut registry);
    println!("Applied: {:?}", report.applied);
    for failure in &report.failures {
        println!("Skipped: {}", failure);
    }
    for (name, object) in registry.iter() {
        let model = &object.left.model;
        println!(
            "{}: anchor={:?} views={} hue band=[{}, {}] peak={:?}",
            name,
            object.anchor.as_slice(),
            object.views(),
            model.lower_hue(),
            model.upper_hue(),
            model.peak_color()
        );
    }
}
