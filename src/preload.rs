use crate::registry::service::RegistryClient;
use crate::registry::ObjectRegistry;
use crate::Errors;
use anyhow::Result;
use image::RgbImage;
use log::{error, info};
use nalgebra::Vector3;
use serde::Deserialize;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    name: String,
    path: PathBuf,
    #[serde(default)]
    anchor: Option<Vec<f32>>,
}

/// Object to register at startup
///
#[derive(Clone, Debug, PartialEq)]
pub struct ModelEntry {
    pub name: String,
    /// sample image of the object
    pub path: PathBuf,
    pub anchor: Vector3<f32>,
}

impl ModelEntry {
    fn parse(index: usize, value: Value, base: Option<&Path>) -> Result<Self, Errors> {
        let malformed = |reason: String| Errors::PreloadEntry { index, reason };
        let raw: RawEntry = serde_yaml::from_value(value).map_err(|e| malformed(e.to_string()))?;
        if raw.name.is_empty() {
            return Err(malformed("empty object name".to_string()));
        }
        let anchor = match raw.anchor.as_deref() {
            None => Vector3::zeros(),
            Some([x, y, z]) => Vector3::new(*x, *y, *z),
            Some(other) => {
                return Err(malformed(format!(
                    "anchor must have 3 coordinates, got {}",
                    other.len()
                )))
            }
        };
        let path = match base {
            Some(base) if raw.path.is_relative() => base.join(raw.path),
            _ => raw.path,
        };
        Ok(Self {
            name: raw.name,
            path,
            anchor,
        })
    }

    /// Decodes the sample image
    ///
    pub fn load_sample(&self) -> Result<RgbImage, Errors> {
        image::open(&self.path)
            .map(|img| img.to_rgb8())
            .map_err(|e| Errors::SampleImageUnreadable {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

/// Outcome of applying a preload list
///
#[derive(Clone, Debug, Default)]
pub struct PreloadReport {
    /// registered names, in list order
    pub applied: Vec<String>,
    /// skipped entries, including the ones that failed to parse
    pub failures: Vec<Errors>,
}

/// Parsed preload document.
///
/// The document is a YAML sequence of mappings:
///
/// ```yaml
/// - name: ball
///   path: samples/ball.png
/// - name: cup
///   path: /opt/samples/cup.jpg
///   anchor: [0.0, 0.0, 0.05]
/// ```
///
/// A document that is not a sequence is rejected as a whole. Malformed entries are logged and
/// skipped, the rest is kept in order.
///
#[derive(Clone, Debug, Default)]
pub struct PreloadList {
    entries: Vec<ModelEntry>,
    malformed: Vec<Errors>,
}

impl PreloadList {
    pub fn from_yaml_str(doc: &str) -> Result<Self> {
        Self::parse(doc, None)
    }

    /// Reads the document; relative sample paths are resolved against its directory
    ///
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let doc = fs::read_to_string(path)
            .map_err(|e| Errors::PreloadDocument(format!("{}: {}", path.display(), e)))?;
        Self::parse(&doc, path.parent())
    }

    fn parse(doc: &str, base: Option<&Path>) -> Result<Self> {
        let values: Vec<Value> =
            serde_yaml::from_str(doc).map_err(|e| Errors::PreloadDocument(e.to_string()))?;
        let mut list = Self::default();
        for (index, value) in values.into_iter().enumerate() {
            match ModelEntry::parse(index, value, base) {
                Ok(entry) => list.entries.push(entry),
                Err(e) => {
                    error!("{}", e);
                    list.malformed.push(e);
                }
            }
        }
        Ok(list)
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn malformed(&self) -> &[Errors] {
        &self.malformed
    }

    /// Loads every sample and hands it to `register`, in list order. Failing entries are logged
    /// and skipped.
    ///
    pub fn apply<F>(&self, mut register: F) -> PreloadReport
    where
        F: FnMut(&str, Vector3<f32>, RgbImage) -> Result<()>,
    {
        let mut report = PreloadReport {
            applied: Vec::default(),
            failures: self.malformed.clone(),
        };
        for (index, entry) in self.entries.iter().enumerate() {
            let res = entry.load_sample().map_err(anyhow::Error::from).and_then(|image| {
                info!("Preloading object {} from {}", entry.name, entry.path.display());
                register(&entry.name, entry.anchor, image)
            });
            match res {
                Ok(()) => report.applied.push(entry.name.clone()),
                Err(e) => {
                    error!("Unable to preload object {}: {}", entry.name, e);
                    report.failures.push(e.downcast::<Errors>().unwrap_or_else(|e| {
                        Errors::PreloadEntry {
                            index,
                            reason: e.to_string(),
                        }
                    }));
                }
            }
        }
        report
    }

    pub fn apply_to_registry(&self, registry: &mut ObjectRegistry) -> PreloadReport {
        self.apply(|name, anchor, image| registry.register(name, anchor, &image))
    }

    pub fn apply_to_client(&self, client: &RegistryClient) -> PreloadReport {
        self.apply(|name, anchor, image| client.register(name, anchor, image))
    }
}

#[cfg(test)]
mod tests {
    use crate::preload::PreloadList;
    use crate::registry::service::RegistryService;
    use crate::registry::ObjectRegistry;
    use crate::test_stuff::{sample_image, BLUE, GREEN};
    use crate::Errors;
    use nalgebra::Vector3;
    use std::fs;
    use std::path::{Path, PathBuf};

    fn scratch_dir(test: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hueblob-{}-{}", test, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn parse_entries() {
        let list = PreloadList::from_yaml_str(
            "- name: ball\n  path: /tmp/ball.png\n- name: cup\n  path: cup.png\n  anchor: [0.0, 0.5, 1.0]\n",
        )
        .unwrap();
        assert_eq!(list.entries().len(), 2);
        assert_eq!(list.entries()[0].name, "ball");
        assert_eq!(list.entries()[0].anchor, Vector3::zeros());
        assert_eq!(list.entries()[1].path, Path::new("cup.png"));
        assert_eq!(list.entries()[1].anchor, Vector3::new(0.0, 0.5, 1.0));
        assert!(list.malformed().is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let list = PreloadList::from_yaml_str(
            "- name: ball\n- name: cup\n  path: cup.png\n- name: box\n  path: box.png\n  anchor: [1.0]\n- 42\n",
        )
        .unwrap();
        assert_eq!(list.entries().len(), 1);
        assert_eq!(list.entries()[0].name, "cup");
        let indices = list
            .malformed()
            .iter()
            .map(|e| match e {
                Errors::PreloadEntry { index, .. } => *index,
                other => panic!("unexpected {:?}", other),
            })
            .collect::<Vec<_>>();
        assert_eq!(indices, vec![0, 2, 3]);
    }

    #[test]
    fn bad_document() {
        let err = PreloadList::from_yaml_str("name: ball\npath: ball.png\n").unwrap_err();
        assert!(matches!(
            err.downcast::<Errors>().unwrap(),
            Errors::PreloadDocument(_)
        ));
        assert!(PreloadList::from_yaml_file("/nonexistent/hueblob/models.yaml").is_err());
    }

    #[test]
    fn apply_from_file() {
        let dir = scratch_dir("apply");
        sample_image(GREEN, 10).save(dir.join("ball.png")).unwrap();
        sample_image(BLUE, 10).save(dir.join("cup.png")).unwrap();
        fs::write(
            dir.join("models.yaml"),
            "- name: ball\n  path: ball.png\n- name: ghost\n  path: missing.png\n- name: cup\n  path: cup.png\n  anchor: [0.0, 0.0, 0.1]\n",
        )
        .unwrap();

        let list = PreloadList::from_yaml_file(dir.join("models.yaml")).unwrap();
        let mut registry = ObjectRegistry::default();
        let report = list.apply_to_registry(&mut registry);

        assert_eq!(report.applied, vec!["ball".to_string(), "cup".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0],
            Errors::SampleImageUnreadable { .. }
        ));
        assert_eq!(registry.list(), vec!["ball".to_string(), "cup".to_string()]);
        assert_eq!(
            registry.get("cup").unwrap().anchor,
            Vector3::new(0.0, 0.0, 0.1)
        );
        assert!(registry.get("ball").unwrap().left.model.is_trained());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn apply_through_service() {
        let dir = scratch_dir("service");
        sample_image(GREEN, 10).save(dir.join("ball.png")).unwrap();
        let doc = format!(
            "- name: ball\n  path: {}\n",
            dir.join("ball.png").display()
        );
        let list = PreloadList::from_yaml_str(&doc).unwrap();

        let registry = ObjectRegistry::default().shared();
        let service = RegistryService::spawn(registry.clone());
        let report = list.apply_to_client(&service.client());
        assert_eq!(report.applied, vec!["ball".to_string()]);
        assert!(report.failures.is_empty());
        assert_eq!(registry.read().unwrap().len(), 1);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn repeated_names_add_views() {
        let dir = scratch_dir("views");
        sample_image(GREEN, 10).save(dir.join("a.png")).unwrap();
        sample_image(GREEN, 12).save(dir.join("b.png")).unwrap();
        fs::write(
            dir.join("models.yaml"),
            "- name: obj\n  path: a.png\n- name: obj\n  path: b.png\n  anchor: [0.0, 0.0, 0.2]\n",
        )
        .unwrap();
        let list = PreloadList::from_yaml_file(dir.join("models.yaml")).unwrap();
        let mut registry = ObjectRegistry::default();
        let report = list.apply_to_registry(&mut registry);
        assert_eq!(report.applied.len(), 2);
        assert_eq!(registry.len(), 1);
        let object = registry.get("obj").unwrap();
        assert_eq!(object.views(), 2);
        assert_eq!(object.anchor, Vector3::new(0.0, 0.0, 0.2));

        fs::remove_dir_all(dir).unwrap();
    }
}
