use crate::options::HueBlobOptions;
use crate::pipeline::{FrameReport, ResultSink, TrackingOrchestrator};
use crate::preload::{PreloadList, PreloadReport};
use crate::registry::service::{RegistryClient, RegistryService};
use crate::registry::{ObjectRegistry, SharedRegistry};
use crate::sync::watchdog::{DesyncWatchdog, SyncSnapshot};
use crate::sync::{SensorMessage, Synchronizer};
use anyhow::Result;
use log::{error, info};

/// Complete tracking node.
///
/// Sensor messages are fed one by one with [on_message](HueBlob::on_message); every message that
/// completes a frame tuple runs the tracking pipeline synchronously. Registry requests are
/// served by a background thread and can be issued from any thread through
/// [client](HueBlob::client). The synchronization watchdog runs on its own thread. Both threads
/// are stopped when the node is dropped.
///
pub struct HueBlob<S: ResultSink> {
    synchronizer: Synchronizer,
    orchestrator: TrackingOrchestrator<S>,
    service: RegistryService,
    _watchdog: DesyncWatchdog,
    preload: Option<PreloadReport>,
}

impl<S: ResultSink> HueBlob<S> {
    /// Builds the node and applies the preload list if the options name one.
    ///
    /// A preload file that cannot be read or parsed is reported and skipped, the node starts with
    /// whatever was registered.
    ///
    pub fn new(options: HueBlobOptions, sink: S) -> Result<Self> {
        options.validate()?;
        let registry = ObjectRegistry::new(options.get_mask_threshold()).shared();
        let service = RegistryService::spawn(registry.clone());

        let preload = options.get_models().and_then(|path| {
            match PreloadList::from_yaml_file(path) {
                Ok(list) => {
                    let report = list.apply_to_client(&service.client());
                    info!(
                        "Preloaded {} objects from {}, {} entries skipped",
                        report.applied.len(),
                        path.display(),
                        report.failures.len()
                    );
                    Some(report)
                }
                Err(e) => {
                    error!("Unable to preload objects: {}", e);
                    None
                }
            }
        });

        let synchronizer = Synchronizer::new(options.get_sync_policy());
        let watchdog = DesyncWatchdog::spawn(
            synchronizer.counters(),
            options.get_watchdog_period(),
            options.get_desync_ratio(),
        );
        let orchestrator = TrackingOrchestrator::new(&options, registry, sink)?;
        info!(
            "Node started, frame {}, synchronization {:?}",
            options.get_frame_id(),
            options.get_sync_policy()
        );

        Ok(Self {
            synchronizer,
            orchestrator,
            service,
            _watchdog: watchdog,
            preload,
        })
    }

    /// Feeds one sensor message; returns the results if it completed a frame
    ///
    pub fn on_message(&mut self, msg: SensorMessage) -> Option<FrameReport> {
        let tuple = self.synchronizer.push(msg)?;
        Some(self.orchestrator.process_tuple(&tuple))
    }

    pub fn client(&self) -> RegistryClient {
        self.service.client()
    }

    pub fn registry(&self) -> SharedRegistry {
        self.orchestrator.registry()
    }

    pub fn sink(&self) -> &S {
        self.orchestrator.sink()
    }

    pub fn sync_snapshot(&self) -> SyncSnapshot {
        self.synchronizer.counters().snapshot()
    }

    /// Outcome of the startup preload, `None` if nothing was preloaded
    ///
    pub fn preload_report(&self) -> Option<&PreloadReport> {
        self.preload.as_ref()
    }
}
