use crate::registry::SharedRegistry;
use crate::Errors;
use anyhow::Result;
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use image::RgbImage;
use log::warn;
use nalgebra::Vector3;
use std::thread::{spawn, JoinHandle};

enum RegistryCommand {
    Register {
        name: String,
        anchor: Vector3<f32>,
        image: RgbImage,
        reply: Sender<Result<()>>,
    },
    List {
        reply: Sender<Vec<String>>,
    },
    Remove {
        name: String,
        reply: Sender<bool>,
    },
    Exit,
}

fn service_thread(registry: SharedRegistry, rx: Receiver<RegistryCommand>) {
    while let Ok(command) = rx.recv() {
        let delivered = match command {
            RegistryCommand::Register {
                name,
                anchor,
                image,
                reply,
            } => {
                let res = registry
                    .write()
                    .expect("Access to registry must always succeed")
                    .register(&name, anchor, &image);
                reply.send(res).is_ok()
            }
            RegistryCommand::List { reply } => {
                let names = registry
                    .read()
                    .expect("Access to registry must always succeed")
                    .list();
                reply.send(names).is_ok()
            }
            RegistryCommand::Remove { name, reply } => {
                let removed = registry
                    .write()
                    .expect("Access to registry must always succeed")
                    .remove(&name);
                reply.send(removed).is_ok()
            }
            RegistryCommand::Exit => break,
        };
        if !delivered {
            warn!("Unable to reply to a registry request, likely the caller is gone.");
        }
    }
}

/// Thread serving `register`, `list` and `remove` requests against a shared registry.
///
/// Each request takes the registry write lock for its whole duration, so a frame processed
/// concurrently observes the registry either before or after the request. The thread is stopped
/// and joined on drop.
///
pub struct RegistryService {
    tx: Sender<RegistryCommand>,
    thread: Option<JoinHandle<()>>,
}

impl RegistryService {
    pub fn spawn(registry: SharedRegistry) -> Self {
        let (tx, rx) = unbounded();
        let thread = spawn(move || service_thread(registry, rx));
        Self {
            tx,
            thread: Some(thread),
        }
    }

    pub fn client(&self) -> RegistryClient {
        RegistryClient {
            tx: self.tx.clone(),
        }
    }
}

impl Drop for RegistryService {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.tx.send(RegistryCommand::Exit);
            thread
                .join()
                .expect("Registry thread is expected to shutdown successfully.");
        }
    }
}

/// Cloneable request side of the [RegistryService](RegistryService)
///
#[derive(Clone)]
pub struct RegistryClient {
    tx: Sender<RegistryCommand>,
}

impl RegistryClient {
    fn call<T>(&self, command: impl FnOnce(Sender<T>) -> RegistryCommand) -> Result<T> {
        let (reply, response) = bounded(1);
        self.tx
            .send(command(reply))
            .map_err(|_| Errors::RegistryServiceStopped)?;
        Ok(response
            .recv()
            .map_err(|_| Errors::RegistryServiceStopped)?)
    }

    pub fn register(&self, name: &str, anchor: Vector3<f32>, image: RgbImage) -> Result<()> {
        self.call(|reply| RegistryCommand::Register {
            name: name.to_string(),
            anchor,
            image,
            reply,
        })?
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.call(|reply| RegistryCommand::List { reply })
    }

    /// Removing an unknown object is not an error; the result tells whether it existed
    ///
    pub fn remove(&self, name: &str) -> Result<bool> {
        self.call(|reply| RegistryCommand::Remove {
            name: name.to_string(),
            reply,
        })
    }
}
