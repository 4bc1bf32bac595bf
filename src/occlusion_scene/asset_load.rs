use crate::occlusion_scene::config::AssetDescriptor;
use crate::occlusion_scene::splat::{decode_splats, splat_bounds, splat_point_mesh};
use bevy::prelude::{Mesh, Vec3};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("asset descriptor has no uri")]
    MissingUri,
    #[error("unsupported uri scheme: {uri}")]
    UnsupportedScheme { uri: String },
    #[error("failed to fetch {uri}: {reason}")]
    Fetch { uri: String, reason: String },
    #[error("unsupported asset format: {uri}")]
    UnsupportedFormat { uri: String },
    #[error("failed to decode {uri}: {reason}")]
    Decode { uri: String, reason: String },
    #[error("load worker for {uri} stopped without reporting")]
    WorkerLost { uri: String },
}

/// Renderable content produced by a successful load.
#[derive(Debug)]
pub struct DecodedAsset {
    pub mesh: Mesh,
    pub splat_count: usize,
    pub bounds: (Vec3, Vec3),
}

pub type LoadOutcome = Result<Arc<DecodedAsset>, LoadError>;

/// Where asset bytes come from. Called on a worker thread.
pub trait AssetSource: Send + Sync + 'static {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, LoadError>;
}

pub struct FileAssetSource {
    root: PathBuf,
}

impl FileAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, uri: &str) -> Result<PathBuf, LoadError> {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        if path.contains("://") {
            return Err(LoadError::UnsupportedScheme {
                uri: uri.to_string(),
            });
        }
        let path = Path::new(path);
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.root.join(path))
        }
    }
}

impl AssetSource for FileAssetSource {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, LoadError> {
        let path = self.resolve(uri)?;
        fs::read(&path).map_err(|err| LoadError::Fetch {
            uri: uri.to_string(),
            reason: format!("{}: {err}", path.display()),
        })
    }
}

pub fn decode_asset(uri: &str, bytes: &[u8]) -> Result<DecodedAsset, LoadError> {
    let extension = Path::new(uri)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("splat") => {
            let splats = decode_splats(bytes).map_err(|err| LoadError::Decode {
                uri: uri.to_string(),
                reason: err.to_string(),
            })?;
            let bounds = splat_bounds(&splats).unwrap_or((Vec3::ZERO, Vec3::ZERO));
            Ok(DecodedAsset {
                mesh: splat_point_mesh(&splats),
                splat_count: splats.len(),
                bounds,
            })
        }
        _ => Err(LoadError::UnsupportedFormat {
            uri: uri.to_string(),
        }),
    }
}

#[derive(Debug)]
pub enum LoadStatus {
    /// A load was started (or, for a malformed descriptor, resolved
    /// immediately); its outcome arrives through [`AssetLoadPipeline::poll`].
    Started,
    /// A load for this uri is already running; no second fetch happens.
    InFlight,
    /// The load already finished; this is the cached outcome.
    Ready(LoadOutcome),
}

#[derive(Debug)]
pub struct CompletedLoad {
    pub descriptor: AssetDescriptor,
    pub outcome: LoadOutcome,
}

enum LoadSlot {
    InFlight {
        descriptor: AssetDescriptor,
        worker: Option<JoinHandle<()>>,
    },
    Done(LoadOutcome),
}

/// Single-shot asset loads keyed by uri. Fetch and decode run on a worker
/// thread; completions are drained on the main schedule by `poll`, which
/// yields each outcome exactly once and caches it for later requests.
pub struct AssetLoadPipeline {
    source: Arc<dyn AssetSource>,
    tx: Sender<(String, LoadOutcome)>,
    rx: Receiver<(String, LoadOutcome)>,
    slots: HashMap<String, LoadSlot>,
}

impl AssetLoadPipeline {
    pub fn new(source: impl AssetSource) -> Self {
        let (tx, rx) = channel();
        Self {
            source: Arc::new(source),
            tx,
            rx,
            slots: HashMap::new(),
        }
    }

    pub fn request(&mut self, descriptor: &AssetDescriptor) -> LoadStatus {
        match self.slots.get(&descriptor.uri) {
            Some(LoadSlot::InFlight { .. }) => return LoadStatus::InFlight,
            Some(LoadSlot::Done(outcome)) => return LoadStatus::Ready(outcome.clone()),
            None => {}
        }

        let uri = descriptor.uri.clone();
        if descriptor.is_malformed() {
            let _ = self.tx.send((uri.clone(), Err(LoadError::MissingUri)));
            self.slots.insert(
                uri,
                LoadSlot::InFlight {
                    descriptor: descriptor.clone(),
                    worker: None,
                },
            );
            return LoadStatus::Started;
        }

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let worker_uri = uri.clone();
        let worker = std::thread::spawn(move || {
            let outcome = source
                .fetch(&worker_uri)
                .and_then(|bytes| decode_asset(&worker_uri, &bytes))
                .map(Arc::new);
            let _ = tx.send((worker_uri, outcome));
        });

        self.slots.insert(
            uri,
            LoadSlot::InFlight {
                descriptor: descriptor.clone(),
                worker: Some(worker),
            },
        );
        LoadStatus::Started
    }

    pub fn poll(&mut self) -> Vec<CompletedLoad> {
        // Workers send before they exit, so anything finished before the drain
        // below has its message in the channel already.
        let finished: Vec<String> = self
            .slots
            .iter()
            .filter_map(|(uri, slot)| match slot {
                LoadSlot::InFlight {
                    worker: Some(worker),
                    ..
                } if worker.is_finished() => Some(uri.clone()),
                _ => None,
            })
            .collect();

        let mut completed = Vec::new();
        while let Ok((uri, outcome)) = self.rx.try_recv() {
            if let Some(done) = self.complete(&uri, outcome) {
                completed.push(done);
            }
        }

        for uri in finished {
            let lost = Err(LoadError::WorkerLost { uri: uri.clone() });
            if let Some(done) = self.complete(&uri, lost) {
                completed.push(done);
            }
        }

        completed
    }

    pub fn outcome(&self, uri: &str) -> Option<&LoadOutcome> {
        match self.slots.get(uri) {
            Some(LoadSlot::Done(outcome)) => Some(outcome),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.slots
            .values()
            .any(|slot| matches!(slot, LoadSlot::InFlight { .. }))
    }

    fn complete(&mut self, uri: &str, outcome: LoadOutcome) -> Option<CompletedLoad> {
        let slot = self.slots.get_mut(uri)?;
        let LoadSlot::InFlight { descriptor, .. } = slot else {
            return None;
        };
        let descriptor = descriptor.clone();
        *slot = LoadSlot::Done(outcome.clone());
        Some(CompletedLoad {
            descriptor,
            outcome,
        })
    }
}
