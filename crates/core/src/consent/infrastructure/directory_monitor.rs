use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::consent::domain::record::{parse_capture_path, ConsentRecord};
use crate::consent::domain::registry::ConsentRegistry;
use crate::recognition::domain::face_embedder::FaceEmbedder;

/// Duplicate create/modify events for one path inside this window are
/// coalesced into a single registry update.
const COALESCE_WINDOW: Duration = Duration::from_millis(200);

const EVENT_POLL: Duration = Duration::from_millis(250);

/// Enumerate the capture directory once and fill the registry.
///
/// Files that don't parse under the capture grammar are ignored with a
/// warning; files that fail to decode or embed are skipped, never fatal.
/// Loading the same directory twice yields the same registry state.
pub fn load_directory(
    dir: &Path,
    embedder: &dyn FaceEmbedder,
    registry: &ConsentRegistry,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut loaded = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        match load_capture(&path, embedder) {
            Ok(Some(record)) => {
                registry.insert(record);
                loaded += 1;
            }
            Ok(None) => {
                log::warn!("ignoring non-capture file: {}", path.display());
            }
            Err(e) => {
                log::warn!("skipping unreadable capture {}: {e}", path.display());
            }
        }
    }
    Ok(loaded)
}

/// Decode and embed one capture file. `Ok(None)` means the name didn't parse.
fn load_capture(
    path: &Path,
    embedder: &dyn FaceEmbedder,
) -> Result<Option<ConsentRecord>, Box<dyn std::error::Error>> {
    let (timestamp, name) = match parse_capture_path(path) {
        Ok(parsed) => parsed,
        Err(_) => return Ok(None),
    };
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or("capture path has no stem")?
        .to_string();

    let image = image::open(path)?.into_rgb8();
    let (w, h) = image.dimensions();
    let embedding = embedder.embed(image.as_raw(), w, h)?;

    Ok(Some(ConsentRecord {
        id,
        name,
        timestamp,
        embedding,
    }))
}

/// Watches the capture directory and keeps the registry in sync.
///
/// Create events load + embed + insert; remove events drop the one record
/// for that file. The pipeline's own capture writes come back through the
/// watcher as creates; re-insertion under the same id is idempotent, so no
/// self-write filtering is needed beyond event coalescing.
pub struct DirectoryMonitor {
    stop: Arc<AtomicBool>,
    // Held so the watch stays registered for the monitor's lifetime.
    _watcher: RecommendedWatcher,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl DirectoryMonitor {
    pub fn start(
        dir: &Path,
        embedder: Arc<dyn FaceEmbedder>,
        registry: Arc<ConsentRegistry>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(dir)?;

        let (tx, rx) = crossbeam_channel::unbounded::<notify::Result<notify::Event>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_worker = stop.clone();
        let handle = std::thread::Builder::new()
            .name("consent-monitor".to_string())
            .spawn(move || {
                run_event_loop(&rx, &*embedder, &registry, &stop_worker);
            })?;

        Ok(Self {
            stop,
            _watcher: watcher,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DirectoryMonitor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_event_loop(
    rx: &crossbeam_channel::Receiver<notify::Result<notify::Event>>,
    embedder: &dyn FaceEmbedder,
    registry: &ConsentRegistry,
    stop: &AtomicBool,
) {
    let mut recent: HashMap<PathBuf, Instant> = HashMap::new();

    while !stop.load(Ordering::Relaxed) {
        let event = match rx.recv_timeout(EVENT_POLL) {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                log::warn!("capture watcher error: {e}");
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        match event.kind {
            notify::EventKind::Create(_) | notify::EventKind::Modify(_) => {
                for path in &event.paths {
                    handle_upsert(path, embedder, registry, &mut recent);
                }
            }
            notify::EventKind::Remove(_) => {
                for path in &event.paths {
                    handle_remove(path, registry, &mut recent);
                }
            }
            _ => {}
        }

        recent.retain(|_, seen| seen.elapsed() < COALESCE_WINDOW);
    }
}

fn handle_upsert(
    path: &Path,
    embedder: &dyn FaceEmbedder,
    registry: &ConsentRegistry,
    recent: &mut HashMap<PathBuf, Instant>,
) {
    if let Some(seen) = recent.get(path) {
        if seen.elapsed() < COALESCE_WINDOW {
            return;
        }
    }
    // A remove racing the event can make the path vanish before we read it;
    // the matching Remove event cleans the registry up.
    if !path.exists() {
        return;
    }
    match load_capture(path, embedder) {
        Ok(Some(record)) => {
            log::info!("consent capture added: {} ({})", record.id, record.name);
            registry.insert(record);
            recent.insert(path.to_path_buf(), Instant::now());
        }
        Ok(None) => {}
        Err(e) => {
            log::warn!("failed to load capture {}: {e}", path.display());
        }
    }
}

fn handle_remove(path: &Path, registry: &ConsentRegistry, recent: &mut HashMap<PathBuf, Instant>) {
    recent.remove(path);
    let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
        return;
    };
    if parse_capture_path(path).is_err() {
        return;
    }
    if registry.remove_file(id) {
        log::info!("consent capture removed: {id}");
    }
}
