use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A debounced change to the store file or one of its companions.
#[derive(Debug, Clone)]
pub struct WatcherEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Watches the directory holding a store file for writes by other processes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    events: mpsc::Receiver<WatcherEvent>,
}

impl FileWatcher {
    /// Start watching `store_path` and its `-wal` / `-shm` files. A burst of
    /// changes is reported once it has been quiet for 100ms.
    pub fn start(store_path: &Path) -> Result<Self, notify::Error> {
        let dir = match store_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let names = store_file_names(store_path);

        let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<Event>>();
        let (events_tx, events) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        // Exits once the watcher, and with it `raw_tx`, is dropped.
        std::thread::spawn(move || {
            let mut pending: HashMap<PathBuf, ChangeKind> = HashMap::new();
            loop {
                match raw_rx.recv_timeout(DEBOUNCE) {
                    Ok(Ok(event)) => {
                        let Some(kind) = classify(&event.kind) else {
                            continue;
                        };
                        let ours = event.paths.into_iter().filter(|path| {
                            path.file_name()
                                .is_some_and(|n| names.iter().any(|s| s.as_os_str() == n))
                        });
                        for path in ours {
                            pending.insert(path, kind);
                        }
                    }
                    Ok(Err(e)) => log::warn!("File watcher error: {e}"),
                    Err(RecvTimeoutError::Timeout) => {
                        for (path, kind) in pending.drain() {
                            if events_tx.send(WatcherEvent { path, kind }).is_err() {
                                return;
                            }
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        });

        Ok(FileWatcher {
            _watcher: watcher,
            events,
        })
    }

    /// Events reported so far, without blocking.
    pub fn drain(&self) -> Vec<WatcherEvent> {
        self.events.try_iter().collect()
    }
}

fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// File names making up a store: the file itself plus SQLite's WAL companions.
pub(crate) fn store_file_names(store_path: &Path) -> Vec<OsString> {
    let Some(name) = store_path.file_name() else {
        return Vec::new();
    };
    let mut names = vec![name.to_os_string()];
    for suffix in ["-wal", "-shm"] {
        let mut companion = name.to_os_string();
        companion.push(suffix);
        names.push(companion);
    }
    names
}
