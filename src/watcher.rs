//! Filesystem watcher adapter (§4.9): wraps `notify` in recursive mode
//! rooted at the shared folder, normalizes its events into `crate::event::Event`,
//! and exposes a debounce "ready to sync" indicator.
//!
//! The source polls its debounce flag with a 1-second busy-loop thread per
//! quiet period; §9/§11 replace that with a single timer armed once per burst
//! of activity and re-armed on each new event, so there is at most one sleeping
//! thread per quiet period rather than one running continuously.

use crate::error::{Result, SyncError};
use crate::event::{Event, EventKind};
use crossbeam_channel::{unbounded, Receiver, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, EventKind as NotifyEventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcherTrait};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const DEBOUNCE: Duration = Duration::from_secs(2);

/// Watches a shared folder and surfaces normalized events plus a debounce
/// signal. Dropping this stops the underlying `notify` watcher; `shutdown`
/// additionally tears down the debounce timer thread.
pub struct Watcher {
    receiver: Receiver<Event>,
    ready: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    _inner: RecommendedWatcher,
}

impl Watcher {
    pub fn spawn(root: &Path) -> Result<Self> {
        let root = root.to_path_buf();
        let (tx, rx) = unbounded();
        let ready = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let debounce = Arc::new(Debounce::new(Arc::clone(&ready), Arc::clone(&shutdown)));

        let tx_for_handler = tx.clone();
        let root_for_handler = root.clone();
        let mut inner: RecommendedWatcher = notify::Watcher::new(
            move |result: notify::Result<notify::Event>| {
                let event = match result {
                    Ok(event) => event,
                    Err(_) => return,
                };
                debounce.hit();
                for normalized in normalize(&root_for_handler, &event) {
                    let _ = tx_for_handler.send(normalized);
                }
            },
            Config::default(),
        )
        .map_err(|e| SyncError::Protocol(format!("failed to start filesystem watcher: {e}")))?;

        inner
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| SyncError::Protocol(format!("failed to watch {}: {e}", root.display())))?;

        Ok(Self {
            receiver: rx,
            ready,
            shutdown,
            _inner: inner,
        })
    }

    /// True once ≥2 seconds have passed since the last filesystem event with
    /// none arriving since; false immediately on the next event.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Drains exactly the events queued as of this call, per §4.6: anything
    /// the watcher pushes while the caller is coalescing this batch is left
    /// for the next tick rather than folded into the current one.
    pub fn drain_snapshot(&self) -> Vec<Event> {
        let pending = self.receiver.len();
        (0..pending).filter_map(|_| self.receiver.try_recv().ok()).collect()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Re-armed on every event; announces "ready" once a full `DEBOUNCE` quiet
/// period has elapsed. `timer_running` is the only mutex-guarded state here —
/// it exists purely so concurrent bursts don't spawn overlapping timers; the
/// `ready` flag itself stays a bare atomic per §9.
struct Debounce {
    ready: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    last_activity: Mutex<Instant>,
    timer_running: Mutex<bool>,
}

impl Debounce {
    fn new(ready: Arc<AtomicBool>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            ready,
            shutdown,
            last_activity: Mutex::new(Instant::now()),
            timer_running: Mutex::new(false),
        }
    }

    fn hit(self: &Arc<Self>) {
        *self.last_activity.lock().unwrap() = Instant::now();
        self.ready.store(false, Ordering::SeqCst);

        let mut running = self.timer_running.lock().unwrap();
        if *running {
            return;
        }
        *running = true;
        drop(running);

        let this = Arc::clone(self);
        thread::spawn(move || this.run_timer());
    }

    fn run_timer(&self) {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                *self.timer_running.lock().unwrap() = false;
                return;
            }
            let elapsed = self.last_activity.lock().unwrap().elapsed();
            if elapsed >= DEBOUNCE {
                self.ready.store(true, Ordering::SeqCst);
                *self.timer_running.lock().unwrap() = false;
                return;
            }
            // Sleep exactly until the deadline implied by the last event;
            // if a new event pushed the deadline out while we slept, the
            // next pass through the loop picks up the later `elapsed` and
            // sleeps again for the new remainder, rather than polling.
            thread::sleep(DEBOUNCE - elapsed);
        }
    }
}

fn normalize(root: &Path, event: &notify::Event) -> Vec<Event> {
    match event.kind {
        NotifyEventKind::Create(_) => event
            .paths
            .iter()
            .filter_map(|p| to_relative_event(root, p, EventKind::Created))
            .collect(),
        NotifyEventKind::Remove(_) => event
            .paths
            .iter()
            .filter_map(|p| to_relative_event(root, p, EventKind::Deleted))
            .collect(),
        NotifyEventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let is_dir = event.paths[1].is_dir();
            match (relative(root, &event.paths[0]), relative(root, &event.paths[1])) {
                (Some(src), Some(dest)) => vec![Event::new(src, Some(dest), is_dir, EventKind::Moved)],
                _ => Vec::new(),
            }
        }
        NotifyEventKind::Modify(_) => event
            .paths
            .iter()
            .filter(|p| !p.is_dir())
            .filter_map(|p| to_relative_event(root, p, EventKind::Modified))
            .collect(),
        _ => Vec::new(),
    }
}

fn to_relative_event(root: &Path, path: &Path, kind: EventKind) -> Option<Event> {
    let is_dir = path.is_dir();
    relative(root, path).map(|rel| Event::new(rel, None, is_dir, kind))
}

fn relative(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|p| p.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"))
        .filter(|s| !s.is_empty())
}
