use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::disk_io::{self, FileStats};
use crate::error::{CallbackError, WatchError};
use crate::listeners::{ListenerId, Listeners, SubscriberId};
use crate::settle::WriteSettle;

/// Writes must stay quiet this long before a change is delivered.
pub const SETTLE_THRESHOLD: Duration = Duration::from_millis(300);

/// Recommended cadence for calling [`WatchRegistry::pump`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A settled external write to a watched file, with content and stats
/// re-read after the writes stopped.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub content: String,
    pub stats: FileStats,
}

/// A watched file disappeared from disk.
#[derive(Clone, Debug)]
pub struct DeleteEvent {
    pub path: PathBuf,
}

pub type ChangeCallback = Box<dyn FnMut(&ChangeEvent) -> Result<(), CallbackError>>;
pub type DeleteCallback = Box<dyn FnMut(&DeleteEvent) -> Result<(), CallbackError>>;

/// One OS watch handle and the subscribers sharing it. The entry
/// exists exactly while its subscriber set is non-empty.
struct WatchedPath {
    watcher: RecommendedWatcher,
    watch_root: PathBuf,
    subscribers: HashSet<SubscriberId>,
}

/// Multi-subscriber file watching with reference counting.
///
/// Each watched path owns exactly one OS watch handle regardless of
/// how many subscribers are interested in it; the handle is released
/// exactly when the last subscriber leaves. Raw OS events arrive on
/// the watch backend's own thread and are marshaled through a channel;
/// all processing and delivery happens inside [`pump`](Self::pump) on
/// the host's event loop, so subscriber-set mutation never interleaves
/// with delivery.
pub struct WatchRegistry {
    watched: HashMap<PathBuf, WatchedPath>,
    settle: WriteSettle,
    change_listeners: Listeners<ChangeEvent>,
    delete_listeners: Listeners<DeleteEvent>,
    raw_tx: Sender<(PathBuf, notify::Result<Event>)>,
    raw_rx: Receiver<(PathBuf, notify::Result<Event>)>,
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settle_threshold(SETTLE_THRESHOLD)
    }

    /// The settle threshold is tunable policy; what is guaranteed is
    /// one notification per settled write burst.
    #[must_use]
    pub fn with_settle_threshold(threshold: Duration) -> Self {
        let (raw_tx, raw_rx) = unbounded();
        Self {
            watched: HashMap::new(),
            settle: WriteSettle::new(threshold),
            change_listeners: Listeners::new(),
            delete_listeners: Listeners::new(),
            raw_tx,
            raw_rx,
        }
    }

    /// Register `subscriber`'s interest in `path`.
    ///
    /// Idempotent: if the path is already watched this only extends
    /// the subscriber set. Otherwise a new OS watch is started; on
    /// failure no entry is retained.
    pub fn subscribe(&mut self, path: &Path, subscriber: SubscriberId) -> Result<(), WatchError> {
        if let Some(entry) = self.watched.get_mut(path) {
            entry.subscribers.insert(subscriber);
            return Ok(());
        }

        let key = path.to_path_buf();
        let watch_root = watch_root(path);
        let tx = self.raw_tx.clone();
        let event_key = key.clone();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send((event_key.clone(), res));
        })
        .map_err(|source| WatchError::Setup {
            path: key.clone(),
            source,
        })?;

        // Watch the parent directory, not the file itself, so editors
        // that save by renaming a temp file over the target keep the
        // watch alive.
        watcher
            .watch(&watch_root, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Setup {
                path: key.clone(),
                source,
            })?;

        tracing::debug!(path = %key.display(), "watch started");
        let mut subscribers = HashSet::new();
        subscribers.insert(subscriber);
        self.watched.insert(
            key,
            WatchedPath {
                watcher,
                watch_root,
                subscribers,
            },
        );
        Ok(())
    }

    /// Drop `subscriber`'s interest in `path`; the OS handle closes
    /// when the last subscriber leaves. No-op for unknown paths or
    /// subscribers.
    pub fn unsubscribe(&mut self, path: &Path, subscriber: SubscriberId) {
        let Some(entry) = self.watched.get_mut(path) else {
            return;
        };
        entry.subscribers.remove(&subscriber);
        if entry.subscribers.is_empty() {
            self.drop_watch(path);
        }
    }

    /// Remove `subscriber` from every watched path and drop all of its
    /// callback registrations. Used on subscriber teardown.
    pub fn unsubscribe_all(&mut self, subscriber: SubscriberId) {
        let mut emptied = Vec::new();
        for (path, entry) in &mut self.watched {
            if entry.subscribers.remove(&subscriber) && entry.subscribers.is_empty() {
                emptied.push(path.clone());
            }
        }
        for path in emptied {
            self.drop_watch(&path);
        }
        self.change_listeners.remove_subscriber(subscriber);
        self.delete_listeners.remove_subscriber(subscriber);
    }

    pub fn on_change(&mut self, subscriber: SubscriberId, callback: ChangeCallback) -> ListenerId {
        self.change_listeners.register(subscriber, callback)
    }

    pub fn on_delete(&mut self, subscriber: SubscriberId, callback: DeleteCallback) -> ListenerId {
        self.delete_listeners.register(subscriber, callback)
    }

    pub fn remove_change_listener(&mut self, id: ListenerId) {
        self.change_listeners.remove(id);
    }

    pub fn remove_delete_listener(&mut self, id: ListenerId) {
        self.delete_listeners.remove(id);
    }

    #[must_use]
    pub fn is_watching_path(&self, path: &Path) -> bool {
        self.watched.contains_key(path)
    }

    #[must_use]
    pub fn is_watching_any(&self) -> bool {
        !self.watched.is_empty()
    }

    /// Drain raw OS events and deliver settled notifications.
    ///
    /// Call this from the host event loop, typically every
    /// [`POLL_INTERVAL`]. Returns the number of notifications
    /// delivered during this turn.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;

        while let Ok((key, res)) = self.raw_rx.try_recv() {
            match res {
                Ok(event) => delivered += self.note_raw_event(&key, &event),
                Err(err) => {
                    let err = WatchError::Runtime(err);
                    tracing::warn!(path = %key.display(), error = %err, "watch continues");
                }
            }
        }

        for path in self.settle.take_settled() {
            if !self.watched.contains_key(&path) {
                continue;
            }
            if path.exists() {
                delivered += usize::from(self.deliver_change(&path));
            } else {
                // Rename-as-modify: the settled path is gone.
                delivered += self.deliver_delete(&path);
            }
        }

        delivered
    }

    fn note_raw_event(&mut self, key: &Path, event: &Event) -> usize {
        if !self.watched.contains_key(key) {
            return 0;
        }
        // The watch root is a directory; only events touching the
        // registered file count. Compare by file name because some
        // backends report canonicalized paths.
        let name = key.file_name();
        if !event.paths.iter().any(|path| path.file_name() == name) {
            return 0;
        }

        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                self.settle.record(key.to_path_buf());
                0
            }
            EventKind::Remove(_) => {
                if key.exists() {
                    // Delete-and-recreate save strategy: a write.
                    self.settle.record(key.to_path_buf());
                    0
                } else {
                    self.settle.forget(key);
                    self.deliver_delete(key)
                }
            }
            _ => 0,
        }
    }

    fn deliver_change(&mut self, path: &Path) -> bool {
        let Some(entry) = self.watched.get(path) else {
            return false;
        };
        match disk_io::read_stable(path) {
            Ok((content, stats)) => {
                let targets = entry.subscribers.clone();
                let event = ChangeEvent {
                    path: path.to_path_buf(),
                    content,
                    stats,
                };
                self.change_listeners.emit(&targets, &event);
                true
            }
            Err(source) => {
                let err = WatchError::ChangeRead {
                    path: path.to_path_buf(),
                    source,
                };
                tracing::warn!(error = %err, "dropping change notification");
                false
            }
        }
    }

    /// Deliver a delete to the path's current subscribers, then tear
    /// the entry down; no explicit unsubscribe is required.
    fn deliver_delete(&mut self, path: &Path) -> usize {
        let Some(entry) = self.watched.remove(path) else {
            return 0;
        };
        self.settle.forget(path);
        let event = DeleteEvent {
            path: path.to_path_buf(),
        };
        self.delete_listeners.emit(&entry.subscribers, &event);
        tracing::debug!(path = %path.display(), "watch torn down after delete");
        1
    }

    fn drop_watch(&mut self, path: &Path) {
        if let Some(mut entry) = self.watched.remove(path) {
            let _ = entry.watcher.unwatch(&entry.watch_root);
        }
        self.settle.forget(path);
    }
}

fn watch_root(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::{Instant, SystemTime};
    use std::{fs, thread};

    use super::*;

    const DEADLINE: Duration = Duration::from_secs(5);

    fn make_temp_dir(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        dir.push(format!("{name}-{nanos}-{}", std::process::id()));
        let _ = fs::create_dir_all(&dir);
        // Some platforms hand out a symlinked temp dir; resolve it so
        // paths compare equal to what the watch backend reports.
        dir.canonicalize().unwrap_or(dir)
    }

    fn fast_registry() -> WatchRegistry {
        WatchRegistry::with_settle_threshold(Duration::from_millis(50))
    }

    fn pump_until(registry: &mut WatchRegistry, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < DEADLINE {
            registry.pump();
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    fn recording_change(log: &Rc<RefCell<Vec<String>>>) -> ChangeCallback {
        let log = Rc::clone(log);
        Box::new(move |event| {
            log.borrow_mut().push(event.content.clone());
            Ok(())
        })
    }

    #[test]
    fn subscribe_is_ref_counted_per_path() {
        let dir = make_temp_dir("livemark-refcount-test");
        let path = dir.join("doc.md");
        fs::write(&path, "hello\n").ok();

        let mut registry = WatchRegistry::new();
        assert!(registry.subscribe(&path, 1).is_ok());
        assert!(registry.subscribe(&path, 2).is_ok());
        // Same subscriber again is a no-op.
        assert!(registry.subscribe(&path, 1).is_ok());

        registry.unsubscribe(&path, 1);
        assert!(registry.is_watching_path(&path));

        registry.unsubscribe(&path, 2);
        assert!(!registry.is_watching_path(&path));
        assert!(!registry.is_watching_any());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unsubscribe_unknown_path_or_subscriber_is_noop() {
        let dir = make_temp_dir("livemark-noop-test");
        let path = dir.join("doc.md");
        fs::write(&path, "hello\n").ok();

        let mut registry = WatchRegistry::new();
        registry.unsubscribe(&path, 1);
        assert!(registry.subscribe(&path, 1).is_ok());
        registry.unsubscribe(&path, 99);
        assert!(registry.is_watching_path(&path));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_setup_retains_no_entry() {
        let path = PathBuf::from("/tmp/livemark-no-such-dir-12345/doc.md");
        let mut registry = WatchRegistry::new();

        let result = registry.subscribe(&path, 1);
        assert!(matches!(result, Err(WatchError::Setup { .. })));
        assert!(!registry.is_watching_path(&path));
        assert!(!registry.is_watching_any());
    }

    #[test]
    fn change_is_delivered_with_fresh_content_and_stats() {
        let dir = make_temp_dir("livemark-change-test");
        let path = dir.join("doc.md");
        fs::write(&path, "old\n").ok();

        let mut registry = fast_registry();
        assert!(registry.subscribe(&path, 1).is_ok());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sizes = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = Rc::clone(&seen);
            let sizes = Rc::clone(&sizes);
            registry.on_change(
                1,
                Box::new(move |event| {
                    seen.borrow_mut().push(event.content.clone());
                    sizes.borrow_mut().push(event.stats.size);
                    Ok(())
                }),
            );
        }

        fs::write(&path, "new content\n").ok();
        assert!(pump_until(&mut registry, || !seen.borrow().is_empty()));
        assert_eq!(seen.borrow().last().map(String::as_str), Some("new content\n"));
        assert_eq!(sizes.borrow().last().copied(), Some(12));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn write_burst_collapses_to_one_notification() {
        let dir = make_temp_dir("livemark-burst-test");
        let path = dir.join("doc.md");
        fs::write(&path, "start\n").ok();

        let mut registry = fast_registry();
        assert!(registry.subscribe(&path, 1).is_ok());

        let seen = Rc::new(RefCell::new(Vec::new()));
        registry.on_change(1, recording_change(&seen));

        for n in 0..5 {
            fs::write(&path, format!("draft {n}\n")).ok();
        }

        assert!(pump_until(&mut registry, || !seen.borrow().is_empty()));

        // A quiet stretch afterwards must not surface further
        // notifications for the same burst.
        let quiet_until = Instant::now() + Duration::from_millis(300);
        while Instant::now() < quiet_until {
            registry.pump();
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0], "draft 4\n");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn events_only_reach_subscribers_of_that_path() {
        let dir = make_temp_dir("livemark-filter-test");
        let path_a = dir.join("a.md");
        let path_b = dir.join("b.md");
        fs::write(&path_a, "a\n").ok();
        fs::write(&path_b, "b\n").ok();

        let mut registry = fast_registry();
        assert!(registry.subscribe(&path_a, 1).is_ok());
        assert!(registry.subscribe(&path_b, 2).is_ok());

        let seen_a = Rc::new(RefCell::new(Vec::new()));
        let seen_b = Rc::new(RefCell::new(Vec::new()));
        registry.on_change(1, recording_change(&seen_a));
        registry.on_change(2, recording_change(&seen_b));

        fs::write(&path_b, "b changed\n").ok();
        assert!(pump_until(&mut registry, || !seen_b.borrow().is_empty()));
        assert!(seen_a.borrow().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn former_subscriber_is_not_notified() {
        let dir = make_temp_dir("livemark-former-test");
        let path = dir.join("doc.md");
        fs::write(&path, "v1\n").ok();

        let mut registry = fast_registry();
        assert!(registry.subscribe(&path, 1).is_ok());
        assert!(registry.subscribe(&path, 2).is_ok());

        let seen_a = Rc::new(RefCell::new(Vec::new()));
        let seen_b = Rc::new(RefCell::new(Vec::new()));
        registry.on_change(1, recording_change(&seen_a));
        registry.on_change(2, recording_change(&seen_b));

        registry.unsubscribe(&path, 2);

        fs::write(&path, "v2\n").ok();
        assert!(pump_until(&mut registry, || !seen_a.borrow().is_empty()));
        assert!(seen_b.borrow().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn delete_notifies_and_tears_down_the_watch() {
        let dir = make_temp_dir("livemark-delete-test");
        let path = dir.join("doc.md");
        fs::write(&path, "here\n").ok();

        let mut registry = fast_registry();
        assert!(registry.subscribe(&path, 1).is_ok());

        let deleted = Rc::new(RefCell::new(Vec::new()));
        {
            let deleted = Rc::clone(&deleted);
            registry.on_delete(
                1,
                Box::new(move |event| {
                    deleted.borrow_mut().push(event.path.clone());
                    Ok(())
                }),
            );
        }

        fs::remove_file(&path).ok();
        assert!(pump_until(&mut registry, || !deleted.borrow().is_empty()));
        assert_eq!(deleted.borrow().first(), Some(&path));
        assert!(!registry.is_watching_path(&path));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unsubscribe_all_silences_the_subscriber() {
        let dir = make_temp_dir("livemark-teardown-test");
        let path_a = dir.join("a.md");
        let path_b = dir.join("b.md");
        fs::write(&path_a, "a\n").ok();
        fs::write(&path_b, "b\n").ok();

        let mut registry = fast_registry();
        assert!(registry.subscribe(&path_a, 1).is_ok());
        assert!(registry.subscribe(&path_b, 1).is_ok());

        let seen = Rc::new(RefCell::new(Vec::new()));
        registry.on_change(1, recording_change(&seen));

        registry.unsubscribe_all(1);
        assert!(!registry.is_watching_any());

        fs::write(&path_a, "a changed\n").ok();
        let quiet_until = Instant::now() + Duration::from_millis(300);
        while Instant::now() < quiet_until {
            registry.pump();
            thread::sleep(Duration::from_millis(20));
        }
        assert!(seen.borrow().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn revoked_callback_is_not_invoked() {
        let dir = make_temp_dir("livemark-revoke-test");
        let path = dir.join("doc.md");
        fs::write(&path, "v1\n").ok();

        let mut registry = fast_registry();
        assert!(registry.subscribe(&path, 1).is_ok());

        let kept = Rc::new(RefCell::new(Vec::new()));
        let revoked = Rc::new(RefCell::new(Vec::new()));
        registry.on_change(1, recording_change(&kept));
        let id = registry.on_change(1, recording_change(&revoked));
        registry.remove_change_listener(id);

        fs::write(&path, "v2\n").ok();
        assert!(pump_until(&mut registry, || !kept.borrow().is_empty()));
        assert!(revoked.borrow().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failing_callback_does_not_block_other_callbacks() {
        let dir = make_temp_dir("livemark-cberr-test");
        let path = dir.join("doc.md");
        fs::write(&path, "v1\n").ok();

        let mut registry = fast_registry();
        assert!(registry.subscribe(&path, 1).is_ok());

        registry.on_change(1, Box::new(|_| Err("callback failed".into())));
        let seen = Rc::new(RefCell::new(Vec::new()));
        registry.on_change(1, recording_change(&seen));

        fs::write(&path, "v2\n").ok();
        assert!(pump_until(&mut registry, || !seen.borrow().is_empty()));

        let _ = fs::remove_dir_all(&dir);
    }
}
