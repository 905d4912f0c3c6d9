// Copyright 2026 The hemicycle authors.
// Licensed under the MIT and Apache-2.0 licenses.

//! The persisted-blob backend: every publisher keeps its view of the
//! session in a JSON blob of its own, and clients poll all of them.
//!
//! This backend's wire format is the whole snapshot, while the rest of the
//! crate speaks field-scoped patches. It translates at the boundary in both
//! directions. A publication is folded into the publisher's own blob with
//! the merge policy (read, join, write back), never written over it, and a
//! changed blob is handed to subscribers decomposed into one write per
//! field, so their merge compares every field's stamp on its own.
//!
//! Blobs live under `<namespace>/<topic>/<publisher>`. A key has a single
//! writer, so the read-join-write of a publication cannot lose a
//! concurrent publisher's fields the way a shared blob would. Two running
//! clients must not share a publisher id.

use crate::transport::lock;
use crate::{
    Error, Handler, Patch, PublisherId, Result, SessionConfig, Snapshot, Subscription, Transport,
};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

/// Somewhere to keep blobs by key. Keys are `/`-separated paths.
pub trait BlobStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn store(&self, key: &str, blob: &str) -> Result<()>;
    /// Keys of the blobs directly under `dir`, sorted.
    fn list(&self, dir: &str) -> Result<Vec<String>>;
}

/// Blobs in shared memory. Clones share the same blobs, which makes it a
/// stand-in for a remote store in tests; it can also be made unavailable.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<BTreeMap<String, String>>>,
    down: Arc<AtomicBool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        MemoryBlobStore::default()
    }

    pub fn set_available(&self, available: bool) {
        self.down.store(!available, Ordering::SeqCst);
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::Store {
                namespace: key.to_string(),
                reason: "store is unreachable".to_string(),
            });
        }
        Ok(())
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        self.check(key)?;
        Ok(lock(&self.blobs).get(key).cloned())
    }

    fn store(&self, key: &str, blob: &str) -> Result<()> {
        self.check(key)?;
        lock(&self.blobs).insert(key.to_string(), blob.to_string());
        Ok(())
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        self.check(dir)?;
        let prefix = format!("{}/", dir);
        Ok(lock(&self.blobs)
            .keys()
            .filter(|k| k.starts_with(&prefix) && !k[prefix.len()..].contains('/'))
            .cloned()
            .collect())
    }
}

/// One JSON file per key, in subdirectories following the key's segments.
#[derive(Clone, Debug)]
pub struct FileBlobStore {
    dir: PathBuf,
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl FileBlobStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(FileBlobStore {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    /// A store in the configured `blob_dir`.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        match &config.blob_dir {
            Some(dir) => FileBlobStore::new(dir),
            None => Err(Error::Store {
                namespace: config.namespace.clone(),
                reason: "no blob_dir configured".to_string(),
            }),
        }
    }

    fn dir_path(&self, dir: &str) -> PathBuf {
        dir.split('/')
            .fold(self.dir.clone(), |path, segment| path.join(sanitize(segment)))
    }

    fn path(&self, key: &str) -> PathBuf {
        let (dir, name) = match key.rfind('/') {
            Some(i) => (self.dir_path(&key[..i]), &key[i + 1..]),
            None => (self.dir.clone(), key),
        };
        dir.join(format!("{}.json", sanitize(name)))
    }
}

impl BlobStore for FileBlobStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // Write aside and rename, so a poller never reads half a blob. The
    // side file is named per process.
    fn store(&self, key: &str, blob: &str) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension(format!("{}.tmp", std::process::id()));
        fs::write(&tmp, blob)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let entries = match fs::read_dir(self.dir_path(dir)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(format!("{}/{}", dir, stem));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[derive(Default)]
struct PollState {
    next_id: u64,
    handlers: BTreeMap<u64, (String, Arc<Handler>)>,
    // Publications not yet folded into the store, oldest first.
    outbox: Vec<(String, Patch)>,
    // Last blob text handed to subscribers, per blob key.
    seen: HashMap<String, String>,
}

/// Transport over a `BlobStore`, scoped to one namespace and publishing
/// as one publisher.
pub struct BlobTransport<S: BlobStore> {
    store: S,
    namespace: String,
    publisher: PublisherId,
    state: Mutex<PollState>,
}

impl<S: BlobStore> BlobTransport<S> {
    pub fn new(store: S, namespace: impl Into<String>, publisher: PublisherId) -> Self {
        BlobTransport {
            store,
            namespace: namespace.into(),
            publisher,
            state: Mutex::new(PollState::default()),
        }
    }

    /// A transport for the configured namespace and publisher.
    pub fn from_config(store: S, config: &SessionConfig) -> Self {
        BlobTransport::new(store, config.namespace.clone(), config.publisher.clone())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn topic_dir(&self, topic: &str) -> String {
        format!("{}/{}", self.namespace, topic)
    }

    fn own_key(&self, topic: &str) -> String {
        format!("{}/{}", self.topic_dir(topic), self.publisher)
    }

    /// Number of publications still waiting to reach the store.
    pub fn pending(&self) -> usize {
        lock(&self.state).outbox.len()
    }

    fn read(&self, key: &str) -> Result<Option<(String, Snapshot)>> {
        match self.store.load(key)? {
            None => Ok(None),
            Some(text) => {
                let snapshot = Snapshot::deserialize(&text)?;
                Ok(Some((text, snapshot)))
            }
        }
    }

    fn fold_into_store(&self, topic: &str, patch: &Patch) -> Result<()> {
        let key = self.own_key(topic);
        let current = match self.read(&key) {
            Ok(found) => found.map(|(_, snapshot)| snapshot).unwrap_or_default(),
            Err(Error::Json(e)) => {
                // A blob nobody can parse is no one's state; start over.
                warn!("discarding unreadable blob {}: {}", key, e);
                Snapshot::new()
            }
            Err(e) => return Err(e),
        };
        let (merged, report) = current.apply(patch);
        if report.changed() {
            self.store.store(&key, &merged.serialize()?)?;
        }
        trace!(
            "folded patch into {}: {} applied, {} stale",
            key,
            report.applied,
            report.stale
        );
        Ok(())
    }

    // Retries everything in the outbox in order, stopping at the first
    // failure so later patches never overtake earlier ones.
    fn flush(&self) {
        let mut state = lock(&self.state);
        while let Some((topic, patch)) = state.outbox.first().cloned() {
            match self.fold_into_store(&topic, &patch) {
                Ok(()) => {
                    state.outbox.remove(0);
                }
                Err(e) => {
                    debug!(
                        "store for {} unavailable, {} publications held: {}",
                        self.namespace,
                        state.outbox.len(),
                        e
                    );
                    return;
                }
            }
        }
    }

    // Every publisher's blob that changed since the last fetch, as one
    // patch.
    fn fetch(&self, topic: &str) -> Option<Patch> {
        let dir = self.topic_dir(topic);
        let keys = match self.store.list(&dir) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("cannot poll {}: {}", dir, e);
                return None;
            }
        };
        let mut writes = Vec::new();
        for key in keys {
            let (text, snapshot) = match self.read(&key) {
                Ok(Some(found)) => found,
                Ok(None) => continue,
                Err(e) => {
                    warn!("cannot poll {}: {}", key, e);
                    continue;
                }
            };
            let mut state = lock(&self.state);
            if state.seen.get(&key) == Some(&text) {
                continue;
            }
            state.seen.insert(key, text);
            writes.extend(snapshot.decompose().writes);
        }
        if writes.is_empty() {
            None
        } else {
            Some(Patch::new(writes))
        }
    }
}

impl<S: BlobStore> Transport for BlobTransport<S> {
    fn publish(&self, topic: &str, patch: &Patch) {
        lock(&self.state)
            .outbox
            .push((topic.to_string(), patch.clone()));
        self.flush();
    }

    fn subscribe(&self, topic: &str, handler: Handler) -> Subscription {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        state
            .handlers
            .insert(id, (topic.to_string(), Arc::new(handler)));
        // A new subscriber must get every current blob on its first poll.
        let prefix = format!("{}/", self.topic_dir(topic));
        state.seen.retain(|key, _| !key.starts_with(&prefix));
        Subscription {
            topic: topic.to_string(),
            id,
        }
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        lock(&self.state).handlers.remove(&subscription.id);
    }

    fn poll(&self) {
        self.flush();
        let topics: Vec<String> = {
            let state = lock(&self.state);
            let mut topics: Vec<String> = state.handlers.values().map(|(t, _)| t.clone()).collect();
            topics.sort();
            topics.dedup();
            topics
        };
        for topic in topics {
            let patch = match self.fetch(&topic) {
                Some(patch) => patch,
                None => continue,
            };
            let handlers: Vec<Arc<Handler>> = lock(&self.state)
                .handlers
                .values()
                .filter(|(t, _)| *t == topic)
                .map(|(_, h)| h.clone())
                .collect();
            debug!(
                "blobs under {} changed, delivering {} writes to {} subscribers",
                self.topic_dir(&topic),
                patch.len(),
                handlers.len()
            );
            for handler in handlers {
                handler(patch.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Lww, MemberId, MemberIdentity, PublisherId, Role, Stamp, Write};
    use std::sync::atomic::AtomicUsize;

    fn presence(member: &str, time: u64, present: bool) -> Patch {
        Patch::new(vec![
            Write::Enroll {
                identity: MemberIdentity::new(member, member, Role::Delegate),
            },
            Write::Presence {
                member: MemberId::new(member),
                register: Lww::new(Stamp::new(time, PublisherId::new("p")), present),
            },
        ])
    }

    fn stored(store: &impl BlobStore, key: &str) -> Snapshot {
        Snapshot::deserialize(&store.load(key).unwrap().unwrap()).unwrap()
    }

    fn transport<S: BlobStore>(store: S, publisher: &str) -> BlobTransport<S> {
        BlobTransport::new(store, "ns", PublisherId::new(publisher))
    }

    #[test]
    fn publish_folds_instead_of_overwriting() {
        let store = MemoryBlobStore::new();
        let transport = transport(store.clone(), "p1");
        transport.publish("session", &presence("m1", 10, true));
        // An older write to the same field, then a write to another field.
        transport.publish("session", &presence("m1", 5, false));
        transport.publish("session", &presence("m2", 1, true));

        let snap = stored(&store, "ns/session/p1");
        assert!(snap.is_present(&MemberId::new("m1")));
        assert!(snap.is_present(&MemberId::new("m2")));
    }

    #[test]
    fn publishers_write_only_their_own_blob() {
        let store = MemoryBlobStore::new();
        let a = transport(store.clone(), "a");
        let b = transport(store.clone(), "b");
        a.publish("session", &presence("m1", 1, true));
        b.publish("session", &presence("m2", 1, true));
        assert_eq!(
            store.list("ns/session").unwrap(),
            vec!["ns/session/a".to_string(), "ns/session/b".to_string()]
        );
        assert!(!stored(&store, "ns/session/a").is_present(&MemberId::new("m2")));

        // A reader sees the union.
        let reader = transport(store, "r");
        let merged = Arc::new(Mutex::new(Snapshot::new()));
        let m = merged.clone();
        reader.subscribe(
            "session",
            Box::new(move |patch| {
                let mut snap = lock(&m);
                let next = snap.apply(&patch).0;
                *snap = next;
            }),
        );
        reader.poll();
        let snap = lock(&merged).clone();
        assert!(snap.is_present(&MemberId::new("m1")));
        assert!(snap.is_present(&MemberId::new("m2")));
    }

    #[test]
    fn held_publications_reach_the_store_later() {
        let store = MemoryBlobStore::new();
        let transport = transport(store.clone(), "p1");
        store.set_available(false);
        transport.publish("session", &presence("m1", 1, true));
        assert_eq!(transport.pending(), 1);
        store.set_available(true);
        transport.poll();
        assert_eq!(transport.pending(), 0);
        assert!(stored(&store, "ns/session/p1").is_present(&MemberId::new("m1")));
    }

    #[test]
    fn poll_delivers_only_changes() {
        let store = MemoryBlobStore::new();
        let writer = transport(store.clone(), "w");
        let reader = transport(store, "r");
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        reader.subscribe(
            "session",
            Box::new(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            }),
        );
        reader.poll();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        writer.publish("session", &presence("m1", 1, true));
        reader.poll();
        reader.poll();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path()).unwrap();
        assert_eq!(store.load("ns/session/p1").unwrap(), None);
        assert!(store.list("ns/session").unwrap().is_empty());
        store.store("ns/session/p1", "{}").unwrap();
        store.store("ns/session/p2", "[]").unwrap();
        store.store("ns/other/p1", "{}").unwrap();
        assert_eq!(store.load("ns/session/p1").unwrap().as_deref(), Some("{}"));
        assert_eq!(
            store.list("ns/session").unwrap(),
            vec!["ns/session/p1".to_string(), "ns/session/p2".to_string()]
        );
    }

    #[test]
    fn file_store_needs_a_directory() {
        let cfg = SessionConfig {
            namespace: "bop20-council".to_string(),
            ..SessionConfig::default()
        };
        match FileBlobStore::from_config(&cfg) {
            Err(Error::Store { namespace, .. }) => assert_eq!(namespace, "bop20-council"),
            other => panic!("expected a store error, got {:?}", other.map(|_| ())),
        }

        let dir = tempfile::tempdir().unwrap();
        let cfg = SessionConfig {
            blob_dir: Some(dir.path().join("blobs")),
            publisher: PublisherId::new("chair-laptop"),
            ..cfg
        };
        let transport = BlobTransport::from_config(FileBlobStore::from_config(&cfg).unwrap(), &cfg);
        assert_eq!(transport.namespace(), "bop20-council");
        transport.publish("session", &presence("m1", 1, true));
        assert!(dir
            .path()
            .join("blobs/bop20-council/session/chair-laptop.json")
            .is_file());
    }
}
