/// Replica store: the in-memory vote and state maps plus their durable local replica.
///
/// - `open` reads the durable replica (missing or corrupt blobs start empty)
/// - `load_remote` reconciles against the remote replica via the LWW merge and writes the
///   result through; on failure it keeps the local replica and, as the only fallback,
///   fills in states from the legacy snapshot for ids the local replica has no record of
/// - every mutation stamps `ts` from the injected clock and persists the full map;
///   a failed persist is logged and never rolls the mutation back
///
/// The maps sit behind one mutex that is never held across an `.await`, so a reader
/// always sees a state between two whole mutations.
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::clock::Clock;
use crate::merge::merge_detailed;
use crate::storage::{ReplicaBackend, StorageError, STATE_KEY, VOTES_KEY};
use crate::sync::SyncGateway;
use crate::types::{
    decode_records, encode_records, Entry, RecordMap, RecordValue, StateAction, StateMap,
    Timestamp, Vote, VoteMap,
};

#[derive(Debug, Default)]
struct Replicas {
    votes: VoteMap,
    states: StateMap,
}

/// Both maps, read under a single lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub votes: VoteMap,
    pub states: StateMap,
}

/// What `load_remote` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Remote fetch succeeded and was merged + persisted.
    Merged {
        remote_wins: usize,
        remote_only: usize,
    },
    /// Remote fetch failed; the legacy snapshot supplied this many states (in memory only).
    Fallback { snapshot_states: usize },
    /// Neither source was reachable; local replica only.
    LocalOnly,
}

pub struct ReplicaStore {
    replicas: Mutex<Replicas>,
    backend: Arc<dyn ReplicaBackend>,
    clock: Arc<dyn Clock>,
}

impl ReplicaStore {
    /// Load the durable local replica.
    pub fn open(backend: Arc<dyn ReplicaBackend>, clock: Arc<dyn Clock>) -> Self {
        let votes = read_map::<Vote>(backend.as_ref(), VOTES_KEY);
        let states = read_map::<StateAction>(backend.as_ref(), STATE_KEY);
        log::info!(
            "[vacancy.store] Loaded local replica: {} votes, {} states",
            votes.len(),
            states.len()
        );
        Self {
            replicas: Mutex::new(Replicas { votes, states }),
            backend,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Replicas> {
        self.replicas.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::from_datetime(self.clock.now())
    }

    /// Reconcile with the remote replica. Never fails; see `LoadOutcome`.
    pub async fn load_remote(&self, gateway: &dyn SyncGateway) -> LoadOutcome {
        match gateway.fetch_remote().await {
            Ok(remote) => {
                let mut replicas = self.lock();
                let votes = merge_detailed(&replicas.votes, &remote.votes);
                let states = merge_detailed(&replicas.states, &remote.states);
                replicas.votes = votes.records;
                replicas.states = states.records;
                self.persist(VOTES_KEY, &replicas.votes);
                self.persist(STATE_KEY, &replicas.states);

                let outcome = LoadOutcome::Merged {
                    remote_wins: votes.remote_wins + states.remote_wins,
                    remote_only: votes.remote_only + states.remote_only,
                };
                log::info!("[vacancy.store] Remote replica merged: {:?}", outcome);
                outcome
            }
            Err(e) => {
                log::warn!("[vacancy.store] Remote fetch failed, using local replica: {}", e);
                match gateway.fetch_fallback_states().await {
                    Ok(snapshot) => {
                        let supplied = snapshot.len();
                        let mut replicas = self.lock();
                        let mut added = 0;
                        // Local records always win over the snapshot, whatever their ts.
                        for (id, entry) in snapshot {
                            if !replicas.states.contains_key(&id) {
                                replicas.states.insert(id, entry);
                                added += 1;
                            }
                        }
                        log::info!(
                            "[vacancy.store] Fallback snapshot supplied {} states ({} new)",
                            supplied,
                            added
                        );
                        LoadOutcome::Fallback {
                            snapshot_states: supplied,
                        }
                    }
                    Err(e) => {
                        log::warn!("[vacancy.store] Fallback snapshot unavailable: {}", e);
                        LoadOutcome::LocalOnly
                    }
                }
            }
        }
    }

    pub fn votes(&self) -> VoteMap {
        self.lock().votes.clone()
    }

    pub fn states(&self) -> StateMap {
        self.lock().states.clone()
    }

    pub fn vote(&self, id: &str) -> Option<Entry<Vote>> {
        self.lock().votes.get(id).copied()
    }

    pub fn state(&self, id: &str) -> Option<Entry<StateAction>> {
        self.lock().states.get(id).copied()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let replicas = self.lock();
        StoreSnapshot {
            votes: replicas.votes.clone(),
            states: replicas.states.clone(),
        }
    }

    /// Record a vote (`Some`) or remove it (`None`; an empty vote is no record).
    pub fn set_vote(&self, id: &str, vote: Option<Vote>) {
        if id.is_empty() {
            return;
        }
        let ts = self.now();
        let mut replicas = self.lock();
        match vote {
            Some(value) => {
                replicas.votes.insert(id.to_string(), Entry::Active { value, ts });
            }
            None => {
                replicas.votes.remove(id);
            }
        }
        self.persist(VOTES_KEY, &replicas.votes);
    }

    /// Record a disposition for an item.
    pub fn set_state(&self, id: &str, action: StateAction) {
        self.write_state(id, |ts| Entry::Active { value: action, ts });
    }

    /// Write the `undo` tombstone for an item.
    pub fn retract_state(&self, id: &str) {
        self.write_state(id, |ts| Entry::Retracted { ts });
    }

    fn write_state(&self, id: &str, entry: impl FnOnce(Timestamp) -> Entry<StateAction>) {
        if id.is_empty() {
            return;
        }
        let ts = self.now();
        let mut replicas = self.lock();
        replicas.states.insert(id.to_string(), entry(ts));
        self.persist(STATE_KEY, &replicas.states);
    }

    /// Persist both maps. Used on teardown.
    pub fn flush(&self) -> Result<(), StorageError> {
        let replicas = self.lock();
        write_map(self.backend.as_ref(), VOTES_KEY, &replicas.votes)?;
        write_map(self.backend.as_ref(), STATE_KEY, &replicas.states)?;
        Ok(())
    }

    fn persist<T: RecordValue>(&self, key: &str, records: &RecordMap<T>) {
        if let Err(e) = write_map(self.backend.as_ref(), key, records) {
            log::warn!("[vacancy.store] Failed to persist {}: {}", key, e);
        }
    }
}

fn read_map<T: RecordValue>(
    backend: &dyn ReplicaBackend,
    key: &str,
) -> RecordMap<T> {
    let raw = match backend.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Default::default(),
        Err(e) => {
            log::warn!("[vacancy.store] Failed to read {}: {}", key, e);
            return Default::default();
        }
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => decode_records(&value),
        Err(e) => {
            log::warn!("[vacancy.store] Ignoring corrupt {}: {}", key, e);
            Default::default()
        }
    }
}

fn write_map<T: RecordValue>(
    backend: &dyn ReplicaBackend,
    key: &str,
    records: &RecordMap<T>,
) -> Result<(), StorageError> {
    let encoded = encode_records(records).to_string();
    backend.write(key, &encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::memory::MemoryReplica;
    use crate::testing::FakeGateway;
    use chrono::{DateTime, Utc};

    fn at(raw: &str) -> DateTime<Utc> {
        Timestamp::parse_lenient(raw).as_datetime()
    }

    fn store_with(backend: Arc<MemoryReplica>, now: &str) -> ReplicaStore {
        ReplicaStore::open(backend, Arc::new(ManualClock::new(at(now))))
    }

    #[test]
    fn test_open_reads_durable_replica() {
        let backend = Arc::new(
            MemoryReplica::new()
                .with_blob(VOTES_KEY, r#"{"J1":{"vote":"right","ts":"2025-11-01T00:00:00Z"}}"#)
                .with_blob(STATE_KEY, "this is not json"),
        );
        let store = store_with(backend, "2025-11-02T00:00:00Z");
        assert_eq!(store.vote("J1").and_then(|e| e.value()), Some(Vote::Right));
        assert!(store.states().is_empty());
    }

    #[test]
    fn test_set_vote_stamps_and_persists() {
        let backend = Arc::new(MemoryReplica::new());
        let store = store_with(backend.clone(), "2025-11-02T00:00:00Z");

        store.set_vote("J1", Some(Vote::Wrong));
        let entry = store.vote("J1").unwrap();
        assert_eq!(entry.ts().to_iso(), "2025-11-02T00:00:00.000Z");

        let blob: Value = serde_json::from_str(&backend.blob(VOTES_KEY).unwrap()).unwrap();
        assert_eq!(blob["J1"]["vote"], "wrong");

        store.set_vote("J1", None);
        assert!(store.vote("J1").is_none());
        assert_eq!(backend.blob(VOTES_KEY).as_deref(), Some("{}"));
    }

    #[test]
    fn test_retract_writes_tombstone() {
        let backend = Arc::new(MemoryReplica::new());
        let store = store_with(backend.clone(), "2025-11-02T00:00:00Z");

        store.set_state("J1", StateAction::Applied);
        store.retract_state("J1");
        assert!(matches!(store.state("J1"), Some(Entry::Retracted { .. })));

        let blob: Value = serde_json::from_str(&backend.blob(STATE_KEY).unwrap()).unwrap();
        assert_eq!(blob["J1"]["action"], "undo");
    }

    #[test]
    fn test_empty_id_is_ignored() {
        let backend = Arc::new(MemoryReplica::new());
        let store = store_with(backend.clone(), "2025-11-02T00:00:00Z");
        store.set_vote("", Some(Vote::Right));
        store.set_state("", StateAction::Applied);
        assert!(store.snapshot().votes.is_empty());
        assert!(store.snapshot().states.is_empty());
        assert!(backend.blob(VOTES_KEY).is_none());
    }

    #[test]
    fn test_failed_persist_keeps_mutation() {
        let backend = Arc::new(MemoryReplica::new());
        backend.set_fail_writes(true);
        let store = store_with(backend.clone(), "2025-11-02T00:00:00Z");

        store.set_state("J1", StateAction::NotInterested);
        assert_eq!(
            store.state("J1").and_then(|e| e.value()),
            Some(StateAction::NotInterested)
        );
        assert!(store.flush().is_err());
    }

    #[tokio::test]
    async fn test_load_remote_merges_and_writes_through() {
        let backend = Arc::new(MemoryReplica::new().with_blob(
            VOTES_KEY,
            r#"{"J1":{"vote":"right","ts":"2025-11-01T00:00:00Z"},
                "J2":{"vote":"right","ts":"2025-11-05T00:00:00Z"}}"#,
        ));
        let store = store_with(backend.clone(), "2025-11-06T00:00:00Z");
        let gateway = FakeGateway::with_remote(serde_json::json!({
            "ok": true,
            "votes": {
                "J1": { "vote": "wrong", "ts": "2025-11-02T00:00:00Z" },
                "J2": { "vote": "wrong", "ts": "2025-11-03T00:00:00Z" },
                "J3": { "vote": "wrong", "ts": "2025-11-03T00:00:00Z" }
            },
            "state": { "J1": { "action": "applied", "ts": "2025-11-02T00:00:00Z" } }
        }));

        let outcome = store.load_remote(&gateway).await;
        assert_eq!(
            outcome,
            LoadOutcome::Merged {
                remote_wins: 1,
                remote_only: 2
            }
        );

        let votes = store.votes();
        assert_eq!(votes["J1"].value(), Some(Vote::Wrong));
        assert_eq!(votes["J2"].value(), Some(Vote::Right));
        assert_eq!(votes["J3"].value(), Some(Vote::Wrong));

        let blob: Value = serde_json::from_str(&backend.blob(STATE_KEY).unwrap()).unwrap();
        assert_eq!(blob["J1"]["action"], "applied");
    }

    #[tokio::test]
    async fn test_load_remote_fallback_supplies_states_only() {
        let backend = Arc::new(MemoryReplica::new().with_blob(
            VOTES_KEY,
            r#"{"J1":{"vote":"right","ts":"2025-11-01T00:00:00Z"}}"#,
        ));
        let store = store_with(backend.clone(), "2025-11-06T00:00:00Z");
        let gateway = FakeGateway::failing().with_fallback(serde_json::json!({
            "J2": { "action": "not_interested", "ts": "2025-11-02T00:00:00Z" }
        }));

        let outcome = store.load_remote(&gateway).await;
        assert_eq!(outcome, LoadOutcome::Fallback { snapshot_states: 1 });
        assert_eq!(
            store.state("J2").and_then(|e| e.value()),
            Some(StateAction::NotInterested)
        );
        assert_eq!(store.votes().len(), 1);
        // The durable replica is left untouched on the fallback path.
        assert!(backend.blob(STATE_KEY).is_none());
    }

    #[tokio::test]
    async fn test_fallback_never_overrides_local_state() {
        let backend = Arc::new(MemoryReplica::new());
        let store = store_with(backend.clone(), "2025-11-06T00:00:00Z");
        store.set_state("J1", StateAction::Applied);
        let gateway = FakeGateway::failing().with_fallback(serde_json::json!({
            "J1": { "action": "not_interested", "ts": "2025-11-10T00:00:00Z" },
            "J2": { "action": "exam_done", "ts": "2025-11-10T00:00:00Z" }
        }));

        let outcome = store.load_remote(&gateway).await;
        assert_eq!(outcome, LoadOutcome::Fallback { snapshot_states: 2 });
        assert_eq!(
            store.state("J1").and_then(|e| e.value()),
            Some(StateAction::Applied)
        );
        assert_eq!(
            store.state("J2").and_then(|e| e.value()),
            Some(StateAction::ExamDone)
        );

        let blob: Value = serde_json::from_str(&backend.blob(STATE_KEY).unwrap()).unwrap();
        assert_eq!(blob["J1"]["action"], "applied");
        assert!(blob.get("J2").is_none());
    }

    #[tokio::test]
    async fn test_load_remote_local_only() {
        let backend = Arc::new(MemoryReplica::new());
        let store = store_with(backend, "2025-11-06T00:00:00Z");
        store.set_state("J1", StateAction::Applied);

        let outcome = store.load_remote(&FakeGateway::failing()).await;
        assert_eq!(outcome, LoadOutcome::LocalOnly);
        assert_eq!(store.states().len(), 1);
    }
}
