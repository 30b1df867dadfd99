/// Last-write-wins merge of a local and a remote replica.
///
/// Given two record maps of the same kind:
/// - only in local -> keep local
/// - only in remote -> take remote
/// - in both -> the later `ts` wins; equal timestamps keep local
///
/// Tombstones (`Entry::Retracted`) compete like any other record, so an explicit undo
/// written after the remote's action survives the merge.
/// Votes and states are merged independently; nothing here looks across kinds.

use crate::types::{RecordMap, Timestamp};

/// Which side wins a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
}

/// Compare write times. Ties go to local, the side performing the merge.
pub fn resolve_conflict(local: Timestamp, remote: Timestamp) -> Winner {
    if local >= remote {
        Winner::Local
    } else {
        Winner::Remote
    }
}

/// Result of merging two replicas.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult<T> {
    pub records: RecordMap<T>,
    /// Ids present on both sides where the remote record won.
    pub remote_wins: usize,
    /// Ids only the remote knew about.
    pub remote_only: usize,
}

/// Merge and report how much the remote side contributed.
pub fn merge_detailed<T: Copy>(local: &RecordMap<T>, remote: &RecordMap<T>) -> MergeResult<T> {
    let mut records = local.clone();
    let mut remote_wins = 0;
    let mut remote_only = 0;

    for (id, theirs) in remote {
        match local.get(id) {
            None => {
                records.insert(id.clone(), *theirs);
                remote_only += 1;
            }
            Some(ours) => {
                if resolve_conflict(ours.ts(), theirs.ts()) == Winner::Remote {
                    records.insert(id.clone(), *theirs);
                    remote_wins += 1;
                }
            }
        }
    }

    MergeResult {
        records,
        remote_wins,
        remote_only,
    }
}

/// Pure LWW merge over the union of both key sets.
pub fn merge<T: Copy>(local: &RecordMap<T>, remote: &RecordMap<T>) -> RecordMap<T> {
    merge_detailed(local, remote).records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entry, StateAction, Vote};

    fn ts(raw: &str) -> Timestamp {
        Timestamp::parse_lenient(raw)
    }

    fn vote(v: Vote, at: &str) -> Entry<Vote> {
        Entry::Active { value: v, ts: ts(at) }
    }

    fn map<T: Copy>(entries: &[(&str, Entry<T>)]) -> RecordMap<T> {
        entries.iter().map(|(id, e)| (id.to_string(), *e)).collect()
    }

    #[test]
    fn test_tie_goes_to_local() {
        let t = "2025-11-01T10:00:00Z";
        let local = map(&[("J1", vote(Vote::Right, t))]);
        let remote = map(&[("J1", vote(Vote::Wrong, t))]);

        let merged = merge(&local, &remote);
        assert_eq!(merged["J1"], vote(Vote::Right, t));
    }

    #[test]
    fn test_later_timestamp_wins() {
        let local = map(&[("J1", vote(Vote::Right, "2025-11-01T10:00:00Z"))]);
        let remote = map(&[("J1", vote(Vote::Wrong, "2025-11-01T10:00:01Z"))]);

        let result = merge_detailed(&local, &remote);
        assert_eq!(result.records["J1"].value(), Some(Vote::Wrong));
        assert_eq!(result.remote_wins, 1);
    }

    #[test]
    fn test_newer_local_beats_older_remote() {
        let local = map(&[("J1", vote(Vote::Right, "2025-11-02T00:00:00Z"))]);
        let remote = map(&[("J1", vote(Vote::Wrong, "2025-11-01T00:00:00Z"))]);
        assert_eq!(merge(&local, &remote)["J1"].value(), Some(Vote::Right));
    }

    #[test]
    fn test_union_of_keys() {
        let local = map(&[("A", vote(Vote::Right, "2025-11-01T00:00:00Z"))]);
        let remote = map(&[("B", vote(Vote::Wrong, "2025-11-01T00:00:00Z"))]);

        let result = merge_detailed(&local, &remote);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.remote_only, 1);
        assert!(result.records.contains_key("A"));
        assert!(result.records.contains_key("B"));
    }

    #[test]
    fn test_merge_is_idempotent_once_reconciled() {
        let local = map(&[
            ("A", vote(Vote::Right, "2025-11-01T00:00:00Z")),
            ("B", vote(Vote::Right, "2025-11-03T00:00:00Z")),
        ]);
        let remote = map(&[
            ("B", vote(Vote::Wrong, "2025-11-02T00:00:00Z")),
            ("C", vote(Vote::Wrong, "2025-11-02T00:00:00Z")),
        ]);

        let once = merge(&local, &remote);
        let twice = merge(&once, &remote);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_malformed_timestamp_loses_to_real_one() {
        let local = map(&[("J1", vote(Vote::Right, "garbage"))]);
        let remote = map(&[("J1", vote(Vote::Wrong, "1970-01-01T00:00:00.001Z"))]);
        assert_eq!(merge(&local, &remote)["J1"].value(), Some(Vote::Wrong));
    }

    #[test]
    fn test_two_malformed_timestamps_tie_to_local() {
        let local = map(&[("J1", vote(Vote::Right, "garbage"))]);
        let remote = map(&[("J1", vote(Vote::Wrong, ""))]);
        assert_eq!(merge(&local, &remote)["J1"].value(), Some(Vote::Right));
    }

    #[test]
    fn test_newer_tombstone_beats_remote_action() {
        let local: RecordMap<StateAction> = map(&[(
            "J1",
            Entry::Retracted { ts: ts("2025-11-02T00:00:00Z") },
        )]);
        let remote = map(&[(
            "J1",
            Entry::Active {
                value: StateAction::Applied,
                ts: ts("2025-11-01T00:00:00Z"),
            },
        )]);

        let merged = merge(&local, &remote);
        assert!(matches!(merged["J1"], Entry::Retracted { .. }));
    }

    #[test]
    fn test_empty_replicas() {
        let empty: RecordMap<Vote> = RecordMap::new();
        assert!(merge(&empty, &empty).is_empty());
    }
}
