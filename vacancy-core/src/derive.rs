/// Bucket derivation: which listings are open, applied, or set aside.
///
/// Seed sets from the item feed are overridden by the merged state records:
///   applied        -> applied
///   not_interested -> other
///   undo           -> neither
///   exam_done      -> applied while `now - ts <= 7 days`, then neither
/// Applied wins if an id ever ends up in both sets. Items keep their input order.
use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::types::{Entry, Item, SeedSections, StateAction, StateMap};

/// How long an exam_done marking keeps its item in the applied bucket (inclusive).
pub const EXAM_DONE_TTL_DAYS: i64 = 7;

/// Three disjoint display buckets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Buckets {
    pub open: Vec<Item>,
    pub applied: Vec<Item>,
    pub other: Vec<Item>,
}

/// Final applied / other membership after the override pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub applied: HashSet<String>,
    pub other: HashSet<String>,
}

impl Classification {
    pub fn bucket_of(&self, id: &str) -> Bucket {
        if self.applied.contains(id) {
            Bucket::Applied
        } else if self.other.contains(id) {
            Bucket::Other
        } else {
            Bucket::Open
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Open,
    Applied,
    Other,
}

/// True while an exam_done marking written at `ts` still counts as applied.
pub fn exam_done_active(ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - ts <= Duration::days(EXAM_DONE_TTL_DAYS)
}

/// Apply the state overrides to the seed classification.
pub fn classify(seed: &SeedSections, states: &StateMap, now: DateTime<Utc>) -> Classification {
    let mut applied: HashSet<String> = seed.applied.iter().cloned().collect();
    let mut other: HashSet<String> = seed.other.iter().cloned().collect();

    for (id, entry) in states {
        match entry {
            Entry::Active {
                value: StateAction::Applied,
                ..
            } => {
                applied.insert(id.clone());
                other.remove(id);
            }
            Entry::Active {
                value: StateAction::NotInterested,
                ..
            } => {
                other.insert(id.clone());
                applied.remove(id);
            }
            Entry::Active {
                value: StateAction::ExamDone,
                ts,
            } => {
                if exam_done_active(ts.as_datetime(), now) {
                    applied.insert(id.clone());
                    other.remove(id);
                } else {
                    applied.remove(id);
                    other.remove(id);
                }
            }
            Entry::Retracted { .. } => {
                applied.remove(id);
                other.remove(id);
            }
        }
    }

    Classification { applied, other }
}

/// Split `items` into buckets, preserving input order within each.
pub fn derive_buckets(
    items: &[Item],
    seed: &SeedSections,
    states: &StateMap,
    now: DateTime<Utc>,
) -> Buckets {
    let classification = classify(seed, states, now);
    let mut buckets = Buckets::default();
    for item in items {
        let target = match classification.bucket_of(item.id()) {
            Bucket::Applied => &mut buckets.applied,
            Bucket::Other => &mut buckets.other,
            Bucket::Open => &mut buckets.open,
        };
        target.push(item.clone());
    }
    buckets
}

/// Parse a `DD-MM-YYYY` or `DD/MM/YYYY` deadline. `N/A` and anything else is `None`.
pub fn parse_deadline(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("N/A") {
        return None;
    }
    let normalized = raw.replace('-', "/");
    let parts: Vec<&str> = normalized.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let day: u32 = parts[0].trim().parse().ok()?;
    let month: u32 = parts[1].trim().parse().ok()?;
    let year: i32 = parts[2].trim().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Ascending deadline; undated listings go last, ordered by title.
pub fn sort_by_deadline(items: &mut [Item]) {
    items.sort_by(|a, b| {
        let da = a.deadline.as_deref().and_then(parse_deadline);
        let db = b.deadline.as_deref().and_then(parse_deadline);
        match (da, db) {
            (None, None) => a
                .title
                .as_deref()
                .unwrap_or("")
                .cmp(b.title.as_deref().unwrap_or("")),
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => x.cmp(&y),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    fn item(id: &str) -> Item {
        Item {
            id: Some(id.to_string()),
            title: None,
            deadline: None,
            attributes: Default::default(),
        }
    }

    fn dated(id: &str, title: &str, deadline: &str) -> Item {
        Item {
            title: Some(title.to_string()),
            deadline: Some(deadline.to_string()),
            ..item(id)
        }
    }

    fn now() -> DateTime<Utc> {
        Timestamp::parse_lenient("2025-11-20T12:00:00Z").as_datetime()
    }

    fn active(action: StateAction, ts: DateTime<Utc>) -> Entry<StateAction> {
        Entry::Active {
            value: action,
            ts: Timestamp::from_datetime(ts),
        }
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.id()).collect()
    }

    #[test]
    fn test_no_state_everything_open() {
        let items = vec![item("J1"), item("J2")];
        let buckets = derive_buckets(&items, &SeedSections::default(), &StateMap::new(), now());
        assert_eq!(ids(&buckets.open), vec!["J1", "J2"]);
        assert!(buckets.applied.is_empty());
        assert!(buckets.other.is_empty());
    }

    #[test]
    fn test_overrides_beat_seed() {
        let items = vec![item("A"), item("B"), item("C"), item("D")];
        let mut seed = SeedSections::default();
        seed.applied.insert("A".into());
        seed.other.insert("B".into());
        seed.applied.insert("C".into());

        let mut states = StateMap::new();
        states.insert("A".into(), active(StateAction::NotInterested, now()));
        states.insert("B".into(), active(StateAction::Applied, now()));
        states.insert(
            "C".into(),
            Entry::Retracted {
                ts: Timestamp::from_datetime(now()),
            },
        );

        let buckets = derive_buckets(&items, &seed, &states, now());
        assert_eq!(ids(&buckets.applied), vec!["B"]);
        assert_eq!(ids(&buckets.other), vec!["A"]);
        assert_eq!(ids(&buckets.open), vec!["C", "D"]);
    }

    #[test]
    fn test_exam_done_expiry() {
        let items = vec![item("fresh"), item("stale"), item("edge")];
        let mut seed = SeedSections::default();
        seed.other.insert("stale".into());

        let mut states = StateMap::new();
        states.insert("fresh".into(), active(StateAction::ExamDone, now() - Duration::days(6)));
        states.insert("stale".into(), active(StateAction::ExamDone, now() - Duration::days(8)));
        states.insert("edge".into(), active(StateAction::ExamDone, now() - Duration::days(7)));

        let buckets = derive_buckets(&items, &seed, &states, now());
        assert_eq!(ids(&buckets.applied), vec!["fresh", "edge"]);
        assert_eq!(ids(&buckets.open), vec!["stale"]);
        assert!(buckets.other.is_empty());
    }

    #[test]
    fn test_exam_done_boundary_is_inclusive() {
        let ts = now() - Duration::days(EXAM_DONE_TTL_DAYS);
        assert!(exam_done_active(ts, now()));
        assert!(!exam_done_active(ts - Duration::milliseconds(1), now()));
    }

    #[test]
    fn test_applied_wins_when_both_sets_hold_id() {
        let mut seed = SeedSections::default();
        seed.applied.insert("X".into());
        seed.other.insert("X".into());
        let buckets = derive_buckets(&[item("X")], &seed, &StateMap::new(), now());
        assert_eq!(ids(&buckets.applied), vec!["X"]);
    }

    #[test]
    fn test_items_without_id_stay_open() {
        let nameless = Item {
            id: None,
            ..item("")
        };
        let mut states = StateMap::new();
        states.insert("J1".into(), active(StateAction::Applied, now()));
        let buckets = derive_buckets(&[nameless], &SeedSections::default(), &states, now());
        assert_eq!(buckets.open.len(), 1);
    }

    #[test]
    fn test_parse_deadline_formats() {
        assert_eq!(parse_deadline("05-12-2025"), NaiveDate::from_ymd_opt(2025, 12, 5));
        assert_eq!(parse_deadline("05/12/2025"), NaiveDate::from_ymd_opt(2025, 12, 5));
        assert_eq!(parse_deadline("n/a"), None);
        assert_eq!(parse_deadline("2025-12"), None);
        assert_eq!(parse_deadline("31-02-2025"), None);
    }

    #[test]
    fn test_sort_by_deadline_undated_last_by_title() {
        let mut items = vec![
            dated("late", "Z", "10-01-2026"),
            dated("na2", "Beta", "N/A"),
            dated("early", "Y", "05-12-2025"),
            dated("na1", "Alpha", "N/A"),
        ];
        sort_by_deadline(&mut items);
        assert_eq!(ids(&items), vec!["early", "late", "na1", "na2"]);
    }
}
