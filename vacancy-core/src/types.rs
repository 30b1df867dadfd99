/// Record and item types shared by the replica store, the merge engine and the backend.
///
/// Records travel on the wire (and in the durable replica) as `{ "vote": .., "ts": .. }`
/// and `{ "action": .., "ts": .. }`. In memory they are `Entry<T>`, which separates a live
/// value from an explicit retraction; absence from the map means "never touched".
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Wall-clock write time of a record.
///
/// Missing or unparseable timestamps decode as the Unix epoch, so they lose every
/// comparison against a real write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn epoch() -> Self {
        Self(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Parse an ISO-8601 string. Never fails: garbage becomes the epoch.
    pub fn parse_lenient(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Self(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Self(naive.and_utc());
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Self(naive.and_utc());
            }
        }
        Self::epoch()
    }

    /// Decode whatever the remote or the durable replica stored under `ts`.
    /// Numbers are epoch milliseconds.
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => Self::parse_lenient(s),
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(Self)
                .unwrap_or_else(Self::epoch),
            _ => Self::epoch(),
        }
    }

    /// ISO-8601 with millisecond precision and a `Z` suffix.
    pub fn to_iso(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_iso())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(Self::from_json(value.as_ref()))
    }
}

/// A per-item verification vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Right,
    Wrong,
}

/// A per-item disposition. The `undo` tombstone is `Entry::Retracted`, not a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateAction {
    Applied,
    NotInterested,
    ExamDone,
}

/// Value types that can live inside a record map.
pub trait RecordValue: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// JSON field holding the value (`vote` or `action`).
    const FIELD: &'static str;
    /// Wire value of an explicit retraction, if this record kind has one.
    const RETRACTED: Option<&'static str>;

    fn as_str(&self) -> &'static str;
    fn parse(raw: &str) -> Option<Self>;
}

impl RecordValue for Vote {
    const FIELD: &'static str = "vote";
    const RETRACTED: Option<&'static str> = None;

    fn as_str(&self) -> &'static str {
        match self {
            Vote::Right => "right",
            Vote::Wrong => "wrong",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "right" => Some(Vote::Right),
            "wrong" => Some(Vote::Wrong),
            _ => None,
        }
    }
}

impl RecordValue for StateAction {
    const FIELD: &'static str = "action";
    const RETRACTED: Option<&'static str> = Some("undo");

    fn as_str(&self) -> &'static str {
        match self {
            StateAction::Applied => "applied",
            StateAction::NotInterested => "not_interested",
            StateAction::ExamDone => "exam_done",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "applied" => Some(StateAction::Applied),
            "not_interested" => Some(StateAction::NotInterested),
            "exam_done" => Some(StateAction::ExamDone),
            _ => None,
        }
    }
}

/// One record in a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry<T> {
    Active { value: T, ts: Timestamp },
    /// Explicit retraction; distinct from "no record at all".
    Retracted { ts: Timestamp },
}

impl<T: Copy> Entry<T> {
    pub fn ts(&self) -> Timestamp {
        match self {
            Entry::Active { ts, .. } | Entry::Retracted { ts } => *ts,
        }
    }

    pub fn value(&self) -> Option<T> {
        match self {
            Entry::Active { value, .. } => Some(*value),
            Entry::Retracted { .. } => None,
        }
    }
}

/// Item id -> record. Ordered so the durable replica serializes deterministically.
pub type RecordMap<T> = BTreeMap<String, Entry<T>>;
pub type VoteMap = RecordMap<Vote>;
pub type StateMap = RecordMap<StateAction>;

/// Decode a `{ id: record }` object. Anything that isn't a well-formed record is
/// dropped on its own; a non-object yields an empty map.
pub fn decode_records<T: RecordValue>(value: &Value) -> RecordMap<T> {
    let mut records = RecordMap::new();
    let Some(object) = value.as_object() else {
        return records;
    };

    for (id, raw) in object {
        if id.is_empty() {
            continue;
        }
        let Some(fields) = raw.as_object() else {
            log::debug!("[vacancy.types] Skipping non-object record for {}", id);
            continue;
        };
        let Some(tag) = fields.get(T::FIELD).and_then(Value::as_str) else {
            continue;
        };
        let ts = Timestamp::from_json(fields.get("ts"));

        if T::RETRACTED == Some(tag) {
            records.insert(id.clone(), Entry::Retracted { ts });
        } else if let Some(value) = T::parse(tag) {
            records.insert(id.clone(), Entry::Active { value, ts });
        } else {
            // Empty vote strings land here too: they mean "no record".
            log::debug!("[vacancy.types] Dropping record {} with {}={:?}", id, T::FIELD, tag);
        }
    }
    records
}

/// Encode a record map back into its wire shape. Retractions of a record kind with no
/// wire form for them are omitted, which is the same as absence for that kind.
pub fn encode_records<T: RecordValue>(records: &RecordMap<T>) -> Value {
    let mut object = serde_json::Map::new();
    for (id, entry) in records {
        let tag = match entry {
            Entry::Active { value, .. } => value.as_str(),
            Entry::Retracted { .. } => match T::RETRACTED {
                Some(tag) => tag,
                None => continue,
            },
        };
        let mut fields = serde_json::Map::new();
        fields.insert(T::FIELD.to_string(), Value::String(tag.to_string()));
        fields.insert("ts".to_string(), Value::String(entry.ts().to_iso()));
        object.insert(id.clone(), Value::Object(fields));
    }
    Value::Object(object)
}

/// A listing from the item feed. Only `id`, `title` and `deadline` matter to the core;
/// everything else is carried through to the display surface untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, Value>,
}

impl Item {
    /// The item id, or `""` for malformed records without one.
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }
}

/// Seed classification shipped with the item feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedSections {
    #[serde(default)]
    pub applied: BTreeSet<String>,
    #[serde(default)]
    pub other: BTreeSet<String>,
}

/// One fetch of the item feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedDocument {
    pub items: Vec<Item>,
    pub seed: SeedSections,
}

impl FeedDocument {
    /// Decode `{ jobListings: [..], sections: { applied, other } }`.
    /// Returns `None` when `jobListings` is missing or not an array; individual malformed
    /// listings are skipped.
    pub fn from_json(value: &Value) -> Option<Self> {
        let listings = value.get("jobListings")?.as_array()?;
        let items = listings
            .iter()
            .filter_map(|raw| match serde_json::from_value::<Item>(raw.clone()) {
                Ok(item) => Some(item),
                Err(e) => {
                    log::debug!("[vacancy.types] Skipping malformed listing: {}", e);
                    None
                }
            })
            .collect();
        let seed = value
            .get("sections")
            .and_then(|s| serde_json::from_value::<SeedSections>(s.clone()).ok())
            .unwrap_or_default();
        Some(Self { items, seed })
    }
}
