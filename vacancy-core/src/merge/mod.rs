pub mod merge;

pub use merge::{merge, merge_detailed, resolve_conflict, MergeResult, Winner};
