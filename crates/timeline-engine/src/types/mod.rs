use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Data a trial runner reports for one completed trial
///
/// Opaque to the engine: stored, handed to predicates, never interpreted
/// except by declarative predicates that look up a named field.
pub type TrialData = Value;

/// One variable-assignment record; drives one expansion copy
pub type VariableRecord = IndexMap<String, Value>;

/// Identifier for one executor run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a node below its parent timeline
///
/// `child` is the index in the parent's child sequence, `copy` and
/// `repetition` identify which pass of the parent produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment {
    pub child: usize,
    pub copy: usize,
    pub repetition: u32,
}

/// Location of a live node, from the root down
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodePath(pub Vec<PathSegment>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "root");
        }
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "-")?;
            }
            write!(f, "{}.{}.{}", seg.child, seg.copy, seg.repetition)?;
        }
        Ok(())
    }
}

/// A completed trial as the engine recorded it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_index: u64,
    pub path: NodePath,
    pub data: TrialData,
}

impl TrialRecord {
    /// Look up a top-level field of the trial data
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

/// All trial records of a run, in completion order
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataLog {
    records: Vec<TrialRecord>,
}

impl DataLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, record: TrialRecord) {
        self.records.push(record);
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrialRecord> + '_ {
        self.records.iter()
    }

    /// Values of one data field across all records that have it
    pub fn field_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.records.iter().filter_map(move |r| r.field(name))
    }
}

/// Snapshot of how far a run has come
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub trials_completed: u64,
    pub active_trial: Option<u64>,
    pub finished: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_path_display() {
        assert_eq!(NodePath::root().to_string(), "root");
    }

    #[test]
    fn nested_path_display() {
        let path = NodePath::root()
            .child(PathSegment {
                child: 0,
                copy: 1,
                repetition: 0,
            })
            .child(PathSegment {
                child: 2,
                copy: 0,
                repetition: 3,
            });
        assert_eq!(path.to_string(), "0.1.0-2.0.3");
        assert_eq!(path.depth(), 2);
    }

    #[test]
    fn data_log_field_values() {
        let mut log = DataLog::new();
        log.push(TrialRecord {
            trial_index: 0,
            path: NodePath::root(),
            data: json!({"rt": 410}),
        });
        log.push(TrialRecord {
            trial_index: 1,
            path: NodePath::root(),
            data: json!({"key": "f"}),
        });
        let rts: Vec<_> = log.field_values("rt").collect();
        assert_eq!(rts, vec![&json!(410)]);
        assert_eq!(log.count(), 2);
    }
}
