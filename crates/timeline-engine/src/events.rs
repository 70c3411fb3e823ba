//! Structured engine journal
//!
//! Alongside `tracing` output the engine can keep an in-memory journal of
//! what it did, for inspection after a run and for tests.

use crate::types::NodePath;
use serde::Serialize;

/// One thing the engine did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    TrialIssued { trial_index: u64, path: NodePath },
    TrialFinished { trial_index: u64, path: NodePath },
    /// A copy of a timeline passed its gate
    TimelineEntered { path: NodePath, copy: usize },
    /// A copy of a timeline was gated out
    TimelineSkipped { path: NodePath, copy: usize },
    LoopReentered { path: NodePath, iteration: u32 },
    TimelineTerminated { path: NodePath },
    NodeAppended { position: usize },
    Finished { trials: u64 },
}

/// Append-only list of [`EngineEvent`]s
#[derive(Debug, Clone, Default)]
pub struct EventJournal {
    enabled: bool,
    events: Vec<EngineEvent>,
}

impl EventJournal {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            events: Vec::new(),
        }
    }

    /// Record `event`; dropped when the journal is disabled
    pub fn append(&mut self, event: EngineEvent) {
        if self.enabled {
            self.events.push(event);
        }
    }

    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_journal_drops_events() {
        let mut journal = EventJournal::new(false);
        journal.append(EngineEvent::Finished { trials: 0 });
        assert!(journal.is_empty());
    }

    #[test]
    fn events_serialize_with_tag() {
        let mut journal = EventJournal::new(true);
        journal.append(EngineEvent::NodeAppended { position: 2 });
        let json = journal.to_json().unwrap();
        assert!(json.contains(r#""event": "node_appended""#));
        assert!(json.contains(r#""position": 2"#));
    }
}
