//! Variable-record expansion
//!
//! An interior node carrying variable records is expanded once, when it is
//! instantiated, into one copy per (sampled) record. Each copy gets its own
//! child scope seeded with its record and chained to the enclosing scope.

use crate::node::TimelineSpec;
use crate::scope::VariableScope;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the record list is turned into the copy order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sampling {
    /// Every record once, in random order
    Shuffle,
    /// `size` draws, records may repeat
    WithReplacement { size: usize },
    /// `size` distinct records in random order
    WithoutReplacement { size: usize },
    /// Every record `size` times, shuffled together
    FixedRepetitions { size: usize },
}

/// One expansion copy of an interior node
#[derive(Debug, Clone)]
pub struct ExpansionCopy {
    /// Index into the node's record list; `None` when the node has no records
    pub record_index: Option<usize>,
    pub scope: VariableScope,
}

/// Expand `spec` below `parent_scope`.
///
/// Without records there is exactly one copy, which reuses the parent scope.
/// An empty record list yields no copies at all.
pub fn expand<R: Rng + ?Sized>(
    spec: &TimelineSpec,
    parent_scope: &VariableScope,
    rng: &mut R,
) -> Vec<ExpansionCopy> {
    let Some(records) = spec.variables.as_ref() else {
        return vec![ExpansionCopy {
            record_index: None,
            scope: parent_scope.clone(),
        }];
    };

    let order = sample_order(records.len(), spec.sampling.as_ref(), rng);
    order
        .into_iter()
        .map(|index| ExpansionCopy {
            record_index: Some(index),
            scope: parent_scope.with_record(&records[index]),
        })
        .collect()
}

/// Record indices in the order their copies run
pub fn sample_order<R: Rng + ?Sized>(
    count: usize,
    sampling: Option<&Sampling>,
    rng: &mut R,
) -> Vec<usize> {
    let mut order: Vec<usize> = (0..count).collect();
    match sampling {
        None => {}
        Some(Sampling::Shuffle) => order.shuffle(rng),
        Some(Sampling::WithReplacement { size }) => {
            if count == 0 {
                return Vec::new();
            }
            order = (0..*size).map(|_| rng.gen_range(0..count)).collect();
        }
        Some(Sampling::WithoutReplacement { size }) => {
            order.shuffle(rng);
            order.truncate(*size);
        }
        Some(Sampling::FixedRepetitions { size }) => {
            order = (0..count)
                .flat_map(|index| std::iter::repeat(index).take(*size))
                .collect();
            order.shuffle(rng);
        }
    }
    order
}
