//! JSON timeline descriptions
//!
//! The authoring format is duck-typed: an object with a `timeline` array is
//! an interior node, anything else is a trial whose fields are its
//! parameters. Interior nodes may carry extra fields too; those become
//! defaults for every trial below.
//!
//! ```json
//! {
//!   "timeline": [{"type": "word", "stimulus": {"$var": "word"}}],
//!   "timeline_variables": [{"word": "a"}, {"word": "b"}],
//!   "repetitions": 2,
//!   "randomize_order": true
//! }
//! ```

use crate::error::{DescriptionError, EngineError};
use crate::expansion::Sampling;
use crate::node::{NodeSpec, TimelineSpec, Trial};
use crate::predicate::PredicateSpec;
use crate::types::VariableRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One node as written by an experiment author
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Vec<NodeDescription>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_variables: Option<Vec<VariableRecord>>,
    /// Signed so a negative count is reported rather than failing to parse
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetitions: Option<i64>,
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_while: Option<PredicateSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional: Option<PredicateSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<Sampling>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub randomize_order: bool,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl NodeDescription {
    pub fn is_timeline(&self) -> bool {
        self.timeline.is_some()
    }

    fn control_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.timeline_variables.is_some() {
            fields.push("timeline_variables");
        }
        if self.repetitions.is_some() {
            fields.push("repetitions");
        }
        if self.loop_while.is_some() {
            fields.push("loop");
        }
        if self.conditional.is_some() {
            fields.push("conditional");
        }
        if self.sample.is_some() {
            fields.push("sample");
        }
        if self.randomize_order {
            fields.push("randomize_order");
        }
        fields
    }

    fn into_spec(mut self, path: &str) -> Result<NodeSpec, EngineError> {
        let Some(children) = self.timeline.take() else {
            let fields = self.control_fields();
            if !fields.is_empty() {
                return Err(EngineError::invalid_spec(
                    path,
                    format!("trial carries timeline controls: {}", fields.join(", ")),
                ));
            }
            return Ok(Trial::new(Value::Object(self.params)).into());
        };

        let repetitions = match self.repetitions {
            None => 1,
            Some(n) if n < 1 => {
                return Err(EngineError::invalid_spec(
                    path,
                    format!("repetitions must be at least 1, got {n}"),
                ));
            }
            Some(n) => u32::try_from(n).map_err(|_| {
                EngineError::invalid_spec(path, format!("repetitions too large: {n}"))
            })?,
        };

        if self.randomize_order && self.sample.is_some() {
            return Err(EngineError::invalid_spec(
                path,
                "randomize_order and sample are mutually exclusive",
            ));
        }

        let children = children
            .into_iter()
            .enumerate()
            .map(|(i, child)| child.into_spec(&format!("{path}.timeline[{i}]")))
            .collect::<Result<Vec<_>, _>>()?;

        let mut spec = TimelineSpec::new(children).repetitions(repetitions);
        spec.loop_predicate = self.loop_while.map(Into::into);
        spec.conditional = self.conditional.map(Into::into);
        spec.variables = self.timeline_variables;
        spec.sampling = if self.randomize_order {
            Some(Sampling::Shuffle)
        } else {
            self.sample
        };
        spec.defaults = self.params;
        Ok(spec.into())
    }
}

impl TryFrom<NodeDescription> for NodeSpec {
    type Error = EngineError;

    fn try_from(description: NodeDescription) -> Result<Self, Self::Error> {
        description.into_spec("root")
    }
}

/// Parse a timeline from JSON
///
/// A top-level array is shorthand for a root timeline with those children.
pub fn load_timeline(json: &str) -> Result<NodeSpec, DescriptionError> {
    let value: Value = serde_json::from_str(json)?;
    let description = if value.is_array() {
        NodeDescription {
            timeline: Some(serde_json::from_value(value)?),
            ..NodeDescription::default()
        }
    } else {
        serde_json::from_value(value)?
    };
    Ok(NodeSpec::try_from(description)?)
}
