//! Construction validator
//!
//! Checks a timeline tree before the engine instantiates anything. A tree
//! that fails here never starts; nothing is coerced into shape.

use crate::error::EngineError;
use crate::expansion::Sampling;
use crate::node::{NodeSpec, TimelineSpec};
use serde::Serialize;

/// Finding that does not stop the tree from running
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SpecWarning {
    /// Both a loop predicate and `repetitions > 1`; the loop wins
    LoopOverridesRepetitions { path: String, repetitions: u32 },
}

impl std::fmt::Display for SpecWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoopOverridesRepetitions { path, repetitions } => write!(
                f,
                "{path}: loop predicate overrides repetitions = {repetitions}"
            ),
        }
    }
}

/// Shape of a validated tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub trial_count: usize,
    pub timeline_count: usize,
    pub max_depth: usize,
    pub warnings: Vec<SpecWarning>,
}

/// Construction-time validator
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstructionValidator {
    strict_controls: bool,
}

impl ConstructionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat conflicting loop/repetition controls as an error
    #[must_use]
    pub fn strict(mut self, strict_controls: bool) -> Self {
        self.strict_controls = strict_controls;
        self
    }

    /// Validate the whole tree below `root`
    pub fn validate(&self, root: &NodeSpec) -> Result<ValidationReport, EngineError> {
        self.validate_at(root, "root")
    }

    /// Validate with a caller-chosen path prefix (used for appended nodes)
    pub fn validate_at(&self, node: &NodeSpec, path: &str) -> Result<ValidationReport, EngineError> {
        let mut report = ValidationReport::default();
        self.visit(node, path, 0, &mut report)?;
        Ok(report)
    }

    fn visit(
        &self,
        node: &NodeSpec,
        path: &str,
        depth: usize,
        report: &mut ValidationReport,
    ) -> Result<(), EngineError> {
        report.max_depth = report.max_depth.max(depth);
        match node {
            NodeSpec::Trial(_) => {
                report.trial_count += 1;
                Ok(())
            }
            NodeSpec::Timeline(spec) => {
                report.timeline_count += 1;
                self.check_controls(spec, path, report)?;
                for (i, child) in spec.children.iter().enumerate() {
                    self.visit(child, &format!("{path}.timeline[{i}]"), depth + 1, report)?;
                }
                Ok(())
            }
        }
    }

    fn check_controls(
        &self,
        spec: &TimelineSpec,
        path: &str,
        report: &mut ValidationReport,
    ) -> Result<(), EngineError> {
        if spec.repetitions == 0 {
            return Err(EngineError::invalid_spec(path, "repetitions must be at least 1"));
        }

        if spec.loop_predicate.is_some() && spec.repetitions > 1 {
            if self.strict_controls {
                return Err(EngineError::invalid_spec(
                    path,
                    "loop predicate and repetitions are mutually exclusive",
                ));
            }
            report.warnings.push(SpecWarning::LoopOverridesRepetitions {
                path: path.to_string(),
                repetitions: spec.repetitions,
            });
        }

        if let Some(sampling) = &spec.sampling {
            let Some(count) = spec.record_count() else {
                return Err(EngineError::invalid_spec(
                    path,
                    "sampling requires timeline variables",
                ));
            };
            match sampling {
                Sampling::WithoutReplacement { size } if *size > count => {
                    return Err(EngineError::invalid_spec(
                        path,
                        format!("cannot sample {size} records without replacement from {count}"),
                    ));
                }
                Sampling::WithReplacement { size } if *size > 0 && count == 0 => {
                    return Err(EngineError::invalid_spec(
                        path,
                        "cannot sample with replacement from an empty record list",
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Validate `root` with default settings, or strict control checking
pub fn validate(root: &NodeSpec, strict: bool) -> Result<ValidationReport, EngineError> {
    ConstructionValidator::new().strict(strict).validate(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Trial;
    use crate::predicate::PredicateSpec;
    use serde_json::json;

    fn leaf() -> NodeSpec {
        Trial::new(json!({})).into()
    }

    #[test]
    fn counts_shape() {
        let inner = TimelineSpec::new(vec![leaf(), leaf()]);
        let root: NodeSpec = TimelineSpec::new(vec![leaf(), inner.into()]).into();
        let report = validate(&root, false).unwrap();
        assert_eq!(report.trial_count, 3);
        assert_eq!(report.timeline_count, 2);
        assert_eq!(report.max_depth, 2);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn zero_repetitions_rejected() {
        let root: NodeSpec = TimelineSpec::new(vec![leaf()]).repetitions(0).into();
        let err = validate(&root, false).unwrap_err();
        assert!(err.to_string().contains("repetitions must be at least 1"));
    }

    #[test]
    fn loop_with_repetitions_warns_or_fails() {
        let root: NodeSpec = TimelineSpec::new(vec![leaf()])
            .repetitions(3)
            .loop_while(PredicateSpec::Never)
            .into();
        let report = validate(&root, false).unwrap();
        assert_eq!(
            report.warnings,
            vec![SpecWarning::LoopOverridesRepetitions {
                path: "root".to_string(),
                repetitions: 3
            }]
        );
        assert!(validate(&root, true).is_err());
    }

    #[test]
    fn sampling_without_records_rejected() {
        let inner = TimelineSpec::new(vec![leaf()]).randomize_order();
        let root: NodeSpec = TimelineSpec::new(vec![inner.into()]).into();
        let err = validate(&root, false).unwrap_err();
        assert!(err.to_string().starts_with("invalid node spec at root.timeline[0]"));
    }

    #[test]
    fn oversized_sample_rejected() {
        let root: NodeSpec = TimelineSpec::new(vec![leaf()])
            .variables(vec![Default::default(), Default::default()])
            .sample(Sampling::WithoutReplacement { size: 3 })
            .into();
        assert!(validate(&root, false).is_err());
    }
}
