//! Run predicates - boolean conditions over the pipeline state that gate
//! whether a stage executes

use crate::core::state::{PipelineState, StateError, Value};
use crate::core::status::ScanStatus;
use serde::{Deserialize, Serialize};

/// A stage's run condition, evaluated against the accumulated state just
/// before the stage would start
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Always run (stages with no `when:` clause)
    Always,
    Equals { key: String, value: Value },
    NotEquals { key: String, value: Value },
    /// Loose truthiness of a single key
    Truthy { key: String },
    /// Scan gate: proceed when the recorded scan status is clean, or when
    /// findings are present and the configured severity filter is in the
    /// tolerated set. A status of 2 or above never passes.
    ScanGate {
        status_key: String,
        filter_key: String,
        tolerated: Vec<String>,
    },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Evaluate against the state. `Err(UnknownKey)` means a referenced key
    /// has no value yet - typically because the producing stage was skipped.
    pub fn evaluate(&self, state: &PipelineState) -> Result<bool, StateError> {
        match self {
            Predicate::Always => Ok(true),
            Predicate::Equals { key, value } => Ok(state.lookup(key)? == value),
            Predicate::NotEquals { key, value } => Ok(state.lookup(key)? != value),
            Predicate::Truthy { key } => Ok(state.lookup(key)?.is_truthy()),
            Predicate::ScanGate {
                status_key,
                filter_key,
                tolerated,
            } => {
                let code = match state.lookup(status_key)? {
                    Value::Int(n) => *n as i32,
                    other => {
                        return Err(StateError::UnknownKey(format!(
                            "{} (expected a numeric scan status, found `{}`)",
                            status_key, other
                        )))
                    }
                };
                let filter = state.lookup(filter_key)?.to_string();
                Ok(can_proceed(
                    ScanStatus::from_exit_code(code),
                    &filter,
                    tolerated,
                ))
            }
            Predicate::All(preds) => {
                for p in preds {
                    if !p.evaluate(state)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Any(preds) => {
                for p in preds {
                    if p.evaluate(state)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Not(inner) => Ok(!inner.evaluate(state)?),
        }
    }

    /// State keys this predicate reads, for definition-time validation
    pub fn referenced_keys(&self) -> Vec<String> {
        match self {
            Predicate::Always => Vec::new(),
            Predicate::Equals { key, .. }
            | Predicate::NotEquals { key, .. }
            | Predicate::Truthy { key } => vec![key.clone()],
            Predicate::ScanGate {
                status_key,
                filter_key,
                ..
            } => vec![status_key.clone(), filter_key.clone()],
            Predicate::All(preds) | Predicate::Any(preds) => {
                preds.iter().flat_map(|p| p.referenced_keys()).collect()
            }
            Predicate::Not(inner) => inner.referenced_keys(),
        }
    }
}

/// The publish gate: clean always proceeds, findings proceed only when the
/// severity filter is explicitly tolerated, a scanner error never proceeds.
pub fn can_proceed(status: ScanStatus, severity_filter: &str, tolerated: &[String]) -> bool {
    match status {
        ScanStatus::Clean => true,
        ScanStatus::Findings => {
            let normalized = severity_filter.trim().to_ascii_uppercase();
            tolerated
                .iter()
                .any(|t| t.trim().to_ascii_uppercase() == normalized)
        }
        ScanStatus::Error(_) => false,
    }
}

/// Wire form of a predicate, as written in the `when:` clause
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateConfig {
    Equals { key: String, value: serde_yaml::Value },
    NotEquals { key: String, value: serde_yaml::Value },
    Truthy { key: String },
    ScanGate {
        status_key: String,
        filter_key: String,
        #[serde(default)]
        tolerated: Vec<String>,
    },
    All(Vec<PredicateConfig>),
    Any(Vec<PredicateConfig>),
    Not(Box<PredicateConfig>),
}

impl PredicateConfig {
    pub fn to_predicate(&self) -> Predicate {
        match self {
            PredicateConfig::Equals { key, value } => Predicate::Equals {
                key: key.clone(),
                value: yaml_to_value(value),
            },
            PredicateConfig::NotEquals { key, value } => Predicate::NotEquals {
                key: key.clone(),
                value: yaml_to_value(value),
            },
            PredicateConfig::Truthy { key } => Predicate::Truthy { key: key.clone() },
            PredicateConfig::ScanGate {
                status_key,
                filter_key,
                tolerated,
            } => Predicate::ScanGate {
                status_key: status_key.clone(),
                filter_key: filter_key.clone(),
                tolerated: tolerated.clone(),
            },
            PredicateConfig::All(preds) => {
                Predicate::All(preds.iter().map(|p| p.to_predicate()).collect())
            }
            PredicateConfig::Any(preds) => {
                Predicate::Any(preds.iter().map(|p| p.to_predicate()).collect())
            }
            PredicateConfig::Not(inner) => Predicate::Not(Box::new(inner.to_predicate())),
        }
    }
}

fn yaml_to_value(value: &serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Bool(b) => Value::Bool(*b),
        serde_yaml::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::String(n.to_string()),
        },
        serde_yaml::Value::String(s) => Value::String(s.clone()),
        other => Value::String(serde_yaml::to_string(other).unwrap_or_default().trim().to_string()),
    }
}
