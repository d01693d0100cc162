//! Pipeline state - the shared key/value store stages read and write
//!
//! Keys live in one of three partitions: parameters (fixed by the caller),
//! environment values (rendered once at run start), and stage outputs
//! (write-once per stage execution).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// A state value. Parameters, environment values and stage outputs all
/// resolve to one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Loose truthiness used by `truthy` predicates: false / 0 / "" / "false"
    /// are false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::String(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

/// Errors raised by state reads and writes
#[derive(Debug, Error)]
pub enum StateError {
    #[error("unknown state key `{0}`")]
    UnknownKey(String),

    #[error("key `{key}` was already produced by stage `{producer}`")]
    AlreadyProduced { key: String, producer: String },

    #[error("key `{0}` belongs to a read-only partition")]
    ReadOnly(String),
}

/// A recorded output write, applied to the state by the executor
#[derive(Debug, Clone)]
pub struct OutputWrite {
    pub stage_id: String,
    pub key: String,
    pub value: Value,
}

/// A batch of output writes produced by one stage execution. Parallel group
/// members return deltas; the executor applies them only after the whole
/// group has completed.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub writes: Vec<OutputWrite>,
}

impl StateDelta {
    pub fn push(&mut self, stage_id: &str, key: &str, value: Value) {
        self.writes.push(OutputWrite {
            stage_id: stage_id.to_string(),
            key: key.to_string(),
            value,
        });
    }
}

#[derive(Debug, Clone)]
struct OutputEntry {
    producer: String,
    value: Value,
}

/// The run's key/value store
#[derive(Debug, Clone)]
pub struct PipelineState {
    params: HashMap<String, Value>,
    env: HashMap<String, Value>,
    outputs: HashMap<String, OutputEntry>,
}

impl PipelineState {
    /// Build the state from resolved parameters and rendered environment
    /// values. Both partitions are read-only from here on.
    pub fn new(params: HashMap<String, Value>, env: HashMap<String, Value>) -> Self {
        Self {
            params,
            env,
            outputs: HashMap::new(),
        }
    }

    /// Look a key up across all partitions. Validation rejects colliding
    /// keys at definition time, so at most one partition holds the key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params
            .get(key)
            .or_else(|| self.env.get(key))
            .or_else(|| self.outputs.get(key).map(|e| &e.value))
    }

    /// Like [`get`](Self::get) but raising `StateError::UnknownKey`
    pub fn lookup(&self, key: &str) -> Result<&Value, StateError> {
        self.get(key)
            .ok_or_else(|| StateError::UnknownKey(key.to_string()))
    }

    /// Record a stage output. Write-once per key, except that the producing
    /// stage may overwrite its own output on re-execution (a retry).
    pub fn record_output(
        &mut self,
        stage_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), StateError> {
        if self.params.contains_key(key) || self.env.contains_key(key) {
            return Err(StateError::ReadOnly(key.to_string()));
        }
        if let Some(existing) = self.outputs.get(key) {
            if existing.producer != stage_id {
                return Err(StateError::AlreadyProduced {
                    key: key.to_string(),
                    producer: existing.producer.clone(),
                });
            }
        }
        self.outputs.insert(
            key.to_string(),
            OutputEntry {
                producer: stage_id.to_string(),
                value,
            },
        );
        Ok(())
    }

    /// Apply a delta. The executor only calls this from the controller task,
    /// after a stage (or a whole parallel group) has finished, so readers
    /// never observe a partially written group.
    pub fn apply(&mut self, delta: &StateDelta) -> Result<(), StateError> {
        for write in &delta.writes {
            self.record_output(&write.stage_id, &write.key, write.value.clone())?;
        }
        Ok(())
    }

    /// Snapshot of every key/value pair, for reports
    pub fn entries(&self) -> HashMap<String, Value> {
        let mut all = self.params.clone();
        all.extend(self.env.clone());
        for (key, entry) in &self.outputs {
            all.insert(key.clone(), entry.value.clone());
        }
        all
    }
}

/// Collect the `{{ key }}` placeholders referenced by a template
pub fn template_keys(template: &str) -> Vec<String> {
    let re = match Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    re.captures_iter(template)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Render a template against the state, substituting every `{{ key }}`
/// placeholder. An unresolvable key is an error - validation catches these
/// at definition time, so hitting one at run time means a producer was
/// skipped.
pub fn render_template(template: &str, state: &PipelineState) -> Result<String, StateError> {
    let mut rendered = template.to_string();
    for key in template_keys(template) {
        let value = state.lookup(&key)?.to_string();
        if let Ok(re) = Regex::new(&format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(&key))) {
            // NoExpand: values may contain `$`, which must stay literal
            rendered = re
                .replace_all(&rendered, regex::NoExpand(&value))
                .to_string();
        }
    }
    Ok(rendered)
}
