//! Parameter declarations and resolution
//!
//! Parameters are declared in the pipeline definition and supplied by the
//! caller at run start. They are validated against their declared type
//! before any stage executes and are immutable for the rest of the run.

use crate::core::config::ConfigError;
use crate::core::state::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A declared pipeline parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub spec: ParameterSpec,
}

/// The declared type of a parameter, with its default
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSpec {
    String { default: Option<String> },
    Choice { choices: Vec<String>, default: Option<String> },
    Boolean { default: bool },
}

/// Wire form of a parameter declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: ParameterKind,

    #[serde(default)]
    pub default: Option<serde_yaml::Value>,

    /// Allowed values; only meaningful for `type: choice`
    #[serde(default)]
    pub choices: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Choice,
    Boolean,
}

impl ParameterConfig {
    /// Validate the declaration and convert it to the domain model
    pub fn to_parameter(&self) -> Result<Parameter, ConfigError> {
        let spec = match self.kind {
            ParameterKind::String => ParameterSpec::String {
                default: self.default_as_string(),
            },
            ParameterKind::Choice => {
                if self.choices.is_empty() {
                    return Err(ConfigError::EmptyChoices {
                        parameter: self.name.clone(),
                    });
                }
                let default = self.default_as_string();
                if let Some(ref d) = default {
                    if !self.choices.contains(d) {
                        return Err(ConfigError::InvalidChoice {
                            parameter: self.name.clone(),
                            value: d.clone(),
                            choices: self.choices.join(", "),
                        });
                    }
                }
                ParameterSpec::Choice {
                    choices: self.choices.clone(),
                    default,
                }
            }
            ParameterKind::Boolean => {
                let default = match &self.default {
                    None => false,
                    Some(serde_yaml::Value::Bool(b)) => *b,
                    Some(serde_yaml::Value::String(s)) => parse_bool(s).ok_or_else(|| {
                        ConfigError::InvalidBoolean {
                            parameter: self.name.clone(),
                            value: s.clone(),
                        }
                    })?,
                    Some(other) => {
                        return Err(ConfigError::InvalidBoolean {
                            parameter: self.name.clone(),
                            value: format!("{:?}", other),
                        })
                    }
                };
                ParameterSpec::Boolean { default }
            }
        };
        Ok(Parameter {
            name: self.name.clone(),
            spec,
        })
    }

    fn default_as_string(&self) -> Option<String> {
        match &self.default {
            Some(serde_yaml::Value::String(s)) => Some(s.clone()),
            Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
            Some(serde_yaml::Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Validate a supplied parameter set against the declarations and produce
/// the typed parameter partition of the pipeline state. Fails on unknown
/// names, type/choice mismatches, and missing values with no default.
pub fn resolve_parameters(
    declared: &[Parameter],
    supplied: &HashMap<String, String>,
) -> Result<HashMap<String, Value>, ConfigError> {
    for name in supplied.keys() {
        if !declared.iter().any(|p| &p.name == name) {
            return Err(ConfigError::UnknownParameter(name.clone()));
        }
    }

    let mut resolved = HashMap::new();
    for param in declared {
        let value = match (&param.spec, supplied.get(&param.name)) {
            (ParameterSpec::String { .. }, Some(raw)) => Value::String(raw.clone()),
            (ParameterSpec::String { default: Some(d) }, None) => Value::String(d.clone()),
            (ParameterSpec::Choice { choices, .. }, Some(raw)) => {
                if !choices.contains(raw) {
                    return Err(ConfigError::InvalidChoice {
                        parameter: param.name.clone(),
                        value: raw.clone(),
                        choices: choices.join(", "),
                    });
                }
                Value::String(raw.clone())
            }
            (ParameterSpec::Choice { default: Some(d), .. }, None) => Value::String(d.clone()),
            (ParameterSpec::Boolean { .. }, Some(raw)) => {
                Value::Bool(parse_bool(raw).ok_or_else(|| ConfigError::InvalidBoolean {
                    parameter: param.name.clone(),
                    value: raw.clone(),
                })?)
            }
            (ParameterSpec::Boolean { default }, None) => Value::Bool(*default),
            (_, None) => {
                return Err(ConfigError::MissingParameter(param.name.clone()));
            }
        };
        resolved.insert(param.name.clone(), value);
    }
    Ok(resolved)
}
