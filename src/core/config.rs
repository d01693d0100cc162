//! Pipeline configuration from YAML
//!
//! A definition file declares parameters, environment templates and stages.
//! Variants of the same pipeline are different parameter sets against one
//! definition, never separate stage lists.

use crate::core::parameter::{Parameter, ParameterConfig};
use crate::core::pipeline::{DownstreamSettings, NotifySettings, Pipeline};
use crate::core::predicate::PredicateConfig;
use crate::core::stage::{Command, OutputSource, OutputSpec, RetryPolicy, Stage, StageDefaults};
use crate::core::state::{template_keys, Value};
use crate::core::status::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Definition-time and parameter-validation errors. The CLI maps these to
/// exit code 2; no stage runs once one is raised.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read pipeline definition: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse pipeline definition: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("duplicate stage id `{0}`")]
    DuplicateStage(String),

    #[error("duplicate parameter `{0}`")]
    DuplicateParameter(String),

    #[error("stage `{0}` has an empty body")]
    EmptyBody(String),

    #[error("parallel group `{group}` is not contiguous (stage `{stage}`)")]
    NonContiguousGroup { group: String, stage: String },

    #[error("stage `{stage}` references undeclared key `{key}`")]
    UndeclaredKey { stage: String, key: String },

    #[error("environment value `{env}` may only reference parameters, found `{key}`")]
    EnvReferencesNonParameter { env: String, key: String },

    #[error("key `{key}` is declared more than once ({first} and {second})")]
    KeyCollision {
        key: String,
        first: String,
        second: String,
    },

    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    #[error("parameter `{0}` has no value and no default")]
    MissingParameter(String),

    #[error("parameter `{parameter}`: `{value}` is not one of [{choices}]")]
    InvalidChoice {
        parameter: String,
        value: String,
        choices: String,
    },

    #[error("parameter `{parameter}`: `{value}` is not a boolean")]
    InvalidBoolean { parameter: String, value: String },

    #[error("choice parameter `{parameter}` declares no choices")]
    EmptyChoices { parameter: String },

    #[error("stage `{0}`: retry max_attempts must be at least 1")]
    InvalidRetry(String),

    #[error("stage `{stage}`: output `{key}` with `from: const` needs a value")]
    ConstOutputMissingValue { stage: String, key: String },

    #[error("stage `{stage}`: command lists no acceptable exit codes")]
    EmptyOkExitCodes { stage: String },

    #[error("{target} references undeclared key `{key}`")]
    UndeclaredKeyIn { target: String, key: String },
}

/// Top-level pipeline definition loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,

    /// Environment templates, rendered once at run start. Values may only
    /// reference parameters.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Mark a parallel group FAILURE on its first fatal member
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    pub stages: Vec<StageConfig>,

    #[serde(default)]
    pub notify: Option<NotifyConfig>,

    #[serde(default)]
    pub downstream: Option<DownstreamConfig>,
}

fn default_fail_fast() -> bool {
    true
}

/// Stage defaults applied where a stage does not override them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Stage definition as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub id: String,

    /// Run condition; absent means always run
    #[serde(default)]
    pub when: Option<PredicateConfig>,

    /// Ordered body commands
    pub run: Vec<CommandConfig>,

    #[serde(default)]
    pub on_failure: FailurePolicy,

    #[serde(default)]
    pub retry: Option<RetryConfig>,

    #[serde(default)]
    pub outputs: Vec<OutputConfig>,

    /// Parallel group id; contiguous stages sharing one run concurrently
    #[serde(default)]
    pub group: Option<String>,

    /// Execute even after a fatal failure aborts the run
    #[serde(default)]
    pub always_run: bool,
}

/// One body command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub command: String,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Defaults to `[0]`
    #[serde(default)]
    pub ok_exit_codes: Option<Vec<i32>>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Fixed-interval retry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: usize,

    #[serde(default)]
    pub delay_secs: u64,
}

/// A declared stage output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub key: String,

    pub from: OutputSourceConfig,

    /// Only used with `from: const`
    #[serde(default)]
    pub value: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSourceConfig {
    ExitCode,
    Stdout,
    ScanStatus,
    Const,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamConfig {
    pub job: String,

    /// Parameter templates rendered against the final state
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl PipelineConfig {
    /// Load a pipeline definition from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a pipeline definition from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the definition: unique ids, group contiguity, key collisions,
    /// and that every referenced key has a declared producer that runs in an
    /// earlier batch.
    pub fn validate(&self) -> Result<()> {
        let mut param_names = HashSet::new();
        for param in &self.parameters {
            if !param_names.insert(param.name.clone()) {
                return Err(ConfigError::DuplicateParameter(param.name.clone()));
            }
            param.to_parameter()?;
        }

        // Environment values are computed from parameters alone
        for (env_key, template) in &self.env {
            if param_names.contains(env_key) {
                return Err(ConfigError::KeyCollision {
                    key: env_key.clone(),
                    first: "parameters".to_string(),
                    second: "env".to_string(),
                });
            }
            for key in template_keys(template) {
                if !param_names.contains(&key) {
                    return Err(ConfigError::EnvReferencesNonParameter {
                        env: env_key.clone(),
                        key,
                    });
                }
            }
        }

        let mut stage_ids = HashSet::new();
        for stage in &self.stages {
            if !stage_ids.insert(stage.id.clone()) {
                return Err(ConfigError::DuplicateStage(stage.id.clone()));
            }
            if stage.run.is_empty() {
                return Err(ConfigError::EmptyBody(stage.id.clone()));
            }
            if let Some(retry) = &stage.retry {
                if retry.max_attempts == 0 {
                    return Err(ConfigError::InvalidRetry(stage.id.clone()));
                }
            }
            for cmd in &stage.run {
                if matches!(&cmd.ok_exit_codes, Some(codes) if codes.is_empty()) {
                    return Err(ConfigError::EmptyOkExitCodes {
                        stage: stage.id.clone(),
                    });
                }
            }
            for output in &stage.outputs {
                if output.from == OutputSourceConfig::Const && output.value.is_none() {
                    return Err(ConfigError::ConstOutputMissingValue {
                        stage: stage.id.clone(),
                        key: output.key.clone(),
                    });
                }
            }
        }

        self.check_group_contiguity()?;
        self.check_output_collisions(&param_names)?;
        self.check_key_resolution(&param_names)?;

        Ok(())
    }

    /// A parallel group's members must be adjacent in the declared order
    fn check_group_contiguity(&self) -> Result<()> {
        let mut closed: HashSet<String> = HashSet::new();
        let mut current: Option<String> = None;
        for stage in &self.stages {
            match (&stage.group, &current) {
                (Some(group), Some(open)) if group == open => {}
                (Some(group), _) => {
                    if closed.contains(group) {
                        return Err(ConfigError::NonContiguousGroup {
                            group: group.clone(),
                            stage: stage.id.clone(),
                        });
                    }
                    if let Some(open) = current.take() {
                        closed.insert(open);
                    }
                    current = Some(group.clone());
                }
                (None, Some(open)) => {
                    closed.insert(open.clone());
                    current = None;
                }
                (None, None) => {}
            }
        }
        Ok(())
    }

    /// Output keys may not shadow parameters, env values, or each other
    fn check_output_collisions(&self, param_names: &HashSet<String>) -> Result<()> {
        let mut producers: HashMap<String, String> = HashMap::new();
        for stage in &self.stages {
            for output in &stage.outputs {
                if param_names.contains(&output.key) {
                    return Err(ConfigError::KeyCollision {
                        key: output.key.clone(),
                        first: "parameters".to_string(),
                        second: format!("stage `{}`", stage.id),
                    });
                }
                if self.env.contains_key(&output.key) {
                    return Err(ConfigError::KeyCollision {
                        key: output.key.clone(),
                        first: "env".to_string(),
                        second: format!("stage `{}`", stage.id),
                    });
                }
                if let Some(first) = producers.insert(output.key.clone(), stage.id.clone()) {
                    return Err(ConfigError::KeyCollision {
                        key: output.key.clone(),
                        first: format!("stage `{}`", first),
                        second: format!("stage `{}`", stage.id),
                    });
                }
            }
        }
        Ok(())
    }

    /// Every key a stage reads must be a parameter, an env value, or an
    /// output of a stage in a strictly earlier batch. Parallel group members
    /// never see each other's outputs.
    fn check_key_resolution(&self, param_names: &HashSet<String>) -> Result<()> {
        let mut available: HashSet<String> = param_names.clone();
        available.extend(self.env.keys().cloned());

        let mut pending_group: Option<String> = None;
        let mut pending_outputs: Vec<String> = Vec::new();

        for stage in &self.stages {
            // Close the previous group when leaving it
            if pending_group.is_some() && stage.group != pending_group {
                available.extend(pending_outputs.drain(..));
                pending_group = None;
            }

            let mut referenced: Vec<String> = Vec::new();
            if let Some(when) = &stage.when {
                referenced.extend(when.to_predicate().referenced_keys());
            }
            for cmd in &stage.run {
                referenced.extend(template_keys(&cmd.command));
                for value in cmd.env.values() {
                    referenced.extend(template_keys(value));
                }
            }
            for key in referenced {
                if !available.contains(&key) {
                    return Err(ConfigError::UndeclaredKey {
                        stage: stage.id.clone(),
                        key,
                    });
                }
            }

            let outputs = stage.outputs.iter().map(|o| o.key.clone());
            match &stage.group {
                Some(group) => {
                    pending_group = Some(group.clone());
                    pending_outputs.extend(outputs);
                }
                None => available.extend(outputs),
            }
        }
        available.extend(pending_outputs.drain(..));

        // Downstream trigger params render against the final state
        if let Some(downstream) = &self.downstream {
            for template in downstream.params.values() {
                for key in template_keys(template) {
                    if !available.contains(&key) {
                        return Err(ConfigError::UndeclaredKeyIn {
                            target: format!("downstream job `{}`", downstream.job),
                            key,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Convert the validated definition to the domain model
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        let parameters: Vec<Parameter> = self
            .parameters
            .iter()
            .map(|p| p.to_parameter())
            .collect::<Result<_>>()?;

        let stages: Vec<Stage> = self
            .stages
            .iter()
            .map(|s| self.build_stage(s))
            .collect::<Result<_>>()?;

        Ok(Pipeline::assemble(
            self.name.clone(),
            parameters,
            self.env.clone(),
            stages,
            self.fail_fast,
            self.notify.as_ref().map(|n| NotifySettings { to: n.to.clone() }),
            self.downstream.as_ref().map(|d| DownstreamSettings {
                job: d.job.clone(),
                params: d.params.clone(),
            }),
        ))
    }

    fn build_stage(&self, config: &StageConfig) -> Result<Stage> {
        let defaults = StageDefaults {
            timeout_secs: self.defaults.timeout_secs,
        };
        let body = config
            .run
            .iter()
            .map(|cmd| Command {
                line: cmd.command.clone(),
                env: cmd.env.clone(),
                ok_exit_codes: cmd.ok_exit_codes.clone().unwrap_or_else(|| vec![0]),
                timeout: Duration::from_secs(cmd.timeout_secs.unwrap_or(defaults.timeout_secs)),
            })
            .collect();

        let outputs = config
            .outputs
            .iter()
            .map(|o| {
                let from = match o.from {
                    OutputSourceConfig::ExitCode => OutputSource::ExitCode,
                    OutputSourceConfig::Stdout => OutputSource::Stdout,
                    OutputSourceConfig::ScanStatus => OutputSource::ScanStatus,
                    OutputSourceConfig::Const => OutputSource::Const(match &o.value {
                        Some(serde_yaml::Value::Bool(b)) => Value::Bool(*b),
                        Some(serde_yaml::Value::Number(n)) => match n.as_i64() {
                            Some(i) => Value::Int(i),
                            None => Value::String(n.to_string()),
                        },
                        Some(serde_yaml::Value::String(s)) => Value::String(s.clone()),
                        // validate() already rejected a missing value
                        _ => Value::String(String::new()),
                    }),
                };
                OutputSpec {
                    key: o.key.clone(),
                    from,
                }
            })
            .collect();

        Ok(Stage {
            id: config.id.clone(),
            predicate: config
                .when
                .as_ref()
                .map(|w| w.to_predicate())
                .unwrap_or(crate::core::predicate::Predicate::Always),
            body,
            failure_policy: config.on_failure,
            retry: config.retry.as_ref().map(|r| RetryPolicy {
                max_attempts: r.max_attempts,
                delay: Duration::from_secs(r.delay_secs),
            }),
            outputs,
            parallel_group: config.group.clone(),
            always_run: config.always_run,
        })
    }
}

type Result<T> = std::result::Result<T, ConfigError>;
