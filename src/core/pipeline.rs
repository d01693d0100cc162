//! Pipeline domain model

use crate::core::parameter::Parameter;
use crate::core::stage::Stage;
use std::collections::HashMap;

/// A scheduling unit: either a single stage or a contiguous parallel group.
/// Indices point into [`Pipeline::stages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Batch {
    Single(usize),
    Group { id: String, members: Vec<usize> },
}

/// Settings for the terminal notification
#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub to: String,
}

/// Downstream job trigger, fired only when the run finishes SUCCESS
#[derive(Debug, Clone)]
pub struct DownstreamSettings {
    pub job: String,
    /// Parameter templates rendered against the final state
    pub params: HashMap<String, String>,
}

/// A validated pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,

    pub parameters: Vec<Parameter>,

    /// Environment templates, rendered once at run start from parameters
    pub env_templates: HashMap<String, String>,

    /// Stages in declared order
    pub stages: Vec<Stage>,

    /// Mark a parallel group FAILURE on its first fatal member instead of
    /// waiting for stragglers
    pub fail_fast: bool,

    pub notify: Option<NotifySettings>,

    pub downstream: Option<DownstreamSettings>,

    batches: Vec<Batch>,
}

impl Pipeline {
    /// Assemble a pipeline from already-validated parts. Batches are folded
    /// from the declared order: consecutive stages sharing a group id form
    /// one parallel batch.
    pub(crate) fn assemble(
        name: String,
        parameters: Vec<Parameter>,
        env_templates: HashMap<String, String>,
        stages: Vec<Stage>,
        fail_fast: bool,
        notify: Option<NotifySettings>,
        downstream: Option<DownstreamSettings>,
    ) -> Self {
        let batches = fold_batches(&stages);
        Self {
            name,
            parameters,
            env_templates,
            stages,
            fail_fast,
            notify,
            downstream,
            batches,
        }
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }
}

/// Fold the declared stage order into batches. Group contiguity is enforced
/// by validation before assembly.
fn fold_batches(stages: &[Stage]) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    for (idx, stage) in stages.iter().enumerate() {
        match &stage.parallel_group {
            None => batches.push(Batch::Single(idx)),
            Some(group_id) => match batches.last_mut() {
                Some(Batch::Group { id, members }) if id == group_id => {
                    members.push(idx);
                }
                _ => batches.push(Batch::Group {
                    id: group_id.clone(),
                    members: vec![idx],
                }),
            },
        }
    }
    batches
}
