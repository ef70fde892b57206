use std::collections::BTreeMap;

use crate::domain::deal::StageId;

/// Placeholder used whenever a stage id cannot be resolved to a name.
pub const UNKNOWN_STAGE: &str = "Unknown stage";

/// Lookup capability mapping a pipeline stage id to its display name.
pub trait StageDirectory: Send + Sync {
    fn stage_name(&self, stage_id: StageId) -> Option<String>;
}

/// Resolves a stage name, substituting [`UNKNOWN_STAGE`] for unknown or blank entries.
pub fn resolve_stage(directory: &dyn StageDirectory, stage_id: StageId) -> String {
    directory
        .stage_name(stage_id)
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_STAGE.to_owned())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticStageDirectory {
    stages: BTreeMap<StageId, String>,
}

impl StaticStageDirectory {
    pub fn new(stages: BTreeMap<StageId, String>) -> Self {
        Self { stages }
    }

    pub fn insert(&mut self, stage_id: StageId, name: impl Into<String>) {
        self.stages.insert(stage_id, name.into());
    }

    /// Entries from `other` win over existing ones.
    pub fn merge(&mut self, other: StaticStageDirectory) {
        self.stages.extend(other.stages);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl FromIterator<(StageId, String)> for StaticStageDirectory {
    fn from_iter<T: IntoIterator<Item = (StageId, String)>>(iter: T) -> Self {
        Self { stages: iter.into_iter().collect() }
    }
}

impl StageDirectory for StaticStageDirectory {
    fn stage_name(&self, stage_id: StageId) -> Option<String> {
        self.stages.get(&stage_id).cloned()
    }
}
