use crate::error::CatalogError;
use coinquest_types::{Coins, NetworkId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Static definition of a sponsored task. Not mutated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub name: String,
    pub reward: Coins,
    /// Per-day completion cap.
    pub max_turns: u32,
    pub network: NetworkId,
}

/// Closed task→provider mapping, validated once at configuration load.
/// An unknown network or duplicate task id fails construction instead of
/// silently defaulting at click time.
#[derive(Debug)]
pub struct TaskCatalog {
    tasks: HashMap<TaskId, TaskDefinition>,
}

impl TaskCatalog {
    pub fn new(
        definitions: Vec<TaskDefinition>,
        networks: &HashSet<NetworkId>,
    ) -> Result<Self, CatalogError> {
        let mut tasks = HashMap::with_capacity(definitions.len());

        for def in definitions {
            if def.max_turns == 0 {
                return Err(CatalogError::ZeroTurns(def.id.to_string()));
            }
            if !networks.contains(&def.network) {
                return Err(CatalogError::UnknownNetwork {
                    task: def.id.to_string(),
                    network: def.network.to_string(),
                });
            }
            if tasks.insert(def.id.clone(), def.clone()).is_some() {
                return Err(CatalogError::DuplicateTask(def.id.to_string()));
            }
        }

        info!(task_count = tasks.len(), "📋 Task catalog loaded");
        Ok(Self { tasks })
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskDefinition> {
        self.tasks.get(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
