//! Pipeline stages and the per-stage updates yielded by streaming

use serde::{Deserialize, Serialize};

use crate::state::StateUpdate;

/// A node in the fixed pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Retrieve,
    Generate,
}

impl Stage {
    /// Execution order: `START -> Retrieve -> Generate -> END`
    pub const ORDER: [Stage; 2] = [Stage::Retrieve, Stage::Generate];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Retrieve => "retrieve",
            Stage::Generate => "generate",
        }
    }

    /// The stage that runs after this one, `None` meaning END
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Retrieve => Some(Stage::Generate),
            Stage::Generate => None,
        }
    }

    /// Whether this is the terminal stage
    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

/// The delta produced by one completed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageUpdate {
    pub stage: Stage,
    pub update: StateUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_is_linear() {
        assert_eq!(Stage::Retrieve.next(), Some(Stage::Generate));
        assert!(Stage::Generate.is_terminal());
        assert_eq!(Stage::ORDER[0], Stage::Retrieve);
    }

    #[test]
    fn test_stage_update_serializes_stage_name() {
        let update = StageUpdate {
            stage: Stage::Retrieve,
            update: StateUpdate::context(vec!["doc".into()]),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["stage"], "retrieve");
        assert_eq!(json["update"]["context"][0], "doc");
    }
}
