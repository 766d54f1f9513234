//! Recipe model: an ordered list of tagged build steps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Descriptive project metadata carried into the persisted model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// An ordered build recipe. Step order is significant: later steps may
/// reference elements created by earlier ones through their local `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default, alias = "projectInfo")]
    pub project_info: Option<ProjectInfo>,
    pub steps: Vec<Step>,
}

/// One untyped recipe step. Converted into a typed command at dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Recipe-local identifier other steps use to refer to this element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "commandType", alias = "command", alias = "command_type")]
    pub command_type: String,
    #[serde(default)]
    pub parameters: Value,
    /// Free-form metadata stored on the created element.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl Step {
    pub fn new(command_type: impl Into<String>, parameters: Value) -> Self {
        Self {
            id: None,
            command_type: command_type.into(),
            parameters,
            properties: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl Recipe {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            project_info: None,
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
