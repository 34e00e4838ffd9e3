//! Declarative tool catalogs exposed to the model.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::tool::Tool;
use super::types::ToolParameters;

/// One entry of a tool catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Render in the completions API `tools` shape.
    pub fn to_function_definition(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters.schema,
            }
        })
    }
}

/// The list of callable tools for a persona.
///
/// Which catalog a persona gets is decided by the caller; the loop only
/// forwards it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ToolCatalog {
    specs: Vec<ToolSpec>,
}

impl ToolCatalog {
    pub fn new(specs: Vec<ToolSpec>) -> Self {
        Self { specs }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive a catalog from registered executors.
    pub fn from_tools(tools: &[Arc<dyn Tool>]) -> Self {
        Self {
            specs: tools
                .iter()
                .map(|tool| {
                    ToolSpec::new(tool.name(), tool.description(), tool.parameters().clone())
                })
                .collect(),
        }
    }

    pub fn with(mut self, spec: ToolSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn to_function_definitions(&self) -> Vec<serde_json::Value> {
        self.specs.iter().map(ToolSpec::to_function_definition).collect()
    }
}
