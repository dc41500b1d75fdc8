use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::errors::SchemaError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParameterType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub kind: ParameterType,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, ParameterSpec>,
    pub required: Vec<String>,
}

impl ToolSpec {
    pub fn validate(&self) -> Result<(), SchemaError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(SchemaError::EmptyToolName);
        }
        let well_formed = name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            && name.chars().next().is_some_and(|ch| ch.is_ascii_alphabetic());
        if !well_formed || name != self.name {
            return Err(SchemaError::InvalidToolName(self.name.clone()));
        }
        if self.description.trim().is_empty() {
            return Err(SchemaError::MissingDescription { tool: self.name.clone() });
        }
        if self.parameters.is_empty() {
            return Err(SchemaError::NoParameters { tool: self.name.clone() });
        }

        let mut seen = BTreeSet::new();
        for field in &self.required {
            if !self.parameters.contains_key(field) {
                return Err(SchemaError::RequiredFieldNotDeclared {
                    tool: self.name.clone(),
                    field: field.clone(),
                });
            }
            if !seen.insert(field.as_str()) {
                return Err(SchemaError::DuplicateRequiredField {
                    tool: self.name.clone(),
                    field: field.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn is_required(&self, field: &str) -> bool {
        self.required.iter().any(|required| required == field)
    }

    /// OpenAI function-calling declaration.
    pub fn to_function_json(&self) -> Value {
        let properties = self
            .parameters
            .iter()
            .map(|(name, spec)| {
                (
                    name.clone(),
                    json!({ "type": spec.kind.as_str(), "description": spec.description }),
                )
            })
            .collect::<Map<String, Value>>();

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": self.required,
                },
            },
        })
    }
}

/// One deployable agent: instructions, tools and the memory it answers from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfiguration {
    pub name: String,
    pub description: String,
    pub model: String,
    pub policy_version: String,
    pub system_instructions: String,
    pub retrieval_instructions: String,
    pub tool_declarations: Vec<ToolSpec>,
    pub bound_memory_name: String,
}

impl AgentConfiguration {
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut names = BTreeSet::new();
        for tool in &self.tool_declarations {
            tool.validate()?;
            if !names.insert(tool.name.as_str()) {
                return Err(SchemaError::DuplicateTool(tool.name.clone()));
            }
        }
        Ok(())
    }

    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tool_declarations.iter().find(|tool| tool.name == name)
    }

    /// Content hash over every field; equal fingerprints mean an identical configuration.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        format!("{:x}", hasher.finalize())
    }
}
