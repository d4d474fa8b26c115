// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 dagflow contributors

//! Task definition structures
//!
//! A [`TaskDefinition`] is the reusable schema of a task (a "component"): its
//! typed inputs, ordered typed outputs, default resources and the body that
//! implements it. Definitions are instantiated into task nodes by the builder.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::resources::ResourceProfile;
use crate::artifact::{DataType, ParamValue};

/// Declared input of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    /// Input name (unique within the definition)
    pub name: String,

    /// Declared type
    #[serde(rename = "type")]
    pub data_type: DataType,

    /// Value used when the input is left unbound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
}

/// Declared output of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Output name (unique within the definition)
    pub name: String,

    /// Declared type
    #[serde(rename = "type")]
    pub data_type: DataType,
}

/// External pipeline parameter declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub data_type: DataType,

    /// Used when the parameter is not supplied at submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
}

/// Reference to the code that implements a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BodyRef {
    /// A body registered by name with the scheduler's body registry
    Registered {
        /// Registry name
        name: String,
    },

    /// Shell command
    Shell {
        /// Shell command to run
        command: String,

        /// Shell to use (sh, bash, etc.)
        #[serde(default = "default_shell")]
        shell: String,

        /// Extra environment variables
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
}

fn default_shell() -> String {
    "sh".to_string()
}

impl BodyRef {
    pub fn registered(name: impl Into<String>) -> Self {
        Self::Registered { name: name.into() }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self::Shell {
            command: command.into(),
            shell: default_shell(),
            env: BTreeMap::new(),
        }
    }

    /// Short human-readable description
    pub fn describe(&self) -> String {
        match self {
            Self::Registered { name } => format!("registered:{}", name),
            Self::Shell { shell, .. } => format!("shell:{}", shell),
        }
    }
}

/// Reusable schema of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Component name
    pub name: String,

    /// Component description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Typed inputs
    #[serde(default)]
    pub inputs: Vec<InputSpec>,

    /// Typed outputs, in declaration order
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,

    /// Default resources for every task built from this definition
    #[serde(default, skip_serializing_if = "ResourceProfile::is_empty")]
    pub resources: ResourceProfile,

    /// Implementation
    pub body: BodyRef,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>, body: BodyRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            resources: ResourceProfile::default(),
            body,
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Declare a required input
    pub fn input(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.inputs.push(InputSpec {
            name: name.into(),
            data_type,
            default: None,
        });
        self
    }

    /// Declare an input with a default value
    pub fn input_with_default(
        mut self,
        name: impl Into<String>,
        data_type: DataType,
        default: impl Into<ParamValue>,
    ) -> Self {
        self.inputs.push(InputSpec {
            name: name.into(),
            data_type,
            default: Some(default.into()),
        });
        self
    }

    /// Declare an output
    pub fn output(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.outputs.push(OutputSpec {
            name: name.into(),
            data_type,
        });
        self
    }

    pub fn resources(mut self, profile: ResourceProfile) -> Self {
        self.resources = profile;
        self
    }

    pub fn get_input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn get_output(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.name == name)
    }
}
