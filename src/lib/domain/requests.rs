use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A tool call as received from the MCP client, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// Accepts `null` or an object; anything else is reported as a validation problem by the caller.
    pub fn from_value(tool_name: impl Into<String>, arguments: Value) -> Option<Self> {
        match arguments {
            Value::Null => Some(Self::new(tool_name, Map::new())),
            Value::Object(map) => Some(Self::new(tool_name, map)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunJobRequest {
    pub command: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cpu: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_memory: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iobps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_memory_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub secret_environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    #[default]
    Filesystem,
    Memory,
}

impl VolumeType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "filesystem" => Some(VolumeType::Filesystem),
            "memory" => Some(VolumeType::Memory),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeType::Filesystem => "filesystem",
            VolumeType::Memory => "memory",
        }
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateVolumeRequest {
    pub name: String,
    pub size: String,
    #[serde(rename = "type")]
    pub volume_type: VolumeType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateNetworkRequest {
    pub name: String,
    pub cidr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallRuntimeRequest {
    pub runtime_spec: String,
    pub force_reinstall: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsRequest {
    pub interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowRequest {
    pub workflow_file: PathBuf,
}
