use super::ToolContext;
use super::schema::{InputSchema, ValidatedArgs};
use crate::domain::ToolOutcome;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ToolOutcome> + Send + 'a>>;

/// Maps validated arguments onto backend calls.
pub type ToolHandler = for<'a> fn(ToolContext<'a>, ValidatedArgs) -> ToolFuture<'a>;

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: InputSchema,
}

impl ToolSpec {
    pub fn new(name: &'static str, description: &'static str, input_schema: InputSchema) -> Self {
        Self {
            name,
            description,
            input_schema,
        }
    }

    /// Shape used in the MCP `tools/list` response.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema.to_json_schema(),
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    Duplicate(String),
}

struct RegisteredTool {
    spec: ToolSpec,
    handler: ToolHandler,
}

/// Tools in registration order, with name lookup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec, handler: ToolHandler) -> Result<(), RegistryError> {
        if self.index.contains_key(spec.name) {
            return Err(RegistryError::Duplicate(spec.name.to_string()));
        }
        self.index.insert(spec.name, self.tools.len());
        self.tools.push(RegisteredTool { spec, handler });
        Ok(())
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter().map(|tool| &tool.spec)
    }

    pub fn get(&self, name: &str) -> Option<(&ToolSpec, ToolHandler)> {
        self.index
            .get(name)
            .map(|&position| &self.tools[position])
            .map(|tool| (&tool.spec, tool.handler))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
