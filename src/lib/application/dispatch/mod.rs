pub mod catalog;
pub mod registry;
pub mod resolver;
pub mod schema;


pub use catalog::build_registry;
pub use registry::{RegistryError, ToolFuture, ToolHandler, ToolRegistry, ToolSpec};
pub use schema::{FieldKind, FieldSpec, InputSchema, ValidatedArgs};

use crate::application::backend::JobBackend;
use crate::domain::{CanonicalError, ToolInvocation, ToolOutcome};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// What a handler gets to work with besides its arguments.
#[derive(Clone, Copy)]
pub struct ToolContext<'a> {
    pub backend: &'a dyn JobBackend,
}

impl ToolContext<'_> {
    pub async fn resolve_job(&self, supplied: &str) -> Result<String, CanonicalError> {
        resolver::resolve_job_id(self.backend, supplied).await
    }
}

/// Routes validated tool calls to the active backend.
pub struct Dispatcher {
    registry: ToolRegistry,
    backend: Arc<dyn JobBackend>,
    calls: AtomicU64,
}

impl Dispatcher {
    /// Dispatcher over the full joblet catalogue.
    pub fn new(backend: Arc<dyn JobBackend>) -> Result<Self, RegistryError> {
        Ok(Self::with_registry(backend, build_registry()?))
    }

    pub fn with_registry(backend: Arc<dyn JobBackend>, registry: ToolRegistry) -> Self {
        Self {
            registry,
            backend,
            calls: AtomicU64::new(0),
        }
    }

    pub fn list_tools(&self) -> Vec<&ToolSpec> {
        self.registry.specs().collect()
    }

    pub fn backend(&self) -> &Arc<dyn JobBackend> {
        &self.backend
    }

    pub async fn invoke(&self, invocation: ToolInvocation) -> ToolOutcome {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let tool = invocation.tool_name.as_str();

        let Some((spec, handler)) = self.registry.get(tool) else {
            warn!(call, tool, "Rejected call to unknown tool");
            return Err(CanonicalError::unknown_tool(tool));
        };

        let args = match spec.input_schema.validate(&invocation.arguments) {
            Ok(args) => args,
            Err(err) => {
                warn!(call, tool, error = %err.message, "Rejected tool arguments");
                return Err(err);
            }
        };

        debug!(call, tool, "Dispatching tool call");
        let started = Instant::now();
        let ctx = ToolContext {
            backend: self.backend.as_ref(),
        };
        let outcome = handler(ctx, args).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(_) => debug!(call, tool, elapsed_ms, "Tool call completed"),
            Err(err) => warn!(
                call,
                tool,
                elapsed_ms,
                kind = %err.kind,
                error = %err.message,
                detail = err.original_detail.as_deref().unwrap_or(""),
                "Tool call failed"
            ),
        }
        outcome
    }

    pub async fn shutdown(&self) {
        self.backend.shutdown().await;
    }
}
