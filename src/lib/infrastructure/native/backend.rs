use super::connection::RpcConnection;
use super::tls::{Connector, TlsConnector};
use crate::application::backend::JobBackend;
use crate::config::{ConfigDocument, NodeConfig, ServerSettings};
use crate::domain::records::{
    job_action, job_list, job_record, named_action, named_list, named_record, snapshot,
};
use crate::domain::{
    CanonicalError, CanonicalResult, CreateNetworkRequest, CreateVolumeRequest,
    InstallRuntimeRequest, LogStream, MetricsRequest, RunJobRequest, ToolOutcome, WorkflowRequest,
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Adapter that talks to joblet directly over one multiplexed RPC connection.
#[derive(Clone)]
pub struct NativeBackend {
    connection: RpcConnection,
    document: ConfigDocument,
    active_node: String,
}

impl NativeBackend {
    /// Builds the mTLS connector for the selected node. Nothing is dialled until the first call.
    pub fn connect_lazily(
        settings: &ServerSettings,
        document: ConfigDocument,
        node: &NodeConfig,
    ) -> Result<Self, CanonicalError> {
        let connector = TlsConnector::for_node(node, settings.connect_timeout)?;
        info!(
            node = %node.name,
            address = %node.address,
            secure = !node.is_insecure(),
            "Using native joblet backend"
        );
        Ok(Self::with_connector(
            Arc::new(connector),
            document,
            node.name.clone(),
            settings.request_timeout,
        ))
    }

    pub fn with_connector(
        connector: Arc<dyn Connector>,
        document: ConfigDocument,
        active_node: String,
        request_timeout: Duration,
    ) -> Self {
        Self {
            connection: RpcConnection::new(connector, request_timeout),
            document,
            active_node,
        }
    }

    pub fn connection(&self) -> &RpcConnection {
        &self.connection
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, CanonicalError> {
        self.connection.call(method, params).await
    }

    async fn call_with<T: Serialize + Sync>(
        &self,
        method: &str,
        request: &T,
    ) -> Result<Value, CanonicalError> {
        let params = serde_json::to_value(request).map_err(|err| {
            CanonicalError::internal(format!("failed to encode {method} parameters: {err}"))
        })?;
        self.call(method, params).await
    }
}

#[async_trait]
impl JobBackend for NativeBackend {
    async fn run_job(&self, request: &RunJobRequest) -> ToolOutcome {
        job_record(self.call_with("job.run", request).await?)
    }

    async fn list_jobs(&self) -> ToolOutcome {
        job_list(self.call("job.list", json!({})).await?)
    }

    async fn job_status(&self, job_uuid: &str) -> ToolOutcome {
        job_record(self.call("job.status", json!({ "uuid": job_uuid })).await?)
    }

    async fn stream_logs(&self, job_uuid: &str) -> Result<LogStream, CanonicalError> {
        self.connection
            .stream("job.logs", json!({ "uuid": job_uuid }))
            .await
    }

    async fn stop_job(&self, job_uuid: &str) -> ToolOutcome {
        self.call("job.stop", json!({ "uuid": job_uuid })).await?;
        Ok(job_action(job_uuid, "stopped"))
    }

    async fn cancel_job(&self, job_uuid: &str) -> ToolOutcome {
        self.call("job.cancel", json!({ "uuid": job_uuid })).await?;
        Ok(job_action(job_uuid, "cancelled"))
    }

    async fn delete_job(&self, job_uuid: &str) -> ToolOutcome {
        self.call("job.delete", json!({ "uuid": job_uuid })).await?;
        Ok(job_action(job_uuid, "deleted"))
    }

    async fn delete_all_jobs(&self) -> ToolOutcome {
        self.call("job.deleteAll", json!({})).await?;
        Ok(CanonicalResult::new(json!({ "action": "deleted_all" }))
            .with_summary("deleted all non-running jobs"))
    }

    async fn create_volume(&self, request: &CreateVolumeRequest) -> ToolOutcome {
        self.call_with("volume.create", request).await?;
        Ok(named_action("volume", &request.name, "created"))
    }

    async fn list_volumes(&self) -> ToolOutcome {
        named_list(self.call("volume.list", json!({})).await?, "volumes")
    }

    async fn remove_volume(&self, name: &str) -> ToolOutcome {
        self.call("volume.remove", json!({ "name": name })).await?;
        Ok(named_action("volume", name, "removed"))
    }

    async fn create_network(&self, request: &CreateNetworkRequest) -> ToolOutcome {
        self.call_with("network.create", request).await?;
        Ok(named_action("network", &request.name, "created"))
    }

    async fn list_networks(&self) -> ToolOutcome {
        named_list(self.call("network.list", json!({})).await?, "networks")
    }

    async fn remove_network(&self, name: &str) -> ToolOutcome {
        self.call("network.remove", json!({ "name": name })).await?;
        Ok(named_action("network", name, "removed"))
    }

    async fn system_status(&self) -> ToolOutcome {
        snapshot(self.call("monitor.status", json!({})).await?, "status")
    }

    async fn system_metrics(&self, request: &MetricsRequest) -> ToolOutcome {
        snapshot(self.call_with("monitor.metrics", request).await?, "samples")
    }

    async fn gpu_status(&self) -> ToolOutcome {
        snapshot(self.call("monitor.gpu", json!({})).await?, "gpus")
    }

    async fn list_nodes(&self) -> ToolOutcome {
        let nodes: Vec<Value> = self
            .document
            .nodes()
            .map(|node| {
                json!({
                    "name": node.name,
                    "address": node.address,
                    "active": node.name == self.active_node,
                    "insecure": node.is_insecure(),
                })
            })
            .collect();
        named_list(Value::Array(nodes), "nodes")
    }

    async fn list_runtimes(&self) -> ToolOutcome {
        named_list(self.call("runtime.list", json!({})).await?, "runtimes")
    }

    async fn runtime_info(&self, runtime: &str) -> ToolOutcome {
        named_record(
            self.call("runtime.info", json!({ "runtime": runtime })).await?,
            "runtime",
        )
    }

    async fn install_runtime(&self, request: &InstallRuntimeRequest) -> ToolOutcome {
        self.call(
            "runtime.install",
            json!({
                "runtime_spec": request.runtime_spec,
                "force_reinstall": request.force_reinstall,
            }),
        )
        .await?;
        Ok(named_action("runtime", &request.runtime_spec, "installed"))
    }

    async fn remove_runtime(&self, runtime: &str) -> ToolOutcome {
        self.call("runtime.remove", json!({ "runtime": runtime }))
            .await?;
        Ok(named_action("runtime", runtime, "removed"))
    }

    async fn run_workflow(&self, request: &WorkflowRequest) -> ToolOutcome {
        let path = &request.workflow_file;
        let content = tokio::fs::read_to_string(path).await.map_err(|err| {
            let message = format!("cannot read workflow file '{}': {err}", path.display());
            match err.kind() {
                io::ErrorKind::NotFound => CanonicalError::not_found(message),
                _ => CanonicalError::validation(message),
            }
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        snapshot(
            self.call("workflow.run", json!({ "name": name, "content": content }))
                .await?,
            "jobs",
        )
    }

    async fn shutdown(&self) {
        self.connection.close().await;
    }
}
