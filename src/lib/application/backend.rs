use crate::domain::{
    CanonicalError, CreateNetworkRequest, CreateVolumeRequest, InstallRuntimeRequest, LogStream,
    MetricsRequest, RunJobRequest, ToolOutcome, WorkflowRequest,
};
use async_trait::async_trait;

/// Operations every joblet adapter provides.
///
/// Job identifiers reaching these methods are already resolved to full form.
/// Implementations translate their transport failures into [`CanonicalError`]
/// and return payloads normalised through [`crate::domain::records`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn run_job(&self, request: &RunJobRequest) -> ToolOutcome;
    async fn list_jobs(&self) -> ToolOutcome;
    async fn job_status(&self, job_uuid: &str) -> ToolOutcome;
    /// Live log lines for a job. Dropping or cancelling the stream releases the producer.
    async fn stream_logs(&self, job_uuid: &str) -> Result<LogStream, CanonicalError>;
    async fn stop_job(&self, job_uuid: &str) -> ToolOutcome;
    async fn cancel_job(&self, job_uuid: &str) -> ToolOutcome;
    async fn delete_job(&self, job_uuid: &str) -> ToolOutcome;
    async fn delete_all_jobs(&self) -> ToolOutcome;

    async fn create_volume(&self, request: &CreateVolumeRequest) -> ToolOutcome;
    async fn list_volumes(&self) -> ToolOutcome;
    async fn remove_volume(&self, name: &str) -> ToolOutcome;

    async fn create_network(&self, request: &CreateNetworkRequest) -> ToolOutcome;
    async fn list_networks(&self) -> ToolOutcome;
    async fn remove_network(&self, name: &str) -> ToolOutcome;

    async fn system_status(&self) -> ToolOutcome;
    async fn system_metrics(&self, request: &MetricsRequest) -> ToolOutcome;
    async fn gpu_status(&self) -> ToolOutcome;
    async fn list_nodes(&self) -> ToolOutcome;

    async fn list_runtimes(&self) -> ToolOutcome;
    async fn runtime_info(&self, runtime: &str) -> ToolOutcome;
    async fn install_runtime(&self, request: &InstallRuntimeRequest) -> ToolOutcome;
    async fn remove_runtime(&self, runtime: &str) -> ToolOutcome;

    async fn run_workflow(&self, request: &WorkflowRequest) -> ToolOutcome;

    /// Releases connections and in-flight work. Called once on server exit.
    async fn shutdown(&self);
}
