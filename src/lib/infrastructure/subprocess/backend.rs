use super::command::{CommandBuilder, Invocation, OutputFormat};
use super::parse::{classify_failure, parse_json, parse_text};
use super::runner::ProcessRunner;
use crate::application::backend::JobBackend;
use crate::config::ServerSettings;
use crate::domain::records::{
    job_action, job_list, job_record, named_action, named_list, named_record, snapshot,
};
use crate::domain::{
    CanonicalError, CanonicalResult, CreateNetworkRequest, CreateVolumeRequest,
    InstallRuntimeRequest, LogStream, MetricsRequest, RunJobRequest, ToolOutcome, WorkflowRequest,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

/// Adapter that shells out to the `rnx` CLI, one process per operation.
#[derive(Debug, Clone)]
pub struct CliBackend {
    commands: CommandBuilder,
    runner: ProcessRunner,
}

impl CliBackend {
    pub fn new(commands: CommandBuilder, runner: ProcessRunner) -> Self {
        Self { commands, runner }
    }

    pub fn from_settings(settings: &ServerSettings) -> Self {
        info!(
            binary = %settings.rnx_binary.display(),
            max_processes = settings.max_processes,
            "Using rnx subprocess backend"
        );
        Self::new(
            CommandBuilder::new(Some(settings.config_path.clone()), settings.node.clone()),
            ProcessRunner::new(
                settings.rnx_binary.clone(),
                settings.max_processes,
                settings.command_timeout,
            ),
        )
    }

    /// Runs the invocation and returns its parsed stdout.
    async fn execute(&self, invocation: Invocation) -> Result<Value, CanonicalError> {
        let output = self.runner.run(&invocation).await?;
        if !output.success() {
            return Err(classify_failure(
                &invocation.label,
                output.code,
                &output.stderr,
                &output.stdout,
            ));
        }
        if !output.stderr.trim().is_empty() {
            debug!(command = %invocation, stderr = %output.stderr.trim(), "rnx wrote to stderr");
        }
        match invocation.output {
            OutputFormat::Json => parse_json(&invocation.label, &output.stdout),
            OutputFormat::Text => Ok(parse_text(&output.stdout)),
        }
    }
}

#[async_trait]
impl JobBackend for CliBackend {
    async fn run_job(&self, request: &RunJobRequest) -> ToolOutcome {
        let raw = self.execute(self.commands.run_job(request)).await?;
        job_record(raw)
    }

    async fn list_jobs(&self) -> ToolOutcome {
        job_list(self.execute(self.commands.list_jobs()).await?)
    }

    async fn job_status(&self, job_uuid: &str) -> ToolOutcome {
        job_record(self.execute(self.commands.job_status(job_uuid)).await?)
    }

    async fn stream_logs(&self, job_uuid: &str) -> Result<LogStream, CanonicalError> {
        self.runner.stream(&self.commands.job_logs(job_uuid)).await
    }

    async fn stop_job(&self, job_uuid: &str) -> ToolOutcome {
        self.execute(self.commands.stop_job(job_uuid)).await?;
        Ok(job_action(job_uuid, "stopped"))
    }

    async fn cancel_job(&self, job_uuid: &str) -> ToolOutcome {
        self.execute(self.commands.cancel_job(job_uuid)).await?;
        Ok(job_action(job_uuid, "cancelled"))
    }

    async fn delete_job(&self, job_uuid: &str) -> ToolOutcome {
        self.execute(self.commands.delete_job(job_uuid)).await?;
        Ok(job_action(job_uuid, "deleted"))
    }

    async fn delete_all_jobs(&self) -> ToolOutcome {
        self.execute(self.commands.delete_all_jobs()).await?;
        Ok(CanonicalResult::new(json!({ "action": "deleted_all" }))
            .with_summary("deleted all non-running jobs"))
    }

    async fn create_volume(&self, request: &CreateVolumeRequest) -> ToolOutcome {
        self.execute(self.commands.create_volume(request)).await?;
        Ok(named_action("volume", &request.name, "created"))
    }

    async fn list_volumes(&self) -> ToolOutcome {
        named_list(self.execute(self.commands.list_volumes()).await?, "volumes")
    }

    async fn remove_volume(&self, name: &str) -> ToolOutcome {
        self.execute(self.commands.remove_volume(name)).await?;
        Ok(named_action("volume", name, "removed"))
    }

    async fn create_network(&self, request: &CreateNetworkRequest) -> ToolOutcome {
        self.execute(self.commands.create_network(request)).await?;
        Ok(named_action("network", &request.name, "created"))
    }

    async fn list_networks(&self) -> ToolOutcome {
        named_list(self.execute(self.commands.list_networks()).await?, "networks")
    }

    async fn remove_network(&self, name: &str) -> ToolOutcome {
        self.execute(self.commands.remove_network(name)).await?;
        Ok(named_action("network", name, "removed"))
    }

    async fn system_status(&self) -> ToolOutcome {
        snapshot(self.execute(self.commands.system_status()).await?, "status")
    }

    async fn system_metrics(&self, request: &MetricsRequest) -> ToolOutcome {
        snapshot(
            self.execute(self.commands.system_metrics(request)).await?,
            "samples",
        )
    }

    async fn gpu_status(&self) -> ToolOutcome {
        snapshot(self.execute(self.commands.gpu_status()).await?, "gpus")
    }

    async fn list_nodes(&self) -> ToolOutcome {
        named_list(self.execute(self.commands.list_nodes()).await?, "nodes")
    }

    async fn list_runtimes(&self) -> ToolOutcome {
        named_list(self.execute(self.commands.list_runtimes()).await?, "runtimes")
    }

    async fn runtime_info(&self, runtime: &str) -> ToolOutcome {
        named_record(
            self.execute(self.commands.runtime_info(runtime)).await?,
            "runtime",
        )
    }

    async fn install_runtime(&self, request: &InstallRuntimeRequest) -> ToolOutcome {
        self.execute(self.commands.install_runtime(request)).await?;
        Ok(named_action("runtime", &request.runtime_spec, "installed"))
    }

    async fn remove_runtime(&self, runtime: &str) -> ToolOutcome {
        self.execute(self.commands.remove_runtime(runtime)).await?;
        Ok(named_action("runtime", runtime, "removed"))
    }

    async fn run_workflow(&self, request: &WorkflowRequest) -> ToolOutcome {
        snapshot(
            self.execute(self.commands.run_workflow(request)).await?,
            "jobs",
        )
    }

    async fn shutdown(&self) {
        debug!("rnx subprocess backend has no persistent resources");
    }
}
