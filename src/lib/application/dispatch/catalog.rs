//! The joblet tool set: schemas plus the handlers that turn validated
//! arguments into backend calls.

use super::ToolContext;
use super::registry::{RegistryError, ToolFuture, ToolRegistry, ToolSpec};
use super::schema::{FieldSpec, InputSchema, ValidatedArgs};
use crate::domain::{
    CanonicalError, CanonicalResult, CreateNetworkRequest, CreateVolumeRequest,
    InstallRuntimeRequest, LogStream, MetricsRequest, RunJobRequest, VolumeType, WorkflowRequest,
};
use serde_json::json;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

const DEFAULT_LOG_TIMEOUT_SECS: i64 = 30;
const VOLUME_TYPES: &[&str] = &["filesystem", "memory"];

fn job_uuid_field() -> FieldSpec {
    FieldSpec::string(
        "job_uuid",
        "Job UUID; a unique prefix such as the first 8 characters is accepted",
    )
    .required()
}

/// Registers every joblet tool in catalogue order.
pub fn build_registry() -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();

    registry.register(
        ToolSpec::new(
            "joblet_run_job",
            "Run a command as a joblet job with optional resource limits, runtime, network and volumes",
            InputSchema::new(vec![
                FieldSpec::string("command", "Executable to run").required(),
                FieldSpec::string_list("args", "Arguments passed to the command"),
                FieldSpec::string("name", "Human readable job name"),
                FieldSpec::integer("max_cpu", "CPU limit in percent (100 = one core)").range(0, 10000),
                FieldSpec::integer("max_memory", "Memory limit in MB").at_least(1),
                FieldSpec::integer("max_iobps", "IO bandwidth limit in bytes per second").at_least(0),
                FieldSpec::string("cpu_cores", "CPU cores to pin to, e.g. \"0-3\" or \"1,3\""),
                FieldSpec::integer("gpu_count", "Number of GPUs to allocate").range(0, 16),
                FieldSpec::integer("gpu_memory_mb", "Minimum GPU memory in MB").at_least(0),
                FieldSpec::string("runtime", "Runtime to execute in, e.g. python-3.11"),
                FieldSpec::string("network", "Network to attach the job to"),
                FieldSpec::string_list("volumes", "Volumes to mount"),
                FieldSpec::string_map("environment", "Environment variables"),
                FieldSpec::string_map("secret_environment", "Secret environment variables, never logged"),
                FieldSpec::string("work_dir", "Working directory inside the job"),
                FieldSpec::string("schedule", "Schedule spec, e.g. \"10min\" or an RFC 3339 time"),
            ]),
        ),
        run_job,
    )?;
    registry.register(
        ToolSpec::new("joblet_list_jobs", "List all jobs with their status", InputSchema::empty()),
        list_jobs,
    )?;
    registry.register(
        ToolSpec::new(
            "joblet_get_job_status",
            "Get detailed status of a job",
            InputSchema::new(vec![job_uuid_field()]),
        ),
        job_status,
    )?;
    registry.register(
        ToolSpec::new(
            "joblet_get_job_logs",
            "Collect log output of a job until it finishes or the timeout elapses",
            InputSchema::new(vec![
                job_uuid_field(),
                FieldSpec::integer("lines", "Only return the last N lines").at_least(1),
                FieldSpec::integer("timeout_seconds", "How long to wait for output")
                    .range(1, 600)
                    .default_value(json!(DEFAULT_LOG_TIMEOUT_SECS)),
            ]),
        ),
        job_logs,
    )?;
    registry.register(
        ToolSpec::new(
            "joblet_stop_job",
            "Stop a running job",
            InputSchema::new(vec![job_uuid_field()]),
        ),
        stop_job,
    )?;
    registry.register(
        ToolSpec::new(
            "joblet_cancel_job",
            "Cancel a scheduled job before it starts",
            InputSchema::new(vec![job_uuid_field()]),
        ),
        cancel_job,
    )?;
    registry.register(
        ToolSpec::new(
            "joblet_delete_job",
            "Delete a finished job and its logs",
            InputSchema::new(vec![job_uuid_field()]),
        ),
        delete_job,
    )?;
    registry.register(
        ToolSpec::new(
            "joblet_delete_all_jobs",
            "Delete every job that is not running",
            InputSchema::empty(),
        ),
        delete_all_jobs,
    )?;

    registry.register(
        ToolSpec::new(
            "joblet_create_volume",
            "Create a persistent volume",
            InputSchema::new(vec![
                FieldSpec::string("name", "Volume name").required(),
                FieldSpec::string("size", "Volume size, e.g. 1GB or 500MB").required(),
                FieldSpec::string("type", "Volume type")
                    .one_of(VOLUME_TYPES)
                    .default_value(json!("filesystem")),
            ]),
        ),
        create_volume,
    )?;
    registry.register(
        ToolSpec::new("joblet_list_volumes", "List volumes", InputSchema::empty()),
        list_volumes,
    )?;
    registry.register(
        ToolSpec::new(
            "joblet_remove_volume",
            "Remove a volume",
            InputSchema::new(vec![FieldSpec::string("name", "Volume name").required()]),
        ),
        remove_volume,
    )?;

    registry.register(
        ToolSpec::new(
            "joblet_create_network",
            "Create an isolated network",
            InputSchema::new(vec![
                FieldSpec::string("name", "Network name").required(),
                FieldSpec::string("cidr", "Address range, e.g. 10.10.0.0/24").required(),
            ]),
        ),
        create_network,
    )?;
    registry.register(
        ToolSpec::new("joblet_list_networks", "List networks", InputSchema::empty()),
        list_networks,
    )?;
    registry.register(
        ToolSpec::new(
            "joblet_remove_network",
            "Remove a network",
            InputSchema::new(vec![FieldSpec::string("name", "Network name").required()]),
        ),
        remove_network,
    )?;

    registry.register(
        ToolSpec::new(
            "joblet_get_system_status",
            "Get host status of the joblet node",
            InputSchema::empty(),
        ),
        system_status,
    )?;
    registry.register(
        ToolSpec::new(
            "joblet_get_system_metrics",
            "Sample CPU, memory, disk and network metrics",
            InputSchema::new(vec![
                FieldSpec::integer("interval", "Sampling interval in seconds")
                    .range(1, 60)
                    .default_value(json!(1)),
            ]),
        ),
        system_metrics,
    )?;
    registry.register(
        ToolSpec::new("joblet_get_gpu_status", "Get GPU inventory and usage", InputSchema::empty()),
        gpu_status,
    )?;
    registry.register(
        ToolSpec::new("joblet_list_nodes", "List configured joblet nodes", InputSchema::empty()),
        list_nodes,
    )?;

    registry.register(
        ToolSpec::new("joblet_list_runtimes", "List installed runtimes", InputSchema::empty()),
        list_runtimes,
    )?;
    registry.register(
        ToolSpec::new(
            "joblet_get_runtime_info",
            "Show details of an installed runtime",
            InputSchema::new(vec![FieldSpec::string("runtime", "Runtime name").required()]),
        ),
        runtime_info,
    )?;
    registry.register(
        ToolSpec::new(
            "joblet_install_runtime",
            "Install a runtime on the node",
            InputSchema::new(vec![
                FieldSpec::string("runtime_spec", "Runtime to install, e.g. python-3.11-ml")
                    .required(),
                FieldSpec::boolean("force_reinstall", "Reinstall if already present")
                    .default_value(json!(false)),
            ]),
        ),
        install_runtime,
    )?;
    registry.register(
        ToolSpec::new(
            "joblet_remove_runtime",
            "Remove an installed runtime",
            InputSchema::new(vec![FieldSpec::string("runtime", "Runtime name").required()]),
        ),
        remove_runtime,
    )?;

    registry.register(
        ToolSpec::new(
            "joblet_run_workflow",
            "Run a workflow defined in a YAML file",
            InputSchema::new(vec![
                FieldSpec::string("workflow_file", "Path to the workflow YAML file").required(),
            ]),
        ),
        run_workflow,
    )?;

    Ok(registry)
}

fn run_job<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move {
        let request = RunJobRequest {
            command: args.required_str("command")?.to_string(),
            args: args.string_list("args"),
            name: args.string("name"),
            max_cpu: args.u64("max_cpu"),
            max_memory: args.u64("max_memory"),
            max_iobps: args.u64("max_iobps"),
            cpu_cores: args.string("cpu_cores"),
            gpu_count: args.u64("gpu_count"),
            gpu_memory_mb: args.u64("gpu_memory_mb"),
            runtime: args.string("runtime"),
            network: args.string("network"),
            volumes: args.string_list("volumes"),
            environment: args.string_map("environment"),
            secret_environment: args.string_map("secret_environment"),
            work_dir: args.string("work_dir"),
            schedule: args.string("schedule"),
        };
        ctx.backend.run_job(&request).await
    })
}

fn list_jobs<'a>(ctx: ToolContext<'a>, _args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move { ctx.backend.list_jobs().await })
}

fn job_status<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move {
        let job_uuid = ctx.resolve_job(args.required_str("job_uuid")?).await?;
        ctx.backend.job_status(&job_uuid).await
    })
}

fn job_logs<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move {
        let job_uuid = ctx.resolve_job(args.required_str("job_uuid")?).await?;
        let tail = args.u64("lines").map(|lines| lines as usize);
        let wait = Duration::from_secs(
            args.u64("timeout_seconds")
                .unwrap_or(DEFAULT_LOG_TIMEOUT_SECS as u64),
        );

        let mut stream = ctx.backend.stream_logs(&job_uuid).await?;
        let collected = collect_logs(&mut stream, tail, wait).await;
        stream.cancel();
        let (lines, complete) = collected?;

        let summary = if lines.is_empty() {
            format!("no log output for job {job_uuid}")
        } else {
            lines.join("\n")
        };
        Ok(CanonicalResult::new(json!({
            "job_uuid": job_uuid,
            "lines": lines,
            "complete": complete,
        }))
        .with_summary(summary))
    })
}

/// Drains `stream` until it ends or `wait` elapses. The flag is `false` when cut short.
async fn collect_logs(
    stream: &mut LogStream,
    tail: Option<usize>,
    wait: Duration,
) -> Result<(Vec<String>, bool), CanonicalError> {
    let deadline = Instant::now() + wait;
    let mut lines = VecDeque::new();
    loop {
        match timeout_at(deadline, stream.next_line()).await {
            Ok(Some(Ok(line))) => {
                lines.push_back(line);
                if tail.is_some_and(|limit| lines.len() > limit) {
                    lines.pop_front();
                }
            }
            Ok(Some(Err(err))) => return Err(err),
            Ok(None) => return Ok((lines.into(), true)),
            Err(_) => return Ok((lines.into(), false)),
        }
    }
}

fn stop_job<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move {
        let job_uuid = ctx.resolve_job(args.required_str("job_uuid")?).await?;
        ctx.backend.stop_job(&job_uuid).await
    })
}

fn cancel_job<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move {
        let job_uuid = ctx.resolve_job(args.required_str("job_uuid")?).await?;
        ctx.backend.cancel_job(&job_uuid).await
    })
}

fn delete_job<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move {
        let job_uuid = ctx.resolve_job(args.required_str("job_uuid")?).await?;
        ctx.backend.delete_job(&job_uuid).await
    })
}

fn delete_all_jobs<'a>(ctx: ToolContext<'a>, _args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move { ctx.backend.delete_all_jobs().await })
}

fn create_volume<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move {
        let volume_type = args
            .str("type")
            .and_then(VolumeType::parse)
            .unwrap_or_default();
        let request = CreateVolumeRequest {
            name: args.required_str("name")?.to_string(),
            size: args.required_str("size")?.to_string(),
            volume_type,
        };
        ctx.backend.create_volume(&request).await
    })
}

fn list_volumes<'a>(ctx: ToolContext<'a>, _args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move { ctx.backend.list_volumes().await })
}

fn remove_volume<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move { ctx.backend.remove_volume(args.required_str("name")?).await })
}

fn create_network<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move {
        let request = CreateNetworkRequest {
            name: args.required_str("name")?.to_string(),
            cidr: args.required_str("cidr")?.to_string(),
        };
        ctx.backend.create_network(&request).await
    })
}

fn list_networks<'a>(ctx: ToolContext<'a>, _args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move { ctx.backend.list_networks().await })
}

fn remove_network<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move { ctx.backend.remove_network(args.required_str("name")?).await })
}

fn system_status<'a>(ctx: ToolContext<'a>, _args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move { ctx.backend.system_status().await })
}

fn system_metrics<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move {
        let request = MetricsRequest {
            interval: args.u64("interval").unwrap_or(1),
        };
        ctx.backend.system_metrics(&request).await
    })
}

fn gpu_status<'a>(ctx: ToolContext<'a>, _args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move { ctx.backend.gpu_status().await })
}

fn list_nodes<'a>(ctx: ToolContext<'a>, _args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move { ctx.backend.list_nodes().await })
}

fn list_runtimes<'a>(ctx: ToolContext<'a>, _args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move { ctx.backend.list_runtimes().await })
}

fn runtime_info<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move { ctx.backend.runtime_info(args.required_str("runtime")?).await })
}

fn install_runtime<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move {
        let request = InstallRuntimeRequest {
            runtime_spec: args.required_str("runtime_spec")?.to_string(),
            force_reinstall: args.bool("force_reinstall"),
        };
        ctx.backend.install_runtime(&request).await
    })
}

fn remove_runtime<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move { ctx.backend.remove_runtime(args.required_str("runtime")?).await })
}

fn run_workflow<'a>(ctx: ToolContext<'a>, args: ValidatedArgs) -> ToolFuture<'a> {
    Box::pin(async move {
        let request = WorkflowRequest {
            workflow_file: PathBuf::from(args.required_str("workflow_file")?),
        };
        ctx.backend.run_workflow(&request).await
    })
}
