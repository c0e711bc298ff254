use crate::domain::{
    CreateNetworkRequest, CreateVolumeRequest, InstallRuntimeRequest, MetricsRequest,
    RunJobRequest, WorkflowRequest,
};
use std::fmt;
use std::path::PathBuf;

/// How stdout of an invocation is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Text,
}

/// Arguments for one `rnx` run, excluding the binary itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
    pub output: OutputFormat,
    /// `group action` used in logs and error messages.
    pub label: String,
}

impl Invocation {
    /// Arguments with secret environment values masked, for logging.
    pub fn redacted_args(&self) -> Vec<String> {
        let mut redacted = Vec::with_capacity(self.args.len());
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                let name = arg.split_once('=').map(|(name, _)| name).unwrap_or(arg);
                redacted.push(format!("{name}=***"));
                mask_next = false;
            } else {
                mask_next = arg == "--secret-env";
                redacted.push(arg.clone());
            }
        }
        redacted
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Builds deterministic `rnx` argument vectors: same request, same argv.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBuilder {
    config_path: Option<PathBuf>,
    node: Option<String>,
}

impl CommandBuilder {
    pub fn new(config_path: Option<PathBuf>, node: Option<String>) -> Self {
        Self { config_path, node }
    }

    pub fn run_job(&self, request: &RunJobRequest) -> Invocation {
        let mut args = self.base(&["job", "run"]);
        push_opt(&mut args, "--name", request.name.as_deref());
        push_opt(&mut args, "--max-cpu", request.max_cpu);
        push_opt(&mut args, "--max-memory", request.max_memory);
        push_opt(&mut args, "--max-iobps", request.max_iobps);
        push_opt(&mut args, "--cpu-cores", request.cpu_cores.as_deref());
        push_opt(&mut args, "--gpu", request.gpu_count);
        push_opt(&mut args, "--gpu-memory", request.gpu_memory_mb.map(|mb| format!("{mb}MB")));
        push_opt(&mut args, "--runtime", request.runtime.as_deref());
        push_opt(&mut args, "--network", request.network.as_deref());
        for volume in &request.volumes {
            push_pair(&mut args, "--volume", volume);
        }
        for (key, value) in &request.environment {
            push_pair(&mut args, "--env", format!("{key}={value}"));
        }
        for (key, value) in &request.secret_environment {
            push_pair(&mut args, "--secret-env", format!("{key}={value}"));
        }
        push_opt(&mut args, "--workdir", request.work_dir.as_deref());
        push_opt(&mut args, "--schedule", request.schedule.as_deref());
        args.push("--json".to_string());
        args.push("--".to_string());
        args.push(request.command.clone());
        args.extend(request.args.iter().cloned());
        self.finish(args, OutputFormat::Json, "job run")
    }

    pub fn list_jobs(&self) -> Invocation {
        self.json(&["job", "list"], &[])
    }

    pub fn job_status(&self, job_uuid: &str) -> Invocation {
        self.json(&["job", "status"], &[job_uuid])
    }

    /// Streams until the job finishes; stdout is consumed line by line.
    pub fn job_logs(&self, job_uuid: &str) -> Invocation {
        self.text(&["job", "log"], &[job_uuid])
    }

    pub fn stop_job(&self, job_uuid: &str) -> Invocation {
        self.text(&["job", "stop"], &[job_uuid])
    }

    pub fn cancel_job(&self, job_uuid: &str) -> Invocation {
        self.text(&["job", "cancel"], &[job_uuid])
    }

    pub fn delete_job(&self, job_uuid: &str) -> Invocation {
        self.text(&["job", "delete"], &[job_uuid])
    }

    pub fn delete_all_jobs(&self) -> Invocation {
        self.text(&["job", "delete-all"], &[])
    }

    pub fn create_volume(&self, request: &CreateVolumeRequest) -> Invocation {
        let mut args = self.base(&["volume", "create", &request.name]);
        push_pair(&mut args, "--size", &request.size);
        push_pair(&mut args, "--type", request.volume_type.as_str());
        self.finish(args, OutputFormat::Text, "volume create")
    }

    pub fn list_volumes(&self) -> Invocation {
        self.json(&["volume", "list"], &[])
    }

    pub fn remove_volume(&self, name: &str) -> Invocation {
        self.text(&["volume", "remove"], &[name])
    }

    pub fn create_network(&self, request: &CreateNetworkRequest) -> Invocation {
        let mut args = self.base(&["network", "create", &request.name]);
        push_pair(&mut args, "--cidr", &request.cidr);
        self.finish(args, OutputFormat::Text, "network create")
    }

    pub fn list_networks(&self) -> Invocation {
        self.json(&["network", "list"], &[])
    }

    pub fn remove_network(&self, name: &str) -> Invocation {
        self.text(&["network", "remove"], &[name])
    }

    pub fn system_status(&self) -> Invocation {
        self.json(&["monitor", "status"], &[])
    }

    pub fn system_metrics(&self, request: &MetricsRequest) -> Invocation {
        let mut args = self.base(&["monitor", "top"]);
        push_pair(&mut args, "--interval", request.interval.to_string());
        args.push("--json".to_string());
        self.finish(args, OutputFormat::Json, "monitor top")
    }

    pub fn gpu_status(&self) -> Invocation {
        self.json(&["monitor", "gpu"], &[])
    }

    pub fn list_nodes(&self) -> Invocation {
        self.json(&["nodes"], &[])
    }

    pub fn list_runtimes(&self) -> Invocation {
        self.json(&["runtime", "list"], &[])
    }

    pub fn runtime_info(&self, runtime: &str) -> Invocation {
        self.json(&["runtime", "info"], &[runtime])
    }

    pub fn install_runtime(&self, request: &InstallRuntimeRequest) -> Invocation {
        let mut args = self.base(&["runtime", "install", &request.runtime_spec]);
        if request.force_reinstall {
            args.push("--force".to_string());
        }
        self.finish(args, OutputFormat::Text, "runtime install")
    }

    pub fn remove_runtime(&self, runtime: &str) -> Invocation {
        self.text(&["runtime", "remove"], &[runtime])
    }

    pub fn run_workflow(&self, request: &WorkflowRequest) -> Invocation {
        let mut args = self.base(&["workflow", "run"]);
        args.push(request.workflow_file.to_string_lossy().into_owned());
        args.push("--json".to_string());
        self.finish(args, OutputFormat::Json, "workflow run")
    }

    fn json(&self, command: &[&str], positional: &[&str]) -> Invocation {
        let mut args = self.base(command);
        args.extend(positional.iter().map(|value| value.to_string()));
        args.push("--json".to_string());
        self.finish(args, OutputFormat::Json, &command.join(" "))
    }

    fn text(&self, command: &[&str], positional: &[&str]) -> Invocation {
        let mut args = self.base(command);
        args.extend(positional.iter().map(|value| value.to_string()));
        self.finish(args, OutputFormat::Text, &command.join(" "))
    }

    fn base(&self, command: &[&str]) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.config_path {
            push_pair(&mut args, "--config", path.to_string_lossy());
        }
        if let Some(node) = &self.node {
            push_pair(&mut args, "--node", node);
        }
        args.extend(command.iter().map(|part| part.to_string()));
        args
    }

    fn finish(&self, args: Vec<String>, output: OutputFormat, label: &str) -> Invocation {
        Invocation {
            args,
            output,
            label: label.to_string(),
        }
    }
}

fn push_pair(args: &mut Vec<String>, flag: &str, value: impl ToString) {
    args.push(flag.to_string());
    args.push(value.to_string());
}

fn push_opt<T: ToString>(args: &mut Vec<String>, flag: &str, value: Option<T>) {
    if let Some(value) = value {
        push_pair(args, flag, value);
    }
}
