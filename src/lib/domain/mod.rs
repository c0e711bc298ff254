pub mod error;
pub mod records;
pub mod requests;
pub mod result;
pub mod stream;

pub use error::{CanonicalError, ErrorKind};
pub use requests::{
    CreateNetworkRequest, CreateVolumeRequest, InstallRuntimeRequest, MetricsRequest,
    RunJobRequest, ToolInvocation, VolumeType, WorkflowRequest,
};
pub use result::{CanonicalResult, ToolOutcome};
pub use stream::{LogSink, LogStream};
