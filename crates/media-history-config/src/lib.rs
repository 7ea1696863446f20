pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{ApiConfig, Config, ExportConfig, PipelineConfig, SchedulerConfig, default_scheduler_config};
pub use credentials::{CredentialStore, TOKEN_ENV_VAR};
pub use paths::{PathManager, container_base_path};
