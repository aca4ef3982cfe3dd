pub mod config;
pub mod container;
pub mod errors;
pub mod exec;
pub mod marker;
pub mod orchestrator;
pub mod screen;
pub mod step;
pub mod sync;

pub use config::{BackupConfig, ConfigFile, Overrides, load_config_file, parse_config};
pub use errors::{BackupError, BackupOutcome, EXIT_FATAL, exit_code};
pub use exec::{Clock, CommandOutput, CommandRunner, ProcessRunner, TokioClock};
pub use marker::{MarkerStore, RunMarker};
pub use orchestrator::{CheckReport, Orchestrator, RunOptions};
pub use step::Step;
