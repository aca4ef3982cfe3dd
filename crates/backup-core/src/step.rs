use std::fmt;

use serde::{Deserialize, Serialize};

/// Checkpoints of a backup run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Preflight,
    Warned,
    ServerStopped,
    ContainerStopped,
    Copied,
    ContainerStarted,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Preflight => "preflight",
            Step::Warned => "warned",
            Step::ServerStopped => "server-stopped",
            Step::ContainerStopped => "container-stopped",
            Step::Copied => "copied",
            Step::ContainerStarted => "container-started",
        }
    }

    /// Where a resumed run picks up after `self` completed.
    ///
    /// Nothing destructive has happened before the warnings are done, so
    /// `Preflight` restarts the whole sequence.
    pub fn resume_point(self) -> ResumePoint {
        match self {
            Step::Preflight => ResumePoint::Start,
            Step::Warned => ResumePoint::StopServer,
            Step::ServerStopped => ResumePoint::StopContainer,
            Step::ContainerStopped => ResumePoint::Copy,
            Step::Copied => ResumePoint::StartContainer,
            Step::ContainerStarted => ResumePoint::RestoreSession,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResumePoint {
    Start,
    StopServer,
    StopContainer,
    Copy,
    StartContainer,
    RestoreSession,
}
