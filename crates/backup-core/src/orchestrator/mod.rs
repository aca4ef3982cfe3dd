//! The backup sequence: preflight, session negotiation, warnings, shutdown,
//! container stop, mirror copy, restart and session restore.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::BackupConfig;
use crate::container::ContainerRuntime;
use crate::errors::{BackupError, BackupOutcome};
use crate::exec::{Clock, CommandRunner};
use crate::marker::{MarkerStore, RunMarker};
use crate::screen::{ScreenSession, SessionEntry};
use crate::step::{ResumePoint, Step};
use crate::sync;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Continue an interrupted run from its marker instead of refusing to start.
    pub resume: bool,
}

/// Result of the read-only preflight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub session: SessionEntry,
}

pub struct Orchestrator<'a> {
    config: &'a BackupConfig,
    runner: &'a dyn CommandRunner,
    clock: &'a dyn Clock,
    markers: &'a MarkerStore,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a BackupConfig,
        runner: &'a dyn CommandRunner,
        clock: &'a dyn Clock,
        markers: &'a MarkerStore,
    ) -> Self {
        Self {
            config,
            runner,
            clock,
            markers,
        }
    }

    /// Verify container, paths and session without changing anything.
    pub async fn check(&self) -> Result<CheckReport, BackupError> {
        self.preflight(ResumePoint::Start).await?;
        let session = self.find_session().await?;
        Ok(CheckReport { session })
    }

    pub async fn run(&self, options: RunOptions) -> Result<BackupOutcome, BackupError> {
        let previous = self.markers.load().await?;
        let start = match &previous {
            None => ResumePoint::Start,
            Some(marker) if !options.resume => {
                return Err(BackupError::Interrupted {
                    step: marker.completed,
                });
            }
            Some(marker) => {
                if marker.container != self.config.container {
                    return Err(BackupError::config(format!(
                        "run marker belongs to container {}, not {}",
                        marker.container, self.config.container
                    )));
                }
                info!(
                    "resuming run started {} after step {}",
                    marker.started_at, marker.completed
                );
                marker.completed.resume_point()
            }
        };

        self.preflight(start).await?;

        let mut marker = match previous {
            Some(marker) if start > ResumePoint::Start => marker,
            _ => RunMarker::new(&self.config.container, Step::Preflight),
        };
        let session = self.session();
        let runtime = self.runtime();

        if start == ResumePoint::Start {
            self.negotiate(&session).await?;
            self.send_warnings(&session).await?;
            // From here on the server goes down, so the run must be resumable.
            marker.advance(Step::Warned);
            self.markers.save(&marker).await?;
        }

        if start <= ResumePoint::StopServer {
            self.shutdown_server(&session, start == ResumePoint::StopServer)
                .await?;
            self.checkpoint(&mut marker, Step::ServerStopped).await;
        }

        if start <= ResumePoint::StopContainer {
            runtime.stop(&self.config.container).await?;
            self.checkpoint(&mut marker, Step::ContainerStopped).await;
        }

        if start <= ResumePoint::Copy {
            sync::mirror(
                self.runner,
                &self.config.tools.rsync,
                &self.config.data_dir,
                &self.config.destination(),
            )
            .await?;
            info!("backup copied to {}", self.config.destination().display());
            self.checkpoint(&mut marker, Step::Copied).await;
        }

        if start <= ResumePoint::StartContainer {
            runtime.start(&self.config.container).await?;
            self.checkpoint(&mut marker, Step::ContainerStarted).await;
        }

        let problems = self.restore_session(&session).await;
        self.finish().await;

        if problems.is_empty() {
            info!("backup of {} complete", self.config.container);
            Ok(BackupOutcome::Completed)
        } else {
            for problem in &problems {
                warn!("backup completed, but: {problem}");
            }
            Ok(BackupOutcome::CompletedWithWarnings(problems))
        }
    }

    async fn preflight(&self, start: ResumePoint) -> Result<(), BackupError> {
        let runtime = self.runtime();
        let container = &self.config.container;
        // A resumed run may find the container stopped on purpose.
        let present = if start <= ResumePoint::StopServer {
            runtime.is_running(container).await?
        } else {
            runtime.exists(container).await?
        };
        if !present {
            return Err(BackupError::ContainerMissing {
                container: container.clone(),
            });
        }

        if start <= ResumePoint::Copy {
            ensure_dir_exists("backup", &self.config.backup_dir).await?;
            ensure_dir_exists("source data", &self.config.data_dir).await?;
        }
        Ok(())
    }

    async fn find_session(&self) -> Result<SessionEntry, BackupError> {
        self.session()
            .status()
            .await?
            .ok_or_else(|| BackupError::SessionMissing {
                session: self.config.session.clone(),
            })
    }

    async fn negotiate(&self, session: &ScreenSession<'_>) -> Result<(), BackupError> {
        let entry = self.find_session().await?;
        if entry.multi_user {
            info!("session {} already allows multiple users", session.name());
            return Ok(());
        }
        session.enable_multiuser(&self.config.connect_user).await
    }

    async fn send_warnings(&self, session: &ScreenSession<'_>) -> Result<(), BackupError> {
        for warning in &self.config.warnings {
            info!("warning players: {}", warning.message);
            session.send(&warning.command()).await?;
            self.clock.sleep(warning.wait()).await;
        }
        Ok(())
    }

    /// Send the stop command and wait for the session to disappear.
    async fn shutdown_server(
        &self,
        session: &ScreenSession<'_>,
        resuming: bool,
    ) -> Result<(), BackupError> {
        if resuming && session.status().await?.is_none() {
            info!("session {} already gone", session.name());
            return Ok(());
        }

        info!("stopping server");
        session.send(&self.config.stop_command).await?;
        self.clock.sleep(self.config.timings.shutdown_wait()).await;
        if session.status().await?.is_none() {
            info!("server shut down cleanly");
            return Ok(());
        }

        let grace = self.config.timings.shutdown_grace();
        let exited = self.poll_session(session, grace, false).await?;
        if exited {
            info!("server shut down cleanly after the grace period");
            return Ok(());
        }

        warn!(
            "session {} still alive {}s after the stop command",
            session.name(),
            (self.config.timings.shutdown_wait() + grace).as_secs()
        );
        if self.config.require_clean_shutdown {
            return Err(BackupError::UncleanShutdown {
                session: session.name().to_string(),
            });
        }
        Ok(())
    }

    /// Wait up to `limit`, re-listing after each poll interval, until the
    /// session's presence equals `want_present`. Returns whether it did.
    async fn poll_session(
        &self,
        session: &ScreenSession<'_>,
        limit: Duration,
        want_present: bool,
    ) -> Result<bool, BackupError> {
        let interval = self.config.timings.poll_interval();
        let mut waited = Duration::ZERO;
        while waited < limit {
            let step = interval.min(limit - waited);
            self.clock.sleep(step).await;
            waited += step;
            if session.status().await?.is_some() == want_present {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Give the server time to boot, then make the session reachable again.
    /// Failures here do not undo the backup, so they come back as warnings.
    async fn restore_session(&self, session: &ScreenSession<'_>) -> Vec<String> {
        self.clock.sleep(self.config.timings.startup_grace()).await;

        let present = match session.status().await {
            Ok(Some(_)) => Ok(true),
            Ok(None) => {
                self.poll_session(session, self.config.timings.session_timeout(), true)
                    .await
            }
            Err(err) => Err(err),
        };
        match present {
            Ok(true) => {}
            Ok(false) => {
                return vec![format!(
                    "session {} did not come back after the restart; multi-user mode not restored",
                    session.name()
                )];
            }
            Err(err) => return vec![format!("could not list sessions after the restart: {err}")],
        }

        match session.enable_multiuser(&self.config.connect_user).await {
            Ok(()) => {
                info!("multi-user access restored for {}", self.config.connect_user);
                Vec::new()
            }
            Err(err) => vec![err.to_string()],
        }
    }

    async fn checkpoint(&self, marker: &mut RunMarker, step: Step) {
        marker.advance(step);
        if let Err(err) = self.markers.save(marker).await {
            warn!("failed to record step {step}: {err}");
        }
    }

    async fn finish(&self) {
        if let Err(err) = self.markers.clear().await {
            warn!("failed to clear run marker: {err}");
        }
    }

    fn runtime(&self) -> ContainerRuntime<'a> {
        ContainerRuntime::new(self.runner, &self.config.tools.runtime)
    }

    fn session(&self) -> ScreenSession<'a> {
        ScreenSession::new(
            self.runner,
            &self.config.tools.runtime,
            &self.config.tools.screen,
            &self.config.container,
            &self.config.service_user,
            &self.config.session,
        )
    }
}

async fn ensure_dir_exists(kind: &'static str, path: &std::path::Path) -> Result<(), BackupError> {
    let missing = || BackupError::PathMissing {
        kind,
        path: path.to_path_buf(),
    };
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(missing()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(missing()),
        Err(err) => Err(BackupError::io("checking directory", err)),
    }
}
