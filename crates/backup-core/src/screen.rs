//! Control of the server console's screen session inside the container.

use tracing::{debug, info};

use crate::container::exec_args;
use crate::errors::BackupError;
use crate::exec::{CommandRunner, run_checked};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub pid: Option<u32>,
    pub name: String,
    pub multi_user: bool,
    pub attached: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionListing {
    pub entries: Vec<SessionEntry>,
}

impl SessionListing {
    pub fn find(&self, session: &str) -> Option<&SessionEntry> {
        self.entries.iter().find(|entry| entry.name == session)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse `screen -ls` output.
///
/// Entries look like `\t12345.minecraft\t(01/02/24 10:00:00)\t(Multi, detached)`.
/// "No Sockets found", header/footer lines and `(Dead ???)` sockets left
/// behind by a crashed screen yield no entries.
pub fn parse_listing(text: &str) -> SessionListing {
    let entries = text.lines().filter_map(parse_entry).collect();
    SessionListing { entries }
}

fn parse_entry(line: &str) -> Option<SessionEntry> {
    let trimmed = line.trim();
    let mut fields = trimmed.splitn(2, char::is_whitespace);
    let id = fields.next()?;
    let rest = fields.next().unwrap_or("").to_ascii_lowercase();

    let (pid, name) = id.split_once('.')?;
    if pid.is_empty() || !pid.chars().all(|c| c.is_ascii_digit()) || name.is_empty() {
        return None;
    }
    if rest.contains("dead") {
        return None;
    }

    Some(SessionEntry {
        pid: pid.parse().ok(),
        name: name.to_string(),
        multi_user: rest.contains("multi"),
        attached: rest.contains("attached"),
    })
}

/// A named screen session owned by `user` in `container`.
pub struct ScreenSession<'a> {
    runner: &'a dyn CommandRunner,
    runtime: &'a str,
    screen: &'a str,
    container: &'a str,
    user: &'a str,
    session: &'a str,
}

impl<'a> ScreenSession<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        runtime: &'a str,
        screen: &'a str,
        container: &'a str,
        user: &'a str,
        session: &'a str,
    ) -> Self {
        Self {
            runner,
            runtime,
            screen,
            container,
            user,
            session,
        }
    }

    pub fn name(&self) -> &str {
        self.session
    }

    /// List sessions. `screen -ls` exits non-zero even when sessions exist,
    /// so only the text is inspected.
    pub async fn list(&self) -> Result<SessionListing, BackupError> {
        let args = exec_args(
            self.container,
            self.user,
            &[self.screen.to_string(), "-ls".to_string()],
        );
        let output = self.runner.run(self.runtime, &args).await?;
        if !output.stderr.trim().is_empty() {
            debug!("screen -ls stderr: {}", output.stderr.trim());
        }
        Ok(parse_listing(&output.stdout))
    }

    /// Current state of this session, `None` if it does not exist.
    pub async fn status(&self) -> Result<Option<SessionEntry>, BackupError> {
        Ok(self.list().await?.find(self.session).cloned())
    }

    /// Turn on multi-user mode and grant `connect_user` access.
    pub async fn enable_multiuser(&self, connect_user: &str) -> Result<(), BackupError> {
        info!("enabling multi-user mode on session {}", self.session);
        self.control(&["multiuser", "on"]).await?;
        self.control(&["acladd", connect_user]).await?;
        Ok(())
    }

    /// Type `command` followed by Enter into window 0 of the session.
    pub async fn send(&self, command: &str) -> Result<(), BackupError> {
        debug!("session {} <- {command}", self.session);
        let args = exec_args(
            self.container,
            self.user,
            &[
                self.screen.to_string(),
                "-S".to_string(),
                self.session.to_string(),
                "-p".to_string(),
                "0".to_string(),
                "-X".to_string(),
                "stuff".to_string(),
                format!("{command}\r"),
            ],
        );
        run_checked(self.runner, self.runtime, &args).await?;
        Ok(())
    }

    async fn control(&self, words: &[&str]) -> Result<(), BackupError> {
        let mut command = vec![
            self.screen.to_string(),
            "-S".to_string(),
            self.session.to_string(),
            "-X".to_string(),
        ];
        command.extend(words.iter().map(|word| word.to_string()));
        let args = exec_args(self.container, self.user, &command);

        let output = self.runner.run(self.runtime, &args).await?;
        if output.success() {
            return Ok(());
        }
        let mut detail = output.stderr.trim().to_string();
        if detail.is_empty() {
            detail = output.stdout.trim().to_string();
        }
        if detail.is_empty() {
            detail = format!("`{}` exited with status {}", words.join(" "), output.status_text());
        }
        Err(BackupError::SessionBusy {
            session: self.session.to_string(),
            detail,
        })
    }
}
