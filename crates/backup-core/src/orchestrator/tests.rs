use super::*;
use crate::config::{Schedule, Timings, Tools, default_warnings};
use crate::errors::exit_code;
use crate::exec::CommandOutput;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SINGLE: &str =
    "There is a screen on:\n\t100.minecraft\t(10/16/2026 04:00:00 AM)\t(Detached)\n1 Socket in /run/screen/S-minecraft.\n";
const MULTI: &str =
    "There is a screen on:\n\t100.minecraft\t(10/16/2026 04:00:00 AM)\t(Multi, detached)\n1 Socket in /run/screen/S-minecraft.\n";
const NONE: &str = "No Sockets found in /run/screen/S-minecraft.\n";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Cmd(Vec<String>),
    Sleep(u64),
}

/// Records every command and sleep; answers commands from canned state.
struct MockHost {
    events: Mutex<Vec<Event>>,
    running: Vec<String>,
    all: Vec<String>,
    listings: Mutex<VecDeque<&'static str>>,
    multiuser_ok: Mutex<VecDeque<bool>>,
    acladd_ok: bool,
    rsync_ok: bool,
}

impl MockHost {
    fn new(listings: &[&'static str]) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            running: vec!["mc".to_string()],
            all: vec!["mc".to_string()],
            listings: Mutex::new(listings.iter().copied().collect()),
            multiuser_ok: Mutex::new(VecDeque::new()),
            acladd_ok: true,
            rsync_ok: true,
        }
    }

    fn with_multiuser(self, results: &[bool]) -> Self {
        *self.multiuser_ok.lock().unwrap() = results.iter().copied().collect();
        self
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn commands(&self) -> Vec<Vec<String>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Cmd(args) => Some(args),
                Event::Sleep(_) => None,
            })
            .collect()
    }

    fn sleeps(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Sleep(secs) => Some(secs),
                Event::Cmd(_) => None,
            })
            .collect()
    }

    fn count(&self, word: &str) -> usize {
        self.commands()
            .iter()
            .filter(|cmd| cmd.iter().any(|arg| arg == word))
            .count()
    }

    /// The last listing repeats once the queue is down to one entry.
    fn next_listing(&self) -> &'static str {
        let mut listings = self.listings.lock().unwrap();
        if listings.len() > 1 {
            listings.pop_front().unwrap_or(NONE)
        } else {
            listings.front().copied().unwrap_or(NONE)
        }
    }

    fn respond(&self, program: &str, args: &[String]) -> CommandOutput {
        let ok = |stdout: String| CommandOutput {
            code: Some(0),
            stdout,
            stderr: String::new(),
        };
        let failed = |stderr: &str| CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        };
        let has = |word: &str| args.iter().any(|arg| arg == word);

        if program == "rsync" {
            return if self.rsync_ok { ok(String::new()) } else { failed("rsync: disk full") };
        }
        if args.first().map(String::as_str) == Some("ps") {
            let names = if has("-a") { &self.all } else { &self.running };
            return ok(names.iter().map(|name| format!("{name}\n")).collect());
        }
        if has("-ls") {
            return CommandOutput {
                code: Some(1),
                stdout: self.next_listing().to_string(),
                stderr: String::new(),
            };
        }
        if has("multiuser") {
            let success = self.multiuser_ok.lock().unwrap().pop_front().unwrap_or(true);
            return if success {
                ok(String::new())
            } else {
                failed("Must run suid root for multiuser support.")
            };
        }
        if has("acladd") && !self.acladd_ok {
            return failed("acladd: unknown user");
        }
        ok(String::new())
    }
}

#[async_trait]
impl CommandRunner for MockHost {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, BackupError> {
        let mut line = vec![program.to_string()];
        line.extend(args.iter().cloned());
        self.events.lock().unwrap().push(Event::Cmd(line));
        Ok(self.respond(program, args))
    }
}

#[async_trait]
impl Clock for MockHost {
    async fn sleep(&self, duration: Duration) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Sleep(duration.as_secs()));
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    config: BackupConfig,
    markers: MarkerStore,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().join("data");
        let backup_dir = dir.path().join("backups");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::create_dir_all(&backup_dir).unwrap();
        let markers = MarkerStore::new(dir.path().join("state").join("run-marker.json"));

        let config = BackupConfig {
            container: "mc".to_string(),
            backup_dir,
            data_dir,
            service_user: "minecraft".to_string(),
            connect_user: "admin".to_string(),
            session: "minecraft".to_string(),
            backup_name: "mc".to_string(),
            stop_command: "stop".to_string(),
            require_clean_shutdown: false,
            tools: Tools::default(),
            timings: Timings::default(),
            warnings: default_warnings(),
            schedule: Schedule::default(),
        };
        Self {
            _dir: dir,
            config,
            markers,
        }
    }

    async fn run(&self, host: &MockHost, resume: bool) -> Result<BackupOutcome, BackupError> {
        Orchestrator::new(&self.config, host, host, &self.markers)
            .run(RunOptions { resume })
            .await
    }
}

fn cmd(parts: &[&str]) -> Event {
    Event::Cmd(parts.iter().map(|part| part.to_string()).collect())
}

fn in_container(parts: &[&str]) -> Event {
    let mut line = vec!["docker", "exec", "-u", "minecraft", "mc"];
    line.extend_from_slice(parts);
    cmd(&line)
}

fn stuff(text: &str) -> Event {
    let typed = format!("{text}\r");
    in_container(&["screen", "-S", "minecraft", "-p", "0", "-X", "stuff", &typed])
}

fn path_arg(path: &Path) -> String {
    format!("{}/", path.display())
}

#[tokio::test]
async fn happy_path_runs_every_step_in_order() {
    let fx = Fixture::new();
    let host = MockHost::new(&[SINGLE, NONE, SINGLE]);

    let result = fx.run(&host, false).await;
    assert_eq!(result.as_ref().unwrap(), &BackupOutcome::Completed);
    assert_eq!(exit_code(&result), 0);

    let source = path_arg(&fx.config.data_dir);
    let destination = path_arg(&fx.config.backup_dir.join("mc"));
    let expected = vec![
        cmd(&["docker", "ps", "--format", "{{.Names}}"]),
        in_container(&["screen", "-ls"]),
        in_container(&["screen", "-S", "minecraft", "-X", "multiuser", "on"]),
        in_container(&["screen", "-S", "minecraft", "-X", "acladd", "admin"]),
        stuff("say Server shutting down for backup in 10 minutes."),
        Event::Sleep(540),
        stuff("say Server shutting down for backup in 1 minute."),
        Event::Sleep(50),
        stuff("say Server shutting down for backup in 10 seconds."),
        Event::Sleep(10),
        stuff("stop"),
        Event::Sleep(35),
        in_container(&["screen", "-ls"]),
        cmd(&["docker", "stop", "mc"]),
        cmd(&["rsync", "-a", "--delete", &source, &destination]),
        cmd(&["docker", "start", "mc"]),
        Event::Sleep(30),
        in_container(&["screen", "-ls"]),
        in_container(&["screen", "-S", "minecraft", "-X", "multiuser", "on"]),
        in_container(&["screen", "-S", "minecraft", "-X", "acladd", "admin"]),
    ];
    assert_eq!(host.events(), expected);

    assert!(fx.config.backup_dir.join("mc").is_dir());
    assert!(fx.markers.load().await.unwrap().is_none());
}

#[tokio::test]
async fn absent_container_stops_before_anything_else() {
    let fx = Fixture::new();
    let mut host = MockHost::new(&[SINGLE]);
    host.running.clear();

    let result = fx.run(&host, false).await;
    assert!(matches!(result, Err(BackupError::ContainerMissing { .. })));
    assert_eq!(exit_code(&result), 1);
    assert_eq!(host.events(), vec![cmd(&["docker", "ps", "--format", "{{.Names}}"])]);
}

#[tokio::test]
async fn missing_paths_never_touch_the_container() {
    let fx = Fixture::new();
    std::fs::remove_dir_all(&fx.config.backup_dir).unwrap();
    let host = MockHost::new(&[SINGLE]);
    let result = fx.run(&host, false).await;
    assert!(matches!(result, Err(BackupError::PathMissing { kind: "backup", .. })));
    assert_eq!(host.count("stop") + host.count("start"), 0);
    assert_eq!(host.count("-ls"), 0);

    let fx = Fixture::new();
    std::fs::remove_dir_all(&fx.config.data_dir).unwrap();
    let host = MockHost::new(&[SINGLE]);
    let result = fx.run(&host, false).await;
    assert!(matches!(result, Err(BackupError::PathMissing { kind: "source data", .. })));
    assert_eq!(exit_code(&result), 1);
    assert_eq!(host.count("stop") + host.count("start"), 0);
}

#[tokio::test]
async fn no_session_means_no_warnings() {
    let fx = Fixture::new();
    let host = MockHost::new(&[NONE]);

    let result = fx.run(&host, false).await;
    assert!(matches!(result, Err(BackupError::SessionMissing { .. })));
    assert_eq!(exit_code(&result), 1);
    assert_eq!(host.count("stuff"), 0);
    assert!(host.sleeps().is_empty());
    assert!(fx.markers.load().await.unwrap().is_none());
}

#[tokio::test]
async fn existing_multi_user_session_skips_enable() {
    let fx = Fixture::new();
    let host = MockHost::new(&[MULTI, NONE, MULTI]);

    let result = fx.run(&host, false).await;
    assert_eq!(result.unwrap(), BackupOutcome::Completed);

    let commands = host.commands();
    let first_stuff = commands
        .iter()
        .position(|cmd| cmd.iter().any(|arg| arg == "stuff"))
        .unwrap();
    assert!(
        commands[..first_stuff]
            .iter()
            .all(|cmd| !cmd.iter().any(|arg| arg == "multiuser" || arg == "acladd"))
    );
    // Restored once after the restart regardless.
    assert_eq!(host.count("multiuser"), 1);
}

#[tokio::test]
async fn busy_session_is_fatal_before_warnings() {
    let fx = Fixture::new();
    let host = MockHost::new(&[SINGLE]).with_multiuser(&[false]);

    let result = fx.run(&host, false).await;
    match &result {
        Err(BackupError::SessionBusy { detail, .. }) => assert!(detail.contains("multiuser")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(exit_code(&result), 1);
    assert_eq!(host.count("acladd"), 0);
    assert_eq!(host.count("stuff"), 0);
    assert_eq!(host.count("stop"), 0);
}

#[tokio::test]
async fn busy_acl_is_fatal_before_warnings() {
    let fx = Fixture::new();
    let mut host = MockHost::new(&[SINGLE]);
    host.acladd_ok = false;

    let result = fx.run(&host, false).await;
    match &result {
        Err(BackupError::SessionBusy { detail, .. }) => assert!(detail.contains("acladd")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(exit_code(&result), 1);
    assert_eq!(host.count("multiuser"), 1);
    assert_eq!(host.count("acladd"), 1);
    assert_eq!(host.count("stuff"), 0);
    assert!(host.sleeps().is_empty());
    assert!(fx.markers.load().await.unwrap().is_none());
}

#[tokio::test]
async fn source_that_is_a_file_is_missing() {
    let fx = Fixture::new();
    std::fs::remove_dir_all(&fx.config.data_dir).unwrap();
    std::fs::write(&fx.config.data_dir, b"not a directory").unwrap();
    let host = MockHost::new(&[SINGLE]);

    let result = fx.run(&host, false).await;
    assert!(matches!(result, Err(BackupError::PathMissing { kind: "source data", .. })));
    assert_eq!(host.count("-ls"), 0);
}

#[tokio::test]
async fn failed_restore_completes_with_warnings() {
    let fx = Fixture::new();
    let host = MockHost::new(&[SINGLE, NONE, SINGLE]).with_multiuser(&[true, false]);

    let result = fx.run(&host, false).await;
    assert_eq!(exit_code(&result), 2);
    match result.unwrap() {
        BackupOutcome::CompletedWithWarnings(problems) => assert_eq!(problems.len(), 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(host.count("rsync"), 1);
    assert!(fx.markers.load().await.unwrap().is_none());
}

#[tokio::test]
async fn session_that_never_returns_is_a_warning() {
    let fx = Fixture::new();
    let host = MockHost::new(&[SINGLE, NONE]);

    let result = fx.run(&host, false).await;
    assert_eq!(exit_code(&result), 2);
    // 30s startup grace, then 5s polls up to the 60s session timeout.
    let sleeps = host.sleeps();
    assert_eq!(&sleeps[sleeps.len() - 13..], &[30, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5]);
    assert_eq!(host.count("multiuser"), 1);
}

#[tokio::test]
async fn late_shutdown_is_detected_by_polling() {
    let fx = Fixture::new();
    let host = MockHost::new(&[SINGLE, SINGLE, SINGLE, NONE, SINGLE]);

    let result = fx.run(&host, false).await;
    assert_eq!(result.unwrap(), BackupOutcome::Completed);
    assert_eq!(host.sleeps(), vec![540, 50, 10, 35, 5, 5, 30]);
}

#[tokio::test]
async fn unclean_shutdown_proceeds_by_default() {
    let fx = Fixture::new();
    let host = MockHost::new(&[SINGLE]);

    let result = fx.run(&host, false).await;
    // The session never goes away, so restoring it works immediately.
    assert_eq!(result.unwrap(), BackupOutcome::Completed);
    assert_eq!(host.sleeps(), vec![540, 50, 10, 35, 5, 5, 5, 5, 5, 5, 30]);
    assert_eq!(host.count("rsync"), 1);
}

#[tokio::test]
async fn unclean_shutdown_can_be_fatal() {
    let mut fx = Fixture::new();
    fx.config.require_clean_shutdown = true;
    let host = MockHost::new(&[SINGLE]);

    let result = fx.run(&host, false).await;
    assert!(matches!(result, Err(BackupError::UncleanShutdown { .. })));
    assert_eq!(host.count("rsync"), 0);
    assert!(!host.commands().iter().any(|cmd| cmd[1] == "stop"));

    let marker = fx.markers.load().await.unwrap().unwrap();
    assert_eq!(marker.completed, Step::Warned);
}

#[tokio::test]
async fn failed_copy_leaves_resumable_marker() {
    let fx = Fixture::new();
    let mut host = MockHost::new(&[SINGLE, NONE]);
    host.rsync_ok = false;

    let result = fx.run(&host, false).await;
    assert!(matches!(result, Err(BackupError::CommandFailed { .. })));
    assert_eq!(exit_code(&result), 1);
    assert!(!host.commands().iter().any(|cmd| cmd[1] == "start"));

    let marker = fx.markers.load().await.unwrap().unwrap();
    assert_eq!(marker.completed, Step::ContainerStopped);
}

#[tokio::test]
async fn interrupted_run_requires_resume() {
    let fx = Fixture::new();
    fx.markers
        .save(&RunMarker::new("mc", Step::ContainerStopped))
        .await
        .unwrap();
    let host = MockHost::new(&[SINGLE]);

    let result = fx.run(&host, false).await;
    match result {
        Err(BackupError::Interrupted { step }) => assert_eq!(step, Step::ContainerStopped),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(host.events().is_empty());
}

#[tokio::test]
async fn resume_after_container_stop_goes_straight_to_copy() {
    let fx = Fixture::new();
    fx.markers
        .save(&RunMarker::new("mc", Step::ContainerStopped))
        .await
        .unwrap();
    let mut host = MockHost::new(&[SINGLE]);
    host.running.clear();

    let result = fx.run(&host, true).await;
    assert_eq!(result.unwrap(), BackupOutcome::Completed);

    let source = path_arg(&fx.config.data_dir);
    let destination = path_arg(&fx.config.backup_dir.join("mc"));
    let expected = vec![
        cmd(&["docker", "ps", "-a", "--format", "{{.Names}}"]),
        cmd(&["rsync", "-a", "--delete", &source, &destination]),
        cmd(&["docker", "start", "mc"]),
        Event::Sleep(30),
        in_container(&["screen", "-ls"]),
        in_container(&["screen", "-S", "minecraft", "-X", "multiuser", "on"]),
        in_container(&["screen", "-S", "minecraft", "-X", "acladd", "admin"]),
    ];
    assert_eq!(host.events(), expected);
    assert!(fx.markers.load().await.unwrap().is_none());
}

#[tokio::test]
async fn resume_after_server_stop_stops_the_container() {
    let fx = Fixture::new();
    fx.markers
        .save(&RunMarker::new("mc", Step::ServerStopped))
        .await
        .unwrap();
    let mut host = MockHost::new(&[SINGLE]);
    host.running.clear();

    let result = fx.run(&host, true).await;
    assert_eq!(result.unwrap(), BackupOutcome::Completed);

    let source = path_arg(&fx.config.data_dir);
    let destination = path_arg(&fx.config.backup_dir.join("mc"));
    let expected = vec![
        cmd(&["docker", "ps", "-a", "--format", "{{.Names}}"]),
        cmd(&["docker", "stop", "mc"]),
        cmd(&["rsync", "-a", "--delete", &source, &destination]),
        cmd(&["docker", "start", "mc"]),
        Event::Sleep(30),
        in_container(&["screen", "-ls"]),
        in_container(&["screen", "-S", "minecraft", "-X", "multiuser", "on"]),
        in_container(&["screen", "-S", "minecraft", "-X", "acladd", "admin"]),
    ];
    assert_eq!(host.events(), expected);
    assert!(fx.markers.load().await.unwrap().is_none());
}

#[tokio::test]
async fn resume_after_copy_starts_the_container_without_path_checks() {
    let fx = Fixture::new();
    fx.markers
        .save(&RunMarker::new("mc", Step::Copied))
        .await
        .unwrap();
    std::fs::remove_dir_all(&fx.config.data_dir).unwrap();
    std::fs::remove_dir_all(&fx.config.backup_dir).unwrap();
    let mut host = MockHost::new(&[SINGLE]);
    host.running.clear();

    let result = fx.run(&host, true).await;
    assert_eq!(result.unwrap(), BackupOutcome::Completed);

    let expected = vec![
        cmd(&["docker", "ps", "-a", "--format", "{{.Names}}"]),
        cmd(&["docker", "start", "mc"]),
        Event::Sleep(30),
        in_container(&["screen", "-ls"]),
        in_container(&["screen", "-S", "minecraft", "-X", "multiuser", "on"]),
        in_container(&["screen", "-S", "minecraft", "-X", "acladd", "admin"]),
    ];
    assert_eq!(host.events(), expected);
    assert!(fx.markers.load().await.unwrap().is_none());
}

#[tokio::test]
async fn resume_after_warnings_skips_stop_when_session_is_gone() {
    let fx = Fixture::new();
    fx.markers
        .save(&RunMarker::new("mc", Step::Warned))
        .await
        .unwrap();
    let host = MockHost::new(&[NONE, SINGLE]);

    let result = fx.run(&host, true).await;
    assert_eq!(result.unwrap(), BackupOutcome::Completed);
    assert_eq!(host.count("stuff"), 0);
    assert_eq!(host.sleeps(), vec![30]);
}

#[tokio::test]
async fn resume_without_marker_is_a_normal_run() {
    let fx = Fixture::new();
    let host = MockHost::new(&[SINGLE, NONE, SINGLE]);
    let result = fx.run(&host, true).await;
    assert_eq!(result.unwrap(), BackupOutcome::Completed);
    assert_eq!(host.count("stuff"), 4);
}

#[tokio::test]
async fn marker_for_another_container_is_rejected() {
    let fx = Fixture::new();
    fx.markers
        .save(&RunMarker::new("other", Step::Copied))
        .await
        .unwrap();
    let host = MockHost::new(&[SINGLE]);
    let result = fx.run(&host, true).await;
    assert!(matches!(result, Err(BackupError::Config(_))));
    assert!(host.events().is_empty());
}

#[tokio::test]
async fn check_is_read_only() {
    let fx = Fixture::new();
    let host = MockHost::new(&[MULTI]);

    let report = Orchestrator::new(&fx.config, &host, &host, &fx.markers)
        .check()
        .await
        .unwrap();
    assert!(report.session.multi_user);
    assert_eq!(host.commands().len(), 2);
    assert!(host.sleeps().is_empty());
    assert!(!PathBuf::from(fx.markers.path()).exists());
}
