//! Process control for one local instance
//!
//! Every distribution ships a `bin/server` control script; start and stop
//! shell out to it and then poll the pid file under `run/` until the
//! desired state is observed or the bounded wait elapses. The pid file is
//! advisory: a recorded pid whose process is gone counts as stopped.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task;
use tracing::{debug, warn};

use brokkr_core::{Error, Result};

/// Pid file the control script maintains, relative to the instance root
pub const PID_FILE: &str = "run/server.pid";

/// Control script relative to the instance root
pub const CONTROL_SCRIPT: &str = "bin/server";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Observed process state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Running { pid: u32 },
    Stopped,
}

/// Derive the current status from the pid file and process table
pub fn status(dbms_dir: &Path) -> ServerStatus {
    match read_pid(dbms_dir) {
        Some(pid) if process_alive(pid) => ServerStatus::Running { pid },
        Some(pid) => {
            debug!("Pid file names dead process {pid}, treating as stopped");
            ServerStatus::Stopped
        }
        None => ServerStatus::Stopped,
    }
}

/// The status line shown to users for one instance
pub fn status_line(status: ServerStatus) -> String {
    match status {
        ServerStatus::Running { pid } => format!("Database server is running (pid {pid})"),
        ServerStatus::Stopped => "Database server is not running".to_string(),
    }
}

fn read_pid(dbms_dir: &Path) -> Option<u32> {
    let content = std::fs::read_to_string(dbms_dir.join(PID_FILE)).ok()?;
    content.trim().parse().ok()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    // Without a process table probe the pid file alone is trusted.
    true
}

/// Start the instance and wait for it to report running
pub async fn start(dbms_dir: &Path, wait: Duration) -> Result<String> {
    if let ServerStatus::Running { pid } = status(dbms_dir) {
        return Ok(format!("Database server already running (pid {pid})"));
    }

    run_control(dbms_dir, "start").await?;
    wait_for(dbms_dir, true, wait).await?;
    Ok(status_line(status(dbms_dir)))
}

/// Stop the instance and wait for it to report stopped
pub async fn stop(dbms_dir: &Path, wait: Duration) -> Result<String> {
    if status(dbms_dir) == ServerStatus::Stopped {
        return Ok("Database server is not running".to_string());
    }

    run_control(dbms_dir, "stop").await?;
    wait_for(dbms_dir, false, wait).await?;
    Ok("Database server stopped".to_string())
}

async fn run_control(dbms_dir: &Path, action: &'static str) -> Result<String> {
    let script = dbms_dir.join(CONTROL_SCRIPT);
    if !script.is_file() {
        return Err(Error::invalid_config(format!(
            "Instance at {} has no control script",
            dbms_dir.display()
        )));
    }

    let dir: PathBuf = dbms_dir.to_path_buf();
    let output = task::spawn_blocking(move || {
        duct::cmd(script, [action])
            .dir(dir)
            .stderr_to_stdout()
            .read()
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e)))??;

    debug!("Control script {action}: {}", output.trim());
    Ok(output)
}

async fn wait_for(dbms_dir: &Path, running: bool, wait: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let is_running = matches!(status(dbms_dir), ServerStatus::Running { .. });
        if is_running == running {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            let desired = if running { "start" } else { "stop" };
            warn!("Instance at {} did not {desired} in time", dbms_dir.display());
            return Err(Error::timeout(format!(
                "Database server did not {desired} within {}s",
                wait.as_secs()
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
