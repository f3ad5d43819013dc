//! Driver process management: spawn, handshake, reap.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::Instant;

use super::channel::ChannelEndpoint;
use super::handle::DriverHandle;
use crate::config::{ClientConfig, ConnectionParams, DriverSpec};
use crate::error::{DbmiError, DbmiResult};

const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The operating-system side of a driver, as far as the handle needs it.
pub trait DriverProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit check; reaps the process if it has exited.
    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>>;

    /// Request termination without waiting for it.
    fn start_kill(&mut self) -> std::io::Result<()>;
}

impl DriverProcess for Child {
    fn id(&self) -> Option<u32> {
        Child::id(self)
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        Child::try_wait(self)
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        Child::start_kill(self)
    }
}

/// Launch a driver and wire its stdout/stdin into a channel.
pub fn spawn_driver(spec: &DriverSpec) -> DbmiResult<(ChannelEndpoint, Child)> {
    let mut command = Command::new(&spec.command);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|e| {
        DbmiError::Connection(format!(
            "Cannot start driver '{}' ({}): {}",
            spec.name,
            spec.command.display(),
            e
        ))
    })?;

    let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
        (Some(stdin), Some(stdout)) => (stdin, stdout),
        _ => {
            let _ = child.start_kill();
            return Err(DbmiError::Connection(format!(
                "Driver '{}' started without pipes",
                spec.name
            )));
        }
    };

    tracing::info!(
        "Started driver '{}' (pid {})",
        spec.name,
        child.id().unwrap_or_default()
    );

    Ok((ChannelEndpoint::from_halves(stdout, stdin), child))
}

/// Opens driver handles: spawn, then the open-database handshake.
#[derive(Debug, Clone, Default)]
pub struct DriverManager {
    config: ClientConfig,
}

impl DriverManager {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start `spec` and open `params` on it.
    ///
    /// Any failure, including a refused open-database, comes back as a
    /// connection error with the spawned process already terminated.
    pub async fn open(
        &self,
        spec: &DriverSpec,
        params: &ConnectionParams,
    ) -> DbmiResult<DriverHandle> {
        let (channel, child) = spawn_driver(spec)?;
        let mut handle = DriverHandle::attach(channel, Some(Box::new(child)), self.config.clone());

        match handle.open_database(params).await {
            Ok(()) => {
                tracing::debug!(
                    "Driver '{}' opened database '{}'",
                    spec.name,
                    params.database
                );
                Ok(handle)
            }
            Err(e) => {
                handle.force_close().await;
                Err(DbmiError::Connection(format!(
                    "Handshake with driver '{}' failed: {}",
                    spec.name, e
                )))
            }
        }
    }
}

/// Wait up to `grace` for the driver to exit on its own, then kill it.
pub(crate) async fn reap(mut process: Box<dyn DriverProcess>, grace: Duration) {
    let pid = process.id();
    let deadline = Instant::now() + grace;

    loop {
        match process.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!("Driver process {:?} exited with {}", pid, status);
                return;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Cannot poll driver process {:?}: {}", pid, e);
                break;
            }
        }
        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(REAP_POLL_INTERVAL).await;
    }

    tracing::warn!("Killing driver process {:?}", pid);
    if let Err(e) = process.start_kill() {
        tracing::warn!("Cannot kill driver process {:?}: {}", pid, e);
    }
    // Reap if already gone; otherwise the runtime collects it in the background.
    let _ = process.try_wait();
}
