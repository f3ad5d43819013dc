//! The client-side handle for one driver connection.

use super::channel::ChannelEndpoint;
use super::envelope::{exchange, ProcedureRequest, ProcedureResponse};
use super::process::{reap, DriverProcess};
use crate::config::ClientConfig;
use crate::error::{DbmiError, DbmiResult};
use crate::proto::{Procedure, StatusCode, WireValue};

/// Connection state of a [`DriverHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Not opened yet, or closed.
    Disconnected,
    /// The open-database handshake succeeded.
    Connected,
    /// A protocol or connection error was seen; the handle must be closed.
    Faulted,
}

/// One live connection to a driver process.
///
/// Calls take `&mut self`: a handle has at most one call in flight. Share a
/// handle between tasks through [`super::SharedDriver`].
pub struct DriverHandle {
    channel: Option<ChannelEndpoint>,
    process: Option<Box<dyn DriverProcess>>,
    state: HandleState,
    last_status: Option<StatusCode>,
    config: ClientConfig,
}

impl DriverHandle {
    /// A handle with no driver behind it.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            channel: None,
            process: None,
            state: HandleState::Disconnected,
            last_status: None,
            config,
        }
    }

    /// Wrap an established channel (and the process behind it, if any).
    ///
    /// The handle starts out disconnected; procedures can be called right
    /// away, and [`DriverHandle::open_database`] moves it to connected.
    pub fn attach(
        channel: ChannelEndpoint,
        process: Option<Box<dyn DriverProcess>>,
        config: ClientConfig,
    ) -> Self {
        Self {
            channel: Some(channel),
            process,
            state: HandleState::Disconnected,
            last_status: None,
            config,
        }
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == HandleState::Connected
    }

    pub fn is_faulted(&self) -> bool {
        self.state == HandleState::Faulted
    }

    /// Status of the most recent completed call.
    pub fn last_status(&self) -> Option<StatusCode> {
        self.last_status
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Bytes written to the driver so far.
    pub fn bytes_sent(&self) -> u64 {
        self.channel.as_ref().map_or(0, ChannelEndpoint::bytes_sent)
    }

    pub fn process_id(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.id())
    }

    pub(crate) fn mark_connected(&mut self) {
        if self.state != HandleState::Faulted {
            self.state = HandleState::Connected;
        }
    }

    /// Run one procedure.
    ///
    /// A failure status from the driver is an ordinary response. Errors are
    /// argument errors (nothing sent, handle unchanged) or protocol and
    /// connection errors, after which the handle is faulted. Dropping the
    /// returned future before it completes also faults the handle.
    pub async fn call(
        &mut self,
        procedure: Procedure,
        args: &[WireValue],
    ) -> DbmiResult<ProcedureResponse> {
        if self.state == HandleState::Faulted {
            return Err(DbmiError::Connection(format!(
                "Driver handle is faulted; {} not sent",
                procedure
            )));
        }

        let request = ProcedureRequest::new(procedure, args);
        request.validate(&self.config.limits)?;

        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| DbmiError::Connection(format!("No driver connection; {} not sent", procedure)))?;

        tracing::debug!("Calling {} with {} argument(s)", procedure, args.len());

        // Faulted while the exchange is under way: a caller that drops this
        // future mid-call leaves a half-read response in the pipe.
        let previous = self.state;
        self.state = HandleState::Faulted;

        let limits = self.config.limits;
        let outcome = match self.config.call_timeout_duration() {
            Some(limit) => match tokio::time::timeout(limit, exchange(channel, &request, &limits)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(DbmiError::Timeout(limit)),
            },
            None => exchange(channel, &request, &limits).await,
        };

        match outcome {
            Ok(response) => {
                self.state = previous;
                self.last_status = Some(response.status);
                if !response.is_success() {
                    tracing::debug!(
                        "{} returned {}: {}",
                        procedure,
                        response.status,
                        response.diagnostic.as_deref().unwrap_or("")
                    );
                }
                Ok(response)
            }
            Err(e) => {
                tracing::warn!("{} failed, driver handle faulted: {}", procedure, e);
                if matches!(e, DbmiError::Timeout(_)) {
                    // A late answer could still arrive; nothing on this channel can be trusted.
                    self.force_close().await;
                }
                Err(e)
            }
        }
    }

    /// Run one procedure and turn a failure status into an error.
    pub async fn call_checked(
        &mut self,
        procedure: Procedure,
        args: &[WireValue],
    ) -> DbmiResult<Vec<WireValue>> {
        self.call(procedure, args).await?.into_result()
    }

    /// Shut the driver down and release the channel and the process.
    ///
    /// Never fails. A connected driver is asked to close its database and
    /// shut down, bounded by the shutdown timeout; the answers are ignored.
    /// The process then gets the reap grace period to exit before it is
    /// killed. Faulted handles skip straight to the kill.
    pub async fn close(&mut self) {
        if self.state == HandleState::Connected {
            if let Some(channel) = self.channel.as_mut() {
                let limits = self.config.limits;
                let notify = async {
                    for procedure in [Procedure::CloseDatabase, Procedure::ShutdownDriver] {
                        let request = ProcedureRequest::new(procedure, &[]);
                        if let Err(e) = exchange(channel, &request, &limits).await {
                            tracing::debug!("Ignoring {} error during close: {}", procedure, e);
                            break;
                        }
                    }
                };
                if tokio::time::timeout(self.config.shutdown_timeout_duration(), notify)
                    .await
                    .is_err()
                {
                    tracing::warn!("Driver did not acknowledge shutdown in time");
                }
            }
        }

        let grace = if self.state == HandleState::Faulted {
            std::time::Duration::ZERO
        } else {
            self.config.reap_grace_duration()
        };
        self.release(grace).await;

        if self.state != HandleState::Faulted {
            self.state = HandleState::Disconnected;
        }
    }

    /// Drop the channel and kill the process without talking to the driver.
    pub async fn force_close(&mut self) {
        self.release(std::time::Duration::ZERO).await;
    }

    async fn release(&mut self, grace: std::time::Duration) {
        if let Some(mut channel) = self.channel.take() {
            let shutdown_timeout = self.config.shutdown_timeout_duration();
            if tokio::time::timeout(shutdown_timeout, channel.close()).await.is_err() {
                tracing::warn!("Driver channel did not close in time");
            }
        }
        if let Some(process) = self.process.take() {
            reap(process, grace).await;
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        if let Some(process) = self.process.as_mut() {
            tracing::warn!("Driver handle dropped without close; killing driver");
            let _ = process.start_kill();
        }
    }
}

impl Default for DriverHandle {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("state", &self.state)
            .field("last_status", &self.last_status)
            .field("channel", &self.channel)
            .field("pid", &self.process_id())
            .finish()
    }
}
