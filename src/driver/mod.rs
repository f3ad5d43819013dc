//! Driver side of the protocol.
//!
//! A driver executable implements [`Driver`] for its backend and hands it to
//! [`serve_stdio`]. The serve loop reads each request according to the
//! catalog, dispatches it, checks the reply against the catalog and writes
//! the response, so backends never touch the wire format.

use bytes::{Buf, BufMut, BytesMut};

use crate::client::ChannelEndpoint;
use crate::error::{DbmiError, DbmiResult};
use crate::proto::{encode, CodecLimits, Procedure, StatusCode, WireValue};

/// A failed procedure, as reported back to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverFailure {
    pub status: StatusCode,
    pub diagnostic: Option<String>,
}

impl DriverFailure {
    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Failed,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn not_implemented(procedure: Procedure) -> Self {
        Self {
            status: StatusCode::NotImplemented,
            diagnostic: Some(format!("{} is not supported by this driver", procedure)),
        }
    }
}

pub type DriverReply = Result<Vec<WireValue>, DriverFailure>;

/// One backend's implementation of the procedure catalog.
///
/// `args` always match the catalog entry of `procedure`. Procedures a
/// backend does not support should answer [`DriverFailure::not_implemented`].
pub trait Driver: Send {
    fn dispatch(&mut self, procedure: Procedure, args: Vec<WireValue>) -> DriverReply;
}

impl<F> Driver for F
where
    F: FnMut(Procedure, Vec<WireValue>) -> DriverReply + Send,
{
    fn dispatch(&mut self, procedure: Procedure, args: Vec<WireValue>) -> DriverReply {
        self(procedure, args)
    }
}

/// Answer requests on `channel` until the client disconnects or asks the
/// driver to shut down.
pub async fn serve<D: Driver>(
    channel: &mut ChannelEndpoint,
    driver: &mut D,
    limits: &CodecLimits,
) -> DbmiResult<()> {
    loop {
        let Some(mut header) = channel.recv_exact_or_eof(4).await? else {
            tracing::debug!("Client closed the channel");
            return Ok(());
        };

        let id = header.get_u32_le();
        let procedure = Procedure::from_id(id).ok_or_else(|| {
            // Argument shapes are unknown for foreign ids; the stream cannot be resynced.
            DbmiError::Protocol(format!("Unknown procedure id {}", id))
        })?;
        let entry = procedure.entry();

        let mut args = Vec::with_capacity(entry.args.len());
        for (i, slot) in entry.args.iter().enumerate() {
            let value = channel.recv_value_in_message(limits).await?;
            if !slot.accepts(&value) {
                return Err(DbmiError::Protocol(format!(
                    "{} argument {} must be {}, got {}",
                    procedure,
                    i,
                    slot,
                    value.wire_type()
                )));
            }
            args.push(value);
        }

        tracing::debug!("Dispatching {}", procedure);
        let reply = driver.dispatch(procedure, args);
        channel
            .send(&encode_reply_within(procedure, reply, limits))
            .await?;

        if procedure == Procedure::ShutdownDriver {
            tracing::debug!("Shutdown requested");
            return Ok(());
        }
    }
}

/// Serve the client on this process's stdin/stdout.
pub async fn serve_stdio<D: Driver>(driver: &mut D) -> DbmiResult<()> {
    let mut channel = ChannelEndpoint::from_halves(tokio::io::stdin(), tokio::io::stdout());
    let result = serve(&mut channel, driver, &CodecLimits::default()).await;
    channel.close().await;
    result
}

/// Encode a reply under the default codec limits.
pub fn encode_reply(procedure: Procedure, reply: DriverReply) -> BytesMut {
    encode_reply_within(procedure, reply, &CodecLimits::default())
}

/// Encode a reply, replacing results that break the catalog or exceed
/// `limits` with a failure so the client stays in sync.
pub fn encode_reply_within(
    procedure: Procedure,
    reply: DriverReply,
    limits: &CodecLimits,
) -> BytesMut {
    let entry = procedure.entry();

    let reply = match reply {
        Ok(values) => match check_results(procedure, &values, limits) {
            Ok(()) => Ok(values),
            Err(msg) => {
                tracing::error!("Driver produced malformed results: {}", msg);
                Err(DriverFailure::failed(msg))
            }
        },
        Err(failure) if failure.status.is_ok() => {
            Err(DriverFailure::failed("driver reported failure with status OK"))
        }
        Err(failure) => Err(failure),
    };

    let mut buf = BytesMut::new();
    match reply {
        Ok(values) => {
            buf.put_i32_le(StatusCode::Ok.code());
            for value in &values {
                encode(value, &mut buf);
            }
        }
        Err(failure) => {
            buf.put_i32_le(failure.status.code());
            if entry.diagnostic_on_failure {
                encode(&WireValue::from(failure.diagnostic), &mut buf);
            }
        }
    }
    buf
}

fn check_results(
    procedure: Procedure,
    values: &[WireValue],
    limits: &CodecLimits,
) -> Result<(), String> {
    procedure.entry().validate_results(values)?;
    for (i, value) in values.iter().enumerate() {
        limits
            .check(value)
            .map_err(|reason| format!("{} result {}: {}", procedure, i, reason))?;
    }
    Ok(())
}
