//! One procedure call on the wire: request framing and response decoding.
//!
//! Request: `procedure id: u32 LE` followed by the argument values, written
//! in a single send. Response: `status: i32 LE` followed by the declared
//! result values, or by the diagnostic string when the call failed.

use bytes::{BufMut, BytesMut};

use super::channel::ChannelEndpoint;
use crate::error::{DbmiError, DbmiResult};
use crate::proto::{encode, CodecLimits, Procedure, StatusCode, WireType, WireValue};

// ============================================================================
// Request
// ============================================================================

/// A procedure id plus its arguments, built per call.
#[derive(Debug, Clone)]
pub struct ProcedureRequest<'a> {
    pub procedure: Procedure,
    pub args: &'a [WireValue],
}

impl<'a> ProcedureRequest<'a> {
    pub fn new(procedure: Procedure, args: &'a [WireValue]) -> Self {
        Self { procedure, args }
    }

    pub fn validate(&self, limits: &CodecLimits) -> DbmiResult<()> {
        self.procedure.entry().validate_args(self.args, limits)
    }

    /// The exact bytes of this request.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u32_le(self.procedure.id());
        for arg in self.args {
            encode(arg, &mut buf);
        }
        buf
    }
}

// ============================================================================
// Response
// ============================================================================

/// What the driver answered. A failure status is a normal response, not an
/// error: the exchange itself completed and the channel is still in sync.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureResponse {
    pub procedure: Procedure,
    pub status: StatusCode,
    /// Declared results; empty when the call failed
    pub values: Vec<WireValue>,
    /// Diagnostic text sent along with a failure
    pub diagnostic: Option<String>,
}

impl ProcedureResponse {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status.is_ok()
    }

    /// Turn a failure status into [`DbmiError::Operation`].
    pub fn into_result(self) -> DbmiResult<Vec<WireValue>> {
        if self.status.is_ok() {
            Ok(self.values)
        } else {
            Err(DbmiError::Operation {
                procedure: self.procedure.name(),
                status: self.status,
                diagnostic: self.diagnostic,
            })
        }
    }
}

// ============================================================================
// Exchange
// ============================================================================

/// Send an already validated request and read its complete response.
pub(crate) async fn exchange(
    channel: &mut ChannelEndpoint,
    request: &ProcedureRequest<'_>,
    limits: &CodecLimits,
) -> DbmiResult<ProcedureResponse> {
    channel.send(&request.encode()).await?;
    read_response(channel, request.procedure, limits).await
}

/// Read the status word and whatever the catalog says follows it.
pub(crate) async fn read_response(
    channel: &mut ChannelEndpoint,
    procedure: Procedure,
    limits: &CodecLimits,
) -> DbmiResult<ProcedureResponse> {
    let entry = procedure.entry();

    let code = channel.recv_i32().await?;
    let status = StatusCode::from_code(code).ok_or_else(|| {
        DbmiError::Protocol(format!(
            "Unrecognized status {} in response to {}",
            code, procedure
        ))
    })?;

    if !status.is_ok() {
        // Drain the diagnostic so the next call starts on a message boundary.
        let diagnostic = if entry.diagnostic_on_failure {
            match channel.recv_value_in_message(limits).await? {
                WireValue::Text(msg) => Some(msg),
                WireValue::Null => None,
                other => {
                    return Err(DbmiError::Protocol(format!(
                        "{} diagnostic must be {}, got {}",
                        procedure,
                        WireType::Text,
                        other.wire_type()
                    )))
                }
            }
        } else {
            None
        };

        return Ok(ProcedureResponse {
            procedure,
            status,
            values: Vec::new(),
            diagnostic,
        });
    }

    let mut values = Vec::with_capacity(entry.results.len());
    for _ in entry.results {
        values.push(channel.recv_value_in_message(limits).await?);
    }
    entry.validate_results(&values).map_err(DbmiError::Protocol)?;

    Ok(ProcedureResponse {
        procedure,
        status,
        values,
        diagnostic: None,
    })
}
