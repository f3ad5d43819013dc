//! Byte channel to one driver process.
//!
//! The channel owns the two pipe halves and a read buffer. Callers only ever
//! see complete units: an exact byte count or one whole wire value.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::error::{DbmiError, DbmiResult};
use crate::proto::{try_decode, CodecLimits, WireValue};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

const READ_CHUNK: usize = 8192;

/// Bidirectional, ordered byte stream bound to one driver.
pub struct ChannelEndpoint {
    reader: Option<BufReader<BoxedReader>>,
    writer: Option<BufWriter<BoxedWriter>>,
    /// Bytes read from the driver but not yet handed out
    read_buffer: BytesMut,
    bytes_sent: u64,
    bytes_received: u64,
}

impl ChannelEndpoint {
    pub fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            reader: Some(BufReader::new(reader)),
            writer: Some(BufWriter::new(writer)),
            read_buffer: BytesMut::with_capacity(READ_CHUNK),
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Build a channel from any pair of async halves.
    pub fn from_halves<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::new(Box::new(reader), Box::new(writer))
    }

    /// Write one complete message and flush it.
    pub async fn send(&mut self, data: &[u8]) -> DbmiResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| DbmiError::connection("Channel is closed"))?;

        writer
            .write_all(data)
            .await
            .map_err(|e| DbmiError::Connection(format!("Write to driver failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| DbmiError::Connection(format!("Write to driver failed: {}", e)))?;

        self.bytes_sent += data.len() as u64;
        Ok(())
    }

    /// Read exactly `n` bytes.
    pub async fn recv_exact(&mut self, n: usize) -> DbmiResult<Bytes> {
        while self.read_buffer.len() < n {
            self.fill(false).await?;
        }
        Ok(self.read_buffer.split_to(n).freeze())
    }

    /// Read exactly `n` bytes, or `None` if the stream ends cleanly before
    /// the first of them.
    pub async fn recv_exact_or_eof(&mut self, n: usize) -> DbmiResult<Option<Bytes>> {
        while self.read_buffer.len() < n {
            match self.fill(false).await {
                Ok(()) => {}
                Err(DbmiError::Connection(_)) if self.read_buffer.is_empty() => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        Ok(Some(self.read_buffer.split_to(n).freeze()))
    }

    pub async fn recv_i32(&mut self) -> DbmiResult<i32> {
        Ok(self.recv_exact(4).await?.get_i32_le())
    }

    /// Read one complete wire value.
    pub async fn recv_value(&mut self, limits: &CodecLimits) -> DbmiResult<WireValue> {
        self.read_value(limits, false).await
    }

    /// Read one wire value of a message whose first bytes were already
    /// consumed. End of stream is then a truncated message.
    pub async fn recv_value_in_message(&mut self, limits: &CodecLimits) -> DbmiResult<WireValue> {
        self.read_value(limits, true).await
    }

    async fn read_value(&mut self, limits: &CodecLimits, mid_message: bool) -> DbmiResult<WireValue> {
        loop {
            if let Some(value) = try_decode(&mut self.read_buffer, limits)? {
                return Ok(value);
            }
            self.fill(mid_message).await?;
        }
    }

    /// Pull more bytes from the driver into the read buffer.
    ///
    /// End of stream between messages means the driver went away
    /// (connection error). Inside a message, buffered or `mid_message`, the
    /// message was cut short (protocol error).
    async fn fill(&mut self, mid_message: bool) -> DbmiResult<()> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| DbmiError::connection("Channel is closed"))?;

        let mut buf = [0u8; READ_CHUNK];
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| DbmiError::Connection(format!("Read from driver failed: {}", e)))?;

        if n == 0 {
            return if self.read_buffer.is_empty() && !mid_message {
                Err(DbmiError::connection("Driver closed the channel"))
            } else {
                Err(DbmiError::Protocol(format!(
                    "Driver closed the channel mid-message ({} byte(s) pending)",
                    self.read_buffer.len()
                )))
            };
        }

        self.bytes_received += n as u64;
        self.read_buffer.extend_from_slice(&buf[..n]);
        Ok(())
    }

    /// Release both halves. Safe to call any number of times.
    pub async fn close(&mut self) {
        self.reader = None;
        self.read_buffer.clear();
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Ignoring error while closing driver channel: {}", e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

impl std::fmt::Debug for ChannelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEndpoint")
            .field("closed", &self.is_closed())
            .field("buffered", &self.read_buffer.len())
            .field("bytes_sent", &self.bytes_sent)
            .field("bytes_received", &self.bytes_received)
            .finish()
    }
}
