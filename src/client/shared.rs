//! A driver handle shared between tasks.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use super::envelope::ProcedureResponse;
use super::handle::{DriverHandle, HandleState};
use crate::error::DbmiResult;
use crate::proto::{Procedure, WireValue};

/// Serializes calls from concurrent tasks onto one handle.
///
/// The protocol has no request ids, so each call holds the lock from the
/// first request byte to the last response byte. Use [`SharedDriver::lock`]
/// to keep the handle across several calls (e.g. a whole transaction).
#[derive(Clone, Debug)]
pub struct SharedDriver {
    inner: Arc<Mutex<DriverHandle>>,
}

impl SharedDriver {
    pub fn new(handle: DriverHandle) -> Self {
        Self {
            inner: Arc::new(Mutex::new(handle)),
        }
    }

    pub async fn call(
        &self,
        procedure: Procedure,
        args: &[WireValue],
    ) -> DbmiResult<ProcedureResponse> {
        self.inner.lock().await.call(procedure, args).await
    }

    pub async fn lock(&self) -> MutexGuard<'_, DriverHandle> {
        self.inner.lock().await
    }

    pub async fn state(&self) -> HandleState {
        self.inner.lock().await.state()
    }

    /// Close the handle once every pending call has finished.
    pub async fn close(&self) {
        self.inner.lock().await.close().await;
    }
}
