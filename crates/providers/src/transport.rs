use crate::dispatch::DispatchRequest;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use intake_core::error::IntakeError;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, IntakeError>> + Send>>;

/// The upstream response reader. Dropping it releases the connection.
pub struct UpstreamBody {
    inner: ByteStream,
    chunks: u64,
}

impl UpstreamBody {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, IntakeError>> + Send + 'static,
    {
        Self { inner: Box::pin(stream), chunks: 0 }
    }

    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, IntakeError>> {
        let next = self.inner.next().await;
        if matches!(next, Some(Ok(_))) {
            self.chunks += 1;
        }
        next
    }
}

impl Drop for UpstreamBody {
    fn drop(&mut self) {
        debug!(target: "providers::transport", chunks = self.chunks, "upstream reader released");
    }
}

/// Issues a dispatch request and hands back the streaming body.
///
/// Connection failures, timeouts and non-success statuses are
/// `IntakeError::Connect`; a cancellation observed while connecting is
/// `IntakeError::Canceled`.
#[allow(async_fn_in_trait)]
pub trait Transport: Send + Sync {
    async fn open(
        &self,
        request: &DispatchRequest,
        cancel: &CancellationToken,
    ) -> Result<UpstreamBody, IntakeError>;
}
