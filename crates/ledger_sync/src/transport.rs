//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use ledger_protocol::{DeltaPayload, KeyLeaseResponse, UploadPayload};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// A sync transport handles network communication with the sync server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, mock for testing, etc.). Dropping a returned
/// future cancels the request.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Sends local changes and receives the server's delta in return.
    async fn exchange(&self, upload: &UploadPayload) -> SyncResult<DeltaPayload>;

    /// Requests a new range of row ids.
    async fn request_lease(&self) -> SyncResult<KeyLeaseResponse>;
}

/// A mock transport for testing.
///
/// Responses are queued and handed out in order. An empty queue fails the
/// request with a non-retryable transport error.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    deltas: Mutex<VecDeque<SyncResult<DeltaPayload>>>,
    leases: Mutex<VecDeque<SyncResult<KeyLeaseResponse>>>,
    uploads: Mutex<Vec<UploadPayload>>,
    lease_requests: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            deltas: Mutex::new(VecDeque::new()),
            leases: Mutex::new(VecDeque::new()),
            uploads: Mutex::new(Vec::new()),
            lease_requests: AtomicUsize::new(0),
            delay: Mutex::new(None),
        }
    }

    /// Queues the delta returned by the next exchange.
    pub fn push_delta(&self, delta: DeltaPayload) {
        self.deltas.lock().push_back(Ok(delta));
    }

    /// Queues an error returned by the next exchange.
    pub fn push_exchange_error(&self, error: SyncError) {
        self.deltas.lock().push_back(Err(error));
    }

    /// Queues the response to the next lease request.
    pub fn push_lease(&self, lease: KeyLeaseResponse) {
        self.leases.lock().push_back(Ok(lease));
    }

    /// Queues an error returned by the next lease request.
    pub fn push_lease_error(&self, error: SyncError) {
        self.leases.lock().push_back(Err(error));
    }

    /// Delays every response by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns every upload received so far.
    pub fn uploads(&self) -> Vec<UploadPayload> {
        self.uploads.lock().clone()
    }

    /// Returns the number of lease requests received.
    pub fn lease_requests(&self) -> usize {
        self.lease_requests.load(Ordering::SeqCst)
    }

    async fn respond<T>(&self, queue: &Mutex<VecDeque<SyncResult<T>>>, what: &str) -> SyncResult<T> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("not connected"));
        }
        queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::transport_fatal(format!("no mock {what} queued"))))
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn exchange(&self, upload: &UploadPayload) -> SyncResult<DeltaPayload> {
        self.uploads.lock().push(upload.clone());
        self.respond(&self.deltas, "delta").await
    }

    async fn request_lease(&self) -> SyncResult<KeyLeaseResponse> {
        self.lease_requests.fetch_add(1, Ordering::SeqCst);
        self.respond(&self.leases, "lease").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_are_handed_out_in_order() {
        let transport = MockTransport::new();
        transport.push_lease(KeyLeaseResponse::new(1, 10));
        transport.push_lease(KeyLeaseResponse::new(10, 20));

        assert_eq!(transport.request_lease().await.unwrap().next_key, 1);
        assert_eq!(transport.request_lease().await.unwrap().next_key, 10);
        assert!(matches!(
            transport.request_lease().await,
            Err(SyncError::Transport {
                retryable: false,
                ..
            })
        ));
        assert_eq!(transport.lease_requests(), 3);
    }

    #[tokio::test]
    async fn exchange_records_uploads() {
        let transport = MockTransport::new();
        transport.push_delta(DeltaPayload::new().with_anchor(4));

        let delta = transport.exchange(&UploadPayload::new(3)).await.unwrap();
        assert_eq!(delta.anchor().unwrap(), 4);
        assert_eq!(transport.uploads(), vec![UploadPayload::new(3)]);
    }

    #[tokio::test]
    async fn disconnected_transport_is_retryable() {
        let transport = MockTransport::new();
        transport.push_delta(DeltaPayload::new());
        transport.set_connected(false);

        let err = transport.exchange(&UploadPayload::new(0)).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
