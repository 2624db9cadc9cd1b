//! Key lease renewal.
//!
//! Renewals are single-flight: callers that find a renewal in progress wait
//! for it and reuse its result instead of asking the server again.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use ledger_core::{KeyLease, LedgerDb};
use ledger_store::{Cells, RowId, Table};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Requests and installs key leases for a database.
pub struct LeaseRenewer<T: SyncTransport> {
    db: Arc<LedgerDb>,
    transport: Arc<T>,
    timeout: Duration,
    in_flight: Mutex<()>,
    generation: AtomicU64,
}

impl<T: SyncTransport> LeaseRenewer<T> {
    /// Creates a renewer that gives each request `timeout` to complete.
    pub fn new(db: Arc<LedgerDb>, transport: Arc<T>, timeout: Duration) -> Self {
        Self {
            db,
            transport,
            timeout,
            in_flight: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the number of renewals completed.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Obtains and installs a new lease.
    ///
    /// If another renewal completes while this call waits for its turn, that
    /// lease is returned and no request is sent. Dropping the future cancels
    /// the request.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LeaseRenewalFailed`] if the request fails, times
    /// out, or grants an unusable range.
    pub async fn renew(&self) -> SyncResult<KeyLease> {
        self.renew_after(self.generation()).await
    }

    /// Renews unless a renewal completed since generation `seen`.
    async fn renew_after(&self, seen: u64) -> SyncResult<KeyLease> {
        let _turn = self.in_flight.lock().await;
        if self.generation() != seen {
            debug!("lease renewed while waiting");
            return Ok(self.db.lease());
        }

        match self.request().await {
            Ok(lease) => {
                self.generation.fetch_add(1, Ordering::SeqCst);
                Ok(lease)
            }
            Err(e) => {
                warn!(error = %e, "key lease renewal failed");
                Err(e)
            }
        }
    }

    async fn request(&self) -> SyncResult<KeyLease> {
        let response = tokio::time::timeout(self.timeout, self.transport.request_lease())
            .await
            .map_err(|_| SyncError::lease_renewal_failed("request timed out"))?
            .map_err(|e| SyncError::lease_renewal_failed(e.to_string()))?;
        response
            .validate()
            .map_err(|e| SyncError::lease_renewal_failed(e.to_string()))?;
        if response.is_empty() {
            return Err(SyncError::lease_renewal_failed("server granted no keys"));
        }
        self.db
            .install_lease(response.next_key, response.upper_bound)
            .map_err(|e| SyncError::lease_renewal_failed(e.to_string()))?;
        Ok(self.db.lease())
    }

    /// Inserts a record, renewing the lease once if it ran out.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LeaseRenewalFailed`] if the lease was exhausted
    /// and could not be renewed, or the database error of the insert.
    pub async fn insert_with_renewal(&self, table: Table, cells: Cells) -> SyncResult<RowId> {
        let seen = self.generation();
        match self.db.insert(table, cells.clone()) {
            Err(e) if e.is_out_of_keys() => {
                self.renew_after(seen).await?;
                Ok(self.db.insert(table, cells)?)
            }
            result => Ok(result?),
        }
    }
}

impl<T: SyncTransport> std::fmt::Debug for LeaseRenewer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseRenewer")
            .field("timeout", &self.timeout)
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use ledger_core::CoreError;
    use ledger_protocol::KeyLeaseResponse;
    use ledger_store::Cell;

    fn renewer(transport: MockTransport) -> (Arc<LedgerDb>, Arc<MockTransport>, LeaseRenewer<MockTransport>) {
        let db = Arc::new(LedgerDb::open_in_memory().unwrap());
        let transport = Arc::new(transport);
        let renewer = LeaseRenewer::new(
            Arc::clone(&db),
            Arc::clone(&transport),
            Duration::from_millis(200),
        );
        (db, transport, renewer)
    }

    fn caption(text: &str) -> Cells {
        let mut cells = Cells::new();
        cells.insert("caption".into(), Cell::from(text));
        cells
    }

    #[tokio::test]
    async fn renew_installs_lease() {
        let transport = MockTransport::new();
        transport.push_lease(KeyLeaseResponse::new(100, 110));
        let (db, _, renewer) = renewer(transport);

        let lease = renewer.renew().await.unwrap();
        assert_eq!(lease.next(), 100);
        assert_eq!(db.lease().upper_bound(), 110);
        assert_eq!(renewer.generation(), 1);
    }

    #[tokio::test]
    async fn insert_renews_once_when_exhausted() {
        let transport = MockTransport::new();
        transport.push_lease(KeyLeaseResponse::new(1, 2));
        let (db, transport, renewer) = renewer(transport);

        let row = renewer
            .insert_with_renewal(Table::Categories, caption("Food"))
            .await
            .unwrap();
        assert_eq!(row, 1);
        assert_eq!(transport.lease_requests(), 1);
        assert!(db.lease().is_exhausted());
    }

    #[tokio::test]
    async fn renewal_finished_after_a_failed_insert_is_reused() {
        let transport = MockTransport::new();
        transport.push_lease(KeyLeaseResponse::new(1, 10));
        transport.push_lease(KeyLeaseResponse::new(10, 20));
        let (db, transport, renewer) = renewer(transport);

        // An insert ran out of keys at this generation, then another task
        // renewed before this one asked.
        let seen = renewer.generation();
        renewer.renew().await.unwrap();

        let lease = renewer.renew_after(seen).await.unwrap();
        assert_eq!(lease.next(), 1);
        assert_eq!(transport.lease_requests(), 1);
        assert_eq!(db.lease().upper_bound(), 10);
    }

    #[tokio::test]
    async fn failed_renewal_is_reported() {
        let transport = MockTransport::new();
        transport.push_lease_error(SyncError::transport_retryable("offline"));
        let (db, _, renewer) = renewer(transport);

        let err = renewer
            .insert_with_renewal(Table::Categories, caption("Food"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::LeaseRenewalFailed { .. }));
        assert!(!err.is_retryable());
        assert!(db.query(Table::Categories, &ledger_store::Filter::All).unwrap().is_empty());
        assert_eq!(renewer.generation(), 0);
    }

    #[tokio::test]
    async fn inverted_or_empty_grants_are_rejected() {
        let transport = MockTransport::new();
        transport.push_lease(KeyLeaseResponse::new(10, 5));
        transport.push_lease(KeyLeaseResponse::new(7, 7));
        let (db, _, renewer) = renewer(transport);

        assert!(matches!(
            renewer.renew().await,
            Err(SyncError::LeaseRenewalFailed { .. })
        ));
        assert!(matches!(
            renewer.renew().await,
            Err(SyncError::LeaseRenewalFailed { .. })
        ));
        assert!(db.lease().is_exhausted());
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let transport = MockTransport::new();
        transport.push_lease(KeyLeaseResponse::new(1, 10));
        transport.set_delay(Some(Duration::from_secs(5)));
        let (db, _, renewer) = renewer(transport);

        let err = renewer.renew().await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(db.lease().is_exhausted());
    }

    #[tokio::test]
    async fn other_errors_pass_through() {
        let (db, transport, renewer) = renewer(MockTransport::new());
        db.install_lease(1, 5).unwrap();

        let mut cells = caption("Food");
        cells.insert("_id".into(), Cell::Integer(3));
        let err = renewer
            .insert_with_renewal(Table::Categories, cells)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Core(CoreError::InvalidArgument { .. })
        ));
        assert_eq!(transport.lease_requests(), 0);
    }
}
