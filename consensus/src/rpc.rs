use braid_consensus_core::header::Header;
use braid_consensus_core::pending_header::PendingHeader;
use braid_consensus_core::tx::{PendingEtxs, Transaction};
use braid_consensus_core::Location;
use braid_hashes::Hash;
use num_bigint::BigUint;
use std::time::Duration;
use thiserror::Error;

/// Failures at the dom/sub RPC boundary. Timeouts surface as
/// `SubNotSynced`, so the caller keeps the header for a later retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("sub not synced to dom")]
    SubNotSynced,

    #[error("rpc deadline exceeded")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("remote append rejected: {0}")]
    Remote(String),
}

/// Handle to one subordinate chain (Prime -> Region, Region -> Zone). Calls
/// must respect the supplied timeout and be cancellable; a timed-out call
/// leaves the subordinate free to finish or drop the work on its side.
pub trait SubClient: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn append(
        &self,
        header: &Header,
        dom_pending_header: &Header,
        dom_terminus: Hash,
        td: &BigUint,
        reorg: bool,
        manifest_hash: Hash,
        new_inbound_etxs: &[Transaction],
        timeout: Duration,
    ) -> Result<PendingEtxs, ClientError>;

    fn sub_relay_pending_header(&self, pending_header: &PendingHeader, reorg: bool, origin_location: Location, timeout: Duration);
}

/// Handle to the dominant chain.
pub trait DomClient: Send + Sync {
    fn send_pending_etxs_to_dom(&self, header: &Header, etxs: &PendingEtxs, timeout: Duration) -> Result<(), ClientError>;
}
