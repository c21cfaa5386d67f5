//! Relay metrics
//!
//! Byte totals from finished CONNECT relays fan out to this trait.

use crate::session::SessionContext;

/// Observer for relay byte counts
pub trait Metrics: Send + Sync {
    /// Bytes delivered client to target over one session
    fn upload_bytes(&self, ctx: &SessionContext, n: u64);

    /// Bytes delivered target to client over one session
    fn download_bytes(&self, ctx: &SessionContext, n: u64);
}

/// Metrics sink that discards everything
#[derive(Debug, Default)]
pub struct NopMetrics;

impl Metrics for NopMetrics {
    fn upload_bytes(&self, _ctx: &SessionContext, _n: u64) {}
    fn download_bytes(&self, _ctx: &SessionContext, _n: u64) {}
}
