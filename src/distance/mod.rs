pub mod table;

use async_trait::async_trait;

pub use table::StaticDistanceTable;

/// Resolves the distance between two store/location labels.
///
/// `Ok(None)` means the distance is unknown. Implementations backed by a remote
/// service may fail or stall; callers treat both the same as unknown.
#[async_trait]
pub trait DistanceProvider: Send + Sync {
    async fn distance_km(&self, from: &str, to: &str) -> eyre::Result<Option<f64>>;
}
