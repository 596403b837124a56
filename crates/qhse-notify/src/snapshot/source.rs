//! Fallback-aware snapshot acquisition.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{MockSnapshotProvider, Snapshot, SnapshotProvider};

/// Where the engine gets the snapshot it evaluates.
///
/// Acquisition never fails: any provider error is logged and the fallback
/// snapshot is returned instead.
#[derive(Clone)]
pub struct SnapshotSource {
    provider: Arc<dyn SnapshotProvider>,
    fallback: Snapshot,
    force_mock: bool,
}

impl SnapshotSource {
    pub fn new(provider: Arc<dyn SnapshotProvider>) -> Self {
        Self {
            provider,
            fallback: Snapshot::mock(),
            force_mock: false,
        }
    }

    /// A source that never touches the network.
    pub fn mock() -> Self {
        Self::new(Arc::new(MockSnapshotProvider::default())).with_force_mock(true)
    }

    /// Skip the provider entirely and always use the fallback.
    pub fn with_force_mock(mut self, force_mock: bool) -> Self {
        self.force_mock = force_mock;
        self
    }

    pub fn with_fallback(mut self, fallback: Snapshot) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn is_mock(&self) -> bool {
        self.force_mock
    }

    pub fn fallback(&self) -> &Snapshot {
        &self.fallback
    }

    /// Fetch the current snapshot, substituting the fallback on failure.
    pub async fn acquire(&self) -> Snapshot {
        if self.force_mock {
            debug!("Mock mode enabled, using fallback snapshot");
            return self.fallback.clone();
        }

        match self.provider.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    provider = self.provider.name(),
                    error = %e,
                    "Snapshot acquisition failed, using fallback snapshot"
                );
                self.fallback.clone()
            }
        }
    }
}
