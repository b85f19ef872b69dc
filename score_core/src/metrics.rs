/// Counters kept by a [`crate::SyncController`] over its lifetime.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncMetrics {
    pub commits: u64,
    pub failed_commits: u64,
    pub ignored_writes: u64,
    pub own_snapshots: u64,
    pub collection_snapshots: u64,
    pub drafts_discarded: u64,
}

impl SyncMetrics {
    pub fn record_commit(&mut self, ok: bool) {
        if ok {
            self.commits += 1;
        } else {
            self.failed_commits += 1;
        }
    }
}
