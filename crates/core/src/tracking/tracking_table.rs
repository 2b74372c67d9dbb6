use std::collections::HashMap;
use std::sync::RwLock;

use crate::shared::TrackId;
use crate::tracking::candidate::TrackingStatus;

/// Shared map of live tracking ids to their candidate state.
///
/// Locking is internal: the cutout stage consults the skip heuristic
/// while the terminal stage mutates candidates, so the table must be
/// safe under concurrent access without caller-side locking.
#[derive(Default)]
pub struct TrackingTable {
    tracks: RwLock<HashMap<TrackId, TrackingStatus>>,
}

impl TrackingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.read().contains_key(&id)
    }

    /// Clone of the current status, for capture resolution and callers
    /// outside the terminal stage.
    pub fn get(&self, id: TrackId) -> Option<TrackingStatus> {
        self.read().get(&id).cloned()
    }

    pub fn insert(&self, id: TrackId, status: TrackingStatus) {
        self.write().insert(id, status);
    }

    /// Runs `f` against the status for `id`, if tracked.
    pub fn with_status<T>(
        &self,
        id: TrackId,
        f: impl FnOnce(&mut TrackingStatus) -> T,
    ) -> Option<T> {
        self.write().get_mut(&id).map(f)
    }

    pub fn mark_seen(&self, id: TrackId) {
        if let Some(status) = self.write().get_mut(&id) {
            status.mark_seen();
        }
    }

    /// Skip-heuristic bookkeeping for the cutout stage. Returns `true`
    /// when deep processing should be skipped this frame: the track's
    /// top candidate has at least `min_confirmations` and fewer than
    /// `max_skipped` consecutive skips so far. Exhausting the budget
    /// resets the counter and processes the frame.
    pub fn should_skip(&self, id: TrackId, min_confirmations: f32, max_skipped: u32) -> bool {
        let mut tracks = self.write();
        let Some(top) = tracks.get_mut(&id).and_then(|s| s.top_mut()) else {
            return false;
        };
        if top.confirmations < min_confirmations {
            return false;
        }
        if top.skipped_frames < max_skipped {
            top.skipped_frames += 1;
            true
        } else {
            top.skipped_frames = 0;
            false
        }
    }

    /// Ids that the next sweep would evict. Pure query: calling it any
    /// number of times without intervening frames yields the same set.
    pub fn stale_ids(&self) -> Vec<TrackId> {
        let mut stale: Vec<TrackId> = self
            .read()
            .iter()
            .filter(|(_, status)| !status.was_seen())
            .map(|(id, _)| *id)
            .collect();
        stale.sort_unstable();
        stale
    }

    /// Evicts every track unseen since the previous sweep, then resets
    /// all remaining flags for the next interval. Returns the evicted
    /// ids.
    pub fn sweep(&self) -> Vec<TrackId> {
        let mut tracks = self.write();
        let mut evicted: Vec<TrackId> = tracks
            .iter()
            .filter(|(_, status)| !status.was_seen())
            .map(|(id, _)| *id)
            .collect();
        evicted.sort_unstable();
        for id in &evicted {
            tracks.remove(id);
        }
        for status in tracks.values_mut() {
            status.clear_seen();
        }
        evicted
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TrackId, TrackingStatus>> {
        self.tracks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TrackId, TrackingStatus>> {
        self.tracks.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(ids: &[(TrackId, f32)]) -> TrackingTable {
        let table = TrackingTable::new();
        for (id, conf) in ids {
            table.insert(*id, TrackingStatus::seeded(100 + *id as u64, *conf));
        }
        table
    }

    #[test]
    fn test_insert_get_roundtrip() {
        let table = table_with(&[(1, 2.5)]);
        let status = table.get(1).unwrap();
        assert_eq!(status.top().unwrap().face_id, 101);
        assert!(table.get(2).is_none());
    }

    #[test]
    fn test_sweep_evicts_unseen_and_resets_flags() {
        let table = table_with(&[(1, 1.0), (2, 1.0)]);
        // Seeded statuses are seen; nothing evicted, flags reset.
        assert!(table.sweep().is_empty());

        // Only track 1 is seen this interval.
        table.mark_seen(1);
        assert_eq!(table.sweep(), vec![2]);
        assert!(table.contains(1));
        assert!(!table.contains(2));
    }

    #[test]
    fn test_stale_query_is_idempotent() {
        let table = table_with(&[(1, 1.0), (2, 1.0), (3, 1.0)]);
        table.sweep(); // clear the seeded flags
        table.mark_seen(2);

        let first = table.stale_ids();
        let second = table.stale_ids();
        assert_eq!(first, second);
        assert_eq!(first, vec![1, 3]);
        // And the sweep evicts exactly the queried set.
        assert_eq!(table.sweep(), first);
    }

    #[test]
    fn test_sweep_is_deterministic_for_identical_state() {
        let make = || {
            let t = table_with(&[(1, 1.0), (2, 1.0), (3, 1.0)]);
            t.sweep();
            t.mark_seen(3);
            t
        };
        assert_eq!(make().sweep(), make().sweep());
    }

    #[test]
    fn test_should_skip_requires_confirmations() {
        let table = table_with(&[(1, 2.0)]);
        assert!(!table.should_skip(1, 5.0, 3));
        assert!(!table.should_skip(9, 5.0, 3)); // untracked
    }

    #[test]
    fn test_skip_budget_then_resume() {
        let table = table_with(&[(1, 6.0)]);
        let max_skipped = 3;

        // Skipped for up to max_skipped consecutive frames...
        for _ in 0..max_skipped {
            assert!(table.should_skip(1, 5.0, max_skipped));
        }
        // ...then processing resumes on frame max_skipped + 1...
        assert!(!table.should_skip(1, 5.0, max_skipped));
        // ...and the budget starts over.
        assert!(table.should_skip(1, 5.0, max_skipped));
    }

    #[test]
    fn test_with_status_mutates_in_place() {
        let table = table_with(&[(1, 1.0)]);
        let confirmed = table
            .with_status(1, |status| {
                status.top_mut().unwrap().confirmations += 0.5;
                status.top().unwrap().confirmations
            })
            .unwrap();
        assert_eq!(confirmed, 1.5);
        assert!(table.with_status(9, |_| ()).is_none());
    }
}
