use crate::shared::FaceId;

/// One candidate identity for a live track, ranked by accumulated
/// similarity ("confirmations").
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateStatus {
    pub face_id: FaceId,
    pub confirmations: f32,
    pub skipped_frames: u32,
}

impl CandidateStatus {
    pub fn new(face_id: FaceId, confirmations: f32) -> Self {
        Self {
            face_id,
            confirmations,
            skipped_frames: 0,
        }
    }
}

/// Per-live-track ranked candidate list. Index 0 is the top candidate;
/// a non-top candidate whose confirmations overtake the top's swaps to
/// the front, and the former top moves to the tail.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackingStatus {
    candidates: Vec<CandidateStatus>,
    was_seen: bool,
}

impl TrackingStatus {
    /// A fresh status created on first match for a tracking id.
    pub fn seeded(face_id: FaceId, confirmations: f32) -> Self {
        Self {
            candidates: vec![CandidateStatus::new(face_id, confirmations)],
            was_seen: true,
        }
    }

    pub fn candidates(&self) -> &[CandidateStatus] {
        &self.candidates
    }

    pub fn top(&self) -> Option<&CandidateStatus> {
        self.candidates.first()
    }

    pub fn top_mut(&mut self) -> Option<&mut CandidateStatus> {
        self.candidates.first_mut()
    }

    /// Candidates below the top, in rank order.
    pub fn rest(&self) -> &[CandidateStatus] {
        self.candidates.get(1..).unwrap_or_default()
    }

    pub fn position_of(&self, face_id: FaceId) -> Option<usize> {
        self.candidates.iter().position(|c| c.face_id == face_id)
    }

    pub fn candidate_mut(&mut self, face_id: FaceId) -> Option<&mut CandidateStatus> {
        self.candidates.iter_mut().find(|c| c.face_id == face_id)
    }

    /// Appends a new candidate at the tail.
    pub fn add_candidate(&mut self, face_id: FaceId, confirmations: f32) {
        self.candidates
            .push(CandidateStatus::new(face_id, confirmations));
    }

    /// Swaps the candidate at `index` to the front iff its confirmations
    /// exceed the current top's; the former top moves to the tail.
    /// Returns whether a promotion happened.
    pub fn promote_if_leads(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.candidates.len() {
            return false;
        }
        if self.candidates[index].confirmations <= self.candidates[0].confirmations {
            return false;
        }
        let challenger = self.candidates.remove(index);
        let former_top = self.candidates.remove(0);
        self.candidates.insert(0, challenger);
        self.candidates.push(former_top);
        true
    }

    pub fn was_seen(&self) -> bool {
        self.was_seen
    }

    pub fn mark_seen(&mut self) {
        self.was_seen = true;
    }

    pub fn clear_seen(&mut self) {
        self.was_seen = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(confs: &[(FaceId, f32)]) -> TrackingStatus {
        let mut s = TrackingStatus::default();
        for (id, c) in confs {
            s.add_candidate(*id, *c);
        }
        s
    }

    #[test]
    fn test_seeded_has_single_top_and_is_seen() {
        let s = TrackingStatus::seeded(7, 0.96);
        assert_eq!(s.top().unwrap().face_id, 7);
        assert_eq!(s.top().unwrap().skipped_frames, 0);
        assert!(s.rest().is_empty());
        assert!(s.was_seen());
    }

    #[test]
    fn test_promote_moves_former_top_to_tail() {
        let mut s = status(&[(1, 5.0), (2, 3.0), (3, 6.0)]);

        assert!(s.promote_if_leads(2));

        let order: Vec<FaceId> = s.candidates().iter().map(|c| c.face_id).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn test_promote_requires_strictly_more_confirmations() {
        let mut s = status(&[(1, 5.0), (2, 5.0)]);
        assert!(!s.promote_if_leads(1));
        assert_eq!(s.top().unwrap().face_id, 1);
    }

    #[test]
    fn test_promote_out_of_range_is_noop() {
        let mut s = status(&[(1, 5.0)]);
        assert!(!s.promote_if_leads(0));
        assert!(!s.promote_if_leads(3));
    }

    #[test]
    fn test_position_and_candidate_mut() {
        let mut s = status(&[(1, 5.0), (2, 3.0)]);
        assert_eq!(s.position_of(2), Some(1));
        assert_eq!(s.position_of(9), None);

        s.candidate_mut(2).unwrap().confirmations += 1.0;
        assert_eq!(s.candidates()[1].confirmations, 4.0);
    }

    #[test]
    fn test_seen_flag_roundtrip() {
        let mut s = status(&[(1, 1.0)]);
        assert!(!s.was_seen());
        s.mark_seen();
        assert!(s.was_seen());
        s.clear_seen();
        assert!(!s.was_seen());
    }
}
