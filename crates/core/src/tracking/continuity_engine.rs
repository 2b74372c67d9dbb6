use std::sync::Arc;

use crate::biometric::domain::template::FaceTemplate;
use crate::database::face_database::{FaceDatabase, MetadataMode};
use crate::shared::constants::{
    DEFAULT_INSTANT_MATCH_THRESHOLD, DEFAULT_MATCH_THRESHOLD, DEFAULT_NEW_TEMPLATE_THRESHOLD,
    DEFAULT_SWEEP_INTERVAL,
};
use crate::tracking::candidate::TrackingStatus;
use crate::tracking::capture::{CaptureRegistry, PendingCapture};
use crate::tracking::match_event::Match;
use crate::tracking::tracking_table::TrackingTable;

/// Decision thresholds and sweep cadence for the continuity engine.
#[derive(Clone, Copy, Debug)]
pub struct EngineParams {
    /// Tracked-candidate similarity trusted without corroboration
    /// (compared with `>`).
    pub instant_match_threshold: f32,
    /// Similarity at which a template reinforces a candidate's record
    /// (compared with `>=`).
    pub new_template_threshold: f32,
    /// Global floor for emitting matches and seeding tracks.
    pub match_threshold: f32,
    /// Processed batches between stale-track sweeps.
    pub sweep_interval: u32,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            instant_match_threshold: DEFAULT_INSTANT_MATCH_THRESHOLD,
            new_template_threshold: DEFAULT_NEW_TEMPLATE_THRESHOLD,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Reconciles each frame's templates against per-track history and the
/// identity database.
///
/// Runs on the pipeline's terminal stage with parallelism 1, which
/// serializes candidate updates per track without extra locking; the
/// capture registry and tracking table are still internally locked
/// because operator calls and the cutout stage touch them concurrently.
pub struct ContinuityEngine {
    db: Arc<FaceDatabase>,
    tracks: Arc<TrackingTable>,
    captures: Arc<CaptureRegistry>,
    params: EngineParams,
    batches_since_sweep: u32,
}

impl ContinuityEngine {
    pub fn new(
        db: Arc<FaceDatabase>,
        tracks: Arc<TrackingTable>,
        captures: Arc<CaptureRegistry>,
        params: EngineParams,
    ) -> Self {
        Self {
            db,
            tracks,
            captures,
            params,
            batches_since_sweep: 0,
        }
    }

    /// Decides every template of one frame batch, then advances the
    /// sweep cadence.
    pub fn process_batch(&mut self, templates: &[FaceTemplate]) -> Vec<Match> {
        let matches = templates
            .iter()
            .filter_map(|template| self.process_template(template))
            .collect();

        self.batches_since_sweep += 1;
        if self.batches_since_sweep >= self.params.sweep_interval.max(1) {
            self.batches_since_sweep = 0;
            let evicted = self.tracks.sweep();
            if !evicted.is_empty() {
                log::debug!("evicted {} stale tracks: {evicted:?}", evicted.len());
            }
        }
        matches
    }

    /// One template's walk through the decision ladder. Every processed
    /// template marks its track seen for the current sweep interval.
    pub fn process_template(&mut self, template: &FaceTemplate) -> Option<Match> {
        let track_id = template.track_id;

        // A pending capture consumes the template outright; thresholds
        // are not evaluated this frame.
        if let Some(pending) = self.captures.take(track_id) {
            self.consume_capture(template, pending);
            self.tracks.mark_seen(track_id);
            return None;
        }

        let decision = match self.tracks.get(track_id) {
            Some(status) if status.top().is_some() => self.decide_tracked(template, &status),
            _ => self.decide_untracked(template),
        };
        self.tracks.mark_seen(track_id);
        decision
    }

    pub fn tracks(&self) -> &Arc<TrackingTable> {
        &self.tracks
    }

    fn decide_tracked(&mut self, template: &FaceTemplate, status: &TrackingStatus) -> Option<Match> {
        let track_id = template.track_id;
        let demographics = Some(&template.demographics);
        let top_face = status.top()?.face_id;

        let top_score = self.db.score_record(top_face, &template.data, demographics);
        let top_similarity = top_score.as_ref().map_or(0.0, |s| s.similarity);

        // 2. Instant match against the top candidate.
        if top_similarity > self.params.instant_match_threshold {
            let score = top_score?;
            self.tracks.with_status(track_id, |s| {
                if let Some(top) = s.top_mut() {
                    top.confirmations += top_similarity;
                }
            });
            return Some(Match::from_best(score, track_id));
        }

        // 3. Instant match among the remaining candidates.
        let rest_score = status
            .rest()
            .iter()
            .filter_map(|candidate| {
                self.db
                    .score_record(candidate.face_id, &template.data, demographics)
            })
            .max_by(|a, b| {
                a.similarity
                    .partial_cmp(&b.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        let rest_similarity = rest_score.as_ref().map_or(0.0, |s| s.similarity);

        if rest_similarity > self.params.instant_match_threshold {
            let score = rest_score?;
            let face_id = score.face_id;
            self.tracks.with_status(track_id, |s| {
                if let Some(candidate) = s.candidate_mut(face_id) {
                    candidate.confirmations += rest_similarity;
                }
                if let Some(position) = s.position_of(face_id) {
                    s.promote_if_leads(position);
                }
            });
            return Some(Match::from_best(score, track_id));
        }

        // 4./5. Reinforce and/or match on the better of the two.
        let (best_similarity, best_score) = if top_similarity >= rest_similarity {
            (top_similarity, top_score)
        } else {
            (rest_similarity, rest_score)
        };

        let reinforce = best_similarity >= self.params.new_template_threshold;
        let emit = best_similarity >= self.params.match_threshold;
        if reinforce || emit {
            let score = best_score?;
            if reinforce {
                if let Err(e) = self.db.add_or_update(
                    score.face_id,
                    template.data.clone(),
                    &template.demographics,
                    template.image_png.clone(),
                ) {
                    log::warn!(
                        "could not reinforce face {} from track {track_id}: {e}",
                        score.face_id
                    );
                }
            }
            return emit.then(|| Match::from_best(score, track_id));
        }

        // 6. Nothing tracked fits; treat like an unknown face.
        self.decide_untracked(template)
    }

    fn decide_untracked(&mut self, template: &FaceTemplate) -> Option<Match> {
        let track_id = template.track_id;
        let best = self.db.best_match(
            &template.data,
            Some(&template.demographics),
            MetadataMode::Exclude,
        )?;
        if best.similarity <= self.params.match_threshold {
            return None;
        }

        let face_id = best.face_id;
        let similarity = best.similarity;
        let already_tracked = self.tracks.with_status(track_id, |status| {
            match status.candidate_mut(face_id) {
                Some(candidate) => candidate.confirmations += similarity,
                None => status.add_candidate(face_id, similarity),
            }
            if let Some(position) = status.position_of(face_id) {
                status.promote_if_leads(position);
            }
        });
        if already_tracked.is_none() {
            self.tracks
                .insert(track_id, TrackingStatus::seeded(face_id, similarity));
        }

        Some(Match::from_best(best, track_id))
    }

    /// Force-adds the template to the capture target and resolves the
    /// ticket with the resulting status, exactly once.
    fn consume_capture(&mut self, template: &FaceTemplate, pending: PendingCapture) {
        let track_id = pending.track_id();
        let target = self
            .tracks
            .get(track_id)
            .and_then(|status| status.top().map(|c| c.face_id));

        let stored = match target {
            Some(face_id) => self
                .db
                .add_or_update(
                    face_id,
                    template.data.clone(),
                    &template.demographics,
                    template.image_png.clone(),
                )
                .map(|_| face_id),
            None => self
                .db
                .add_new_face(
                    None,
                    template.data.clone(),
                    &template.demographics,
                    template.image_png.clone(),
                )
                .map(|face_id| {
                    self.tracks
                        .insert(track_id, TrackingStatus::seeded(face_id, 0.0));
                    face_id
                }),
        };
        match stored {
            Ok(face_id) => log::debug!("capture for track {track_id} stored into face {face_id}"),
            Err(e) => log::warn!("capture for track {track_id} failed to store: {e}"),
        }

        pending.resolve(self.tracks.get(track_id).unwrap_or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::biometric::domain::engine::TemplateMatcher;
    use crate::biometric::domain::template::DemographicEstimate;
    use crate::shared::TrackId;
    use approx::assert_relative_eq;

    const LEN: usize = 8;

    /// Scores template pairs by their first byte through a scripted
    /// table; unknown pairs score 0.
    struct ScriptedMatcher {
        scores: HashMap<(u8, u8), f32>,
    }

    impl ScriptedMatcher {
        fn new(pairs: &[(u8, u8, f32)]) -> Self {
            let mut scores = HashMap::new();
            for (a, b, s) in pairs {
                scores.insert((*a, *b), *s);
                scores.insert((*b, *a), *s);
            }
            Self { scores }
        }
    }

    impl TemplateMatcher for ScriptedMatcher {
        fn similarity(&self, a: &[u8], b: &[u8]) -> f32 {
            if a.is_empty() || b.is_empty() {
                return 0.0;
            }
            self.scores.get(&(a[0], b[0])).copied().unwrap_or(0.0)
        }

        fn template_len(&self) -> usize {
            LEN
        }
    }

    fn template(tag: u8, track_id: TrackId) -> FaceTemplate {
        FaceTemplate::new(vec![tag; LEN], DemographicEstimate::unknown(), track_id)
    }

    struct Fixture {
        db: Arc<FaceDatabase>,
        tracks: Arc<TrackingTable>,
        captures: Arc<CaptureRegistry>,
        engine: ContinuityEngine,
    }

    fn fixture(pairs: &[(u8, u8, f32)], params: EngineParams) -> Fixture {
        let db = Arc::new(FaceDatabase::new(Arc::new(ScriptedMatcher::new(pairs))));
        let tracks = Arc::new(TrackingTable::new());
        let captures = Arc::new(CaptureRegistry::new());
        let engine = ContinuityEngine::new(
            db.clone(),
            tracks.clone(),
            captures.clone(),
            params,
        );
        Fixture {
            db,
            tracks,
            captures,
            engine,
        }
    }

    fn params() -> EngineParams {
        EngineParams {
            instant_match_threshold: 0.92,
            new_template_threshold: 0.40,
            match_threshold: 0.50,
            sweep_interval: 100,
        }
    }

    /// Stores a record whose single template carries `tag`, under an
    /// explicit id.
    fn store(db: &FaceDatabase, id: u64, tag: u8) {
        db.add_or_update(id, vec![tag; LEN], &DemographicEstimate::unknown(), None)
            .unwrap();
    }

    fn snapshot_count(db: &FaceDatabase, id: u64) -> usize {
        db.snapshot_records()
            .iter()
            .find(|(record_id, _)| *record_id == id)
            .map_or(0, |(_, record)| record.snapshots().len())
    }

    #[test]
    fn test_untracked_below_threshold_no_match_no_mutation() {
        let mut f = fixture(&[(1, 2, 0.5)], params());
        store(&f.db, 7, 1);

        let result = f.engine.process_template(&template(2, 42));

        assert!(result.is_none(), "0.5 is not above the 0.5 threshold");
        assert!(f.tracks.get(42).is_none());
        assert_eq!(f.db.len(), 1);
        assert_eq!(snapshot_count(&f.db, 7), 1);
    }

    #[test]
    fn test_untracked_seeds_tracking_and_emits_match() {
        let mut f = fixture(&[(1, 2, 0.96)], params());
        store(&f.db, 7, 1);

        let m = f.engine.process_template(&template(2, 42)).unwrap();

        assert_eq!(m.face_id, 7);
        assert_relative_eq!(m.similarity, 0.96);
        assert_eq!(m.track_id, 42);

        let status = f.tracks.get(42).unwrap();
        assert_eq!(status.top().unwrap().face_id, 7);
        assert_relative_eq!(status.top().unwrap().confirmations, 0.96);
    }

    #[test]
    fn test_instant_match_accumulates_confirmations() {
        let mut f = fixture(&[(1, 2, 0.95)], params());
        store(&f.db, 7, 1);
        f.tracks.insert(42, TrackingStatus::seeded(7, 5.2));

        let m = f.engine.process_template(&template(2, 42)).unwrap();

        assert_eq!(m.face_id, 7);
        let status = f.tracks.get(42).unwrap();
        assert_relative_eq!(status.top().unwrap().confirmations, 6.15);
    }

    #[test]
    fn test_below_both_thresholds_changes_nothing() {
        // Top candidate scores 0.39 (< 0.40) and the database-wide
        // alternative scores 0.3 (<= 0.5): no reinforcement, no match,
        // no mutation.
        let mut f = fixture(&[(1, 9, 0.39), (2, 9, 0.3)], params());
        store(&f.db, 7, 1);
        store(&f.db, 8, 2);
        f.tracks.insert(42, TrackingStatus::seeded(7, 5.2));

        let result = f.engine.process_template(&template(9, 42));

        assert!(result.is_none());
        let status = f.tracks.get(42).unwrap();
        assert_eq!(status.candidates().len(), 1);
        assert_relative_eq!(status.top().unwrap().confirmations, 5.2);
    }

    #[test]
    fn test_exactly_new_template_threshold_reinforces_without_match() {
        let mut f = fixture(&[(1, 9, 0.40)], params());
        store(&f.db, 7, 1);
        f.tracks.insert(42, TrackingStatus::seeded(7, 5.2));

        let result = f.engine.process_template(&template(9, 42));

        assert!(result.is_none(), "0.40 < 0.50 emits no match");
        // Reinforcement appended the probe template to record 7.
        let records = f.db.snapshot_records();
        let record_7 = &records.iter().find(|(id, _)| *id == 7).unwrap().1;
        assert_eq!(record_7.snapshots().len(), 2);
        assert_eq!(record_7.snapshots()[1].template, vec![9; LEN]);
    }

    #[test]
    fn test_above_match_threshold_reinforces_and_matches() {
        let mut f = fixture(&[(1, 9, 0.55)], params());
        store(&f.db, 7, 1);
        f.tracks.insert(42, TrackingStatus::seeded(7, 5.2));

        let m = f.engine.process_template(&template(9, 42)).unwrap();

        assert_eq!(m.face_id, 7);
        assert_relative_eq!(m.similarity, 0.55);
        assert_eq!(snapshot_count(&f.db, 7), 2);
    }

    #[test]
    fn test_best_of_rest_instant_match_promotes() {
        let mut f = fixture(&[(1, 9, 0.2), (2, 9, 0.95)], params());
        store(&f.db, 7, 1);
        store(&f.db, 8, 2);
        let mut status = TrackingStatus::seeded(7, 5.0);
        status.add_candidate(8, 4.5);
        f.tracks.insert(42, status);

        let m = f.engine.process_template(&template(9, 42)).unwrap();

        assert_eq!(m.face_id, 8);
        let status = f.tracks.get(42).unwrap();
        let order: Vec<u64> = status.candidates().iter().map(|c| c.face_id).collect();
        assert_eq!(order, vec![8, 7], "8 overtook 7; former top at tail");
        assert_relative_eq!(status.top().unwrap().confirmations, 5.45);
    }

    #[test]
    fn test_best_of_rest_instant_match_without_lead_stays_in_place() {
        let mut f = fixture(&[(1, 9, 0.2), (2, 9, 0.95)], params());
        store(&f.db, 7, 1);
        store(&f.db, 8, 2);
        let mut status = TrackingStatus::seeded(7, 50.0);
        status.add_candidate(8, 4.5);
        f.tracks.insert(42, status);

        let m = f.engine.process_template(&template(9, 42)).unwrap();

        assert_eq!(m.face_id, 8);
        let status = f.tracks.get(42).unwrap();
        assert_eq!(status.top().unwrap().face_id, 7);
    }

    #[test]
    fn test_tracked_fallthrough_appends_new_candidate() {
        // Candidate 7 scores nothing, but unknown record 8 clears the
        // match threshold in the database-wide search.
        let mut f = fixture(&[(2, 9, 0.7)], params());
        store(&f.db, 7, 1);
        store(&f.db, 8, 2);
        f.tracks.insert(42, TrackingStatus::seeded(7, 5.2));

        let m = f.engine.process_template(&template(9, 42)).unwrap();

        assert_eq!(m.face_id, 8);
        let status = f.tracks.get(42).unwrap();
        assert_eq!(status.candidates().len(), 2);
        assert_eq!(status.top().unwrap().face_id, 7, "5.2 still leads 0.7");
        assert_eq!(status.rest()[0].face_id, 8);
    }

    #[test]
    fn test_capture_bypasses_thresholds_and_resolves_once() {
        let mut f = fixture(&[(1, 9, 0.99)], params());
        store(&f.db, 7, 1);
        f.tracks.insert(42, TrackingStatus::seeded(7, 5.2));
        let ticket = f.captures.register(42);

        let result = f.engine.process_template(&template(9, 42));

        assert!(result.is_none(), "capture frames never emit matches");
        assert_eq!(snapshot_count(&f.db, 7), 2, "template force-added");

        let status = ticket.wait().unwrap();
        assert_eq!(status.top().unwrap().face_id, 7);
        assert!(!f.captures.has_pending(42));
    }

    #[test]
    fn test_capture_untracked_creates_record_and_seeds() {
        let mut f = fixture(&[], params());
        let ticket = f.captures.register(42);

        let result = f.engine.process_template(&template(9, 42));

        assert!(result.is_none());
        assert_eq!(f.db.len(), 1);
        let status = ticket.wait().unwrap();
        let new_id = status.top().unwrap().face_id;
        assert!(f.db.contains(new_id));
        assert_eq!(f.tracks.get(42).unwrap().top().unwrap().face_id, new_id);
    }

    #[test]
    fn test_next_template_after_capture_is_threshold_checked() {
        let mut f = fixture(&[(1, 9, 0.3)], params());
        store(&f.db, 7, 1);
        f.tracks.insert(42, TrackingStatus::seeded(7, 5.2));
        let ticket = f.captures.register(42);

        f.engine.process_template(&template(9, 42));
        ticket.wait().unwrap();

        // Capture consumed; this one walks the normal ladder and fails
        // every threshold.
        let before = f.db.snapshot_records();
        let result = f.engine.process_template(&template(9, 42));
        assert!(result.is_none());
        assert_eq!(f.db.snapshot_records(), before);
    }

    #[test]
    fn test_sweep_evicts_tracks_unseen_for_an_interval() {
        let mut f = fixture(
            &[(1, 2, 0.96), (3, 4, 0.96)],
            EngineParams {
                sweep_interval: 1,
                ..params()
            },
        );
        store(&f.db, 7, 1);
        store(&f.db, 8, 3);

        // Batch 1 seeds track 41; batch 2 only sees track 42.
        f.engine.process_batch(&[template(2, 41)]);
        assert!(f.tracks.contains(41));

        f.engine.process_batch(&[template(4, 42)]);

        assert!(!f.tracks.contains(41), "track 41 missed a full interval");
        assert!(f.tracks.contains(42));
    }

    #[test]
    fn test_batch_returns_all_matches() {
        let mut f = fixture(&[(1, 2, 0.96), (3, 4, 0.96)], params());
        store(&f.db, 7, 1);
        store(&f.db, 8, 3);

        let matches = f
            .engine
            .process_batch(&[template(2, 41), template(4, 42), template(5, 43)]);

        assert_eq!(matches.len(), 2);
    }
}
