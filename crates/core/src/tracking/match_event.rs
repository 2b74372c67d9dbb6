use crate::database::face_database::BestMatch;
use crate::database::face_record::Snapshot;
use crate::shared::{FaceId, TrackId};

/// A finalized identity assignment for one track in one frame.
#[derive(Clone, Debug)]
pub struct Match {
    pub face_id: FaceId,
    /// Similarity in `[0, 1]` that produced the assignment.
    pub similarity: f32,
    /// The stored snapshot that scored the similarity.
    pub snapshot: Snapshot,
    /// Name of the source record, when one has been assigned.
    pub name: Option<String>,
    pub track_id: TrackId,
}

impl Match {
    pub fn from_best(best: BestMatch, track_id: TrackId) -> Self {
        Self {
            face_id: best.face_id,
            similarity: best.similarity,
            snapshot: best.snapshot,
            name: best.name,
            track_id,
        }
    }
}
