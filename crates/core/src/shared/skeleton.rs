use crate::shared::TrackId;

/// One skeletal joint in camera space, meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Joint {
    pub position: [f32; 3],
    pub confidence: f32,
}

/// Per-body joint set delivered alongside each color frame.
///
/// The sensor derives face rectangles from these upstream of this crate;
/// skeletons ride along so consumers of match events can correlate
/// identities with body positions.
#[derive(Clone, Debug, PartialEq)]
pub struct BodySkeleton {
    pub track_id: TrackId,
    pub joints: Vec<Joint>,
}

impl BodySkeleton {
    pub fn new(track_id: TrackId, joints: Vec<Joint>) -> Self {
        Self { track_id, joints }
    }
}
