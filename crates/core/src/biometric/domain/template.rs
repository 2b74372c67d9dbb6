use crate::shared::TrackId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    pub fn is_known(&self) -> bool {
        !matches!(self, Gender::Unknown)
    }
}

/// Age/gender estimate attached to a template. Any field may be unknown:
/// primitive failures degrade to missing information, never to faults.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DemographicEstimate {
    pub age: Option<f32>,
    pub gender: Gender,
    pub gender_confidence: Option<f32>,
}

impl DemographicEstimate {
    pub fn unknown() -> Self {
        Self {
            age: None,
            gender: Gender::Unknown,
            gender_confidence: None,
        }
    }
}

impl Default for DemographicEstimate {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Fixed-length biometric feature vector for one face in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceTemplate {
    pub data: Vec<u8>,
    pub demographics: DemographicEstimate,
    pub track_id: TrackId,
    /// PNG of the source cutout, carried when image retention is on so
    /// stored snapshots can keep the face that produced them.
    pub image_png: Option<Vec<u8>>,
}

impl FaceTemplate {
    pub fn new(data: Vec<u8>, demographics: DemographicEstimate, track_id: TrackId) -> Self {
        Self {
            data,
            demographics,
            track_id,
            image_png: None,
        }
    }

    pub fn with_image(mut self, image_png: Option<Vec<u8>>) -> Self {
        self.image_png = image_png;
        self
    }
}
