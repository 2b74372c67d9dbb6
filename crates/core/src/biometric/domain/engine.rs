use thiserror::Error;

use crate::biometric::domain::template::Gender;

/// Opaque handle into the external library's internal face representation.
///
/// Only engine implementations and the [`FaceHandle`] guard touch raw
/// handles; pipeline code always goes through the guard.
///
/// [`FaceHandle`]: crate::biometric::domain::handle::FaceHandle
pub type RawHandle = u64;

#[derive(Debug, Error)]
pub enum BiometricError {
    #[error("biometric library not activated")]
    NotActivated,
    #[error("buffer load failed: {0}")]
    Load(String),
    #[error("no face detected")]
    NoFace,
    #[error("feature extraction failed: {0}")]
    Features(String),
    #[error("template extraction failed: {0}")]
    Template(String),
    #[error("demographic estimate unavailable")]
    EstimateUnavailable,
    #[error("unknown handle {0}")]
    UnknownHandle(RawHandle),
}

/// Pixel layout of a buffer handed to [`BiometricEngine::load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Bgra,
    Gray,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u8 {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Bgra => 4,
            PixelFormat::Gray => 1,
        }
    }
}

/// Face bounds within a loaded buffer, refined by the library's detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Landmark feature set used for higher-quality templates and
/// demographic estimates.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceFeatures {
    pub points: Vec<(f32, f32)>,
}

/// Template comparison primitives: the only part of the external library
/// the database layer depends on.
pub trait TemplateMatcher: Send + Sync {
    /// Similarity of two templates in `[0, 1]`.
    fn similarity(&self, a: &[u8], b: &[u8]) -> f32;

    /// The library's fixed template-length contract.
    fn template_len(&self) -> usize;
}

/// Capability interface over the external biometric library.
///
/// One implementation per hardware generation; the core depends only on
/// this trait. Handles allocated by `load` must be passed to `release`
/// exactly once — use [`FaceHandle`] to get that for free.
///
/// [`FaceHandle`]: crate::biometric::domain::handle::FaceHandle
pub trait BiometricEngine: TemplateMatcher {
    fn load(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
    ) -> Result<RawHandle, BiometricError>;

    fn detect(&self, handle: RawHandle) -> Result<FaceBox, BiometricError>;

    fn extract_features(
        &self,
        handle: RawHandle,
        region: &FaceBox,
    ) -> Result<FaceFeatures, BiometricError>;

    /// Derives a template from the region, optionally refined by features.
    fn extract_template(
        &self,
        handle: RawHandle,
        region: &FaceBox,
        features: Option<&FaceFeatures>,
    ) -> Result<Vec<u8>, BiometricError>;

    fn estimate_age(
        &self,
        handle: RawHandle,
        features: &FaceFeatures,
    ) -> Result<f32, BiometricError>;

    /// Estimated gender plus confidence in `[0, 1]`.
    fn estimate_gender(
        &self,
        handle: RawHandle,
        features: &FaceFeatures,
    ) -> Result<(Gender, f32), BiometricError>;

    fn release(&self, handle: RawHandle);
}
