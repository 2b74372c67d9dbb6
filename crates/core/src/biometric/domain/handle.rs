use std::sync::Arc;

use crate::biometric::domain::engine::{
    BiometricEngine, BiometricError, FaceBox, FaceFeatures, PixelFormat, RawHandle,
};
use crate::biometric::domain::template::Gender;
use crate::shared::frame::Frame;

/// Scoped owner of one loaded face buffer inside the external library.
///
/// Invariant: the underlying raw handle is allocated exactly once (by
/// [`FaceHandle::load`]) and released exactly once (by `Drop`), on every
/// exit path including errors and cancellation. The raw handle never
/// leaves this type; callers use the forwarding methods below.
pub struct FaceHandle {
    engine: Arc<dyn BiometricEngine>,
    raw: RawHandle,
}

impl FaceHandle {
    pub fn load(
        engine: Arc<dyn BiometricEngine>,
        frame: &Frame,
        format: PixelFormat,
    ) -> Result<Self, BiometricError> {
        let raw = engine.load(
            frame.data(),
            frame.width(),
            frame.height(),
            frame.stride(),
            format,
        )?;
        Ok(Self { engine, raw })
    }

    pub fn detect(&self) -> Result<FaceBox, BiometricError> {
        self.engine.detect(self.raw)
    }

    pub fn extract_features(&self, region: &FaceBox) -> Result<FaceFeatures, BiometricError> {
        self.engine.extract_features(self.raw, region)
    }

    pub fn extract_template(
        &self,
        region: &FaceBox,
        features: Option<&FaceFeatures>,
    ) -> Result<Vec<u8>, BiometricError> {
        self.engine.extract_template(self.raw, region, features)
    }

    pub fn estimate_age(&self, features: &FaceFeatures) -> Result<f32, BiometricError> {
        self.engine.estimate_age(self.raw, features)
    }

    pub fn estimate_gender(&self, features: &FaceFeatures) -> Result<(Gender, f32), BiometricError> {
        self.engine.estimate_gender(self.raw, features)
    }
}

impl Drop for FaceHandle {
    fn drop(&mut self) {
        self.engine.release(self.raw);
    }
}

impl std::fmt::Debug for FaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceHandle").finish_non_exhaustive()
    }
}
