use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::biometric::domain::engine::{
    BiometricEngine, BiometricError, FaceBox, FaceFeatures, PixelFormat, RawHandle,
    TemplateMatcher,
};
use crate::biometric::domain::template::Gender;
use crate::biometric::infrastructure::activation::EngineActivation;

pub const DEFAULT_TEMPLATE_LEN: usize = 128;

struct LoadedBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

/// Deterministic in-process engine for tests and the demo CLI.
///
/// Templates are bucket-averaged signatures of the loaded pixel buffer,
/// so two crops of the same synthetic face compare near 1.0 while crops
/// with different fill values diverge proportionally. Failure-injection
/// flags let tests exercise every per-item error path, and the handle
/// ledger lets them assert release-exactly-once.
pub struct MockBiometricEngine {
    activation: EngineActivation,
    template_len: usize,
    loaded: Mutex<HashMap<RawHandle, LoadedBuffer>>,
    next_handle: AtomicU64,
    released: AtomicU64,
    fail_detect: AtomicBool,
    fail_features: AtomicBool,
    fail_template: AtomicBool,
    fail_estimates: AtomicBool,
    scripted_age: Mutex<Option<f32>>,
    scripted_gender: Mutex<(Gender, f32)>,
}

impl MockBiometricEngine {
    /// An engine that is already activated.
    pub fn new() -> Self {
        let engine = Self::unactivated();
        engine.activation.activate();
        engine
    }

    /// An engine whose library has not been activated; every `load`
    /// fails with [`BiometricError::NotActivated`] until `activate`.
    pub fn unactivated() -> Self {
        Self {
            activation: EngineActivation::new(),
            template_len: DEFAULT_TEMPLATE_LEN,
            loaded: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            released: AtomicU64::new(0),
            fail_detect: AtomicBool::new(false),
            fail_features: AtomicBool::new(false),
            fail_template: AtomicBool::new(false),
            fail_estimates: AtomicBool::new(false),
            scripted_age: Mutex::new(None),
            scripted_gender: Mutex::new((Gender::Unknown, 0.0)),
        }
    }

    /// Returns whether this call performed the activation.
    pub fn activate(&self) -> bool {
        self.activation.activate()
    }

    pub fn set_fail_detect(&self, fail: bool) {
        self.fail_detect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_features(&self, fail: bool) {
        self.fail_features.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_template(&self, fail: bool) {
        self.fail_template.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_estimates(&self, fail: bool) {
        self.fail_estimates.store(fail, Ordering::SeqCst);
    }

    pub fn set_age(&self, age: Option<f32>) {
        *self.scripted_age.lock().unwrap_or_else(|e| e.into_inner()) = age;
    }

    pub fn set_gender(&self, gender: Gender, confidence: f32) {
        *self
            .scripted_gender
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = (gender, confidence);
    }

    /// Handles loaded but not yet released.
    pub fn outstanding_handles(&self) -> usize {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    fn with_buffer<T>(
        &self,
        handle: RawHandle,
        f: impl FnOnce(&LoadedBuffer) -> T,
    ) -> Result<T, BiometricError> {
        let loaded = self.loaded.lock().unwrap_or_else(|e| e.into_inner());
        loaded
            .get(&handle)
            .map(f)
            .ok_or(BiometricError::UnknownHandle(handle))
    }
}

impl Default for MockBiometricEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateMatcher for MockBiometricEngine {
    fn similarity(&self, a: &[u8], b: &[u8]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let total: u64 = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| x.abs_diff(*y) as u64)
            .sum();
        let mean = total as f32 / a.len() as f32;
        1.0 - mean / 255.0
    }

    fn template_len(&self) -> usize {
        self.template_len
    }
}

impl BiometricEngine for MockBiometricEngine {
    fn load(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        stride: u32,
        _format: PixelFormat,
    ) -> Result<RawHandle, BiometricError> {
        if !self.activation.is_active() {
            return Err(BiometricError::NotActivated);
        }
        let expected = (stride as usize) * (height as usize);
        if data.len() < expected {
            return Err(BiometricError::Load(format!(
                "buffer holds {} bytes, stride * height needs {expected}",
                data.len()
            )));
        }

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.loaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                handle,
                LoadedBuffer {
                    data: data.to_vec(),
                    width,
                    height,
                },
            );
        Ok(handle)
    }

    fn detect(&self, handle: RawHandle) -> Result<FaceBox, BiometricError> {
        if self.fail_detect.load(Ordering::SeqCst) {
            return Err(BiometricError::NoFace);
        }
        self.with_buffer(handle, |buf| FaceBox {
            x: 0,
            y: 0,
            width: buf.width,
            height: buf.height,
        })
    }

    fn extract_features(
        &self,
        handle: RawHandle,
        region: &FaceBox,
    ) -> Result<FaceFeatures, BiometricError> {
        if self.fail_features.load(Ordering::SeqCst) {
            return Err(BiometricError::Features("injected failure".into()));
        }
        self.with_buffer(handle, |_| ())?;
        // Five canonical landmarks at fixed fractions of the face box.
        let points = [(0.3, 0.4), (0.7, 0.4), (0.5, 0.6), (0.35, 0.8), (0.65, 0.8)]
            .iter()
            .map(|(fx, fy)| {
                (
                    region.x as f32 + fx * region.width as f32,
                    region.y as f32 + fy * region.height as f32,
                )
            })
            .collect();
        Ok(FaceFeatures { points })
    }

    fn extract_template(
        &self,
        handle: RawHandle,
        _region: &FaceBox,
        _features: Option<&FaceFeatures>,
    ) -> Result<Vec<u8>, BiometricError> {
        if self.fail_template.load(Ordering::SeqCst) {
            return Err(BiometricError::Template("injected failure".into()));
        }
        self.with_buffer(handle, |buf| signature(&buf.data, self.template_len))
    }

    fn estimate_age(
        &self,
        handle: RawHandle,
        _features: &FaceFeatures,
    ) -> Result<f32, BiometricError> {
        self.with_buffer(handle, |_| ())?;
        if self.fail_estimates.load(Ordering::SeqCst) {
            return Err(BiometricError::EstimateUnavailable);
        }
        self.scripted_age
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .ok_or(BiometricError::EstimateUnavailable)
    }

    fn estimate_gender(
        &self,
        handle: RawHandle,
        _features: &FaceFeatures,
    ) -> Result<(Gender, f32), BiometricError> {
        self.with_buffer(handle, |_| ())?;
        if self.fail_estimates.load(Ordering::SeqCst) {
            return Err(BiometricError::EstimateUnavailable);
        }
        let (gender, confidence) = *self
            .scripted_gender
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if !gender.is_known() {
            return Err(BiometricError::EstimateUnavailable);
        }
        Ok((gender, confidence))
    }

    fn release(&self, handle: RawHandle) {
        let removed = self
            .loaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle);
        if removed.is_none() {
            log::warn!("release of unknown biometric handle {handle}");
        }
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Bucket-averaged fixed-length signature of a byte buffer.
fn signature(data: &[u8], len: usize) -> Vec<u8> {
    if data.is_empty() {
        return vec![0; len];
    }
    (0..len)
        .map(|i| {
            let start = i * data.len() / len;
            let end = (((i + 1) * data.len() / len).max(start + 1)).min(data.len());
            let bucket = &data[start..end];
            let sum: u64 = bucket.iter().map(|b| *b as u64).sum();
            (sum / bucket.len() as u64) as u8
        })
        .collect()
}
