use std::sync::Arc;

use crate::biometric::domain::engine::{BiometricEngine, FaceBox, FaceFeatures, PixelFormat};
use crate::biometric::domain::handle::FaceHandle;
use crate::biometric::domain::template::{DemographicEstimate, FaceTemplate, Gender};
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;
use crate::shared::skeleton::BodySkeleton;
use crate::shared::TrackId;
use crate::tracking::tracking_table::TrackingTable;

/// One frame's located faces, as delivered by the sensor boundary.
/// Created once per frame, consumed by the cutout stage.
pub struct FaceLocation {
    pub frame: Frame,
    pub faces: Vec<FaceRegion>,
    pub skeletons: Vec<BodySkeleton>,
}

/// Per-face sub-image sliced out of the raw frame, with its original
/// top-left offset.
pub struct FaceCutout {
    pub pixels: Frame,
    pub track_id: TrackId,
    pub origin: (i32, i32),
}

/// A cutout loaded into the external library, progressively refined by
/// the detect and feature stages. Owns the handle guard; dropping the
/// item anywhere releases the handle. The cutout pixels ride along so
/// the template stage can retain a snapshot image.
pub struct LoadedFace {
    pub handle: FaceHandle,
    pub pixels: Frame,
    pub track_id: TrackId,
    pub region: FaceBox,
    pub features: Option<FaceFeatures>,
}

/// Skip-heuristic parameters consulted by the cutout stage.
#[derive(Clone, Copy, Debug)]
pub struct SkipPolicy {
    pub min_confirmations: f32,
    pub max_skipped_frames: u32,
}

/// Stage 1: slice the raw buffer into per-face sub-buffers.
///
/// Faces whose track is already well-confirmed are skipped for up to
/// the policy's budget of consecutive frames, amortizing the expensive
/// biometric calls downstream.
pub fn cutout_stage(
    location: FaceLocation,
    tracks: &TrackingTable,
    skip: &SkipPolicy,
) -> Vec<FaceCutout> {
    let frame = &location.frame;
    location
        .faces
        .iter()
        .filter_map(|face| {
            if tracks.should_skip(face.track_id, skip.min_confirmations, skip.max_skipped_frames) {
                log::trace!("skipping well-confirmed track {}", face.track_id);
                return None;
            }
            let clamped = face.clamped_to(frame.width(), frame.height());
            let pixels = frame.crop(&clamped)?;
            Some(FaceCutout {
                pixels,
                track_id: face.track_id,
                origin: (clamped.x, clamped.y),
            })
        })
        .collect()
}

/// Stage 2: load each cutout into the external library. A failing item
/// is dropped; its siblings proceed.
pub fn load_stage(cutouts: Vec<FaceCutout>, engine: &Arc<dyn BiometricEngine>) -> Vec<LoadedFace> {
    cutouts
        .into_iter()
        .filter_map(|cutout| {
            let format = match cutout.pixels.bytes_per_pixel() {
                1 => PixelFormat::Gray,
                3 => PixelFormat::Rgb,
                4 => PixelFormat::Bgra,
                other => {
                    log::warn!(
                        "track {}: unsupported pixel layout ({other} bytes/pixel)",
                        cutout.track_id
                    );
                    return None;
                }
            };
            match FaceHandle::load(engine.clone(), &cutout.pixels, format) {
                Ok(handle) => Some(LoadedFace {
                    handle,
                    region: FaceBox {
                        x: 0,
                        y: 0,
                        width: cutout.pixels.width(),
                        height: cutout.pixels.height(),
                    },
                    pixels: cutout.pixels,
                    track_id: cutout.track_id,
                    features: None,
                }),
                Err(e) => {
                    log::warn!("track {}: load failed: {e}", cutout.track_id);
                    None
                }
            }
        })
        .collect()
}

/// Stage 3 (configurable): refine the face region; items failing
/// detection are dropped.
pub fn detect_stage(faces: Vec<LoadedFace>) -> Vec<LoadedFace> {
    faces
        .into_iter()
        .filter_map(|mut face| match face.handle.detect() {
            Ok(region) => {
                face.region = region;
                Some(face)
            }
            Err(e) => {
                log::debug!("track {}: detection failed: {e}", face.track_id);
                None
            }
        })
        .collect()
}

/// Stage 4 (configurable): extract landmark features used for
/// higher-quality templates and demographic estimates.
pub fn features_stage(faces: Vec<LoadedFace>) -> Vec<LoadedFace> {
    faces
        .into_iter()
        .filter_map(|mut face| match face.handle.extract_features(&face.region) {
            Ok(features) => {
                face.features = Some(features);
                Some(face)
            }
            Err(e) => {
                log::debug!("track {}: feature extraction failed: {e}", face.track_id);
                None
            }
        })
        .collect()
}

/// Stage 5: derive template plus demographics per item. Estimate
/// failures become unknown values; template failures drop the item.
/// Handles are released here as each item is consumed.
pub fn template_stage(faces: Vec<LoadedFace>, retain_images: bool) -> Vec<FaceTemplate> {
    faces
        .into_iter()
        .filter_map(|face| {
            let data = match face.handle.extract_template(&face.region, face.features.as_ref()) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("track {}: template extraction failed: {e}", face.track_id);
                    return None;
                }
            };
            let demographics = match &face.features {
                Some(features) => {
                    let (gender, gender_confidence) = match face.handle.estimate_gender(features) {
                        Ok((g, c)) => (g, Some(c)),
                        Err(_) => (Gender::Unknown, None),
                    };
                    DemographicEstimate {
                        age: face.handle.estimate_age(features).ok(),
                        gender,
                        gender_confidence,
                    }
                }
                None => DemographicEstimate::unknown(),
            };
            let image_png = if retain_images {
                face.pixels.encode_png()
            } else {
                None
            };
            Some(FaceTemplate::new(data, demographics, face.track_id).with_image(image_png))
        })
        .collect()
}
