use serde::{Deserialize, Serialize};

use crate::database::face_database::MetadataPenalties;
use crate::shared::constants::{
    DEFAULT_AGE_MISMATCH_PENALTY, DEFAULT_AGE_RATIO_BAND, DEFAULT_GENDER_MISMATCH_PENALTY,
    DEFAULT_INSTANT_MATCH_THRESHOLD, DEFAULT_MATCH_THRESHOLD, DEFAULT_MAX_SKIPPED_FRAMES,
    DEFAULT_NEW_TEMPLATE_THRESHOLD, DEFAULT_QUEUE_DEPTH, DEFAULT_SKIP_MIN_CONFIRMATIONS,
    DEFAULT_SWEEP_INTERVAL,
};
use crate::tracking::continuity_engine::EngineParams;

/// Worker count per pipeline stage. The identity stage always runs a
/// single worker so per-track state updates stay serialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageParallelism {
    pub cutout: usize,
    pub load: usize,
    pub detect: usize,
    pub features: usize,
    pub template: usize,
}

impl Default for StageParallelism {
    fn default() -> Self {
        Self {
            cutout: 1,
            load: 2,
            detect: 2,
            features: 2,
            template: 2,
        }
    }
}

/// Tuning knobs for the recognition pipeline and continuity engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub instant_match_threshold: f32,
    pub new_template_threshold: f32,
    pub match_threshold: f32,
    /// Capacity of each inter-stage queue.
    pub queue_depth: usize,
    /// Capacity of the emitted-match queue.
    pub match_output_capacity: usize,
    pub parallelism: StageParallelism,
    pub enable_detection: bool,
    pub enable_features: bool,
    /// Keep a PNG of each cutout on the templates it produces, so
    /// stored snapshots retain their source image.
    pub retain_images: bool,
    pub skip_min_confirmations: f32,
    pub max_skipped_frames: u32,
    pub sweep_interval: u32,
    pub age_ratio_band: f32,
    pub age_mismatch_penalty: f32,
    pub gender_mismatch_penalty: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            instant_match_threshold: DEFAULT_INSTANT_MATCH_THRESHOLD,
            new_template_threshold: DEFAULT_NEW_TEMPLATE_THRESHOLD,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            match_output_capacity: 64,
            parallelism: StageParallelism::default(),
            enable_detection: true,
            enable_features: true,
            retain_images: false,
            skip_min_confirmations: DEFAULT_SKIP_MIN_CONFIRMATIONS,
            max_skipped_frames: DEFAULT_MAX_SKIPPED_FRAMES,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            age_ratio_band: DEFAULT_AGE_RATIO_BAND,
            age_mismatch_penalty: DEFAULT_AGE_MISMATCH_PENALTY,
            gender_mismatch_penalty: DEFAULT_GENDER_MISMATCH_PENALTY,
        }
    }
}

impl RecognitionConfig {
    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            instant_match_threshold: self.instant_match_threshold,
            new_template_threshold: self.new_template_threshold,
            match_threshold: self.match_threshold,
            sweep_interval: self.sweep_interval,
        }
    }

    pub fn metadata_penalties(&self) -> MetadataPenalties {
        MetadataPenalties {
            age_ratio_band: self.age_ratio_band,
            age_penalty: self.age_mismatch_penalty,
            gender_penalty: self.gender_mismatch_penalty,
        }
    }
}
