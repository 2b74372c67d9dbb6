/// Similarity above which a tracked candidate is trusted without further
/// corroboration.
pub const DEFAULT_INSTANT_MATCH_THRESHOLD: f32 = 0.92;

/// Similarity at which a template reinforces a tracked candidate's record.
pub const DEFAULT_NEW_TEMPLATE_THRESHOLD: f32 = 0.40;

/// Similarity a database-wide best match must clear to start tracking.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.50;

/// Accumulated confirmations before deep processing may be skipped.
pub const DEFAULT_SKIP_MIN_CONFIRMATIONS: f32 = 5.0;

/// Consecutive frames a well-confirmed track may be skipped.
pub const DEFAULT_MAX_SKIPPED_FRAMES: u32 = 10;

/// Processed batches between stale-track eviction sweeps.
pub const DEFAULT_SWEEP_INTERVAL: u32 = 30;

pub const DEFAULT_QUEUE_DEPTH: usize = 8;

/// Estimated-age ratio (younger / older) below which two ages are
/// considered implausibly far apart.
pub const DEFAULT_AGE_RATIO_BAND: f32 = 0.6;

pub const DEFAULT_AGE_MISMATCH_PENALTY: f32 = 0.8;

/// Gender disagreement weighs similarity down but never eliminates it.
pub const DEFAULT_GENDER_MISMATCH_PENALTY: f32 = 0.75;
