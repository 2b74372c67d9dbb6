pub mod constants;
pub mod frame;
pub mod region;
pub mod skeleton;

/// Sensor-assigned identifier, stable for a body while it stays in view.
pub type TrackId = u32;

/// Persistent integer key for a stored identity record.
pub type FaceId = u64;
