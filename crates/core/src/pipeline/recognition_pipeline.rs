use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::biometric::domain::engine::BiometricEngine;
use crate::database::face_database::FaceDatabase;
use crate::pipeline::config::RecognitionConfig;
use crate::pipeline::infrastructure::stage_pool::spawn_stage;
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::pipeline::stages::{
    cutout_stage, detect_stage, features_stage, load_stage, template_stage, FaceLocation,
    SkipPolicy,
};
use crate::shared::TrackId;
use crate::tracking::capture::{CaptureRegistry, CaptureTicket};
use crate::tracking::continuity_engine::ContinuityEngine;
use crate::tracking::match_event::Match;
use crate::tracking::tracking_table::TrackingTable;

/// The staged, backpressured face recognition pipeline.
///
/// `cutout → load → detect → features → template → identity`
///
/// Every stage runs a worker pool over its own bounded input queue; the
/// terminal identity stage runs a single worker so per-track state
/// updates stay serialized. Construction builds a fresh channel graph;
/// after cancellation a new pipeline is built the same way against the
/// same database.
pub struct RecognitionPipeline {
    input_tx: Option<crossbeam_channel::Sender<FaceLocation>>,
    matches_rx: crossbeam_channel::Receiver<Match>,
    cancelled: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    tracks: Arc<TrackingTable>,
    captures: Arc<CaptureRegistry>,
    dropped_frames: Arc<AtomicU64>,
    dropped_matches: Arc<AtomicU64>,
}

impl RecognitionPipeline {
    pub fn new(
        config: RecognitionConfig,
        engine: Arc<dyn BiometricEngine>,
        db: Arc<FaceDatabase>,
    ) -> Self {
        Self::with_logger(config, engine, db, Box::new(NullPipelineLogger))
    }

    pub fn with_logger(
        config: RecognitionConfig,
        engine: Arc<dyn BiometricEngine>,
        db: Arc<FaceDatabase>,
        mut logger: Box<dyn PipelineLogger>,
    ) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let tracks = Arc::new(TrackingTable::new());
        let captures = Arc::new(CaptureRegistry::new());
        let dropped_frames = Arc::new(AtomicU64::new(0));
        let dropped_matches = Arc::new(AtomicU64::new(0));

        let depth = config.queue_depth.max(1);
        let (input_tx, input_rx) = crossbeam_channel::bounded::<FaceLocation>(depth);
        let (cutout_tx, cutout_rx) = crossbeam_channel::bounded(depth);
        let (loaded_tx, loaded_rx) = crossbeam_channel::bounded(depth);
        let (detected_tx, detected_rx) = crossbeam_channel::bounded(depth);
        let (featured_tx, featured_rx) = crossbeam_channel::bounded(depth);
        let (template_tx, template_rx) = crossbeam_channel::bounded(depth);
        let (match_tx, matches_rx) =
            crossbeam_channel::bounded::<Match>(config.match_output_capacity.max(1));

        let mut workers = Vec::new();

        let skip = SkipPolicy {
            min_confirmations: config.skip_min_confirmations,
            max_skipped_frames: config.max_skipped_frames,
        };
        {
            let tracks = tracks.clone();
            workers.extend(spawn_stage(
                config.parallelism.cutout,
                input_rx,
                cutout_tx,
                cancelled.clone(),
                move |location| {
                    let batch = cutout_stage(location, &tracks, &skip);
                    (!batch.is_empty()).then_some(batch)
                },
            ));
        }
        {
            let engine = engine.clone();
            workers.extend(spawn_stage(
                config.parallelism.load,
                cutout_rx,
                loaded_tx,
                cancelled.clone(),
                move |batch| {
                    let loaded = load_stage(batch, &engine);
                    (!loaded.is_empty()).then_some(loaded)
                },
            ));
        }
        {
            let enabled = config.enable_detection;
            workers.extend(spawn_stage(
                config.parallelism.detect,
                loaded_rx,
                detected_tx,
                cancelled.clone(),
                move |batch| {
                    let refined = if enabled { detect_stage(batch) } else { batch };
                    (!refined.is_empty()).then_some(refined)
                },
            ));
        }
        {
            let enabled = config.enable_features;
            workers.extend(spawn_stage(
                config.parallelism.features,
                detected_rx,
                featured_tx,
                cancelled.clone(),
                move |batch| {
                    let featured = if enabled { features_stage(batch) } else { batch };
                    (!featured.is_empty()).then_some(featured)
                },
            ));
        }
        {
            let retain_images = config.retain_images;
            workers.extend(spawn_stage(
                config.parallelism.template,
                featured_rx,
                template_tx,
                cancelled.clone(),
                move |batch| {
                    let templates = template_stage(batch, retain_images);
                    (!templates.is_empty()).then_some(templates)
                },
            ));
        }

        // Terminal stage: one worker, owns the engine and the logger.
        {
            let mut continuity = ContinuityEngine::new(
                db,
                tracks.clone(),
                captures.clone(),
                config.engine_params(),
            );
            let cancelled = cancelled.clone();
            let dropped_matches = dropped_matches.clone();
            workers.push(std::thread::spawn(move || {
                for batch in template_rx {
                    if cancelled.load(Ordering::Relaxed) {
                        break;
                    }
                    let started = Instant::now();
                    let matches = continuity.process_batch(&batch);
                    logger.timing("identity", started.elapsed().as_secs_f64() * 1000.0);
                    logger.batch_processed(batch.len());
                    for m in matches {
                        if match_tx.try_send(m).is_err() {
                            dropped_matches.fetch_add(1, Ordering::Relaxed);
                            logger.dropped("match");
                        }
                    }
                }
                logger.summary();
            }));
        }

        Self {
            input_tx: Some(input_tx),
            matches_rx,
            cancelled,
            workers,
            tracks,
            captures,
            dropped_frames,
            dropped_matches,
        }
    }

    /// Non-blocking submission: the frame either enters the cutout
    /// queue or is dropped when it is full — the pipeline favors
    /// staying real-time over processing every frame.
    pub fn submit(&self, location: FaceLocation) -> bool {
        if self.cancelled.load(Ordering::Relaxed) {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let Some(tx) = &self.input_tx else {
            return false;
        };
        match tx.try_send(location) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => {
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                log::debug!("frame dropped: cutout queue full");
                false
            }
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }

    /// Registers a capture for `track_id`, resolved once the identity
    /// stage processes the next template for that track.
    pub fn capture(&self, track_id: TrackId) -> CaptureTicket {
        self.captures.register(track_id)
    }

    /// Receiver of emitted match events.
    pub fn matches(&self) -> crossbeam_channel::Receiver<Match> {
        self.matches_rx.clone()
    }

    pub fn tracks(&self) -> Arc<TrackingTable> {
        self.tracks.clone()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn dropped_matches(&self) -> u64 {
        self.dropped_matches.load(Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Stops every stage from accepting or producing further work.
    /// In-flight items are abandoned (their handles release on drop);
    /// resuming means building a fresh pipeline.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Cancels and joins every worker.
    pub fn shutdown(mut self) {
        self.cancel();
        self.join_workers();
    }

    /// Closes the input, lets queued work drain to completion, then
    /// joins every worker.
    pub fn drain(mut self) {
        self.input_tx.take();
        self.join_workers();
    }

    fn join_workers(&mut self) {
        self.input_tx.take();
        for handle in std::mem::take(&mut self.workers) {
            if handle.join().is_err() {
                log::warn!("pipeline worker panicked during shutdown");
            }
        }
    }
}

impl Drop for RecognitionPipeline {
    fn drop(&mut self) {
        // Workers not already joined unwind via channel disconnects.
        self.cancelled.store(true, Ordering::Relaxed);
        self.input_tx.take();
    }
}
