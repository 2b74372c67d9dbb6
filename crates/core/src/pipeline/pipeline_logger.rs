use std::collections::HashMap;
use std::time::Instant;

/// Cross-cutting observer for pipeline orchestration events.
///
/// Decouples the identity stage from specific output mechanisms (stdout,
/// GUI signals, log crate) so each caller can watch pipeline behavior
/// without changing the orchestration code.
pub trait PipelineLogger: Send {
    /// Report one processed frame batch and the face count it carried.
    fn batch_processed(&mut self, faces: usize);

    /// Report a frame rejected at submission or a match that could not
    /// be delivered.
    fn dropped(&mut self, what: &str);

    /// Record how long a named pipeline stage took for one batch.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-pipeline summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events. Used by tests and callers
/// with their own progress surface.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn batch_processed(&mut self, _faces: usize) {}
    fn dropped(&mut self, _what: &str) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// CLI-oriented logger: accumulates per-stage timings and drop counts
/// and emits a summary when the pipeline winds down.
///
/// Progress output is throttled to every `throttle_batches` batches to
/// keep log volume bounded on a live stream.
pub struct StdoutPipelineLogger {
    throttle_batches: usize,
    timings: HashMap<String, Vec<f64>>,
    drops: HashMap<String, u64>,
    start_time: Instant,
    batches: usize,
    faces: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_batches: usize) -> Self {
        Self {
            throttle_batches: throttle_batches.max(1),
            timings: HashMap::new(),
            drops: HashMap::new(),
            start_time: Instant::now(),
            batches: 0,
            faces: 0,
        }
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn drops_for(&self, what: &str) -> u64 {
        self.drops.get(what).copied().unwrap_or(0)
    }

    /// The formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.batches == 0 && self.timings.is_empty() && self.drops.is_empty() {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = Vec::new();
        lines.push(format!(
            "Pipeline summary ({} batches, {} faces, {elapsed_s:.1}s):",
            self.batches, self.faces
        ));

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len() as f64;
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.2}ms  total {total_ms:7.0}ms"
            ));
        }

        let mut dropped: Vec<_> = self.drops.iter().collect();
        dropped.sort();
        for (what, count) in dropped {
            lines.push(format!("  dropped {what}: {count}"));
        }

        if self.batches > 0 && elapsed_s > 0.0 {
            lines.push(format!(
                "  Throughput: {:.1} batches/s",
                self.batches as f64 / elapsed_s
            ));
        }

        Some(lines.join("\n"))
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn batch_processed(&mut self, faces: usize) {
        self.batches += 1;
        self.faces += faces;
        if self.batches % self.throttle_batches == 0 {
            log::info!("processed {} batches ({} faces)", self.batches, self.faces);
        }
    }

    fn dropped(&mut self, what: &str) {
        *self.drops.entry(what.to_string()).or_default() += 1;
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n{text}");
        }
    }
}
