use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use facetrack_core::biometric::infrastructure::mock_engine::MockBiometricEngine;
use facetrack_core::database::face_database::FaceDatabase;
use facetrack_core::database::json_store;
use facetrack_core::pipeline::config::RecognitionConfig;
use facetrack_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use facetrack_core::pipeline::recognition_pipeline::RecognitionPipeline;
use facetrack_core::pipeline::stages::FaceLocation;
use facetrack_core::shared::frame::Frame;
use facetrack_core::shared::region::FaceRegion;
use facetrack_core::shared::skeleton::{BodySkeleton, Joint};
use facetrack_core::tracking::match_event::Match;

const FRAME_W: u32 = 64;
const FRAME_H: u32 = 48;
const FACE: i32 = 16;

/// Face tracking and identity-continuity demo over a synthetic sensor.
#[derive(Parser)]
#[command(name = "facetrack")]
struct Cli {
    /// Face database file (JSON Lines); written back on exit.
    #[arg(long, default_value = "faces.jsonl")]
    db: PathBuf,

    /// Number of synthetic sensor frames to feed through the pipeline.
    #[arg(long, default_value = "120")]
    frames: usize,

    /// Global match threshold (0.0-1.0).
    #[arg(long)]
    match_threshold: Option<f32>,

    /// Instant-match threshold for tracked candidates (0.0-1.0).
    #[arg(long)]
    instant_threshold: Option<f32>,

    /// Similarity at which a template reinforces a record (0.0-1.0).
    #[arg(long)]
    new_template_threshold: Option<f32>,

    /// Processed batches between stale-track sweeps.
    #[arg(long)]
    sweep_interval: Option<u32>,

    /// Capacity of each inter-stage queue.
    #[arg(long)]
    queue_depth: Option<usize>,

    /// Capture the next appearance of this tracking id into the database.
    #[arg(long)]
    capture: Option<u32>,

    /// Name to assign to the captured identity.
    #[arg(long)]
    name: Option<String>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli);

    let engine = Arc::new(MockBiometricEngine::new());
    let db = Arc::new(FaceDatabase::with_penalties(
        engine.clone(),
        config.metadata_penalties(),
    ));
    if cli.db.exists() {
        let reader = BufReader::new(File::open(&cli.db)?);
        let loaded = json_store::deserialize(&db, reader)?;
        log::info!("loaded {loaded} records from {}", cli.db.display());
    }

    let pipeline = RecognitionPipeline::with_logger(
        config,
        engine.clone(),
        db.clone(),
        Box::new(StdoutPipelineLogger::default()),
    );
    let ticket = cli.capture.map(|track_id| {
        log::info!("capture pending for track {track_id}");
        pipeline.capture(track_id)
    });
    let matches = pipeline.matches();

    for index in 0..cli.frames {
        if !pipeline.submit(synthetic_frame(index)) {
            log::debug!("frame {index} dropped");
        }
        drain_matches(&matches);
        std::thread::sleep(Duration::from_millis(5));
    }

    if let Some(ticket) = ticket {
        match ticket.wait_timeout(Duration::from_secs(2)) {
            Ok(status) => {
                let face_id = status
                    .top()
                    .map(|c| c.face_id)
                    .ok_or("capture resolved without a candidate")?;
                if let Some(name) = &cli.name {
                    db.set_name(face_id, Some(name.clone()))?;
                }
                println!(
                    "captured track {} as face {face_id}",
                    cli.capture.unwrap_or_default()
                );
            }
            Err(e) => log::warn!("capture did not resolve: {e}"),
        }
    }

    pipeline.drain();
    drain_matches(&matches);

    let writer = BufWriter::new(File::create(&cli.db)?);
    json_store::serialize(&db, writer)?;
    log::info!("saved {} records to {}", db.len(), cli.db.display());

    Ok(())
}

fn build_config(cli: &Cli) -> RecognitionConfig {
    let mut config = RecognitionConfig::default();
    if let Some(v) = cli.match_threshold {
        config.match_threshold = v;
    }
    if let Some(v) = cli.instant_threshold {
        config.instant_match_threshold = v;
    }
    if let Some(v) = cli.new_template_threshold {
        config.new_template_threshold = v;
    }
    if let Some(v) = cli.sweep_interval {
        config.sweep_interval = v;
    }
    if let Some(v) = cli.queue_depth {
        config.queue_depth = v;
    }
    config
}

fn drain_matches(matches: &crossbeam_channel::Receiver<Match>) {
    while let Ok(m) = matches.try_recv() {
        print_match(&m);
    }
}

fn print_match(m: &Match) {
    println!(
        "match: track {} -> face {} ({}) similarity {:.2}",
        m.track_id,
        m.face_id,
        m.name.as_deref().unwrap_or("unnamed"),
        m.similarity
    );
}

/// Two synthetic bodies drifting through the frame: track 1 from the
/// first frame, track 2 entering at frame 30. Each face is a uniform
/// patch so the mock engine sees stable templates per person.
fn synthetic_frame(index: usize) -> FaceLocation {
    let mut data = vec![16u8; (FRAME_W * FRAME_H * 3) as usize];
    let mut faces = Vec::new();
    let mut skeletons = Vec::new();

    let x1 = 4 + (index as i32 % 20);
    paint(&mut data, x1, 8, 90);
    faces.push(FaceRegion::new(x1, 8, FACE, FACE, 1));
    skeletons.push(body(1, -0.4));

    if index >= 30 {
        let x2 = 40 - (index as i32 % 16);
        paint(&mut data, x2, 26, 180);
        faces.push(FaceRegion::new(x2, 26, FACE, FACE, 2));
        skeletons.push(body(2, 0.4));
    }

    FaceLocation {
        frame: Frame::new(data, FRAME_W, FRAME_H, 3, index),
        faces,
        skeletons,
    }
}

fn paint(data: &mut [u8], x0: i32, y0: i32, fill: u8) {
    for y in y0..y0 + FACE {
        for x in x0..x0 + FACE {
            if x < 0 || y < 0 || x >= FRAME_W as i32 || y >= FRAME_H as i32 {
                continue;
            }
            let offset = ((y as u32 * FRAME_W + x as u32) * 3) as usize;
            data[offset..offset + 3].fill(fill);
        }
    }
}

fn body(track_id: u32, x: f32) -> BodySkeleton {
    BodySkeleton::new(
        track_id,
        vec![Joint {
            position: [x, 0.0, 2.0],
            confidence: 1.0,
        }],
    )
}
