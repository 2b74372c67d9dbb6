use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Spawns `workers` threads that pull items from `rx`, apply `transform`,
/// and push non-empty results to `tx`.
///
/// Backpressure comes from the bounded channels on both sides: a worker
/// blocks on `tx` only when the next stage's queue is full, never on the
/// next stage's internal processing. A `None` transform result is routed
/// to the discard sink (simply not forwarded), so downstream stages
/// never stall on empty batches.
///
/// Workers exit when the input disconnects, the output disconnects, or
/// the cancellation flag is raised.
pub fn spawn_stage<I, O, F>(
    workers: usize,
    rx: crossbeam_channel::Receiver<I>,
    tx: crossbeam_channel::Sender<O>,
    cancelled: Arc<AtomicBool>,
    transform: F,
) -> Vec<JoinHandle<()>>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Option<O> + Send + Sync + 'static,
{
    let transform = Arc::new(transform);
    (0..workers.max(1))
        .map(|_| {
            let rx = rx.clone();
            let tx = tx.clone();
            let cancelled = cancelled.clone();
            let transform = transform.clone();
            std::thread::spawn(move || {
                for item in rx {
                    if cancelled.load(Ordering::Relaxed) {
                        break;
                    }
                    if let Some(output) = transform(item) {
                        if tx.send(output).is_err() {
                            break;
                        }
                    }
                }
            })
        })
        .collect()
}
