use crate::{SegmentQueue, SegmentSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Background capture thread feeding a [`SegmentQueue`].
pub struct CaptureHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl CaptureHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stop the thread and return how many segments it delivered.
    pub fn join(mut self) -> u64 {
        self.stop();
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Run `source` on its own thread until it is exhausted or stopped. The queue
/// is closed when the thread exits.
pub fn spawn_capture<S>(mut source: S, queue: SegmentQueue) -> crate::Result<CaptureHandle>
where
    S: SegmentSource + Send + 'static,
{
    source.start()?;
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let handle = std::thread::Builder::new()
        .name("segment-capture".into())
        .spawn(move || {
            let mut delivered = 0u64;
            while !stop_flag.load(Ordering::Acquire) {
                match source.next_segment() {
                    Some(segment) => {
                        if !queue.push(segment) {
                            break;
                        }
                        delivered += 1;
                    }
                    None => break,
                }
            }
            source.stop();
            queue.close();
            tracing::debug!(delivered, "capture thread finished");
            delivered
        })
        .map_err(|e| crate::VoiceError::Source(e.to_string()))?;
    Ok(CaptureHandle {
        stop,
        handle: Some(handle),
    })
}
