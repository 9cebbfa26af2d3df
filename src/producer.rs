use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::capture::CaptureBackend;
use crate::error::Result;
use crate::frame::Frame;
use crate::jpeg;

/// Backoff after a failed capture before trying again
const CAPTURE_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Single-producer frame pump feeding every connected client.
///
/// Capture runs only while at least one subscriber is connected: the first
/// subscription spawns the capture task, the last release cancels it. The
/// newest frame overwrites the latest slot; there is no queue.
pub struct FrameProducer {
    backend: Arc<AsyncMutex<Box<dyn CaptureBackend>>>,
    latest: Arc<RwLock<Option<Frame>>>,
    sequence: Arc<AtomicU64>,
    state: Mutex<PumpState>,
    interval: Duration,
    jpeg_quality: u8,
}

struct PumpState {
    subscribers: u32,
    task: Option<(JoinHandle<()>, CancellationToken)>,
}

impl FrameProducer {
    /// Create a producer over a backend. `fps` is clamped to at least 1.
    pub fn new(backend: Box<dyn CaptureBackend>, fps: u32, jpeg_quality: u8) -> Self {
        let fps = fps.max(1);
        Self {
            backend: Arc::new(AsyncMutex::new(backend)),
            latest: Arc::new(RwLock::new(None)),
            sequence: Arc::new(AtomicU64::new(0)),
            state: Mutex::new(PumpState {
                subscribers: 0,
                task: None,
            }),
            interval: Duration::from_micros(1_000_000 / fps as u64),
            jpeg_quality,
        }
    }

    /// Prepare the capture backend. Called once before serving.
    pub async fn start(&self) -> Result<()> {
        self.backend.lock().await.start().await
    }

    /// Register interest in frames. The returned guard releases the
    /// subscription exactly once, on `release` or drop.
    pub fn subscribe(self: &Arc<Self>) -> FrameSubscription {
        let mut state = self.state.lock();
        state.subscribers += 1;
        debug!("subscriber added (count: {})", state.subscribers);

        if state.subscribers == 1 {
            let token = CancellationToken::new();
            let handle = tokio::spawn(capture_loop(
                Arc::clone(&self.backend),
                Arc::clone(&self.latest),
                Arc::clone(&self.sequence),
                self.interval,
                self.jpeg_quality,
                token.clone(),
            ));
            state.task = Some((handle, token));
        }

        FrameSubscription {
            producer: Arc::clone(self),
            released: false,
        }
    }

    /// Drop one subscription; the capture task stops when the count reaches 0.
    fn unsubscribe(&self) {
        let mut state = self.state.lock();
        if state.subscribers == 0 {
            return;
        }
        state.subscribers -= 1;
        debug!("subscriber removed (count: {})", state.subscribers);

        if state.subscribers == 0 {
            if let Some((handle, token)) = state.task.take() {
                token.cancel();
                handle.abort();
            }
        }
    }

    /// Snapshot of the most recent frame, if any has been produced.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.latest.read().clone()
    }

    /// Current subscriber count (balanced per connection).
    pub fn subscriber_count(&self) -> u32 {
        self.state.lock().subscribers
    }

    /// Whether the capture task currently exists.
    pub fn capture_task_running(&self) -> bool {
        self.state.lock().task.is_some()
    }

    /// Cancel capture and release the backend.
    pub async fn stop(&self) {
        let task = {
            let mut state = self.state.lock();
            state.task.take()
        };
        if let Some((handle, token)) = task {
            token.cancel();
            let _ = handle.await;
        }
        self.backend.lock().await.stop().await;
    }
}

async fn capture_loop(
    backend: Arc<AsyncMutex<Box<dyn CaptureBackend>>>,
    latest: Arc<RwLock<Option<Frame>>>,
    sequence: Arc<AtomicU64>,
    interval: Duration,
    jpeg_quality: u8,
    token: CancellationToken,
) {
    debug!("capture task started");
    loop {
        let result = tokio::select! {
            _ = token.cancelled() => break,
            result = async { backend.lock().await.capture_frame().await } => result,
        };

        let pause = match result {
            Ok(bytes) => {
                let compressed = jpeg::compress(bytes, jpeg_quality);
                if compressed.bytes.is_empty() {
                    warn!("capture produced an empty frame, skipping");
                    CAPTURE_ERROR_BACKOFF
                } else {
                    let seq = sequence.fetch_add(1, Ordering::Relaxed) + 1;
                    *latest.write() = Some(Frame::new(compressed, seq));
                    interval
                }
            }
            Err(e) => {
                warn!("frame capture failed: {}", e);
                CAPTURE_ERROR_BACKOFF
            }
        };

        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(pause) => {}
        }
    }
    debug!("capture task stopped");
}

/// Handle to one producer subscription.
///
/// Releases exactly once: either explicitly or on drop, never both.
pub struct FrameSubscription {
    producer: Arc<FrameProducer>,
    released: bool,
}

impl FrameSubscription {
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.producer.unsubscribe();
        }
    }
}

impl Drop for FrameSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::StubCapture;
    use crate::frame::ContentType;
    use crate::tiff::fixtures::solid_rgb_tiff;

    fn stub_producer(fps: u32) -> (Arc<FrameProducer>, Arc<AtomicU64>) {
        let stub = StubCapture::new(solid_rgb_tiff(255, 0, 0));
        let counter = stub.capture_counter();
        let producer = Arc::new(FrameProducer::new(Box::new(stub), fps, 80));
        (producer, counter)
    }

    #[tokio::test]
    async fn test_no_capture_without_subscribers() {
        let (producer, counter) = stub_producer(30);
        producer.start().await.unwrap();

        sleep(Duration::from_millis(150)).await;
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        assert!(!producer.capture_task_running());
        assert!(producer.latest_frame().is_none());
    }

    #[tokio::test]
    async fn test_sequences_increase_from_one() {
        let (producer, _) = stub_producer(50);
        producer.start().await.unwrap();

        let mut subscription = producer.subscribe();
        let mut seen = Vec::new();
        for _ in 0..40 {
            sleep(Duration::from_millis(25)).await;
            if let Some(frame) = producer.latest_frame() {
                seen.push(frame.sequence);
                if seen.len() >= 5 {
                    break;
                }
            }
        }
        subscription.release();

        assert!(seen.len() >= 2, "expected frames, got {:?}", seen);
        assert!(seen[0] >= 1);
        for pair in seen.windows(2) {
            assert!(pair[1] >= pair[0], "sequence went backwards: {:?}", seen);
        }
        // first frame of this producer is sequence 1
        assert!(seen[0] < 10, "first observed sequence too large: {:?}", seen);
    }

    #[tokio::test]
    async fn test_frames_are_jpeg() {
        let (producer, _) = stub_producer(50);
        producer.start().await.unwrap();

        let _subscription = producer.subscribe();
        let mut frame = None;
        for _ in 0..40 {
            sleep(Duration::from_millis(25)).await;
            if let Some(f) = producer.latest_frame() {
                frame = Some(f);
                break;
            }
        }
        let frame = frame.expect("no frame produced");
        assert_eq!(frame.content_type, ContentType::Jpeg);
        assert_eq!(&frame.bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let (producer, counter) = stub_producer(30);
        producer.start().await.unwrap();

        for _ in 0..10 {
            let mut subscription = producer.subscribe();
            assert_eq!(producer.subscriber_count(), 1);
            assert!(producer.capture_task_running());
            subscription.release();
            assert_eq!(producer.subscriber_count(), 0);
            assert!(!producer.capture_task_running());
        }

        // capture stops shortly after the last release
        sleep(Duration::from_millis(100)).await;
        let settled = counter.load(Ordering::Relaxed);
        sleep(Duration::from_millis(300)).await;
        assert_eq!(counter.load(Ordering::Relaxed), settled);
    }

    #[tokio::test]
    async fn test_nested_subscriptions_share_one_task() {
        let (producer, _) = stub_producer(30);
        producer.start().await.unwrap();

        let mut first = producer.subscribe();
        let mut second = producer.subscribe();
        assert_eq!(producer.subscriber_count(), 2);
        assert!(producer.capture_task_running());

        first.release();
        assert_eq!(producer.subscriber_count(), 1);
        assert!(producer.capture_task_running());

        second.release();
        assert_eq!(producer.subscriber_count(), 0);
        assert!(!producer.capture_task_running());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (producer, _) = stub_producer(30);
        producer.start().await.unwrap();

        let mut a = producer.subscribe();
        let _b = producer.subscribe();
        a.release();
        a.release();
        drop(a);
        assert_eq!(producer.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let (producer, _) = stub_producer(30);
        producer.start().await.unwrap();

        {
            let _subscription = producer.subscribe();
            assert_eq!(producer.subscriber_count(), 1);
        }
        assert_eq!(producer.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_capture_errors_back_off_and_recover() {
        let stub = StubCapture::new(solid_rgb_tiff(0, 0, 255));
        let counter = stub.capture_counter();
        let fail = stub.failure_switch();
        let producer = Arc::new(FrameProducer::new(Box::new(stub), 30, 80));
        producer.start().await.unwrap();

        fail.store(true, Ordering::Relaxed);
        let _subscription = producer.subscribe();
        sleep(Duration::from_millis(200)).await;
        assert!(producer.latest_frame().is_none());
        assert!(counter.load(Ordering::Relaxed) >= 1);
        // failed captures back off rather than spinning
        assert!(counter.load(Ordering::Relaxed) <= 3);

        fail.store(false, Ordering::Relaxed);
        let mut recovered = false;
        for _ in 0..40 {
            sleep(Duration::from_millis(50)).await;
            if producer.latest_frame().is_some() {
                recovered = true;
                break;
            }
        }
        assert!(recovered, "producer did not recover after backend error");
    }

    #[tokio::test]
    async fn test_fps_is_clamped() {
        let (producer, _) = stub_producer(0);
        assert_eq!(producer.interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_stop_releases_backend() {
        let (producer, counter) = stub_producer(30);
        producer.start().await.unwrap();

        let _subscription = producer.subscribe();
        sleep(Duration::from_millis(100)).await;
        producer.stop().await;

        let settled = counter.load(Ordering::Relaxed);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::Relaxed), settled);
    }
}
