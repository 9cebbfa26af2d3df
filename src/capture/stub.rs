use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::CaptureBackend;
use crate::error::{CaptureError, Result};

/// Capture backend that returns a fixed blob on every call.
///
/// Used by the end-to-end scenarios; the shared capture counter makes the
/// producer's task lifecycle observable from tests.
pub struct StubCapture {
    blob: Vec<u8>,
    captures: Arc<AtomicU64>,
    fail: Arc<AtomicBool>,
    started: bool,
}

impl StubCapture {
    pub fn new(blob: Vec<u8>) -> Self {
        Self {
            blob,
            captures: Arc::new(AtomicU64::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }

    /// Counter incremented on every `capture_frame` call
    pub fn capture_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.captures)
    }

    /// Switch that makes subsequent captures fail
    pub fn failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

#[async_trait]
impl CaptureBackend for StubCapture {
    async fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<Vec<u8>> {
        self.captures.fetch_add(1, Ordering::Relaxed);
        if self.fail.load(Ordering::Relaxed) {
            return Err(CaptureError::FrameRead {
                details: "stub capture failure".to_string(),
            }
            .into());
        }
        Ok(self.blob.clone())
    }

    async fn stop(&mut self) {
        self.started = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_returns_blob_and_counts() {
        let mut stub = StubCapture::new(vec![1, 2, 3]);
        let counter = stub.capture_counter();

        assert!(!stub.is_started());
        stub.start().await.unwrap();
        assert!(stub.is_started());
        assert_eq!(stub.capture_frame().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(stub.capture_frame().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_stub_failure_switch() {
        let mut stub = StubCapture::new(vec![0]);
        let fail = stub.failure_switch();

        stub.start().await.unwrap();
        assert!(stub.capture_frame().await.is_ok());
        fail.store(true, Ordering::Relaxed);
        assert!(stub.capture_frame().await.is_err());
        // failed captures still count
        assert_eq!(stub.capture_counter().load(Ordering::Relaxed), 2);
    }
}
