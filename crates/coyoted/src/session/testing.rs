//! In-memory [`DeviceLink`] for exercising sessions without a socket.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use coyote_protocol::dglab::DglabFrame;

use super::device::{DeviceLink, LinkError};

#[derive(Debug, Default)]
struct Recorded {
    sent: Vec<String>,
    pings: usize,
    closed: bool,
    fail_writes: bool,
    write_delay: Option<Duration>,
}

/// Records every frame written to it. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingLink {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write takes at least `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        let link = Self::new();
        link.lock().write_delay = Some(delay);
        link
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes all further writes fail.
    pub fn fail_writes(&self) {
        self.lock().fail_writes = true;
    }

    /// Raw JSON text of every frame written so far.
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// `message` field of every well-formed frame written so far.
    pub fn bodies(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|text| DglabFrame::parse(text).ok())
            .map(|frame| frame.message)
            .collect()
    }

    pub fn pings(&self) -> usize {
        self.lock().pings
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[async_trait]
impl DeviceLink for RecordingLink {
    async fn send_text(&mut self, text: String) -> Result<(), LinkError> {
        let delay = self.lock().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut recorded = self.lock();
        if recorded.closed {
            return Err(LinkError::Closed);
        }
        if recorded.fail_writes {
            return Err(LinkError::Io("simulated write failure".to_string()));
        }
        recorded.sent.push(text);
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), LinkError> {
        self.lock().pings += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.lock().closed = true;
    }
}
