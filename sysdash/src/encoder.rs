//! SSE framing and the per-connection write side.

use crate::types::MetricSample;
use bytes::Bytes;
use std::ops::ControlFlow;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("serialize {event} payload: {source}")]
    Json {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Renders one event as a complete `data: <json>\n\n` frame.
pub fn encode_frame(sample: &MetricSample) -> Result<Bytes, EncodeError> {
    let json = serde_json::to_vec(sample).map_err(|source| EncodeError::Json {
        event: sample.event_type(),
        source,
    })?;
    let mut frame = Vec::with_capacity(json.len() + 8);
    frame.extend_from_slice(b"data: ");
    frame.extend_from_slice(&json);
    frame.extend_from_slice(b"\n\n");
    Ok(Bytes::from(frame))
}

/// Write side of one client stream. Each frame is handed to the response body
/// on its own; a send only completes once the body has room for it.
pub struct EventWriter {
    tx: mpsc::Sender<Bytes>,
    written: u64,
}

impl EventWriter {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx, written: 0 }
    }

    /// `Break` once the client has gone away. An event that fails to encode is
    /// dropped and the stream carries on.
    pub async fn write(&mut self, sample: &MetricSample) -> ControlFlow<()> {
        let frame = match encode_frame(sample) {
            Ok(f) => f,
            Err(e) => {
                debug!("skipping event: {e}");
                return ControlFlow::Continue(());
            }
        };
        if self.tx.send(frame).await.is_err() {
            return ControlFlow::Break(());
        }
        self.written += 1;
        ControlFlow::Continue(())
    }

    /// Resolves when the receiving body has been dropped (client disconnect).
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Frames accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}
