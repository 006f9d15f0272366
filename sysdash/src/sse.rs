//! `/events` handler: one telemetry stream per connected dashboard.

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tracing::debug;

use crate::encoder::EventWriter;
use crate::metrics::SysinfoSource;
use crate::multiplexer::TelemetryMultiplexer;
use crate::state::AppState;

// Frames queued between the event loop and the socket.
const FRAME_BUFFER: usize = 16;

pub async fn events_handler(State(state): State<AppState>) -> Response {
    let (tx, rx) = mpsc::channel::<Bytes>(FRAME_BUFFER);
    let mux = TelemetryMultiplexer::new(
        SysinfoSource::new(),
        state.config.clone(),
        state.probe.clone(),
        EventWriter::new(tx),
        state.shutdown.clone(),
    )
    .with_cadence(state.cadence);

    tokio::spawn(async move {
        debug!("telemetry stream opened");
        mux.run().await
    });

    // Dropping the body (client gone) drops `rx`, which ends the event loop.
    let frames = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok::<_, Infallible>(frame), rx))
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}
