use std::convert::Infallible;

use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::{QueryRequest, StreamFrame};

/// Frames buffered between the pipeline task and the response body
const FRAME_BUFFER: usize = 16;

fn to_event(frame: &StreamFrame) -> Event {
    Event::default()
        .event(frame.event_name())
        .json_data(frame)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to serialize stream frame: {}", e);
            Event::default().event("error").data("{\"type\":\"error\"}")
        })
}

/// Answer a natural-language question as a stream of status, result/error and end events
pub async fn nl_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<QueryRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let identity = state
        .identity
        .identify(&headers)
        .ok_or_else(|| AppError::Unauthorized("Missing caller identity".to_string()))?;

    tracing::info!("Natural language query from {} for store {}", identity.user_id, payload.store_id);
    let admitted = state.pipeline.admit(identity, payload)?;

    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        pipeline.run(admitted, tx).await;
    });

    let stream = ReceiverStream::new(rx).map(|frame| Ok(to_event(&frame)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
