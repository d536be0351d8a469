//! Live notification stream
//!
//! Server-sent events backed by a broadcaster subscription. The delivery
//! loop is the subscription stream itself: it blocks on the relay (no
//! polling interval) and ends as soon as the client disconnects, which
//! drops the subscription and deregisters the subscriber.

use std::convert::Infallible;

use actix_web::{HttpResponse, get, http::header, web};
use futures::StreamExt;

use crate::model::{app_state::AppState, response::gate_error_response};

#[get("/events")]
pub async fn note_events(state: web::Data<AppState>) -> HttpResponse {
    let channel = state.configuration.notes_channel();
    match state.broadcaster.subscribe(&channel).await {
        Ok(subscription) => {
            let stream = subscription.map(|payload| {
                Ok::<web::Bytes, Infallible>(web::Bytes::from(format!("data: {payload}\n\n")))
            });
            HttpResponse::Ok()
                .content_type("text/event-stream")
                .insert_header((header::CACHE_CONTROL, "no-cache"))
                .streaming(stream)
        }
        Err(err) => gate_error_response(&err),
    }
}
