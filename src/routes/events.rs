use actix_web::{http::header, web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::{
    auth::basic_validator,
    state::{AppState, ReservationEvent},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/events")
            .wrap(HttpAuthentication::basic(basic_validator))
            .route(web::get().to(stream_events)),
    )
    .service(web::resource("/shops/{id}/events").route(web::get().to(stream_shop_events)));
}

/// Live feed of every reservation change. A consumer holds one subscription
/// for its screen lifetime and rebuilds its reservation index on each
/// message; dropping the connection drops the broadcast receiver, so no
/// callbacks outlive the consumer.
async fn stream_events(state: web::Data<AppState>) -> Result<HttpResponse> {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event))),
        // lagged receivers skip ahead; the next full index rebuild catches up
        Err(_) => None,
    });

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream))
}

/// Same feed narrowed to a single shop, for the booking screen.
async fn stream_shop_events(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let shop_id = path.into_inner();
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let event = match result {
            Ok(event) => event,
            Err(_) => return None,
        };
        if !event_is_for_shop(&event, &shop_id) {
            return None;
        }
        Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event)))
    });

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream))
}

// Every published event carries its shop id, so matching on it alone is
// enough. Matching on record_key suffixes is not: one shop id can be a
// suffix of another ("Fade-joe@cut.io" / "SuperFade-joe@cut.io").
fn event_is_for_shop(event: &ReservationEvent, shop_id: &str) -> bool {
    event.shop_id.as_deref() == Some(shop_id)
}

fn event_to_bytes(event: &ReservationEvent) -> web::Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: update\ndata: {}\n\n", payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EVENT_RESERVED;

    fn event_for(shop_id: &str) -> ReservationEvent {
        ReservationEvent {
            kind: EVENT_RESERVED.to_string(),
            record_key: format!("2024-05-01-10:00{shop_id}"),
            shop_id: Some(shop_id.to_string()),
            slot_key: Some("2024-05-01-10:00".to_string()),
            client_id: Some("ana@mail.com".to_string()),
            status: None,
        }
    }

    #[test]
    fn shop_filter_matches_exact_shop_only() {
        let event = event_for("SuperFade-joe@cut.io");
        assert!(event_is_for_shop(&event, "SuperFade-joe@cut.io"));
        // a shop whose id is a suffix of another must not see its events
        assert!(!event_is_for_shop(&event, "Fade-joe@cut.io"));
        assert!(!event_is_for_shop(&event, "Clip-amy@cut.io"));
    }
}
