use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::blobs::BlobStore;
use crate::models::AppointmentRow;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ReservationEvent>,
    pub blobs: BlobStore,
}

pub const EVENT_RESERVED: &str = "slot_reserved";
pub const EVENT_CANCELLED: &str = "slot_cancelled";
pub const EVENT_DELETED: &str = "slot_deleted";

/// Broadcast for every appointment mutation. Subscribers rebuild their
/// reservation index when one arrives; delivery is eventually consistent
/// and carries no ordering guarantee relative to an in-flight write.
#[derive(Clone, Debug, Serialize)]
pub struct ReservationEvent {
    pub kind: String,
    pub record_key: String,
    pub shop_id: Option<String>,
    pub slot_key: Option<String>,
    pub client_id: Option<String>,
    pub status: Option<String>,
}

impl ReservationEvent {
    pub fn from_row(kind: &str, row: AppointmentRow) -> Self {
        Self {
            kind: kind.to_string(),
            record_key: row.record_key,
            shop_id: Some(row.shop_id),
            slot_key: Some(row.slot_key),
            client_id: Some(row.client_id),
            status: Some(row.status),
        }
    }

    /// Event for a record that no longer exists in the store.
    pub fn removed(record_key: &str, shop_id: Option<String>) -> Self {
        Self {
            kind: EVENT_DELETED.to_string(),
            record_key: record_key.to_string(),
            shop_id,
            slot_key: None,
            client_id: None,
            status: None,
        }
    }
}
