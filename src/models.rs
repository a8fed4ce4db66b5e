use serde::{Deserialize, Serialize};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";
pub const ROLE_BARBER: &str = "barber";

pub const STATUS_ACCEPTED: &str = "accepted";
pub const STATUS_CANCELLED: &str = "cancelled";

pub const REQUEST_SAVE: &str = "save";
pub const REQUEST_EDIT: &str = "edit";
pub const REQUEST_DELETE: &str = "delete";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRow {
    pub email: String,
    pub name: String,
    pub surname: String,
    pub avatar_url: Option<String>,
    pub role: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub active: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShopRow {
    pub id: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub services: String,
    /// Email of the owning barber.
    pub barber: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl ShopRow {
    /// Shops are keyed by name and owner, the way the original data set was.
    pub fn derive_id(name: &str, barber: &str) -> String {
        format!("{name}-{barber}")
    }
}

/// A booked slot. `record_key` is `slot_key + shop_id` and is the record's
/// identity, so a second booking of the same slot collides instead of
/// duplicating.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AppointmentRow {
    pub record_key: String,
    pub shop_id: String,
    pub client_id: String,
    pub slot_key: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: String,
    pub requested_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ShopRequestRow {
    pub id: String,
    pub kind: String,
    pub shop_id: String,
    pub shop_name: String,
    pub logo_url: Option<String>,
    pub services: String,
    pub barber: String,
    pub latitude: f64,
    pub longitude: f64,
    pub requested_at: String,
}

impl ShopRequestRow {
    /// One pending request per (kind, barber), mirroring the original's
    /// request document ids.
    pub fn derive_id(kind: &str, barber: &str) -> String {
        format!("{kind}-{barber}")
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActivityRow {
    pub message: String,
    pub created_at: String,
}
