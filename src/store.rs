use std::fmt;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{AppointmentRow, ShopRow, STATUS_ACCEPTED, STATUS_CANCELLED};
use crate::slots::{record_key, ReservationIndex};

#[derive(Debug)]
pub enum StoreError {
    /// The slot already holds a non-cancelled booking. The losing writer is
    /// told so instead of silently clobbering the winner's record.
    SlotTaken { record_key: String },
    /// Referenced shop or appointment does not exist.
    NotFound,
    Database(sqlx::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::SlotTaken { record_key } => {
                write!(f, "slot already reserved: {record_key}")
            }
            StoreError::NotFound => write!(f, "record not found"),
            StoreError::Database(err) => write!(f, "store failure: {err}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err)
    }
}

/// Reserve a slot for a client. Coordinates are copied from the shop at
/// booking time. The write is conditional: it only lands if the record key
/// is free or the previous booking under it was cancelled, so two racing
/// reservations resolve to exactly one winner and a `SlotTaken` loser.
pub async fn reserve(
    pool: &SqlitePool,
    shop_id: &str,
    slot_key: &str,
    client_id: &str,
) -> Result<AppointmentRow, StoreError> {
    let shop = get_shop(pool, shop_id).await?.ok_or(StoreError::NotFound)?;
    let key = record_key(slot_key, shop_id);
    let requested_at = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"INSERT INTO appointments
           (record_key, shop_id, client_id, slot_key, latitude, longitude, status, requested_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(record_key) DO UPDATE SET
             client_id = excluded.client_id,
             latitude = excluded.latitude,
             longitude = excluded.longitude,
             status = excluded.status,
             requested_at = excluded.requested_at
           WHERE appointments.status = ?"#,
    )
    .bind(&key)
    .bind(shop_id)
    .bind(client_id)
    .bind(slot_key)
    .bind(shop.latitude)
    .bind(shop.longitude)
    .bind(STATUS_ACCEPTED)
    .bind(&requested_at)
    .bind(STATUS_CANCELLED)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::SlotTaken { record_key: key });
    }

    Ok(AppointmentRow {
        record_key: key,
        shop_id: shop_id.to_string(),
        client_id: client_id.to_string(),
        slot_key: slot_key.to_string(),
        latitude: shop.latitude,
        longitude: shop.longitude,
        status: STATUS_ACCEPTED.to_string(),
        requested_at,
    })
}

/// Barber-side rejection: the record stays for history, the slot frees up
/// once the index refreshes. Cancelled is terminal.
pub async fn cancel(pool: &SqlitePool, record_key: &str) -> Result<AppointmentRow, StoreError> {
    let result = sqlx::query("UPDATE appointments SET status = ? WHERE record_key = ?")
        .bind(STATUS_CANCELLED)
        .bind(record_key)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }

    get(pool, record_key).await?.ok_or(StoreError::NotFound)
}

/// Client-side cancellation: the record is removed outright, as if the slot
/// had never been booked.
pub async fn remove(pool: &SqlitePool, record_key: &str) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM appointments WHERE record_key = ?")
        .bind(record_key)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub async fn get(
    pool: &SqlitePool,
    record_key: &str,
) -> Result<Option<AppointmentRow>, StoreError> {
    let row = sqlx::query_as::<_, AppointmentRow>(
        "SELECT * FROM appointments WHERE record_key = ? LIMIT 1",
    )
    .bind(record_key)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn appointments_for_shop(
    pool: &SqlitePool,
    shop_id: &str,
) -> Result<Vec<AppointmentRow>, StoreError> {
    let rows = sqlx::query_as::<_, AppointmentRow>(
        "SELECT * FROM appointments WHERE shop_id = ? ORDER BY slot_key",
    )
    .bind(shop_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn appointments_for_client(
    pool: &SqlitePool,
    client_id: &str,
) -> Result<Vec<AppointmentRow>, StoreError> {
    let rows = sqlx::query_as::<_, AppointmentRow>(
        "SELECT * FROM appointments WHERE client_id = ? ORDER BY slot_key",
    )
    .bind(client_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Full rebuild of the reservation projection from the store: every
/// non-cancelled booking counts as reserved. Called once per change
/// notification.
pub async fn load_reservation_index(pool: &SqlitePool) -> Result<ReservationIndex, StoreError> {
    let keys = sqlx::query_scalar::<_, String>(
        "SELECT record_key FROM appointments WHERE status != ?",
    )
    .bind(STATUS_CANCELLED)
    .fetch_all(pool)
    .await?;
    Ok(ReservationIndex::from_keys(keys))
}

async fn get_shop(pool: &SqlitePool, shop_id: &str) -> Result<Option<ShopRow>, StoreError> {
    let shop = sqlx::query_as::<_, ShopRow>("SELECT * FROM shops WHERE id = ? LIMIT 1")
        .bind(shop_id)
        .fetch_optional(pool)
        .await?;
    Ok(shop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShopRow;
    use crate::slots::slot_key;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn seed_shop(pool: &SqlitePool, id: &str) {
        let shop = ShopRow {
            id: id.to_string(),
            name: "Fade Factory".to_string(),
            logo_url: None,
            services: "cut, beard".to_string(),
            barber: "joe@cut.io".to_string(),
            latitude: 40.4168,
            longitude: -3.7038,
        };
        crate::shops::save(pool, &shop).await.unwrap();
    }

    #[tokio::test]
    async fn reserve_copies_shop_coordinates() {
        let pool = test_pool().await;
        seed_shop(&pool, "fade-joe@cut.io").await;

        let key = slot_key("2024-05-01", "10:00");
        let appt = reserve(&pool, "fade-joe@cut.io", &key, "ana@mail.com")
            .await
            .unwrap();

        assert_eq!(appt.status, STATUS_ACCEPTED);
        assert_eq!(appt.latitude, 40.4168);
        assert_eq!(appt.longitude, -3.7038);
        assert_eq!(appt.record_key, format!("{key}fade-joe@cut.io"));
    }

    #[tokio::test]
    async fn reserve_unknown_shop_is_not_found() {
        let pool = test_pool().await;
        let err = reserve(&pool, "ghost", "2024-05-01-10:00", "ana@mail.com")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn second_reserve_on_same_slot_is_rejected() {
        let pool = test_pool().await;
        seed_shop(&pool, "fade-joe@cut.io").await;
        let key = slot_key("2024-05-01", "10:30");

        reserve(&pool, "fade-joe@cut.io", &key, "ana@mail.com")
            .await
            .unwrap();
        let err = reserve(&pool, "fade-joe@cut.io", &key, "bob@mail.com")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::SlotTaken { .. }));

        // the first booking survives untouched
        let stored = get(&pool, &record_key(&key, "fade-joe@cut.io"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.client_id, "ana@mail.com");
    }

    #[tokio::test]
    async fn concurrent_reserves_have_exactly_one_winner() {
        let pool = test_pool().await;
        seed_shop(&pool, "fade-joe@cut.io").await;
        let key = slot_key("2024-05-01", "12:00");

        let (first, second) = tokio::join!(
            reserve(&pool, "fade-joe@cut.io", &key, "ana@mail.com"),
            reserve(&pool, "fade-joe@cut.io", &key, "bob@mail.com"),
        );

        let wins = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        let loser = if first.is_err() { first } else { second };
        assert!(matches!(loser.unwrap_err(), StoreError::SlotTaken { .. }));
    }

    #[tokio::test]
    async fn index_reflects_reserve_cancel_delete() {
        let pool = test_pool().await;
        seed_shop(&pool, "fade-joe@cut.io").await;
        let key = slot_key("2024-05-01", "15:00");

        let appt = reserve(&pool, "fade-joe@cut.io", &key, "ana@mail.com")
            .await
            .unwrap();
        let index = load_reservation_index(&pool).await.unwrap();
        assert!(index.is_reserved("fade-joe@cut.io", &key));

        let cancelled = cancel(&pool, &appt.record_key).await.unwrap();
        assert_eq!(cancelled.status, STATUS_CANCELLED);
        let index = load_reservation_index(&pool).await.unwrap();
        assert!(!index.is_reserved("fade-joe@cut.io", &key));

        // the cancelled record is retained for history
        assert!(get(&pool, &appt.record_key).await.unwrap().is_some());

        remove(&pool, &appt.record_key).await.unwrap();
        assert!(get(&pool, &appt.record_key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelled_slot_can_be_rebooked() {
        let pool = test_pool().await;
        seed_shop(&pool, "fade-joe@cut.io").await;
        let key = slot_key("2024-05-01", "16:00");

        let appt = reserve(&pool, "fade-joe@cut.io", &key, "ana@mail.com")
            .await
            .unwrap();
        cancel(&pool, &appt.record_key).await.unwrap();

        // the key is occupied by a cancelled record, which counts as free
        let rebooked = reserve(&pool, "fade-joe@cut.io", &key, "bob@mail.com")
            .await
            .unwrap();
        assert_eq!(rebooked.client_id, "bob@mail.com");
        assert_eq!(rebooked.status, STATUS_ACCEPTED);
    }

    #[tokio::test]
    async fn deleted_slot_can_be_rebooked() {
        let pool = test_pool().await;
        seed_shop(&pool, "fade-joe@cut.io").await;
        let key = slot_key("2024-05-01", "17:30");

        let appt = reserve(&pool, "fade-joe@cut.io", &key, "ana@mail.com")
            .await
            .unwrap();
        remove(&pool, &appt.record_key).await.unwrap();

        reserve(&pool, "fade-joe@cut.io", &key, "bob@mail.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_missing_record_is_not_found() {
        let pool = test_pool().await;
        let err = cancel(&pool, "nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        let err = remove(&pool, "nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn queries_filter_by_shop_and_client() {
        let pool = test_pool().await;
        seed_shop(&pool, "fade-joe@cut.io").await;
        seed_shop(&pool, "clip-amy@cut.io").await;

        reserve(&pool, "fade-joe@cut.io", "2024-05-01-10:00", "ana@mail.com")
            .await
            .unwrap();
        reserve(&pool, "fade-joe@cut.io", "2024-05-01-10:30", "bob@mail.com")
            .await
            .unwrap();
        reserve(&pool, "clip-amy@cut.io", "2024-05-01-10:00", "ana@mail.com")
            .await
            .unwrap();

        let shop_appts = appointments_for_shop(&pool, "fade-joe@cut.io").await.unwrap();
        assert_eq!(shop_appts.len(), 2);

        let ana = appointments_for_client(&pool, "ana@mail.com").await.unwrap();
        assert_eq!(ana.len(), 2);
        assert!(ana.iter().all(|a| a.client_id == "ana@mail.com"));
    }
}
