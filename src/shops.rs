use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{
    AppointmentRow, ShopRequestRow, ShopRow, REQUEST_DELETE, REQUEST_EDIT, REQUEST_SAVE,
    ROLE_BARBER, ROLE_USER,
};
use crate::store::StoreError;

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<ShopRow>, StoreError> {
    let rows = sqlx::query_as::<_, ShopRow>("SELECT * FROM shops ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn get(pool: &SqlitePool, shop_id: &str) -> Result<Option<ShopRow>, StoreError> {
    let row = sqlx::query_as::<_, ShopRow>("SELECT * FROM shops WHERE id = ? LIMIT 1")
        .bind(shop_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_by_barber(
    pool: &SqlitePool,
    barber: &str,
) -> Result<Vec<ShopRow>, StoreError> {
    let rows = sqlx::query_as::<_, ShopRow>(
        "SELECT * FROM shops WHERE barber = ? ORDER BY name",
    )
    .bind(barber)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Upsert keyed by the derived shop id, matching the original data set where
/// a shop document id is `{name}-{barber}`.
pub async fn save(pool: &SqlitePool, shop: &ShopRow) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO shops (id, name, logo_url, services, barber, latitude, longitude)
           VALUES (?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             logo_url = excluded.logo_url,
             services = excluded.services,
             barber = excluded.barber,
             latitude = excluded.latitude,
             longitude = excluded.longitude"#,
    )
    .bind(&shop.id)
    .bind(&shop.name)
    .bind(&shop.logo_url)
    .bind(&shop.services)
    .bind(&shop.barber)
    .bind(shop.latitude)
    .bind(shop.longitude)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_logo_url(
    pool: &SqlitePool,
    shop_id: &str,
    logo_url: &str,
) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE shops SET logo_url = ? WHERE id = ?")
        .bind(logo_url)
        .bind(shop_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Removes the shop and every appointment booked against it. The removed
/// appointments are returned so the caller can broadcast their deletion;
/// live subscribers would otherwise keep showing the freed slots as taken.
pub async fn remove(
    pool: &SqlitePool,
    shop_id: &str,
) -> Result<Vec<AppointmentRow>, StoreError> {
    let result = sqlx::query("DELETE FROM shops WHERE id = ?")
        .bind(shop_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    let removed = crate::store::appointments_for_shop(pool, shop_id).await?;
    sqlx::query("DELETE FROM appointments WHERE shop_id = ?")
        .bind(shop_id)
        .execute(pool)
        .await?;
    Ok(removed)
}

pub async fn file_request(
    pool: &SqlitePool,
    kind: &str,
    shop: &ShopRow,
) -> Result<ShopRequestRow, StoreError> {
    let request = ShopRequestRow {
        id: ShopRequestRow::derive_id(kind, &shop.barber),
        kind: kind.to_string(),
        shop_id: shop.id.clone(),
        shop_name: shop.name.clone(),
        logo_url: shop.logo_url.clone(),
        services: shop.services.clone(),
        barber: shop.barber.clone(),
        latitude: shop.latitude,
        longitude: shop.longitude,
        requested_at: Utc::now().to_rfc3339(),
    };

    sqlx::query(
        r#"INSERT INTO shop_requests
           (id, kind, shop_id, shop_name, logo_url, services, barber, latitude, longitude, requested_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
             shop_id = excluded.shop_id,
             shop_name = excluded.shop_name,
             logo_url = excluded.logo_url,
             services = excluded.services,
             latitude = excluded.latitude,
             longitude = excluded.longitude,
             requested_at = excluded.requested_at"#,
    )
    .bind(&request.id)
    .bind(&request.kind)
    .bind(&request.shop_id)
    .bind(&request.shop_name)
    .bind(&request.logo_url)
    .bind(&request.services)
    .bind(&request.barber)
    .bind(request.latitude)
    .bind(request.longitude)
    .bind(&request.requested_at)
    .execute(pool)
    .await?;

    Ok(request)
}

pub async fn list_requests(pool: &SqlitePool) -> Result<Vec<ShopRequestRow>, StoreError> {
    let rows = sqlx::query_as::<_, ShopRequestRow>(
        "SELECT * FROM shop_requests ORDER BY requested_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_request(
    pool: &SqlitePool,
    request_id: &str,
) -> Result<Option<ShopRequestRow>, StoreError> {
    let row = sqlx::query_as::<_, ShopRequestRow>(
        "SELECT * FROM shop_requests WHERE id = ? LIMIT 1",
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn delete_request(pool: &SqlitePool, request_id: &str) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM shop_requests WHERE id = ?")
        .bind(request_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Outcome of applying an approved request: the shop acted on, and any
/// appointments a `delete` took with it (to be broadcast by the caller).
#[derive(Debug)]
pub struct AppliedRequest {
    pub shop_id: String,
    pub removed_appointments: Vec<AppointmentRow>,
}

/// Apply an approved request to the shops collection. Approving a `save`
/// promotes the requester to barber; approving a `delete` demotes them back
/// to a plain user once their last shop is gone. The request row itself is
/// dropped by the caller.
pub async fn apply_request(
    pool: &SqlitePool,
    request: &ShopRequestRow,
) -> Result<AppliedRequest, StoreError> {
    let shop = ShopRow {
        id: request.shop_id.clone(),
        name: request.shop_name.clone(),
        logo_url: request.logo_url.clone(),
        services: request.services.clone(),
        barber: request.barber.clone(),
        latitude: request.latitude,
        longitude: request.longitude,
    };

    let mut removed_appointments = Vec::new();
    match request.kind.as_str() {
        REQUEST_SAVE => {
            save(pool, &shop).await?;
            crate::users::set_role(pool, &request.barber, ROLE_BARBER).await?;
        }
        REQUEST_EDIT => {
            save(pool, &shop).await?;
        }
        REQUEST_DELETE => {
            removed_appointments = remove(pool, &shop.id).await?;
            let remaining = list_by_barber(pool, &request.barber).await?;
            if remaining.is_empty() {
                crate::users::set_role(pool, &request.barber, ROLE_USER).await?;
            }
        }
        other => {
            log::error!("Unknown shop request kind: {other}");
            return Err(StoreError::NotFound);
        }
    }

    Ok(AppliedRequest {
        shop_id: shop.id,
        removed_appointments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ROLE_USER, STATUS_ACCEPTED};
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

    fn shop_for(barber: &str, name: &str) -> ShopRow {
        ShopRow {
            id: ShopRow::derive_id(name, barber),
            name: name.to_string(),
            logo_url: None,
            services: "cut".to_string(),
            barber: barber.to_string(),
            latitude: 1.0,
            longitude: 2.0,
        }
    }

    async fn seed_user(pool: &SqlitePool, email: &str) {
        crate::users::save(pool, email, "Test", "User", "x").await.unwrap();
    }

    #[tokio::test]
    async fn save_is_an_upsert_keyed_by_derived_id() {
        let pool = test_pool().await;
        let mut shop = shop_for("joe@cut.io", "Fade");
        save(&pool, &shop).await.unwrap();

        shop.services = "cut, beard".to_string();
        save(&pool, &shop).await.unwrap();

        let all = list_all(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].services, "cut, beard");
    }

    #[tokio::test]
    async fn approving_save_creates_shop_and_promotes_requester() {
        let pool = test_pool().await;
        seed_user(&pool, "joe@cut.io").await;
        let shop = shop_for("joe@cut.io", "Fade");

        let request = file_request(&pool, REQUEST_SAVE, &shop).await.unwrap();
        assert_eq!(request.id, "save-joe@cut.io");

        apply_request(&pool, &request).await.unwrap();
        delete_request(&pool, &request.id).await.unwrap();

        assert!(get(&pool, &shop.id).await.unwrap().is_some());
        let user = crate::users::get(&pool, "joe@cut.io").await.unwrap().unwrap();
        assert_eq!(user.role, ROLE_BARBER);
        assert!(list_requests(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn approving_delete_demotes_barber_with_no_shops_left() {
        let pool = test_pool().await;
        seed_user(&pool, "joe@cut.io").await;
        let shop = shop_for("joe@cut.io", "Fade");

        let request = file_request(&pool, REQUEST_SAVE, &shop).await.unwrap();
        apply_request(&pool, &request).await.unwrap();
        delete_request(&pool, &request.id).await.unwrap();

        // a booking against the shop goes away with it
        crate::store::reserve(&pool, &shop.id, "2024-05-01-10:00", "ana@mail.com")
            .await
            .unwrap();

        let request = file_request(&pool, REQUEST_DELETE, &shop).await.unwrap();
        let applied = apply_request(&pool, &request).await.unwrap();
        assert_eq!(applied.shop_id, shop.id);
        assert_eq!(applied.removed_appointments.len(), 1);
        assert_eq!(
            applied.removed_appointments[0].record_key,
            format!("2024-05-01-10:00{}", shop.id)
        );

        assert!(get(&pool, &shop.id).await.unwrap().is_none());
        let appts = crate::store::appointments_for_shop(&pool, &shop.id).await.unwrap();
        assert!(appts.iter().all(|a| a.status != STATUS_ACCEPTED));
        assert!(appts.is_empty());

        let user = crate::users::get(&pool, "joe@cut.io").await.unwrap().unwrap();
        assert_eq!(user.role, ROLE_USER);
    }

    #[tokio::test]
    async fn approving_delete_keeps_role_while_other_shops_remain() {
        let pool = test_pool().await;
        seed_user(&pool, "joe@cut.io").await;
        let first = shop_for("joe@cut.io", "Fade");
        let second = shop_for("joe@cut.io", "Clip");

        let request = file_request(&pool, REQUEST_SAVE, &first).await.unwrap();
        apply_request(&pool, &request).await.unwrap();
        save(&pool, &second).await.unwrap();

        let request = file_request(&pool, REQUEST_DELETE, &first).await.unwrap();
        apply_request(&pool, &request).await.unwrap();

        let user = crate::users::get(&pool, "joe@cut.io").await.unwrap().unwrap();
        assert_eq!(user.role, ROLE_BARBER);
    }

    #[tokio::test]
    async fn rejecting_a_request_only_drops_it() {
        let pool = test_pool().await;
        seed_user(&pool, "joe@cut.io").await;
        let shop = shop_for("joe@cut.io", "Fade");

        let request = file_request(&pool, REQUEST_SAVE, &shop).await.unwrap();
        delete_request(&pool, &request.id).await.unwrap();

        assert!(get(&pool, &shop.id).await.unwrap().is_none());
        let user = crate::users::get(&pool, "joe@cut.io").await.unwrap().unwrap();
        assert_eq!(user.role, ROLE_USER);
    }
}
