use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{AppointmentRow, UserRow, ROLE_USER};
use crate::store::StoreError;

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<UserRow>, StoreError> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT * FROM users WHERE active = 1 ORDER BY email",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get(pool: &SqlitePool, email: &str) -> Result<Option<UserRow>, StoreError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT * FROM users WHERE email = ? AND active = 1 LIMIT 1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Upsert keyed by email. New accounts start as plain users; a re-save keeps
/// the stored role and avatar.
pub async fn save(
    pool: &SqlitePool,
    email: &str,
    name: &str,
    surname: &str,
    password_hash: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO users (email, name, surname, avatar_url, role, password_hash, active, created_at)
           VALUES (?, ?, ?, NULL, ?, ?, 1, ?)
           ON CONFLICT(email) DO UPDATE SET
             name = excluded.name,
             surname = excluded.surname,
             password_hash = excluded.password_hash,
             active = 1"#,
    )
    .bind(email)
    .bind(name)
    .bind(surname)
    .bind(ROLE_USER)
    .bind(password_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_role(pool: &SqlitePool, email: &str, role: &str) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE users SET role = ? WHERE email = ?")
        .bind(role)
        .bind(email)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub async fn set_avatar_url(
    pool: &SqlitePool,
    email: &str,
    avatar_url: &str,
) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE users SET avatar_url = ? WHERE email = ?")
        .bind(avatar_url)
        .bind(email)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Removes the account and every appointment the user booked as a client.
/// The removed appointments are returned so the caller can broadcast their
/// deletion to live subscribers.
pub async fn remove(
    pool: &SqlitePool,
    email: &str,
) -> Result<Vec<AppointmentRow>, StoreError> {
    let result = sqlx::query("DELETE FROM users WHERE email = ?")
        .bind(email)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    let removed = crate::store::appointments_for_client(pool, email).await?;
    sqlx::query("DELETE FROM appointments WHERE client_id = ?")
        .bind(email)
        .execute(pool)
        .await?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ROLE_BARBER;
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

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let pool = test_pool().await;
        save(&pool, "ana@mail.com", "Ana", "Santos", "hash").await.unwrap();

        let user = get(&pool, "ana@mail.com").await.unwrap().unwrap();
        assert_eq!(user.name, "Ana");
        assert_eq!(user.role, ROLE_USER);
    }

    #[tokio::test]
    async fn resave_keeps_role() {
        let pool = test_pool().await;
        save(&pool, "joe@cut.io", "Joe", "Cut", "hash").await.unwrap();
        set_role(&pool, "joe@cut.io", ROLE_BARBER).await.unwrap();

        save(&pool, "joe@cut.io", "Joseph", "Cut", "hash2").await.unwrap();
        let user = get(&pool, "joe@cut.io").await.unwrap().unwrap();
        assert_eq!(user.role, ROLE_BARBER);
        assert_eq!(user.name, "Joseph");
    }

    #[tokio::test]
    async fn remove_also_drops_client_appointments() {
        let pool = test_pool().await;
        save(&pool, "ana@mail.com", "Ana", "Santos", "hash").await.unwrap();
        let shop = crate::models::ShopRow {
            id: "fade-joe@cut.io".to_string(),
            name: "Fade".to_string(),
            logo_url: None,
            services: String::new(),
            barber: "joe@cut.io".to_string(),
            latitude: 0.0,
            longitude: 0.0,
        };
        crate::shops::save(&pool, &shop).await.unwrap();
        crate::store::reserve(&pool, &shop.id, "2024-05-01-10:00", "ana@mail.com")
            .await
            .unwrap();

        let removed = remove(&pool, "ana@mail.com").await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].record_key, "2024-05-01-10:00fade-joe@cut.io");

        assert!(get(&pool, "ana@mail.com").await.unwrap().is_none());
        let appts = crate::store::appointments_for_client(&pool, "ana@mail.com")
            .await
            .unwrap();
        assert!(appts.is_empty());
    }
}
