use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{admin_validator, AuthUser},
    blobs::{avatar_key, logo_key},
    db::log_activity,
    models::{ActivityRow, ROLE_ADMIN, ROLE_BARBER, ROLE_USER, REQUEST_DELETE},
    routes::store_error,
    shops,
    state::{AppState, ReservationEvent},
    users,
};

#[derive(Deserialize)]
struct RoleForm {
    role: String,
}

#[derive(Deserialize)]
struct UserCreateForm {
    email: String,
    name: String,
    surname: Option<String>,
    password: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .service(
                web::resource("/users")
                    .route(web::get().to(list_users))
                    .route(web::post().to(create_user)),
            )
            .service(
                web::resource("/users/{email}")
                    .route(web::delete().to(delete_user)),
            )
            .service(web::resource("/users/{email}/role").route(web::post().to(change_role)))
            .service(web::resource("/shops").route(web::get().to(list_shops)))
            .service(web::resource("/shops/{id}").route(web::delete().to(delete_shop)))
            .service(web::resource("/requests").route(web::get().to(list_requests)))
            .service(
                web::resource("/requests/{id}/approve").route(web::post().to(approve_request)),
            )
            .service(
                web::resource("/requests/{id}/reject").route(web::post().to(reject_request)),
            )
            .service(web::resource("/activity").route(web::get().to(recent_activity))),
    );
}

async fn list_users(state: web::Data<AppState>) -> Result<HttpResponse> {
    let users = users::list_all(&state.db).await.map_err(store_error)?;
    Ok(HttpResponse::Ok().json(users))
}

async fn create_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Json<UserCreateForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    if form.email.trim().is_empty() || form.password.trim().is_empty() {
        return Err(actix_web::error::ErrorBadRequest("email and password are required"));
    }

    let password_hash = crate::auth::hash_password(&form.password)
        .map_err(|_| actix_web::error::ErrorInternalServerError("password hash failed"))?;
    users::save(
        &state.db,
        &form.email,
        &form.name,
        form.surname.as_deref().unwrap_or(""),
        &password_hash,
    )
    .await
    .map_err(store_error)?;

    log_activity(
        &state.db,
        "user_created",
        &format!("{} created account {}.", auth.email, form.email),
        Some(&auth.email),
        None,
    )
    .await;

    Ok(HttpResponse::Created().json(json!({ "email": form.email })))
}

async fn change_role(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<RoleForm>,
) -> Result<HttpResponse> {
    let email = path.into_inner();
    let role = form.into_inner().role;
    let allowed = [ROLE_ADMIN, ROLE_BARBER, ROLE_USER];
    if !allowed.contains(&role.as_str()) {
        return Err(actix_web::error::ErrorBadRequest("invalid role"));
    }

    users::set_role(&state.db, &email, &role)
        .await
        .map_err(store_error)?;

    log_activity(
        &state.db,
        "role_changed",
        &format!("{} set role of {} to {}.", auth.email, email, role),
        Some(&auth.email),
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "email": email, "role": role })))
}

/// Deleting an account also removes its avatar blob and its bookings.
async fn delete_user(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let email = path.into_inner();
    let removed = users::remove(&state.db, &email).await.map_err(store_error)?;
    for appointment in removed {
        let _ = state.events.send(ReservationEvent::removed(
            &appointment.record_key,
            Some(appointment.shop_id),
        ));
    }

    if let Err(err) = state.blobs.delete(&avatar_key(&email)).await {
        log::debug!("No avatar blob removed for {email}: {err}");
    }

    log_activity(
        &state.db,
        "user_deleted",
        &format!("{} deleted account {}.", auth.email, email),
        Some(&auth.email),
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

async fn list_shops(state: web::Data<AppState>) -> Result<HttpResponse> {
    let shops = shops::list_all(&state.db).await.map_err(store_error)?;
    Ok(HttpResponse::Ok().json(shops))
}

async fn delete_shop(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let shop_id = path.into_inner();
    let removed = shops::remove(&state.db, &shop_id).await.map_err(store_error)?;
    for appointment in removed {
        let _ = state.events.send(ReservationEvent::removed(
            &appointment.record_key,
            Some(appointment.shop_id),
        ));
    }

    if let Err(err) = state.blobs.delete(&logo_key(&shop_id)).await {
        log::debug!("No logo blob removed for {shop_id}: {err}");
    }

    log_activity(
        &state.db,
        "shop_deleted",
        &format!("{} deleted shop {}.", auth.email, shop_id),
        Some(&auth.email),
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

async fn list_requests(state: web::Data<AppState>) -> Result<HttpResponse> {
    let requests = shops::list_requests(&state.db).await.map_err(store_error)?;
    Ok(HttpResponse::Ok().json(requests))
}

async fn approve_request(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let request_id = path.into_inner();
    let request = shops::get_request(&state.db, &request_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("request not found"))?;

    let applied = shops::apply_request(&state.db, &request)
        .await
        .map_err(store_error)?;
    let shop_id = applied.shop_id;
    for appointment in applied.removed_appointments {
        let _ = state.events.send(ReservationEvent::removed(
            &appointment.record_key,
            Some(appointment.shop_id),
        ));
    }

    if request.kind == REQUEST_DELETE {
        if let Err(err) = state.blobs.delete(&logo_key(&shop_id)).await {
            log::debug!("No logo blob removed for {shop_id}: {err}");
        }
    }

    shops::delete_request(&state.db, &request_id)
        .await
        .map_err(store_error)?;

    log_activity(
        &state.db,
        "request_approved",
        &format!("{} approved {} request of {}.", auth.email, request.kind, request.barber),
        Some(&auth.email),
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "applied": request_id, "shop_id": shop_id })))
}

async fn reject_request(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let request_id = path.into_inner();
    shops::delete_request(&state.db, &request_id)
        .await
        .map_err(store_error)?;

    log_activity(
        &state.db,
        "request_rejected",
        &format!("{} rejected request {}.", auth.email, request_id),
        Some(&auth.email),
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

async fn recent_activity(state: web::Data<AppState>) -> Result<HttpResponse> {
    let rows = sqlx::query_as::<_, ActivityRow>(
        "SELECT message, created_at FROM activities ORDER BY created_at DESC LIMIT 50",
    )
    .fetch_all(&state.db)
    .await
    .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok().json(rows))
}
