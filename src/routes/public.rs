use actix_files::NamedFile;
use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{basic_validator, AuthUser},
    blobs::avatar_key,
    db::log_activity,
    models::{ShopRow, REQUEST_SAVE},
    routes::{blob_error, store_error},
    shops, slots,
    state::{AppState, ReservationEvent, EVENT_RESERVED},
    store::{self, StoreError},
    users,
};

#[derive(Deserialize)]
struct AvailabilityQuery {
    date: String,
}

#[derive(Deserialize)]
struct ReserveForm {
    date: String,
    time: String,
}

#[derive(Deserialize)]
struct ShopRequestForm {
    name: String,
    services: String,
    latitude: f64,
    longitude: f64,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/shops").route(web::get().to(list_shops)))
        .service(web::resource("/shops/{id}").route(web::get().to(shop_detail)))
        .service(web::resource("/shops/{id}/availability").route(web::get().to(availability)))
        .service(
            web::resource("/shops/{id}/reserve")
                .wrap(HttpAuthentication::basic(basic_validator))
                .route(web::post().to(reserve_slot)),
        )
        .service(web::resource("/blobs/{key:.*}").route(web::get().to(download_blob)))
        .service(
            web::scope("/me")
                .wrap(HttpAuthentication::basic(basic_validator))
                .service(web::resource("").route(web::get().to(me)))
                .service(web::resource("/appointments").route(web::get().to(my_appointments)))
                .service(
                    web::resource("/appointments/{record_key}")
                        .route(web::delete().to(cancel_my_appointment)),
                )
                .service(web::resource("/avatar").route(web::put().to(upload_avatar)))
                .service(web::resource("/shop-requests").route(web::post().to(request_shop))),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn list_shops(state: web::Data<AppState>) -> Result<HttpResponse> {
    let shops = shops::list_all(&state.db).await.map_err(store_error)?;
    Ok(HttpResponse::Ok().json(shops))
}

async fn shop_detail(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let shop_id = path.into_inner();
    let shop = shops::get(&state.db, &shop_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("shop not found"))?;
    Ok(HttpResponse::Ok().json(shop))
}

/// The daily grid for a shop and date, each slot flagged against a freshly
/// loaded reservation index.
async fn availability(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<AvailabilityQuery>,
) -> Result<HttpResponse> {
    let shop_id = path.into_inner();
    let date = parse_date(&query.date)?;

    if shops::get(&state.db, &shop_id)
        .await
        .map_err(store_error)?
        .is_none()
    {
        return Err(actix_web::error::ErrorNotFound("shop not found"));
    }

    let index = store::load_reservation_index(&state.db)
        .await
        .map_err(store_error)?;
    log::debug!("Reservation index rebuilt with {} entries", index.len());

    let grid: Vec<_> = slots::daily_slots()
        .into_iter()
        .map(|time| {
            let slot_key = slots::slot_key(&date, &time);
            let reserved = index.is_reserved(&shop_id, &slot_key);
            json!({ "time": time, "slot_key": slot_key, "reserved": reserved })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "shop_id": shop_id,
        "date": date,
        "slots": grid,
    })))
}

async fn reserve_slot(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<ReserveForm>,
) -> Result<HttpResponse> {
    let shop_id = path.into_inner();
    let form = form.into_inner();
    let date = parse_date(&form.date)?;
    if !slots::daily_slots().contains(&form.time) {
        return Err(actix_web::error::ErrorBadRequest("time is not on the slot grid"));
    }

    let slot_key = slots::slot_key(&date, &form.time);
    let appointment = match store::reserve(&state.db, &shop_id, &slot_key, &auth.email).await {
        Ok(appointment) => appointment,
        Err(StoreError::SlotTaken { record_key }) => {
            return Ok(HttpResponse::Conflict().json(json!({
                "error": "slot already reserved",
                "record_key": record_key,
            })));
        }
        Err(err) => return Err(store_error(err)),
    };

    log_activity(
        &state.db,
        "slot_reserved",
        &format!("{} reserved {} at {}.", auth.email, slot_key, shop_id),
        Some(&auth.email),
        Some(&appointment.record_key),
    )
    .await;

    let _ = state
        .events
        .send(ReservationEvent::from_row(EVENT_RESERVED, appointment.clone()));

    Ok(HttpResponse::Created().json(appointment))
}

async fn me(auth: web::ReqData<AuthUser>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let user = users::get(&state.db, &auth.email)
        .await
        .map_err(store_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("account not found"))?;
    Ok(HttpResponse::Ok().json(user))
}

async fn my_appointments(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let appointments = store::appointments_for_client(&state.db, &auth.email)
        .await
        .map_err(store_error)?;
    Ok(HttpResponse::Ok().json(appointments))
}

/// Client-side cancellation deletes the record outright, freeing the slot.
async fn cancel_my_appointment(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let record_key = path.into_inner();
    let appointment = store::get(&state.db, &record_key)
        .await
        .map_err(store_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("appointment not found"))?;

    if appointment.client_id != auth.email {
        return Err(actix_web::error::ErrorForbidden("not your appointment"));
    }

    store::remove(&state.db, &record_key)
        .await
        .map_err(store_error)?;

    log_activity(
        &state.db,
        "slot_deleted",
        &format!("{} cancelled {}.", auth.email, record_key),
        Some(&auth.email),
        Some(&record_key),
    )
    .await;

    let _ = state
        .events
        .send(ReservationEvent::removed(&record_key, Some(appointment.shop_id)));

    Ok(HttpResponse::NoContent().finish())
}

async fn upload_avatar(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    if body.is_empty() {
        return Err(actix_web::error::ErrorBadRequest("empty avatar payload"));
    }
    let key = avatar_key(&auth.email);
    let url = state.blobs.upload(&key, &body).await.map_err(blob_error)?;
    users::set_avatar_url(&state.db, &auth.email, &url)
        .await
        .map_err(store_error)?;
    Ok(HttpResponse::Ok().json(json!({ "avatar_url": url })))
}

/// Any signed-in user may ask for a shop of their own; an admin decides.
async fn request_shop(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    form: web::Json<ShopRequestForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    if form.name.trim().is_empty() {
        return Err(actix_web::error::ErrorBadRequest("shop name is required"));
    }

    let shop = ShopRow {
        id: ShopRow::derive_id(&form.name, &auth.email),
        name: form.name,
        logo_url: None,
        services: form.services,
        barber: auth.email.clone(),
        latitude: form.latitude,
        longitude: form.longitude,
    };

    let request = shops::file_request(&state.db, REQUEST_SAVE, &shop)
        .await
        .map_err(store_error)?;

    log_activity(
        &state.db,
        "shop_requested",
        &format!("{} requested shop {}.", auth.email, shop.id),
        Some(&auth.email),
        None,
    )
    .await;

    Ok(HttpResponse::Created().json(request))
}

async fn download_blob(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<NamedFile> {
    let key = path.into_inner();
    let file_path = state.blobs.path_for(&key).map_err(blob_error)?;
    Ok(NamedFile::open(file_path)?)
}

fn parse_date(raw: &str) -> Result<String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|_| actix_web::error::ErrorBadRequest("date must be YYYY-MM-DD"))
}
