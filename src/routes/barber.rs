use actix_web::{web, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{barber_validator, AuthUser},
    blobs::logo_key,
    db::log_activity,
    models::{ShopRow, REQUEST_DELETE, REQUEST_EDIT},
    routes::{blob_error, store_error},
    shops,
    state::{AppState, ReservationEvent, EVENT_CANCELLED},
    store,
};

#[derive(Deserialize)]
struct ShopChangeForm {
    kind: String,
    name: Option<String>,
    services: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/barber")
            .wrap(HttpAuthentication::basic(barber_validator))
            .service(web::resource("/shops").route(web::get().to(my_shops)))
            .service(
                web::resource("/shops/{id}/appointments").route(web::get().to(shop_agenda)),
            )
            .service(web::resource("/shops/{id}/logo").route(web::put().to(upload_logo)))
            .service(
                web::resource("/shops/{id}/requests").route(web::post().to(request_change)),
            )
            .service(
                web::resource("/appointments/{record_key}/reject")
                    .route(web::post().to(reject_appointment)),
            ),
    );
}

async fn my_shops(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    let shops = shops::list_by_barber(&state.db, &auth.email)
        .await
        .map_err(store_error)?;
    Ok(HttpResponse::Ok().json(shops))
}

async fn shop_agenda(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let shop_id = path.into_inner();
    let _shop = owned_shop(&state, &auth, &shop_id).await?;
    let appointments = store::appointments_for_shop(&state.db, &shop_id)
        .await
        .map_err(store_error)?;
    Ok(HttpResponse::Ok().json(appointments))
}

/// Barber-side rejection: status flips to cancelled, the record stays.
async fn reject_appointment(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let record_key = path.into_inner();
    let appointment = store::get(&state.db, &record_key)
        .await
        .map_err(store_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("appointment not found"))?;

    owned_shop(&state, &auth, &appointment.shop_id).await?;

    let cancelled = store::cancel(&state.db, &record_key)
        .await
        .map_err(store_error)?;

    log_activity(
        &state.db,
        "slot_cancelled",
        &format!("{} rejected {}.", auth.email, record_key),
        Some(&auth.email),
        Some(&record_key),
    )
    .await;

    let _ = state
        .events
        .send(ReservationEvent::from_row(EVENT_CANCELLED, cancelled.clone()));

    Ok(HttpResponse::Ok().json(cancelled))
}

async fn upload_logo(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let shop_id = path.into_inner();
    owned_shop(&state, &auth, &shop_id).await?;
    if body.is_empty() {
        return Err(actix_web::error::ErrorBadRequest("empty logo payload"));
    }

    let key = logo_key(&shop_id);
    let url = state.blobs.upload(&key, &body).await.map_err(blob_error)?;
    shops::set_logo_url(&state.db, &shop_id, &url)
        .await
        .map_err(store_error)?;

    Ok(HttpResponse::Ok().json(json!({ "logo_url": url })))
}

/// Barbers do not change shops directly; they file an edit or delete
/// request for an admin to decide.
async fn request_change(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Json<ShopChangeForm>,
) -> Result<HttpResponse> {
    let shop_id = path.into_inner();
    let shop = owned_shop(&state, &auth, &shop_id).await?;
    let form = form.into_inner();

    let kind = match form.kind.as_str() {
        REQUEST_EDIT => REQUEST_EDIT,
        REQUEST_DELETE => REQUEST_DELETE,
        _ => return Err(actix_web::error::ErrorBadRequest("kind must be edit or delete")),
    };

    let payload = ShopRow {
        id: shop.id.clone(),
        name: form.name.unwrap_or(shop.name),
        logo_url: shop.logo_url,
        services: form.services.unwrap_or(shop.services),
        barber: shop.barber,
        latitude: form.latitude.unwrap_or(shop.latitude),
        longitude: form.longitude.unwrap_or(shop.longitude),
    };

    let request = shops::file_request(&state.db, kind, &payload)
        .await
        .map_err(store_error)?;

    log_activity(
        &state.db,
        "shop_change_requested",
        &format!("{} requested {} of {}.", auth.email, kind, shop_id),
        Some(&auth.email),
        None,
    )
    .await;

    Ok(HttpResponse::Created().json(request))
}

async fn owned_shop(
    state: &web::Data<AppState>,
    auth: &AuthUser,
    shop_id: &str,
) -> Result<ShopRow> {
    let shop = shops::get(&state.db, shop_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| actix_web::error::ErrorNotFound("shop not found"))?;
    if shop.barber != auth.email {
        return Err(actix_web::error::ErrorForbidden("not your shop"));
    }
    Ok(shop)
}
