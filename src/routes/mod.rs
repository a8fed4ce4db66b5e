pub mod admin;
pub mod barber;
pub mod events;
pub mod public;

use crate::blobs::BlobError;
use crate::store::StoreError;

pub(crate) fn store_error(err: StoreError) -> actix_web::Error {
    match err {
        StoreError::SlotTaken { .. } => actix_web::error::ErrorConflict(err),
        StoreError::NotFound => actix_web::error::ErrorNotFound(err),
        StoreError::Database(_) => {
            log::error!("Store failure: {err}");
            actix_web::error::ErrorInternalServerError(err)
        }
    }
}

pub(crate) fn blob_error(err: BlobError) -> actix_web::Error {
    match err {
        BlobError::InvalidKey(_) => actix_web::error::ErrorBadRequest(err),
        BlobError::NotFound => actix_web::error::ErrorNotFound(err),
        BlobError::Io(_) => {
            log::error!("Blob failure: {err}");
            actix_web::error::ErrorInternalServerError(err)
        }
    }
}
