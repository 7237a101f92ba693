//! Single-message endpoint.

use rocket::{State, get, serde::json::Json};

use crate::archive::Archive;
use crate::error::ApiError;
use crate::models::MessageRecord;
use crate::routes::params::validate_document_id;
use crate::session::Viewer;

/// Retrieve one message by document id.
///
/// Denied and missing messages both answer 404.
#[get("/email/<id>")]
pub async fn get_email(
    id: &str,
    viewer: Viewer,
    archive: &State<Archive>,
) -> Result<Json<MessageRecord>, ApiError> {
    let id = validate_document_id(id)?;

    archive
        .email(viewer.session(), id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Email '{}' not found", id)))
}
