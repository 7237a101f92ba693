//! Thread view around one message.

use rocket::{State, get, serde::json::Json};
use tokio_util::sync::CancellationToken;

use crate::archive::Archive;
use crate::error::ApiError;
use crate::models::ThreadDetail;
use crate::routes::params::validate_document_id;
use crate::session::Viewer;
use crate::threading::CollectMode;

/// Resolve the thread containing message `id`.
///
/// Walks up to the thread root and collects every visible reply below it.
/// With `short=true` the reply tree carries summaries instead of full records.
#[get("/thread/<id>?<short>")]
pub async fn get_thread(
    id: &str,
    short: Option<bool>,
    viewer: Viewer,
    archive: &State<Archive>,
    shutdown: &State<CancellationToken>,
) -> Result<Json<ThreadDetail>, ApiError> {
    let id = validate_document_id(id)?;
    let mode = if short.unwrap_or(false) {
        CollectMode::Short
    } else {
        CollectMode::Full
    };

    let cancel = shutdown.child_token();
    let detail = archive.thread(viewer.session(), id, mode, &cancel).await?;

    detail
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Thread for email '{}' not found", id)))
}
