//! Viewer session endpoints.

use std::sync::Arc;

use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::Preferences;
use crate::session::guard::clear_session_cookie;
use crate::session::{SessionCache, Viewer};

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Login state of the current viewer.
#[get("/preferences")]
pub fn get_preferences(viewer: Viewer) -> Json<Preferences> {
    let login = viewer
        .session()
        .credentials()
        .map(|credentials| credentials.login_view());
    Json(Preferences { login })
}

/// End the current session in memory and in the store.
#[post("/session/logout")]
pub async fn logout(
    viewer: Viewer,
    cache: &State<Arc<SessionCache>>,
    cookies: &CookieJar<'_>,
) -> Result<Json<MessageResponse>, ApiError> {
    cache.logout(viewer.session().token()).await?;
    clear_session_cookie(cookies, cache.config());

    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}
