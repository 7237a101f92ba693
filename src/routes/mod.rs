//! HTTP route handlers grouped by resource.
//!
//! Handlers stay thin: they validate parameters, resolve the viewer through
//! the [`Viewer`](crate::session::Viewer) guard and delegate to
//! [`Archive`](crate::archive::Archive).

pub mod emails;
pub mod health;
pub mod params;
pub mod session;
pub mod stats;
pub mod threads;

/// Every API route, mounted under `/api/v1`.
pub fn api_routes() -> Vec<rocket::Route> {
    rocket::routes![
        health::health_check,
        emails::get_email,
        threads::get_thread,
        stats::get_stats,
        session::get_preferences,
        session::logout,
    ]
}
