use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;

/// Fairing to log one line per HTTP request with timing
pub struct RequestLogger {
    cookie_name: String,
}

impl RequestLogger {
    /// Logger that reports whether `cookie_name` was presented.
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }
}

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let start_time = request.local_cache(Instant::now);
        let duration = start_time.elapsed();

        // Cookie value is never logged.
        let session = if request.cookies().get(&self.cookie_name).is_some() {
            "session"
        } else {
            "no-session"
        };

        log::info!(
            "{} {} -> {} ({:.2}ms, {})",
            request.method(),
            request.uri(),
            response.status().code,
            duration.as_secs_f64() * 1000.0,
            session
        );
    }
}
