use std::sync::Arc;

use chrono::Utc;
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{FromRequest, Outcome};
use rocket::Request;
use time::Duration as TimeDuration;

use super::{Session, SessionCache, token};
use crate::config::SessionConfig;

/// The session of the viewer issuing a request.
///
/// Resolved from the session cookie through [`SessionCache`]. A well-formed
/// token the cache does not know stands for an anonymous viewer and is kept
/// as is. A missing or malformed cookie starts a new anonymous session and
/// sets its cookie on the response. Anonymous sessions never enter the
/// cache, and resolving a viewer never fails because of the cookie.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub session: Session,
    /// Whether the request presented a cookie that resolved to a session.
    pub resumed: bool,
}

impl Viewer {
    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// Session cookie carrying `token`.
pub fn session_cookie(config: &SessionConfig, token: &str) -> Cookie<'static> {
    let max_age = i64::try_from(config.max_age.as_secs()).unwrap_or(i64::MAX);
    Cookie::build((config.cookie_name.clone(), token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .max_age(TimeDuration::seconds(max_age))
        .build()
}

/// Instruct the client to drop its session cookie.
pub fn clear_session_cookie(cookies: &CookieJar<'_>, config: &SessionConfig) {
    let cookie = Cookie::build((config.cookie_name.clone(), String::new()))
        .path("/")
        .removal()
        .build();
    cookies.add(cookie);
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Viewer {
    type Error = &'static str;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let cache = match request.guard::<&State<Arc<SessionCache>>>().await {
            Outcome::Success(cache) => cache,
            _ => {
                log::error!("session cache missing from managed state");
                return Outcome::Error((Status::InternalServerError, "session cache unavailable"));
            }
        };
        let config = cache.config();

        let presented = request
            .cookies()
            .get(&config.cookie_name)
            .map(|cookie| cookie.value().to_string());

        if let Some(token) = presented {
            if let Some(session) = cache.get(&token).await {
                return Outcome::Success(Viewer {
                    session,
                    resumed: true,
                });
            }
            if token::is_well_formed(&token) {
                return Outcome::Success(Viewer {
                    session: Session::anonymous(token, Utc::now()),
                    resumed: false,
                });
            }
        }

        let session = match cache.create(None, None).await {
            Ok(session) => session,
            Err(err) => {
                log::warn!("failed to start anonymous session: {}", err);
                Session::anonymous(token::generate_token(), Utc::now())
            }
        };
        request.cookies().add(session_cookie(config, session.token()));

        Outcome::Success(Viewer {
            session,
            resumed: false,
        })
    }
}
