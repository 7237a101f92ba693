pub mod access;
pub mod anonymize;
pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod request_logger;
pub mod routes;
pub mod session;
pub mod store;
pub mod threading;

use crate::access::{AccessGate, ListAccessGate};
use crate::archive::Archive;
use crate::config::{ArchiveConfig, SessionConfig, StoreBackend};
use crate::db::ArchiveDb;
use crate::request_logger::RequestLogger;
use crate::session::SessionCache;
use crate::store::{InMemoryStore, PgRecordStore, RecordStore};
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use std::sync::{Arc, Once};
use tokio_util::sync::CancellationToken;

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Manage the archive, the session cache and the shutdown token.
fn manage_archive(
    rocket: Rocket<Build>,
    store: Arc<dyn RecordStore>,
    session_config: SessionConfig,
    archive_config: ArchiveConfig,
) -> Rocket<Build> {
    let gate: Arc<dyn AccessGate> = Arc::new(ListAccessGate::new(
        archive_config.private_lists.iter().cloned(),
    ));
    let cache = Arc::new(SessionCache::new(Arc::clone(&store), session_config));
    let archive = Archive::new(store, gate, archive_config);

    rocket
        .manage(cache)
        .manage(archive)
        .manage(CancellationToken::new())
}

/// Fairings for the session sweeper and for cancelling in-flight work on shutdown.
fn attach_lifecycle(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(AdHoc::on_liftoff("Spawn Session Sweeper", |rocket| {
            Box::pin(async move {
                match (
                    rocket.state::<Arc<SessionCache>>(),
                    rocket.state::<CancellationToken>(),
                ) {
                    (Some(cache), Some(shutdown)) => {
                        let cache = Arc::clone(cache);
                        let shutdown = shutdown.child_token();
                        tokio::spawn(async move {
                            log::info!("starting session sweeper");
                            cache.run_sweeper(shutdown).await
                        });
                    }
                    _ => log::error!("failed to spawn session sweeper: session cache not found"),
                }
            })
        }))
        .attach(AdHoc::on_shutdown("Cancel Background Work", |rocket| {
            Box::pin(async move {
                if let Some(shutdown) = rocket.state::<CancellationToken>() {
                    shutdown.cancel();
                }
            })
        }))
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let session_config = SessionConfig::from_env();
    let archive_config = ArchiveConfig::from_env();

    // Configure CORS
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    let rocket = rocket::build()
        .attach(RequestLogger::new(session_config.cookie_name.clone()))
        .attach(cors);

    let rocket = match StoreBackend::from_env() {
        StoreBackend::Memory => {
            log::warn!("using the in-memory record store; nothing will be persisted");
            let store: Arc<dyn RecordStore> = Arc::new(InMemoryStore::new());
            manage_archive(rocket, store, session_config, archive_config)
        }
        StoreBackend::Postgres => rocket
            .attach(ArchiveDb::init())
            // Run database migrations on startup
            .attach(AdHoc::try_on_ignite("Run Migrations", |rocket| async move {
                match ArchiveDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        match sqlx::migrate!("./migrations").run(&pool).await {
                            Ok(_) => {
                                log::info!("database migrations successful");
                                Ok(rocket)
                            }
                            Err(e) => {
                                log::error!("database migrations failed: {}", e);
                                Err(rocket)
                            }
                        }
                    }
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            }))
            .attach(AdHoc::try_on_ignite(
                "Manage Record Store",
                move |rocket| async move {
                    match ArchiveDb::fetch(&rocket) {
                        Some(db) => {
                            let store: Arc<dyn RecordStore> =
                                Arc::new(PgRecordStore::new((**db).clone()));
                            Ok(manage_archive(rocket, store, session_config, archive_config))
                        }
                        None => Err(rocket),
                    }
                },
            )),
    };

    attach_lifecycle(rocket).mount("/api/v1", routes::api_routes())
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};

    use crate::config::{ArchiveConfig, SessionConfig};
    use crate::models::MessageRecord;
    use crate::store::{InMemoryStore, RecordStore};

    /// Session settings used by the test suite: one week max age, one hour
    /// refresh, insecure cookies so the local client sends them back.
    pub fn test_session_config() -> SessionConfig {
        SessionConfig {
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            refresh_interval: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(60),
            cookie_name: "archive_session".to_string(),
            cookie_secure: false,
            authoritative_providers: HashSet::from(["corp-sso".to_string()]),
        }
    }

    /// Record on `list_id` with a predictable sender, body and Message-ID.
    pub fn message(id: &str, in_reply_to: Option<&str>, epoch: i64, list_id: &str) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            message_id: format!("<{}@example.org>", id),
            in_reply_to: in_reply_to.map(|parent| format!("<{}@example.org>", parent)),
            subject: if in_reply_to.is_some() {
                "Re: Hello".to_string()
            } else {
                "Hello".to_string()
            },
            from: format!("User {} <user{}@example.org>", id, id),
            body: Some(format!("Reach me at user{}@example.org", id)),
            epoch,
            list_id: list_id.to_string(),
            private: false,
            fingerprint: None,
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        store: InMemoryStore,
        session_config: SessionConfig,
        archive_config: ArchiveConfig,
    }

    impl Default for TestRocketBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                store: InMemoryStore::new(),
                session_config: test_session_config(),
                archive_config: ArchiveConfig::default(),
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        /// Serve records from `store`; the caller keeps a handle for seeding.
        pub fn with_store(mut self, store: InMemoryStore) -> Self {
            self.store = store;
            self
        }

        pub fn with_private_lists(mut self, lists: &[&str]) -> Self {
            self.archive_config.private_lists = lists.iter().map(|list| list.to_string()).collect();
            self
        }

        pub fn with_archive_config(mut self, config: ArchiveConfig) -> Self {
            self.archive_config = config;
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let store: Arc<dyn RecordStore> = Arc::new(self.store);
            let mut rocket = super::manage_archive(
                rocket::custom(self.figment),
                store,
                self.session_config,
                self.archive_config,
            );
            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }
            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
