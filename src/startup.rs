use actix_web::{middleware::Logger, web, App, HttpServer};
use actix_web::dev::Server;
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::TokenLifecycle;
use crate::configuration::JwtSettings;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::repository::{
    AuditLog, CredentialStore, PgAuditLog, PgCredentialStore, PgTokenStore, TokenStore,
};
use crate::routes::{current_user, health_check, login, logout, renew};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: TokenLifecycle,
    pub audit: Arc<dyn AuditLog>,
}

impl AppState {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
        audit: Arc<dyn AuditLog>,
        jwt_config: JwtSettings,
    ) -> Self {
        Self {
            lifecycle: TokenLifecycle::new(credentials, tokens, jwt_config),
            audit,
        }
    }

    /// All three stores backed by one Postgres pool
    pub fn postgres(pool: PgPool, jwt_config: JwtSettings) -> Self {
        Self::new(
            Arc::new(PgCredentialStore::new(pool.clone())),
            Arc::new(PgTokenStore::new(pool.clone())),
            Arc::new(PgAuditLog::new(pool)),
            jwt_config,
        )
    }
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let jwt_config = state.lifecycle.jwt_settings().clone();
    let audit = state.audit.clone();
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)

            .app_data(state.clone())

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/login", web::post().to(login))
            .route("/auth/renew", web::post().to(renew))
            .route("/auth/logout", web::post().to(logout))

            // Protected routes (require a valid access token)
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(jwt_config.clone(), audit.clone()))
                    .route("/me", web::get().to(current_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
