use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{info, warn};

use sessionforge::auth::AuthMiddleware;
use sessionforge::config::Config;
use sessionforge::mailer::LogMailer;
use sessionforge::routes::{self, health};
use sessionforge::store::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
use sessionforge::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let store: Arc<dyn CredentialStore> = match &config.database_url {
        Some(url) => {
            let store = PgCredentialStore::connect(url)
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            info!("using PostgreSQL credential store");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, credentials are kept in memory only");
            Arc::new(MemoryCredentialStore::new())
        }
    };

    let state = web::Data::new(AppState::new(
        config.session.clone(),
        store,
        Arc::new(LogMailer),
    ));

    info!("Starting sessionforge server at {}", config.server_url());

    let cors_origin = config.cors_origin.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(
                Cors::default()
                    .allowed_origin(&cors_origin)
                    .allow_any_method()
                    .allow_any_header()
                    .supports_credentials()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware)
                    .configure(routes::config),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
