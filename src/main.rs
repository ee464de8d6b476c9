use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing_subscriber::EnvFilter;

use crate::{
    memory::MemoryRepository,
    mongo::MongoRepository,
    settings::{Backend, Settings},
    store::Repository,
};

mod balance;
mod error;
mod exchange;
mod identity;
mod memory;
mod mongo;
mod report;
mod routes;
mod schemas;
mod settings;
mod split;
mod store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = Settings::new()
        .map_err(|err| std::io::Error::other(format!("invalid configuration: {err}")))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let repo: Arc<dyn Repository> = match settings.database.backend {
        Backend::Memory => {
            tracing::warn!("Using the in-memory store, data is lost on shutdown");
            Arc::new(MemoryRepository::new())
        }
        Backend::Mongodb => {
            tracing::info!("Using the following URI: {}", settings.database.uri);
            match MongoRepository::connect(
                &settings.database.uri,
                &settings.database.name,
                settings.timeouts.timeouts(),
            )
            .await
            {
                Ok(repo) => Arc::new(repo),
                Err(err) => {
                    tracing::error!("failed to connect to MongoDB: {err}");
                    return Err(std::io::Error::other(err));
                }
            }
        }
    };
    let repo = web::Data::from(repo);

    let bind = (settings.server.bind.clone(), settings.server.port);
    tracing::info!("Server listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .app_data(repo.clone())
            .configure(routes::configure)
    })
    .bind(bind)?
    .run()
    .await
}
