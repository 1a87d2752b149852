#[macro_use]
extern crate rocket;

mod api;
mod clock;
mod cors;
mod db;
mod env;
mod error;
mod models;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use std::str::FromStr;

use api::{
    bad_request_api, call_routes, coach_routes, health, internal_error_api, not_found_api,
    slot_routes, student_routes, unprocessable_api,
};
use clock::{SharedClock, system_clock};
use cors::{CorsFairing, preflight};
use env::{database_url, load_environment};
use error::AppError;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use telemetry::{TelemetryFairing, init_tracing, shutdown_telemetry};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("Environment error: {0}")]
    Env(String),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    load_environment().map_err(|e| Error::Env(e.to_string()))?;
    init_tracing()?;

    let database_url = database_url();
    info!(database_url = %database_url, "Connecting to SQLite database");

    let options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(AppError::from)?;
    info!("Migrations completed successfully");

    let result = init_rocket(pool, system_clock()).launch().await;

    shutdown_telemetry();
    result?;

    Ok(())
}

pub fn init_rocket(pool: SqlitePool, clock: SharedClock) -> Rocket<Build> {
    info!("Starting coaching scheduler");

    rocket::build()
        .manage(pool)
        .manage(clock)
        .mount("/api/coaches", coach_routes())
        .mount("/api/students", student_routes())
        .mount("/api/slots", slot_routes())
        .mount("/api/calls", call_routes())
        .mount("/api", routes![health, preflight])
        .register(
            "/api",
            catchers![
                bad_request_api,
                not_found_api,
                unprocessable_api,
                internal_error_api
            ],
        )
        .attach(CorsFairing)
        .attach(TelemetryFairing)
}
