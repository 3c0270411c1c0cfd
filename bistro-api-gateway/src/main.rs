use std::sync::Arc;

use bistro_api_gateway::{app, AppState, Config, Stores};
use bistro_common::{establish_migration_connection, establish_pool};
use bistro_notification_service::LogOnlySender;
use chrono::Utc;
use clap::{Parser, Subcommand};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve,
    /// Apply pending database migrations
    Migrate,
    /// Send pickup reminders for orders left at the counter
    SweepReminders,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Migrate => migrate(config).await,
        Commands::SweepReminders => sweep_reminders(config).await,
    }
}

fn build_state(config: &Config) -> Result<AppState, BoxError> {
    let pool = establish_pool(&config.database_url, config.database_pool_size)?;
    Ok(AppState::new(
        config,
        Stores::postgres(pool),
        Arc::new(LogOnlySender),
    ))
}

async fn serve(config: Config) -> Result<(), BoxError> {
    let state = build_state(&config)?;
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("API listening on {}", listener.local_addr()?);

    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn migrate(config: Config) -> Result<(), BoxError> {
    let sets: [(&str, EmbeddedMigrations); 4] = [
        ("notification", bistro_notification_service::MIGRATIONS),
        ("auth", bistro_auth_service::MIGRATIONS),
        ("restaurant", bistro_restaurant_service::MIGRATIONS),
        ("order", bistro_order_service::MIGRATIONS),
    ];
    let database_url = config.database_url.clone();
    tokio::task::spawn_blocking(move || -> Result<(), BoxError> {
        let mut conn = establish_migration_connection(&database_url)?;
        for (name, migrations) in sets {
            let applied = conn.run_pending_migrations(migrations)?;
            info!(set = name, applied = applied.len(), "migrations applied");
        }
        Ok(())
    })
    .await??;
    Ok(())
}

async fn sweep_reminders(config: Config) -> Result<(), BoxError> {
    let state = build_state(&config)?;
    state
        .orders
        .run_pickup_reminders(Utc::now(), state.reminders)
        .await?;
    Ok(())
}
