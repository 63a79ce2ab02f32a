use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pesatips::config::Config;
use pesatips::db::{create_pool, init_db, queries, AppState};
use pesatips::entitlements::Ledger;
use pesatips::handlers;
use pesatips::models::{CreateVoucher, Plan};
use pesatips::mpesa::MpesaClient;

#[derive(Parser, Debug)]
#[command(name = "pesatips")]
#[command(about = "M-Pesa gated VIP sports tips backend")]
struct Cli {
    /// Seed the database with dev data (user, session, voucher)
    #[arg(long)]
    seed: bool,
}

/// Seeds a dev user with a session token and a redeemable voucher.
/// Only runs in dev mode and when the database is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let existing: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .expect("Failed to count users");
    if existing > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    let user = queries::create_user(&conn, "dev@pesatips.local").expect("Failed to create dev user");

    // 30-day session
    let (_, token) =
        queries::create_session(&conn, &user.id, 30 * 86400).expect("Failed to create dev session");

    let voucher = queries::create_voucher(
        &conn,
        &CreateVoucher {
            code: "DEV-WEEKLY".to_string(),
            plan: Plan::Weekly,
            email: user.email.clone(),
            expires_at: chrono::Utc::now().timestamp() + 30 * 86400,
        },
    )
    .expect("Failed to create dev voucher");

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED");
    tracing::info!("User: {} (id: {})", user.email, user.id);
    tracing::info!("Session token: {}", token);
    tracing::info!("Voucher: {} ({})", voucher.code, voucher.plan);
    tracing::info!("============================================");
    tracing::info!("SAVE THIS TOKEN - IT WILL NOT BE SHOWN AGAIN");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pesatips=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        ledger: Ledger::new(config.plans),
        plans: config.plans,
        mpesa: Arc::new(MpesaClient::new(config.mpesa.clone())),
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set PESATIPS_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = Router::new()
        .merge(handlers::public_router())
        .merge(handlers::api_router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("PesaTips server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
