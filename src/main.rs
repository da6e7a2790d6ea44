mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use config::Config;
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::LevelFilter;

use crate::db::db::DBClient;
use routes::create_router;
use service::{
    balance_service::BalanceService,
    background_jobs::{start_auto_confirmation_job, start_confirmation_reminder_job},
    contract_service::ContractService,
    escrow_service::EscrowService,
    notification_service::NotificationService,
    payment_gateway::PaymentGatewayService,
};

#[derive(Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<DBClient>,
    pub gateway: Arc<PaymentGatewayService>,
    pub escrow_service: Arc<EscrowService>,
    pub contract_service: Arc<ContractService>,
    pub balance_service: Arc<BalanceService>,
    pub notification_service: Arc<NotificationService>,
}

impl AppState {
    pub fn new(db_client: DBClient, config: Config) -> Self {
        let db_client_arc = Arc::new(db_client);

        let gateway = Arc::new(PaymentGatewayService::new(&config));
        let notification_service = Arc::new(NotificationService::new(db_client_arc.clone()));
        let escrow_service = Arc::new(EscrowService::new(db_client_arc.clone(), gateway.clone()));
        let balance_service = Arc::new(BalanceService::new(db_client_arc.clone()));
        let contract_service = Arc::new(ContractService::new(
            db_client_arc.clone(),
            escrow_service.clone(),
            gateway.clone(),
            notification_service.clone(),
        ));

        Self {
            env: config,
            db_client: db_client_arc,
            gateway,
            escrow_service,
            contract_service,
            balance_service,
            notification_service,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    dotenv().ok();

    let config = Config::init();

    let pool = match PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Connected to database");
            pool
        }
        Err(e) => {
            tracing::error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;
    let app_state = Arc::new(AppState::new(DBClient::new(pool), config));

    tokio::spawn(start_confirmation_reminder_job(app_state.clone()));
    tokio::spawn(start_auto_confirmation_job(app_state.clone()));

    let app = create_router(app_state);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to port {}: {}", port, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on port {}", port);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
