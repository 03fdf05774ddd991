//! Shared scaffolding for the integration tests: a throwaway SQLite database per test, migrated and wired into a
//! ready-to-use [`OrderFlowApi`].

use dispatch_engine::{
    config::EngineConfig,
    db_types::{NewItem, NewStop, PorterId, StopType},
    dispatch_api::{order_objects::CreateOrderRequest, pricing::FlatRatePricing},
    OrderFlowApi,
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path() -> String {
    format!("sqlite://../data/test_dispatch_{}", rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    migrate!("./src/db/sqlite/migrations").run(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

pub async fn create_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("Created Sqlite database {url}");
}

/// A migrated database and an API over it, on a random file that lives for the duration of one test.
pub async fn new_api() -> OrderFlowApi<SqliteDatabase, FlatRatePricing> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
    let config = EngineConfig::default();
    OrderFlowApi::new(db, FlatRatePricing::default(), &config)
}

/// Westminster pickup, Tower Bridge dropoff, one box.
pub fn basic_order_request(customer_id: &str) -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id: customer_id.to_string(),
        stops: vec![
            NewStop::new(1, StopType::Pickup, "1 Parliament Sq, London", 51.5007, -0.1246),
            NewStop::new(2, StopType::Dropoff, "Tower Bridge Rd, London", 51.5055, -0.0754),
        ],
        items: vec![NewItem::new("Packing boxes", 12_000)],
        vehicle: dispatch_engine::db_types::VehicleType::Van,
        porters_requested: 2,
        scheduled_at: None,
        instructions: None,
    }
}

pub fn porters(n: usize) -> Vec<PorterId> {
    (1..=n).map(|i| PorterId::from(format!("porter-{i}"))).collect()
}
