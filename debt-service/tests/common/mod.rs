//! Common test utilities for debt-service integration tests.

use chrono::{Duration, TimeZone, Utc};
use debt_service::config::{
    AuthConfig, DatabaseConfig, DebtConfig, SettlementConfig,
};
use debt_service::services::Database;
use debt_service::startup::Application;
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use service_core::config::Config as CommonConfig;
use sqlx::PgPool;
use std::sync::Once;
use uuid::Uuid;

static INIT: Once = Once::new();

pub const JWT_SECRET: &str = "debt-service-test-secret";

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,debt_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn test_config() -> DebtConfig {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run integration tests");

    DebtConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "debt-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url,
            max_connections: 5,
            min_connections: 1,
        },
        settlement: SettlementConfig {
            lock_timeout_ms: 5000,
        },
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
            settlement_roles: vec!["admin".to_string(), "accountant".to_string()],
        },
    }
}

/// Test application wrapper.
#[allow(dead_code)]
pub struct TestApp {
    pub address: String,
    pub http_port: u16,
    pub db: Database,
    pub client: reqwest::Client,
}

#[allow(dead_code)]
impl TestApp {
    pub fn pool(&self) -> &PgPool {
        self.db.pool()
    }

    /// Token for a user whose role is carried in the token.
    pub fn token(&self, role: &str) -> String {
        token_for(&Uuid::new_v4().to_string(), Some(role), JWT_SECRET)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(format!("{}{}", self.address, path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn post_payment(
        &self,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> reqwest::Response {
        let mut request = self
            .client
            .post(format!("{}/api/debts/payments", self.address))
            .json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request")
    }
}

/// Spawn the application on a random port. Migrations are applied on build.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

/// Spawn the application after adjusting the test configuration.
pub async fn spawn_app_with(configure: impl FnOnce(&mut DebtConfig)) -> TestApp {
    init_tracing();

    let mut config = test_config();
    configure(&mut config);

    let app = Application::build(config)
        .await
        .expect("Failed to build application");

    let http_port = app.http_port();
    let db = app.db().clone();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", http_port),
        http_port,
        db,
        client: reqwest::Client::new(),
    }
}

/// Sign a token the way the identity service does.
#[allow(dead_code)]
pub fn token_for(user_id: &str, role: Option<&str>, secret: &str) -> String {
    let mut claims = serde_json::json!({
        "userId": user_id,
        "exp": (Utc::now() + Duration::hours(1)).timestamp(),
    });
    if let Some(role) = role {
        claims["role"] = serde_json::Value::String(role.to_string());
    }
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to sign token")
}

#[allow(dead_code)]
pub async fn create_user(pool: &PgPool, role: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, role) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(format!("{}@example.test", id))
        .bind(role)
        .execute(pool)
        .await
        .expect("Failed to create user");
    id
}

#[allow(dead_code)]
pub async fn create_client(pool: &PgPool, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO clients (id, name, phone) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(name)
        .bind("+221 77 000 00 00")
        .execute(pool)
        .await
        .expect("Failed to create client");
    id
}

/// Seeded sale/invoice pair.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub struct SeededInvoice {
    pub invoice_id: Uuid,
    pub sale_id: Uuid,
}

/// Create a credit sale and its invoice. `day` orders invoices: smaller is older.
#[allow(dead_code)]
pub async fn create_invoice(
    pool: &PgPool,
    client_id: Uuid,
    day: u32,
    total: Decimal,
    paid: Decimal,
    status: &str,
) -> SeededInvoice {
    let sale_id = Uuid::new_v4();
    let invoice_id = Uuid::new_v4();
    let date = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap() + Duration::days(day as i64);

    sqlx::query(
        "INSERT INTO sales (id, client_id, total_amount, amount_paid, payment_status, sale_date)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(sale_id)
    .bind(client_id)
    .bind(total)
    .bind(paid)
    .bind(status)
    .bind(date)
    .execute(pool)
    .await
    .expect("Failed to create sale");

    sqlx::query(
        "INSERT INTO invoices (id, sale_id, invoice_date, amount_total, amount_paid, amount_due, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(invoice_id)
    .bind(sale_id)
    .bind(date)
    .bind(total)
    .bind(paid)
    .bind(total - paid)
    .bind(status)
    .execute(pool)
    .await
    .expect("Failed to create invoice");

    SeededInvoice {
        invoice_id,
        sale_id,
    }
}

/// Stored invoice amounts and status.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceState {
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub status: String,
}

#[allow(dead_code)]
pub async fn invoice_state(pool: &PgPool, invoice_id: Uuid) -> InvoiceState {
    let (amount_paid, amount_due, status): (Decimal, Decimal, String) =
        sqlx::query_as("SELECT amount_paid, amount_due, status FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .fetch_one(pool)
            .await
            .expect("Failed to read invoice");
    InvoiceState {
        amount_paid,
        amount_due,
        status,
    }
}

/// Stored sale `amount_paid` and `payment_status`.
#[allow(dead_code)]
pub async fn sale_state(pool: &PgPool, sale_id: Uuid) -> (Decimal, String) {
    sqlx::query_as("SELECT amount_paid, payment_status FROM sales WHERE id = $1")
        .bind(sale_id)
        .fetch_one(pool)
        .await
        .expect("Failed to read sale")
}

/// Sum of `amount_due` over the client's non-terminal invoices.
#[allow(dead_code)]
pub async fn outstanding_total(pool: &PgPool, client_id: Uuid) -> Decimal {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(i.amount_due), 0)
         FROM invoices i JOIN sales s ON s.id = i.sale_id
         WHERE s.client_id = $1
           AND i.status NOT IN ('paid_in_full', 'cancelled', 'returned_fully')",
    )
    .bind(client_id)
    .fetch_one(pool)
    .await
    .expect("Failed to sum outstanding debt")
}
