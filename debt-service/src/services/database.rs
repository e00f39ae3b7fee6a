//! Database service for debt-service.

use crate::models::{
    ClientDebt, InvoiceRow, InvoiceStatus, OutstandingInvoice, SettlementCommand,
    SettlementOutcome,
};
use crate::services::metrics::{
    DB_QUERY_DURATION, ERRORS_TOTAL, INVOICES_SETTLED_TOTAL, SETTLED_AMOUNT_TOTAL,
    SETTLEMENTS_TOTAL, UNALLOCATED_AMOUNT_TOTAL,
};
use crate::services::settlement::{
    allocate, apply_allocation, into_outstanding, load_outstanding_invoices,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::middleware::auth::RoleStore;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Default bound on waiting for invoice row locks.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    lock_timeout: Duration,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "debt-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set how long a settlement may wait for row locks before failing.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Debt Queries
    // -------------------------------------------------------------------------

    /// List clients with outstanding debt, largest debt first.
    #[instrument(skip(self))]
    pub async fn list_debts(&self) -> Result<Vec<ClientDebt>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_debts"])
            .start_timer();

        let debts = sqlx::query_as::<_, ClientDebt>(
            r#"
            SELECT
                c.id AS client_id,
                c.name AS client_name,
                c.phone AS client_phone,
                COALESCE(SUM(i.amount_due), 0) AS total_due
            FROM clients c
            JOIN sales s ON s.client_id = c.id
            JOIN invoices i ON i.sale_id = s.id AND i.status <> ALL($1)
            GROUP BY c.id, c.name, c.phone
            HAVING COALESCE(SUM(i.amount_due), 0) > 0
            ORDER BY total_due DESC, c.name ASC
            "#,
        )
        .bind(InvoiceStatus::terminal_values())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list debts: {}", e)))?;

        timer.observe_duration();

        Ok(debts)
    }

    /// Get one client's debt with its unsettled invoices, oldest first.
    /// Read-only: takes no locks.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn get_client_debt(
        &self,
        client_id: Uuid,
    ) -> Result<Option<(ClientDebt, Vec<OutstandingInvoice>)>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client_debt"])
            .start_timer();

        let client: Option<(Uuid, String, Option<String>)> =
            sqlx::query_as("SELECT id, name, phone FROM clients WHERE id = $1")
                .bind(client_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to get client: {}", e))
                })?;

        let (client_id, client_name, client_phone) = match client {
            Some(c) => c,
            None => return Ok(None),
        };

        let rows = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT i.id AS invoice_id, i.sale_id, i.invoice_date, i.amount_paid, i.amount_due, i.status
            FROM invoices i
            JOIN sales s ON s.id = i.sale_id
            WHERE s.client_id = $1
              AND i.status <> ALL($2)
              AND i.amount_due > 0
            ORDER BY i.invoice_date ASC, i.id ASC
            "#,
        )
        .bind(client_id)
        .bind(InvoiceStatus::terminal_values())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoices: {}", e)))?;

        let invoices = into_outstanding(rows)?;

        timer.observe_duration();

        let total_due = invoices.iter().map(|i| i.amount_due).sum::<Decimal>();

        Ok(Some((
            ClientDebt {
                client_id,
                client_name,
                client_phone,
                total_due,
            },
            invoices,
        )))
    }

    // -------------------------------------------------------------------------
    // Settlement
    // -------------------------------------------------------------------------

    /// Settle a payment against the client's invoices, oldest first.
    ///
    /// Loading, allocation and every invoice/sale update happen in one
    /// transaction. Any failure drops the transaction, which rolls it back
    /// and releases the row locks. Resubmitting the same command settles it
    /// again: there is no deduplication key.
    #[instrument(skip(self), fields(client_id = %command.client_id, amount = %command.amount))]
    pub async fn settle_payment(
        &self,
        command: &SettlementCommand,
    ) -> Result<SettlementOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["settle_payment"])
            .start_timer();

        let result = self.settle_in_transaction(command).await;

        timer.observe_duration();

        match &result {
            Ok(outcome) => {
                SETTLEMENTS_TOTAL.with_label_values(&["settled"]).inc();
                SETTLED_AMOUNT_TOTAL.inc_by(outcome.applied_total.to_f64().unwrap_or(0.0));
                UNALLOCATED_AMOUNT_TOTAL
                    .inc_by(outcome.unallocated_amount.to_f64().unwrap_or(0.0));
                for allocation in &outcome.allocations {
                    INVOICES_SETTLED_TOTAL
                        .with_label_values(&[allocation.status.as_str()])
                        .inc();
                }
            }
            Err(AppError::NotFound(_)) => {
                SETTLEMENTS_TOTAL.with_label_values(&["no_debt"]).inc();
            }
            Err(_) => {
                SETTLEMENTS_TOTAL.with_label_values(&["error"]).inc();
                ERRORS_TOTAL.with_label_values(&["settlement"]).inc();
            }
        }

        result
    }

    async fn settle_in_transaction(
        &self,
        command: &SettlementCommand,
    ) -> Result<SettlementOutcome, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to set lock timeout: {}", e))
            })?;

        let invoices = load_outstanding_invoices(&mut *tx, command.client_id).await?;

        if invoices.is_empty() {
            tx.rollback().await.ok();
            return Err(AppError::NotFound(anyhow::anyhow!(
                "This client has no active debt."
            )));
        }

        let plan = allocate(&invoices, command.amount);

        for allocation in &plan.allocations {
            apply_allocation(&mut *tx, allocation).await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit settlement: {}", e))
        })?;

        if plan.unallocated > Decimal::ZERO {
            warn!(
                unallocated = %plan.unallocated,
                "Payment exceeds outstanding debt, remainder not allocated"
            );
        }

        info!(
            applied_total = %plan.applied_total,
            invoice_count = plan.allocations.len(),
            "Payment settled"
        );

        Ok(SettlementOutcome {
            client_id: command.client_id,
            requested_amount: command.amount,
            applied_total: plan.applied_total,
            unallocated_amount: plan.unallocated,
            allocations: plan.allocations,
        })
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    /// Get the stored role of a user.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user_role(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user_role"])
            .start_timer();

        let role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to get user role: {}", e))
            })?;

        timer.observe_duration();

        Ok(role)
    }
}

#[async_trait::async_trait]
impl RoleStore for Database {
    async fn role_for_user(&self, user_id: &str) -> Result<Option<String>, AppError> {
        match Uuid::parse_str(user_id) {
            Ok(id) => self.get_user_role(id).await,
            Err(_) => Ok(None),
        }
    }
}
