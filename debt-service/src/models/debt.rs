//! Read models for outstanding client debt.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Total outstanding amount for one client.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ClientDebt {
    pub client_id: Uuid,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub total_due: Decimal,
}
