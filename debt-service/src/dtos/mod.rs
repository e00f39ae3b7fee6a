//! Request and response bodies for the debt API.

use crate::models::{
    Allocation, ClientDebt, OutstandingInvoice, SettlementCommand, SettlementOutcome, MONEY_SCALE,
};
use crate::utils::format_amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

/// 10^12. Amounts at or above this do not fit in a `NUMERIC(14, 2)` column.
const AMOUNT_LIMIT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Body of `POST /api/debts/payments`.
///
/// `amount` accepts a JSON number or a decimal string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettlePaymentRequest {
    pub client_id: Option<Uuid>,
    pub amount: Option<Decimal>,
}

impl SettlePaymentRequest {
    /// Check the preconditions of a settlement. Runs before any transaction.
    pub fn into_command(self) -> Result<SettlementCommand, AppError> {
        let (client_id, amount) = match (self.client_id, self.amount) {
            (Some(client_id), Some(amount)) => (client_id, amount),
            _ => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "A client ID and a valid payment amount are required."
                )))
            }
        };

        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be greater than zero."
            )));
        }

        if amount.normalize().scale() > MONEY_SCALE {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount cannot have more than {} decimal places.",
                MONEY_SCALE
            )));
        }

        if amount >= AMOUNT_LIMIT {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount is too large."
            )));
        }

        Ok(SettlementCommand { client_id, amount })
    }
}

/// Body returned after a committed settlement.
#[derive(Debug, Clone, Serialize)]
pub struct SettlePaymentResponse {
    pub message: String,
    pub client_id: Uuid,
    pub requested_amount: Decimal,
    pub applied_total: Decimal,
    pub unallocated_amount: Decimal,
    pub allocations: Vec<Allocation>,
}

impl From<SettlementOutcome> for SettlePaymentResponse {
    fn from(outcome: SettlementOutcome) -> Self {
        Self {
            message: format!(
                "Payment of {} recorded successfully.",
                format_amount(outcome.requested_amount)
            ),
            client_id: outcome.client_id,
            requested_amount: outcome.requested_amount,
            applied_total: outcome.applied_total,
            unallocated_amount: outcome.unallocated_amount,
            allocations: outcome.allocations,
        }
    }
}

/// One client's debt with the invoices that make it up.
#[derive(Debug, Clone, Serialize)]
pub struct ClientDebtResponse {
    pub client_id: Uuid,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub total_due: Decimal,
    pub invoices: Vec<OutstandingInvoice>,
}

impl From<(ClientDebt, Vec<OutstandingInvoice>)> for ClientDebtResponse {
    fn from((debt, invoices): (ClientDebt, Vec<OutstandingInvoice>)) -> Self {
        Self {
            client_id: debt.client_id,
            client_name: debt.client_name,
            client_phone: debt.client_phone,
            total_due: debt.total_due,
            invoices,
        }
    }
}
