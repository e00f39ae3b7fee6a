//! Settlement models: the request, the allocation plan and its outcome.

use crate::models::InvoiceStatus;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Validated settlement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementCommand {
    pub client_id: Uuid,
    /// Strictly positive, at most `MONEY_SCALE` decimal places.
    pub amount: Decimal,
}

/// Amount applied to a single invoice, with the invoice state it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub invoice_id: Uuid,
    pub sale_id: Uuid,
    pub amount_applied: Decimal,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub status: InvoiceStatus,
}

/// Result of running the allocation algorithm over a loaded invoice sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SettlementPlan {
    /// Touched invoices only, oldest first.
    pub allocations: Vec<Allocation>,
    pub applied_total: Decimal,
    /// Part of the payment left over once every invoice was settled.
    pub unallocated: Decimal,
}

/// Committed settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementOutcome {
    pub client_id: Uuid,
    pub requested_amount: Decimal,
    pub applied_total: Decimal,
    pub unallocated_amount: Decimal,
    pub allocations: Vec<Allocation>,
}
