//! Invoice model for debt-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Settlement status shared by invoices and their sales.
///
/// `PaidInFull`, `Cancelled` and `ReturnedFully` are terminal: invoices in
/// those states are never selected for settlement again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    PartialPayment,
    ReturnedPartially,
    PaidInFull,
    Cancelled,
    ReturnedFully,
}

impl InvoiceStatus {
    /// Statuses excluded from settlement and from the debt listing.
    pub const TERMINAL: [InvoiceStatus; 3] = [
        InvoiceStatus::PaidInFull,
        InvoiceStatus::Cancelled,
        InvoiceStatus::ReturnedFully,
    ];

    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::PartialPayment => "partial_payment",
            InvoiceStatus::ReturnedPartially => "returned_partially",
            InvoiceStatus::PaidInFull => "paid_in_full",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::ReturnedFully => "returned_fully",
        }
    }

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// Terminal statuses as database strings, for `<> ALL($n)` filters.
    pub fn terminal_values() -> Vec<&'static str> {
        Self::TERMINAL.iter().map(|s| s.as_str()).collect()
    }

    /// Status of an invoice once a payment has left `amount_due` behind.
    pub fn after_payment(amount_due: Decimal) -> Self {
        if amount_due <= Decimal::ZERO {
            InvoiceStatus::PaidInFull
        } else {
            InvoiceStatus::PartialPayment
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted status string outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown invoice status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for InvoiceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(InvoiceStatus::Unpaid),
            "partial_payment" => Ok(InvoiceStatus::PartialPayment),
            "returned_partially" => Ok(InvoiceStatus::ReturnedPartially),
            "paid_in_full" => Ok(InvoiceStatus::PaidInFull),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            "returned_fully" => Ok(InvoiceStatus::ReturnedFully),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Invoice row as read by the outstanding-invoice loader.
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub invoice_id: Uuid,
    pub sale_id: Uuid,
    pub invoice_date: DateTime<Utc>,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub status: String,
}

/// Unsettled invoice with a validated status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutstandingInvoice {
    pub invoice_id: Uuid,
    pub sale_id: Uuid,
    pub invoice_date: DateTime<Utc>,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub status: InvoiceStatus,
}

impl TryFrom<InvoiceRow> for OutstandingInvoice {
    type Error = UnknownStatus;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status.parse()?,
            invoice_id: row.invoice_id,
            sale_id: row.sale_id,
            invoice_date: row.invoice_date,
            amount_paid: row.amount_paid,
            amount_due: row.amount_due,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_database_string() {
        for status in [
            InvoiceStatus::Unpaid,
            InvoiceStatus::PartialPayment,
            InvoiceStatus::ReturnedPartially,
            InvoiceStatus::PaidInFull,
            InvoiceStatus::Cancelled,
            InvoiceStatus::ReturnedFully,
        ] {
            assert_eq!(status.as_str().parse::<InvoiceStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = "settled_elsewhere".parse::<InvoiceStatus>().unwrap_err();
        assert_eq!(err, UnknownStatus("settled_elsewhere".to_string()));
    }

    #[test]
    fn test_terminal_set() {
        assert!(InvoiceStatus::PaidInFull.is_terminal());
        assert!(InvoiceStatus::Cancelled.is_terminal());
        assert!(InvoiceStatus::ReturnedFully.is_terminal());
        assert!(!InvoiceStatus::Unpaid.is_terminal());
        assert!(!InvoiceStatus::PartialPayment.is_terminal());
        assert!(!InvoiceStatus::ReturnedPartially.is_terminal());
        assert_eq!(
            InvoiceStatus::terminal_values(),
            vec!["paid_in_full", "cancelled", "returned_fully"]
        );
    }

    #[test]
    fn test_status_after_payment() {
        assert_eq!(
            InvoiceStatus::after_payment(Decimal::ZERO),
            InvoiceStatus::PaidInFull
        );
        assert_eq!(
            InvoiceStatus::after_payment(Decimal::new(1, 2)),
            InvoiceStatus::PartialPayment
        );
    }
}
