//! Domain models for debt-service.

mod debt;
mod invoice;
mod settlement;

pub use debt::ClientDebt;
pub use invoice::{InvoiceRow, InvoiceStatus, OutstandingInvoice, UnknownStatus};
pub use settlement::{Allocation, SettlementCommand, SettlementOutcome, SettlementPlan};

/// Decimal places stored for every monetary column.
pub const MONEY_SCALE: u32 = 2;
