//! Settlement engine building blocks.
//!
//! The loader and the updater take the connection of an already open
//! transaction; `Database::settle_payment` owns that transaction and runs the
//! three steps against it. Nothing here commits or rolls back.

use crate::models::{Allocation, InvoiceRow, InvoiceStatus, OutstandingInvoice, SettlementPlan};
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Load the client's unsettled invoices, oldest first, and lock them.
///
/// Rows of both `invoices` and their `sales` stay locked until the enclosing
/// transaction ends, so a concurrent settlement for the same client waits
/// here. An empty result means the client has no active debt.
#[instrument(skip(conn), fields(client_id = %client_id))]
pub async fn load_outstanding_invoices(
    conn: &mut PgConnection,
    client_id: Uuid,
) -> Result<Vec<OutstandingInvoice>, AppError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["load_outstanding_invoices"])
        .start_timer();

    let rows = sqlx::query_as::<_, InvoiceRow>(
        r#"
        SELECT i.id AS invoice_id, i.sale_id, i.invoice_date, i.amount_paid, i.amount_due, i.status
        FROM invoices i
        JOIN sales s ON s.id = i.sale_id
        WHERE s.client_id = $1
          AND i.status <> ALL($2)
          AND i.amount_due > 0
        ORDER BY i.invoice_date ASC, i.id ASC
        FOR UPDATE OF i, s
        "#,
    )
    .bind(client_id)
    .bind(InvoiceStatus::terminal_values())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to load outstanding invoices: {}", e))
    })?;

    timer.observe_duration();

    let invoices = into_outstanding(rows)?;

    debug!(invoice_count = invoices.len(), "Outstanding invoices locked");

    Ok(invoices)
}

/// Validate persisted statuses. An unknown value fails the whole operation.
pub(crate) fn into_outstanding(rows: Vec<InvoiceRow>) -> Result<Vec<OutstandingInvoice>, AppError> {
    rows.into_iter()
        .map(|row| {
            let invoice_id = row.invoice_id;
            OutstandingInvoice::try_from(row).map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Invoice {}: {}", invoice_id, e))
            })
        })
        .collect()
}

/// Distribute `amount` over `invoices` in the given order.
///
/// Each invoice receives `min(remaining, amount_due)`; iteration stops once
/// the payment is used up. Invoices past that point are not part of the plan.
/// Whatever is left after the last invoice is returned as `unallocated`.
pub fn allocate(invoices: &[OutstandingInvoice], amount: Decimal) -> SettlementPlan {
    let mut remaining = amount;
    let mut allocations = Vec::new();

    for invoice in invoices {
        if remaining <= Decimal::ZERO {
            break;
        }

        let applied = remaining.min(invoice.amount_due);
        if applied <= Decimal::ZERO {
            continue;
        }

        let amount_due = invoice.amount_due - applied;
        allocations.push(Allocation {
            invoice_id: invoice.invoice_id,
            sale_id: invoice.sale_id,
            amount_applied: applied,
            amount_paid: invoice.amount_paid + applied,
            amount_due,
            status: InvoiceStatus::after_payment(amount_due),
        });

        remaining -= applied;
    }

    SettlementPlan {
        allocations,
        applied_total: amount - remaining,
        unallocated: remaining,
    }
}

/// Persist one allocation on the invoice and mirror it onto its sale.
#[instrument(skip(conn, allocation), fields(invoice_id = %allocation.invoice_id, sale_id = %allocation.sale_id))]
pub async fn apply_allocation(
    conn: &mut PgConnection,
    allocation: &Allocation,
) -> Result<(), AppError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["apply_allocation"])
        .start_timer();

    let updated = sqlx::query(
        r#"
        UPDATE invoices
        SET amount_paid = amount_paid + $1,
            amount_due = amount_due - $1,
            status = $2
        WHERE id = $3
        "#,
    )
    .bind(allocation.amount_applied)
    .bind(allocation.status.as_str())
    .bind(allocation.invoice_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

    if updated.rows_affected() != 1 {
        return Err(AppError::DatabaseError(anyhow::anyhow!(
            "Invoice {} disappeared during settlement",
            allocation.invoice_id
        )));
    }

    let updated = sqlx::query(
        r#"
        UPDATE sales
        SET amount_paid = amount_paid + $1,
            payment_status = $2
        WHERE id = $3
        "#,
    )
    .bind(allocation.amount_applied)
    .bind(allocation.status.as_str())
    .bind(allocation.sale_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update sale: {}", e)))?;

    if updated.rows_affected() != 1 {
        return Err(AppError::DatabaseError(anyhow::anyhow!(
            "Sale {} disappeared during settlement",
            allocation.sale_id
        )));
    }

    timer.observe_duration();

    debug!(
        amount_applied = %allocation.amount_applied,
        amount_due = %allocation.amount_due,
        status = %allocation.status,
        "Allocation applied"
    );

    Ok(())
}
