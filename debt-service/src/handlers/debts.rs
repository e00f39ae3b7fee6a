//! Debt listing and payment settlement handlers.

use crate::dtos::{ClientDebtResponse, SettlePaymentRequest, SettlePaymentResponse};
use crate::models::ClientDebt;
use crate::services::metrics::{ERRORS_TOTAL, HTTP_REQUESTS_TOTAL};
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use service_core::error::AppError;
use service_core::middleware::auth::CallerContext;
use tracing::instrument;
use uuid::Uuid;

fn record<T>(operation: &str, result: &Result<T, AppError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(AppError::BadRequest(_)) => "bad_request",
        Err(AppError::NotFound(_)) => "not_found",
        Err(AppError::Unauthorized(_)) => "unauthorized",
        Err(AppError::Forbidden(_)) | Err(AppError::InvalidToken(_)) => "forbidden",
        Err(_) => {
            ERRORS_TOTAL.with_label_values(&[operation]).inc();
            "error"
        }
    };
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// `GET /api/debts`: every client that currently owes something.
#[instrument(skip(state, caller), fields(user_id = %caller.user_id))]
pub async fn list_debts(
    State(state): State<AppState>,
    caller: CallerContext,
) -> Result<Json<Vec<ClientDebt>>, AppError> {
    let result = state.db.list_debts().await;
    record("list_debts", &result);
    Ok(Json(result?))
}

/// `GET /api/debts/:client_id`: one client's outstanding invoices.
#[instrument(skip(state, caller), fields(user_id = %caller.user_id))]
pub async fn get_client_debt(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<ClientDebtResponse>, AppError> {
    let result = state
        .db
        .get_client_debt(client_id)
        .await
        .and_then(|found| {
            found.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))
        });
    record("get_client_debt", &result);
    Ok(Json(ClientDebtResponse::from(result?)))
}

/// `POST /api/debts/payments`: settle a payment against a client's debt.
#[instrument(skip(state, caller, payload), fields(user_id = %caller.user_id, role = %caller.role))]
pub async fn settle_payment(
    State(state): State<AppState>,
    caller: CallerContext,
    payload: Result<Json<SettlePaymentRequest>, JsonRejection>,
) -> Result<Json<SettlePaymentResponse>, AppError> {
    let result = settle(&state, &caller, payload).await;
    record("settle_payment", &result);
    result.map(Json)
}

async fn settle(
    state: &AppState,
    caller: &CallerContext,
    payload: Result<Json<SettlePaymentRequest>, JsonRejection>,
) -> Result<SettlePaymentResponse, AppError> {
    caller.require_role(&state.config.auth.settlement_roles)?;

    let Json(request) = payload.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Invalid request body: {}", e.body_text()))
    })?;
    let command = request.into_command()?;

    let outcome = state.db.settle_payment(&command).await?;

    Ok(SettlePaymentResponse::from(outcome))
}
