// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! REST boundary for the kiosk and the admin dashboard.
//!
//! ## Endpoints
//!
//! - `POST /api/scan` - verify a card (grant/deny preview, no deduction)
//! - `PATCH /api/scan` - settle a scan (deduct credit, record the visit)
//! - `PATCH /api/topup` - add credit to a member
//! - `POST /api/user` - look up a member by card UID
//! - `GET /api/user?name=` - look up a member by name
//! - `GET /api/users` - list members, newest first
//! - `POST /api/users` - register a member
//! - `DELETE /api/users` - delete a member
//! - `POST /api/recent-scans` - enqueue a reader event
//! - `GET /api/recent-scans?since=ts` - destructively drain queued events
//!
//! Business denials on the scan paths (unknown card on verify,
//! insufficient credit) are `200` responses with `success: false`: they
//! are expected kiosk conditions, not transport faults. Input errors are
//! `400`, unknown references elsewhere are `404`.

use crate::base::{CardUid, MemberId};
use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::member::{MemberSnapshot, TopUp};
use crate::scan_queue::{ScanEvent, ScanQueue};
use crate::settlement::{DenialReason, EntryKind, EntryPolicy, SettlementOutcome};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

// === Request/Response DTOs ===

// Request fields are optional so a missing field reports as a 400
// validation error rather than a body-deserialization rejection.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub uid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub uid: Option<String>,
    /// Optional override of the configured entry cost.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    pub card_uid: Option<String>,
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub card_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit: Option<i64>,
}

/// Body for card-keyed lookups and deletes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRequest {
    pub card_uid: Option<String>,
}

/// Member fields exposed over the wire. History fields are omitted on
/// the kiosk summary views.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub id: MemberId,
    pub name: String,
    pub card_uid: CardUid,
    pub credit: u32,
    pub last_scan: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_history: Option<Vec<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topup_history: Option<Vec<TopUp>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl MemberDto {
    fn full(member: MemberSnapshot) -> Self {
        Self {
            id: member.id,
            name: member.name,
            card_uid: member.card_uid,
            credit: member.credit,
            last_scan: member.last_scan,
            scan_history: Some(member.scan_history),
            topup_history: Some(member.topup_history),
            created_at: Some(member.created_at),
        }
    }

    fn summary(member: &MemberSnapshot) -> Self {
        Self {
            id: member.id,
            name: member.name.clone(),
            card_uid: member.card_uid.clone(),
            credit: member.credit,
            last_scan: member.last_scan,
            scan_history: None,
            topup_history: None,
            created_at: None,
        }
    }
}

/// Response body for both scan endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<MemberDto>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deducted_amount: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_credit: Option<u32>,
}

impl ScanResponse {
    fn denied(user: Option<MemberDto>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            user,
            message: message.into(),
            deducted_amount: None,
            previous_credit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpResponse {
    pub success: bool,
    pub message: String,
    pub user: MemberDto,
    pub previous_credit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResponse {
    pub success: bool,
    pub user: MemberDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    pub deleted_user: DeletedMemberDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMemberDto {
    pub id: MemberId,
    pub name: String,
    pub card_uid: CardUid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub success: bool,
    pub scan: ScanEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainResponse {
    pub scans: Vec<ScanEvent>,
}

/// Response body for errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Registration conflict payload; names the member already holding the
/// card or name so the admin form can show who owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterConflictResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_user: Option<ExistingMemberDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingMemberDto {
    pub name: String,
    pub card_uid: CardUid,
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    pub since: Option<String>,
}

// === Application State ===

/// Shared state: the ledger, the scan queue, and the entry policy.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub scans: Arc<ScanQueue>,
    pub policy: EntryPolicy,
}

impl AppState {
    pub fn new(policy: EntryPolicy) -> Self {
        Self {
            ledger: Arc::new(Ledger::new()),
            scans: Arc::new(ScanQueue::new()),
            policy,
        }
    }
}

// === Error Handling ===

/// Wrapper for converting `LedgerError` into HTTP responses.
pub struct AppError(LedgerError);

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::EmptyUid
            | LedgerError::EmptyName
            | LedgerError::InvalidAmount
            | LedgerError::DuplicateCard
            | LedgerError::DuplicateName => StatusCode::BAD_REQUEST,
            LedgerError::MemberNotFound => StatusCode::NOT_FOUND,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// === Scan Handlers ===

/// POST /api/scan - Verify a card without deducting credit.
///
/// The kiosk shows this result while the tap is being settled; both
/// denial cases are 200-level business outcomes.
async fn verify_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, AppError> {
    let uid = request.uid.unwrap_or_default();
    let outcome = state.ledger.verify(&uid, &state.policy)?;

    Ok(Json(match outcome {
        SettlementOutcome::Granted(receipt) => {
            info!(card_uid = %receipt.member.card_uid, credit = receipt.member.credit, "access verified");
            ScanResponse {
                success: true,
                user: Some(MemberDto::full(receipt.member)),
                message: "Access granted".to_string(),
                deducted_amount: None,
                previous_credit: None,
            }
        }
        SettlementOutcome::Denied(DenialReason::NotRegistered) => {
            warn!(uid = uid.trim(), "scan from unregistered card");
            ScanResponse::denied(None, "Card not registered. Please contact admin.")
        }
        SettlementOutcome::Denied(DenialReason::InsufficientCredit { member }) => {
            warn!(name = %member.name, credit = member.credit, "insufficient credit");
            ScanResponse::denied(
                Some(MemberDto::summary(&member)),
                "Insufficient credit. Please top up your account.",
            )
        }
    }))
}

/// PATCH /api/scan - Settle a scan: deduct the entry fee and record the
/// visit.
///
/// Not retry-safe on timeout: the deduction may have been applied even
/// though the response was lost. The kiosk deduplicates taps by
/// `(uid, timestamp)` instead of retrying this call.
async fn settle_scan(
    State(state): State<AppState>,
    Json(request): Json<SettleRequest>,
) -> Result<Response, AppError> {
    let policy = match request.amount {
        None => state.policy,
        Some(amount) if amount > 0 => {
            let cost = u32::try_from(amount).map_err(|_| LedgerError::InvalidAmount)?;
            state.policy.with_cost(cost)
        }
        Some(_) => return Err(LedgerError::InvalidAmount.into()),
    };

    let uid = request.uid.unwrap_or_default();
    let response = match state.ledger.settle_with_policy(&uid, &policy)? {
        SettlementOutcome::Granted(receipt) => {
            let message = match receipt.kind {
                EntryKind::Charged => "Credit deducted successfully",
                EntryKind::FreeReentry => "Repeat entry within the free window, no charge",
            };
            info!(
                name = %receipt.member.name,
                previous = receipt.previous_credit,
                current = receipt.member.credit,
                deducted = receipt.deducted,
                "entry granted"
            );
            (
                StatusCode::OK,
                Json(ScanResponse {
                    success: true,
                    user: Some(MemberDto::full(receipt.member)),
                    message: message.to_string(),
                    deducted_amount: Some(receipt.deducted),
                    previous_credit: Some(receipt.previous_credit),
                }),
            )
        }
        SettlementOutcome::Denied(DenialReason::NotRegistered) => {
            warn!(uid = uid.trim(), "settle for unregistered card");
            (
                StatusCode::NOT_FOUND,
                Json(ScanResponse::denied(
                    None,
                    "Card not registered. Please contact admin.",
                )),
            )
        }
        SettlementOutcome::Denied(DenialReason::InsufficientCredit { member }) => {
            warn!(name = %member.name, credit = member.credit, required = policy.entry_cost, "entry denied");
            let message = format!(
                "Insufficient credit. Need {} credits, but only have {}.",
                policy.entry_cost, member.credit
            );
            (
                StatusCode::OK,
                Json(ScanResponse::denied(Some(MemberDto::summary(&member)), message)),
            )
        }
    };

    Ok(response.into_response())
}

// === Admin Handlers ===

/// PATCH /api/topup - Add credit to a member.
async fn top_up(
    State(state): State<AppState>,
    Json(request): Json<TopUpRequest>,
) -> Result<Json<TopUpResponse>, AppError> {
    let card_uid = request.card_uid.unwrap_or_default();
    let amount = request.amount.ok_or(LedgerError::InvalidAmount)?;
    let receipt = state.ledger.top_up(&card_uid, amount)?;
    info!(
        name = %receipt.member.name,
        amount,
        credit = receipt.member.credit,
        "credit topped up"
    );

    Ok(Json(TopUpResponse {
        success: true,
        message: format!("Successfully added {} credits", amount),
        previous_credit: receipt.previous_credit,
        user: MemberDto::full(receipt.member),
    }))
}

/// POST /api/user - Look up a member by card UID.
async fn lookup_member(
    State(state): State<AppState>,
    Json(request): Json<CardRequest>,
) -> Result<Json<LookupResponse>, AppError> {
    let card_uid = request.card_uid.unwrap_or_default();
    if card_uid.trim().is_empty() {
        return Err(LedgerError::EmptyUid.into());
    }
    let member = state
        .ledger
        .find_by_uid(&card_uid)
        .ok_or(LedgerError::MemberNotFound)?;

    Ok(Json(LookupResponse {
        success: true,
        user: MemberDto::full(member),
    }))
}

/// GET /api/user?name= - Look up a member by display name.
async fn lookup_member_by_name(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Result<Json<LookupResponse>, AppError> {
    let name = query.name.unwrap_or_default();
    if name.trim().is_empty() {
        return Err(LedgerError::EmptyName.into());
    }
    let member = state
        .ledger
        .find_by_name(&name)
        .ok_or(LedgerError::MemberNotFound)?;

    Ok(Json(LookupResponse {
        success: true,
        user: MemberDto::full(member),
    }))
}

/// GET /api/users - List all members, newest registration first.
async fn list_members(State(state): State<AppState>) -> Json<Vec<MemberDto>> {
    Json(state.ledger.members().into_iter().map(MemberDto::full).collect())
}

/// POST /api/users - Register a new member.
async fn register_member(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    let name = request.name.unwrap_or_default();
    let card_uid = request.card_uid.unwrap_or_default();
    match state.ledger.register(&name, &card_uid, request.credit) {
        Ok(member) => {
            info!(name = %member.name, card_uid = %member.card_uid, credit = member.credit, "member registered");
            Ok(Json(LookupResponse {
                success: true,
                user: MemberDto::full(member),
            })
            .into_response())
        }
        Err(err @ (LedgerError::DuplicateCard | LedgerError::DuplicateName)) => {
            let (error, existing) = match err {
                LedgerError::DuplicateCard => (
                    "This card is already registered",
                    state.ledger.find_by_uid(&card_uid),
                ),
                _ => (
                    "This name is already registered",
                    state.ledger.find_by_name(&name),
                ),
            };
            Ok((
                StatusCode::BAD_REQUEST,
                Json(RegisterConflictResponse {
                    error: error.to_string(),
                    existing_user: existing.map(|member| ExistingMemberDto {
                        name: member.name,
                        card_uid: member.card_uid,
                    }),
                }),
            )
                .into_response())
        }
        Err(err) => Err(err.into()),
    }
}

/// DELETE /api/users - Permanently remove a member.
async fn delete_member(
    State(state): State<AppState>,
    Json(request): Json<CardRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    let member = state.ledger.remove(&request.card_uid.unwrap_or_default())?;
    info!(name = %member.name, card_uid = %member.card_uid, "member deleted");

    Ok(Json(DeleteResponse {
        success: true,
        message: "Member deleted successfully".to_string(),
        deleted_user: DeletedMemberDto {
            id: member.id,
            name: member.name,
            card_uid: member.card_uid,
        },
    }))
}

// === Scan Queue Handlers ===

/// POST /api/recent-scans - Enqueue a raw reader event.
async fn enqueue_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<EnqueueResponse>, AppError> {
    let scan = state.scans.push(&request.uid.unwrap_or_default())?;
    info!(uid = %scan.uid, timestamp = scan.timestamp, "scan event queued");

    Ok(Json(EnqueueResponse { success: true, scan }))
}

/// GET /api/recent-scans?since=ts - Destructively drain events newer
/// than the cursor. A missing or unparseable cursor reads as zero.
async fn drain_scans(
    State(state): State<AppState>,
    Query(query): Query<SinceQuery>,
) -> Json<DrainResponse> {
    let since = query
        .since
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(0);

    Json(DrainResponse {
        scans: state.scans.drain_since(since),
    })
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/scan", post(verify_scan).patch(settle_scan))
        .route("/api/topup", patch(top_up))
        .route("/api/user", post(lookup_member).get(lookup_member_by_name))
        .route(
            "/api/users",
            get(list_members).post(register_member).delete(delete_member),
        )
        .route("/api/recent-scans", post(enqueue_scan).get(drain_scans))
        .with_state(state)
}
