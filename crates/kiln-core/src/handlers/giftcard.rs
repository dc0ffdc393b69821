// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Giftcard handlers: issue, balance holds, redemption and refunds.
//!
//! The spendable amount of a card is its balance minus active, unexpired
//! holds. Holds are placed when a booking is paid by giftcard and captured
//! when the booking is confirmed; a hold that is never captured lapses after
//! the configured TTL and stops reserving balance immediately, whether or
//! not the sweeper has marked it expired yet.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::persistence::{GiftcardRecord, HoldRecord, TransactionRecord};

use super::HandlerState;

/// Characters used in giftcard codes. No `0/O`, `1/I/L`.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

const CODE_PREFIX: &str = "KILN";

const MAX_CODE_ATTEMPTS: usize = 5;

/// Input for [`issue_giftcard`].
#[derive(Debug, Clone, Deserialize)]
pub struct IssueGiftcard {
    /// Amount loaded onto the card.
    pub amount_cents: i64,
    /// Who bought the card.
    pub purchaser_name: String,
    /// Who receives the card.
    #[serde(default)]
    pub recipient_name: Option<String>,
    /// Recipient email.
    #[serde(default)]
    pub recipient_email: Option<String>,
    /// Dedication.
    #[serde(default)]
    pub message: Option<String>,
}

/// Spendable view of a giftcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GiftcardBalance {
    /// Card code.
    pub code: String,
    /// Balance after captures and redemptions.
    pub balance_cents: i64,
    /// Sum of active, unexpired holds.
    pub held_cents: i64,
    /// `balance_cents - held_cents`.
    pub available_cents: i64,
    /// Card status.
    pub status: String,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
}

/// A captured hold and the card it was taken from.
#[derive(Debug, Clone, Serialize)]
pub struct HoldCapture {
    /// The hold, now `captured`.
    pub hold: HoldRecord,
    /// The card after the deduction.
    pub giftcard: GiftcardRecord,
}

/// Generate a random `KILN-XXXX-XXXX` code.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let mut group = || -> String {
        (0..4)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    };
    let first = group();
    let second = group();
    format!("{}-{}-{}", CODE_PREFIX, first, second)
}

/// Codes are matched case-insensitively and without surrounding whitespace.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn require_positive(field: &str, amount_cents: i64) -> Result<()> {
    if amount_cents <= 0 {
        return Err(CoreError::validation(field, "must be greater than zero"));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Issue a new giftcard and write its `issue` ledger entry.
#[instrument(skip(state, input), fields(amount_cents = input.amount_cents))]
pub async fn issue_giftcard(state: &HandlerState, input: IssueGiftcard) -> Result<GiftcardRecord> {
    require_positive("amount_cents", input.amount_cents)?;
    let purchaser_name = input.purchaser_name.trim();
    if purchaser_name.is_empty() {
        return Err(CoreError::validation("purchaser_name", "must not be empty"));
    }
    let recipient_email = non_blank(input.recipient_email);
    if let Some(email) = &recipient_email
        && !email.contains('@')
    {
        return Err(CoreError::validation("recipient_email", "must be an email address"));
    }

    let mut code = generate_code();
    let mut attempts = 1;
    while state.persistence.get_giftcard(&code).await?.is_some() {
        if attempts >= MAX_CODE_ATTEMPTS {
            return Err(CoreError::DatabaseError {
                operation: "issue_giftcard".to_string(),
                details: "could not generate a unique giftcard code".to_string(),
            });
        }
        code = generate_code();
        attempts += 1;
    }

    let now = Utc::now();
    let expires_at = now
        .checked_add_signed(state.giftcard_validity)
        .ok_or_else(|| CoreError::validation("giftcard_validity", "expiry is out of range"))?;
    let giftcard = GiftcardRecord {
        code,
        initial_cents: input.amount_cents,
        balance_cents: input.amount_cents,
        status: "active".to_string(),
        purchaser_name: purchaser_name.to_string(),
        recipient_name: non_blank(input.recipient_name),
        recipient_email,
        message: non_blank(input.message),
        expires_at,
        created_at: now,
    };

    state.persistence.insert_giftcard(&giftcard).await?;

    info!(
        code = %giftcard.code,
        expires_at = %giftcard.expires_at,
        "Giftcard issued"
    );
    Ok(giftcard)
}

async fn require_giftcard(state: &HandlerState, code: &str) -> Result<GiftcardRecord> {
    state
        .persistence
        .get_giftcard(code)
        .await?
        .ok_or_else(|| CoreError::not_found("giftcard", code))
}

/// Current balance, held amount and spendable amount of a card.
pub async fn get_balance(state: &HandlerState, code: &str) -> Result<GiftcardBalance> {
    let code = normalize_code(code);
    let card = require_giftcard(state, &code).await?;
    let held_cents = state.persistence.held_cents(&code, Utc::now()).await?;

    Ok(GiftcardBalance {
        available_cents: card.balance_cents - held_cents,
        held_cents,
        balance_cents: card.balance_cents,
        status: card.status,
        expires_at: card.expires_at,
        code: card.code,
    })
}

/// All holds placed on a card, oldest first.
pub async fn list_holds(state: &HandlerState, code: &str) -> Result<Vec<HoldRecord>> {
    let code = normalize_code(code);
    require_giftcard(state, &code).await?;
    state.persistence.list_holds(&code).await
}

/// The card's ledger, oldest first.
pub async fn list_transactions(state: &HandlerState, code: &str) -> Result<Vec<TransactionRecord>> {
    let code = normalize_code(code);
    require_giftcard(state, &code).await?;
    state.persistence.list_transactions(&code).await
}

/// Reserve `amount_cents` of the card's available balance for `hold_ttl`.
#[instrument(skip(state))]
pub async fn place_hold(
    state: &HandlerState,
    code: &str,
    amount_cents: i64,
    reference: Option<&str>,
) -> Result<HoldRecord> {
    require_positive("amount_cents", amount_cents)?;

    let now = Utc::now();
    let expires_at = now
        .checked_add_signed(state.hold_ttl)
        .ok_or_else(|| CoreError::validation("hold_ttl", "expiry is out of range"))?;
    let hold = HoldRecord {
        hold_id: Uuid::new_v4().to_string(),
        giftcard_code: normalize_code(code),
        amount_cents,
        status: "active".to_string(),
        reference: reference.map(str::to_string),
        expires_at,
        created_at: now,
        resolved_at: None,
    };

    state.persistence.place_hold(&hold, now).await?;

    info!(
        hold_id = %hold.hold_id,
        expires_at = %hold.expires_at,
        "Giftcard hold placed"
    );
    Ok(hold)
}

/// Deduct a held amount from the card.
#[instrument(skip(state))]
pub async fn capture_hold(state: &HandlerState, hold_id: &str) -> Result<HoldCapture> {
    match state.persistence.capture_hold(hold_id, Utc::now()).await {
        Ok((hold, giftcard)) => {
            info!(
                code = %giftcard.code,
                amount_cents = hold.amount_cents,
                balance_cents = giftcard.balance_cents,
                "Giftcard hold captured"
            );
            Ok(HoldCapture { hold, giftcard })
        }
        Err(e @ CoreError::HoldExpired { .. }) => {
            warn!("Capture attempted on expired hold");
            Err(e)
        }
        Err(e) => Err(e),
    }
}

/// Give a held amount back. Idempotent for released or expired holds.
#[instrument(skip(state))]
pub async fn release_hold(state: &HandlerState, hold_id: &str) -> Result<HoldRecord> {
    let hold = state.persistence.release_hold(hold_id, Utc::now()).await?;
    info!(status = %hold.status, "Giftcard hold released");
    Ok(hold)
}

/// Immediate point-of-sale deduction.
#[instrument(skip(state))]
pub async fn redeem(
    state: &HandlerState,
    code: &str,
    amount_cents: i64,
    reference: Option<&str>,
) -> Result<GiftcardRecord> {
    require_positive("amount_cents", amount_cents)?;
    let card = state
        .persistence
        .redeem(&normalize_code(code), amount_cents, reference, Utc::now())
        .await?;

    info!(balance_cents = card.balance_cents, "Giftcard redeemed");
    Ok(card)
}

/// Credit a card, capped at its initial amount.
#[instrument(skip(state))]
pub async fn refund(
    state: &HandlerState,
    code: &str,
    amount_cents: i64,
    reference: Option<&str>,
) -> Result<GiftcardRecord> {
    require_positive("amount_cents", amount_cents)?;
    let card = state
        .persistence
        .refund(&normalize_code(code), amount_cents, reference, Utc::now())
        .await?;

    info!(balance_cents = card.balance_cents, "Giftcard refunded");
    Ok(card)
}

/// Void a card and release its active holds.
#[instrument(skip(state))]
pub async fn void_giftcard(state: &HandlerState, code: &str) -> Result<GiftcardRecord> {
    let card = state
        .persistence
        .void_giftcard(&normalize_code(code), Utc::now())
        .await?;

    info!("Giftcard voided");
    Ok(card)
}

/// Mark up to `limit` lapsed holds as expired.
pub async fn expire_holds(state: &HandlerState, now: DateTime<Utc>, limit: i64) -> Result<u64> {
    state.persistence.expire_holds(now, limit).await
}
