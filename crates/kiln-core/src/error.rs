// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for kiln-core.
//!
//! Provides a unified error type with stable machine-readable codes that the
//! HTTP layer maps onto status codes.

use std::fmt;

use chrono::{DateTime, Utc};

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur during request processing.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// A record was not found.
    NotFound {
        /// Kind of record (product, booking, giftcard, hold, employee, time_entry, delivery).
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Not enough seats left in a class slot.
    SlotFull {
        /// Product being booked.
        product_id: String,
        /// Slot start time.
        slot_start: DateTime<Utc>,
        /// Seats still free in the slot.
        remaining: i32,
        /// Seats requested.
        requested: i32,
    },

    /// Giftcard has less available balance than requested.
    InsufficientBalance {
        /// Giftcard code.
        code: String,
        /// Balance minus active holds.
        available_cents: i64,
        /// Amount requested.
        requested_cents: i64,
    },

    /// Giftcard is void or expired.
    GiftcardInactive {
        /// Giftcard code.
        code: String,
        /// Why the card cannot be used.
        reason: String,
    },

    /// Hold passed its expiry before it was captured.
    HoldExpired {
        /// The hold ID.
        hold_id: String,
    },

    /// A record is in the wrong state for the requested operation.
    InvalidState {
        /// Kind of record.
        entity: &'static str,
        /// The record ID.
        id: String,
        /// The expected state(s).
        expected: String,
        /// The actual state.
        actual: String,
    },

    /// Employee already has an open time entry.
    AlreadyClockedIn {
        /// The employee ID.
        employee_id: String,
    },

    /// Employee has no open time entry.
    NotClockedIn {
        /// The employee ID.
        employee_id: String,
    },

    /// Requested technique does not match the product's technique.
    TechniqueMismatch {
        /// The product ID.
        product_id: String,
        /// Technique recorded on the product.
        product_technique: String,
        /// Technique requested for the booking.
        requested: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Shorthand for a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Shorthand for a validation error.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for an invalid-state error.
    pub fn invalid_state(
        entity: &'static str,
        id: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { entity, .. } => match *entity {
                "product" => "PRODUCT_NOT_FOUND",
                "booking" => "BOOKING_NOT_FOUND",
                "giftcard" => "GIFTCARD_NOT_FOUND",
                "hold" => "HOLD_NOT_FOUND",
                "employee" => "EMPLOYEE_NOT_FOUND",
                "time_entry" => "TIME_ENTRY_NOT_FOUND",
                "delivery" => "DELIVERY_NOT_FOUND",
                _ => "NOT_FOUND",
            },
            Self::SlotFull { .. } => "SLOT_FULL",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::GiftcardInactive { .. } => "GIFTCARD_INACTIVE",
            Self::HoldExpired { .. } => "HOLD_EXPIRED",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::AlreadyClockedIn { .. } => "ALREADY_CLOCKED_IN",
            Self::NotClockedIn { .. } => "NOT_CLOCKED_IN",
            Self::TechniqueMismatch { .. } => "TECHNIQUE_MISMATCH",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { entity, id } => {
                write!(f, "{} '{}' not found", capitalize(entity), id)
            }
            Self::SlotFull {
                product_id,
                slot_start,
                remaining,
                requested,
            } => {
                write!(
                    f,
                    "Slot {} for product '{}' has {} seat(s) left, {} requested",
                    slot_start.to_rfc3339(),
                    product_id,
                    remaining,
                    requested
                )
            }
            Self::InsufficientBalance {
                code,
                available_cents,
                requested_cents,
            } => {
                write!(
                    f,
                    "Giftcard '{}' has {} cents available, {} requested",
                    code, available_cents, requested_cents
                )
            }
            Self::GiftcardInactive { code, reason } => {
                write!(f, "Giftcard '{}' cannot be used: {}", code, reason)
            }
            Self::HoldExpired { hold_id } => {
                write!(f, "Hold '{}' has expired", hold_id)
            }
            Self::InvalidState {
                entity,
                id,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "{} '{}' is in invalid state: expected '{}', got '{}'",
                    capitalize(entity),
                    id,
                    expected,
                    actual
                )
            }
            Self::AlreadyClockedIn { employee_id } => {
                write!(f, "Employee '{}' is already clocked in", employee_id)
            }
            Self::NotClockedIn { employee_id } => {
                write!(f, "Employee '{}' is not clocked in", employee_id)
            }
            Self::TechniqueMismatch {
                product_id,
                product_technique,
                requested,
            } => {
                write!(
                    f,
                    "Product '{}' teaches '{}', booking requested '{}'",
                    product_id, product_technique, requested
                )
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

fn capitalize(entity: &str) -> String {
    let label = entity.replace('_', " ");
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CoreError::DatabaseError {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}
