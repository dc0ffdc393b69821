// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Status enums stored as lowercase text columns.
//!
//! Records keep the raw column string; these enums are used for validation
//! and for state-machine checks in the handlers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $(
                #[allow(missing_docs)]
                $variant,
            )+
        }

        impl $name {
            /// Column representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(CoreError::validation(
                        $field,
                        format!("unknown value '{}'", other),
                    )),
                }
            }
        }
    };
}

text_enum!(
    /// Lifecycle of a class booking.
    BookingStatus, "status" {
        Pending => "pending",
        Confirmed => "confirmed",
        Cancelled => "cancelled",
        Attended => "attended",
        NoShow => "no_show",
    }
);

impl BookingStatus {
    /// Whether a booking in this state occupies seats in its slot.
    pub fn holds_seat(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::Attended)
    }

    /// Statuses that occupy seats, as column values.
    pub const SEAT_HOLDING: [&'static str; 3] = ["pending", "confirmed", "attended"];
}

text_enum!(
    /// Giftcard status. Expiry is derived from `expires_at`, not stored.
    GiftcardStatus, "status" {
        Active => "active",
        Void => "void",
    }
);

text_enum!(
    /// Lifecycle of a balance hold.
    HoldStatus, "status" {
        Active => "active",
        Captured => "captured",
        Released => "released",
        Expired => "expired",
    }
);

text_enum!(
    /// Giftcard ledger entry kind.
    TransactionKind, "kind" {
        Issue => "issue",
        Capture => "capture",
        Redeem => "redeem",
        Refund => "refund",
        Void => "void",
    }
);

text_enum!(
    /// Progress of finished pieces from kiln to customer.
    DeliveryStatus, "status" {
        Firing => "firing",
        Glazing => "glazing",
        Ready => "ready",
        PickedUp => "picked_up",
        Cancelled => "cancelled",
    }
);

impl DeliveryStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PickedUp | Self::Cancelled)
    }

    /// Whether `self -> to` is an allowed transition.
    ///
    /// ```text
    /// firing ──► glazing ──► ready ──► picked_up
    ///    └──────────────────►┘
    /// (any non-terminal) ──► cancelled
    /// ```
    pub fn can_transition_to(&self, to: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        match (self, to) {
            (Firing, Glazing) | (Firing, Ready) | (Glazing, Ready) | (Ready, PickedUp) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_column_text() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Attended,
            BookingStatus::NoShow,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert_eq!("no_show".parse::<BookingStatus>().unwrap(), BookingStatus::NoShow);
    }

    #[test]
    fn test_unknown_value_is_validation_error() {
        let err = "shipped".parse::<DeliveryStatus>().unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("shipped"));
    }

    #[test]
    fn test_seat_holding_statuses() {
        assert!(BookingStatus::Pending.holds_seat());
        assert!(BookingStatus::Confirmed.holds_seat());
        assert!(BookingStatus::Attended.holds_seat());
        assert!(!BookingStatus::Cancelled.holds_seat());
        assert!(!BookingStatus::NoShow.holds_seat());
        for s in BookingStatus::SEAT_HOLDING {
            assert!(s.parse::<BookingStatus>().unwrap().holds_seat());
        }
    }

    #[test]
    fn test_delivery_transitions() {
        use DeliveryStatus::*;
        assert!(Firing.can_transition_to(Glazing));
        assert!(Firing.can_transition_to(Ready));
        assert!(Glazing.can_transition_to(Ready));
        assert!(Ready.can_transition_to(PickedUp));
        assert!(Glazing.can_transition_to(Cancelled));

        assert!(!Ready.can_transition_to(Firing));
        assert!(!Firing.can_transition_to(PickedUp));
        assert!(!PickedUp.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Ready));
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&DeliveryStatus::PickedUp).unwrap();
        assert_eq!(json, "\"picked_up\"");
        let parsed: HoldStatus = serde_json::from_str("\"captured\"").unwrap();
        assert_eq!(parsed, HoldStatus::Captured);
    }
}
