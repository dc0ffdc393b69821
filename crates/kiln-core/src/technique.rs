// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Class techniques and product kinds.
//!
//! Older bookings were stored without a technique; the product name is the
//! only place it can be recovered from, so [`Technique::from_product_name`]
//! matches well-known keywords (English and Spanish) against the name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Pottery technique taught in a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    /// Throwing on the potter's wheel.
    Wheel,
    /// Pinch, coil and slab work.
    Handbuilding,
    /// Painting and glazing bisque pieces.
    Painting,
    /// Class covering more than one technique.
    Mixed,
}

const WHEEL_KEYWORDS: &[&str] = &["torno", "wheel", "throwing"];
const HANDBUILDING_KEYWORDS: &[&str] = &["modelado", "hand", "pinch", "coil"];
const PAINTING_KEYWORDS: &[&str] = &["pintura", "paint", "glaze", "esmalt"];

impl Technique {
    /// Column representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wheel => "wheel",
            Self::Handbuilding => "handbuilding",
            Self::Painting => "painting",
            Self::Mixed => "mixed",
        }
    }

    /// Derive a technique from a product name.
    ///
    /// Returns `Mixed` when keywords of more than one technique match and
    /// `None` when nothing matches.
    pub fn from_product_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        let hit = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

        let matches: Vec<Technique> = [
            (Technique::Wheel, hit(WHEEL_KEYWORDS)),
            (Technique::Handbuilding, hit(HANDBUILDING_KEYWORDS)),
            (Technique::Painting, hit(PAINTING_KEYWORDS)),
        ]
        .into_iter()
        .filter_map(|(t, matched)| matched.then_some(t))
        .collect();

        match matches.as_slice() {
            [] => None,
            [single] => Some(*single),
            _ => Some(Technique::Mixed),
        }
    }

    /// Whether a booking requesting `requested` fits a product teaching `self`.
    pub fn accepts(&self, requested: Technique) -> bool {
        *self == Technique::Mixed || *self == requested
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Technique {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wheel" => Ok(Self::Wheel),
            "handbuilding" => Ok(Self::Handbuilding),
            "painting" => Ok(Self::Painting),
            "mixed" => Ok(Self::Mixed),
            other => Err(CoreError::validation(
                "technique",
                format!("unknown technique '{}'", other),
            )),
        }
    }
}

/// What a product sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    /// Recurring class with fixed seats.
    Class,
    /// One-off workshop.
    Workshop,
    /// Open studio time.
    OpenStudio,
    /// Physical goods; not bookable.
    Merchandise,
}

impl ProductKind {
    /// Column representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Workshop => "workshop",
            Self::OpenStudio => "open_studio",
            Self::Merchandise => "merchandise",
        }
    }

    /// Whether customers can book seats for this kind.
    pub fn is_bookable(&self) -> bool {
        !matches!(self, Self::Merchandise)
    }
}

impl FromStr for ProductKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "class" => Ok(Self::Class),
            "workshop" => Ok(Self::Workshop),
            "open_studio" => Ok(Self::OpenStudio),
            "merchandise" => Ok(Self::Merchandise),
            other => Err(CoreError::validation(
                "kind",
                format!("unknown product kind '{}'", other),
            )),
        }
    }
}
