// SPDX-License-Identifier: GPL-3.0-only

//! A/B slot identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata slot number. Only slots 0 and 1 exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Slot(u32);

impl Slot {
    pub const ZERO: Slot = Slot(0);
    pub const ONE: Slot = Slot(1);

    pub fn new(number: u32) -> Option<Self> {
        match number {
            0 | 1 => Some(Self(number)),
            _ => None,
        }
    }

    /// Parse the `--slot` spelling: exactly `0` or `1`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "0" => Some(Self::ZERO),
            "1" => Some(Self::ONE),
            _ => None,
        }
    }

    pub fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Partition name suffix selecting the A or B copy.
///
/// `None` is used on devices without A/B partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SlotSuffix {
    #[default]
    None,
    A,
    B,
}

impl SlotSuffix {
    /// Accepts `_a`, `a`, `0`, `_b`, `b` and `1`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "_a" | "a" | "0" => Some(Self::A),
            "_b" | "b" | "1" => Some(Self::B),
            _ => None,
        }
    }

    /// Parse a system default, where an empty value means "no A/B".
    pub fn parse_default(value: &str) -> Option<Self> {
        if value.trim().is_empty() {
            return Some(Self::None);
        }
        Self::parse(value.trim())
    }

    pub fn for_slot(slot: Slot) -> Self {
        match slot.number() {
            1 => Self::B,
            _ => Self::A,
        }
    }

    /// The slot this suffix selects. Devices without A/B use slot 0.
    pub fn slot(self) -> Slot {
        match self {
            Self::B => Slot::ONE,
            Self::None | Self::A => Slot::ZERO,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::A => "_a",
            Self::B => "_b",
        }
    }

    /// Append this suffix to a partition base name.
    pub fn apply(self, base: &str) -> String {
        format!("{base}{}", self.as_str())
    }
}

impl fmt::Display for SlotSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
