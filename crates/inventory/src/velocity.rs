//! ABC velocity classification and storage placement strategy.

use serde::{Deserialize, Serialize};

/// Picks per week above which an item is class A.
pub const VELOCITY_A_THRESHOLD: u32 = 50;
/// Picks per week at or above which an item is class B.
pub const VELOCITY_B_THRESHOLD: u32 = 10;

/// Pick-frequency class: A (fast movers) to C (slow movers).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VelocityClass {
    A,
    B,
    C,
}

impl VelocityClass {
    pub fn from_pick_frequency(picks_per_week: u32) -> Self {
        if picks_per_week > VELOCITY_A_THRESHOLD {
            VelocityClass::A
        } else if picks_per_week >= VELOCITY_B_THRESHOLD {
            VelocityClass::B
        } else {
            VelocityClass::C
        }
    }
}

impl core::fmt::Display for VelocityClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            VelocityClass::A => "A",
            VelocityClass::B => "B",
            VelocityClass::C => "C",
        };
        f.write_str(s)
    }
}

/// How putaway chooses bins for this item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageStrategy {
    /// Any free bin.
    Chaotic,
    /// System-assigned bins.
    Directed,
    /// Bins chosen by pick velocity (A items near pack-out).
    Velocity,
}

impl core::str::FromStr for StorageStrategy {
    type Err = stockflow_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chaotic" => Ok(StorageStrategy::Chaotic),
            "directed" => Ok(StorageStrategy::Directed),
            "velocity" => Ok(StorageStrategy::Velocity),
            other => Err(stockflow_core::DomainError::validation(format!(
                "unknown storage strategy '{other}'"
            ))),
        }
    }
}
