//! Swap record, lifecycle states and fill observations

pub(crate) mod record;
mod state;

pub use record::{Swap, SwapView};
pub use state::SwapState;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named speed/cost profile offered by the quoter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Fast,
    Medium,
    Slow,
    Custom,
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Preset::Fast => "fast",
            Preset::Medium => "medium",
            Preset::Slow => "slow",
            Preset::Custom => "custom",
        };
        f.write_str(name)
    }
}

impl FromStr for Preset {
    type Err = crate::error::CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Preset::Fast),
            "medium" => Ok(Preset::Medium),
            "slow" => Ok(Preset::Slow),
            "custom" => Ok(Preset::Custom),
            other => Err(crate::error::CoordinatorError::Config(format!(
                "Unknown preset: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainSide {
    Source,
    Destination,
}

/// Escrow state of one fill on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillStatus {
    pub fill_index: u32,
    pub chain_side: ChainSide,
    pub escrow_deployed: bool,
    pub ready_for_secret: bool,
}

/// Distinct fill indices ready for secret release, ascending
pub fn ready_indices(fills: &[FillStatus]) -> Vec<u32> {
    let mut indices: Vec<u32> = fills
        .iter()
        .filter(|f| f.ready_for_secret)
        .map(|f| f.fill_index)
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}
