//! Swap lifecycle states

use crate::error::{CoordinatorError, CoordinatorResult};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapState {
    Quoted,
    OrderBuilt,
    Submitted,
    AwaitingFills,
    SecretsReleased,
    Settled,
    Expired,
    Failed,
}

impl SwapState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapState::Quoted => "quoted",
            SwapState::OrderBuilt => "order_built",
            SwapState::Submitted => "submitted",
            SwapState::AwaitingFills => "awaiting_fills",
            SwapState::SecretsReleased => "secrets_released",
            SwapState::Settled => "settled",
            SwapState::Expired => "expired",
            SwapState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SwapState::Settled | SwapState::Expired | SwapState::Failed
        )
    }

    /// States in which the order book may report ready fills
    pub fn is_polling(&self) -> bool {
        matches!(self, SwapState::AwaitingFills | SwapState::SecretsReleased)
    }

    /// The order exists on the book from here on
    pub fn is_submitted(&self) -> bool {
        matches!(
            self,
            SwapState::Submitted
                | SwapState::AwaitingFills
                | SwapState::SecretsReleased
                | SwapState::Settled
        )
    }

    pub fn can_transition_to(&self, next: SwapState) -> bool {
        if self.is_terminal() {
            return false;
        }

        match next {
            SwapState::Failed | SwapState::Expired => true,
            SwapState::OrderBuilt => *self == SwapState::Quoted,
            SwapState::Submitted => *self == SwapState::OrderBuilt,
            SwapState::AwaitingFills => *self == SwapState::Submitted,
            SwapState::SecretsReleased => *self == SwapState::AwaitingFills,
            SwapState::Settled => self.is_polling(),
            SwapState::Quoted => false,
        }
    }

    pub fn check_transition(&self, next: SwapState) -> CoordinatorResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoordinatorError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapState {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quoted" => Ok(SwapState::Quoted),
            "order_built" => Ok(SwapState::OrderBuilt),
            "submitted" => Ok(SwapState::Submitted),
            "awaiting_fills" => Ok(SwapState::AwaitingFills),
            "secrets_released" => Ok(SwapState::SecretsReleased),
            "settled" => Ok(SwapState::Settled),
            "expired" => Ok(SwapState::Expired),
            "failed" => Ok(SwapState::Failed),
            other => Err(CoordinatorError::Internal(format!(
                "Unknown swap state: {}",
                other
            ))),
        }
    }
}
