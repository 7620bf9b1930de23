//! Error types for the world boundary.
//!
//! Every collaborator call made on behalf of an agent returns [`WorldError`].
//! The action executor never lets one escape: it maps each variant onto a
//! [`FailureReason`](civitas_types::FailureReason) via
//! [`WorldError::failure_reason`].

use civitas_types::FailureReason;

/// Errors reported by a world connection or connector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The connection could not be established.
    #[error("connect failed for {username}: {reason}")]
    ConnectFailed {
        /// The username that tried to log in.
        username: String,
        /// Server-provided reason.
        reason: String,
    },

    /// The connection is closed.
    #[error("not connected")]
    Disconnected,

    /// The movement collaborator could not reach the destination.
    #[error("movement failed: {0}")]
    MovementFailed(String),

    /// The item or block name is not known to the world.
    #[error("unknown item `{0}`")]
    UnknownItem(String),

    /// The item exists but cannot be crafted from what is held.
    #[error("no usable recipe for `{0}`")]
    NoRecipe(String),

    /// The agent does not hold the named item.
    #[error("`{0}` is not in the inventory")]
    NotInInventory(String),

    /// A dig, place, attack or chat command was rejected.
    #[error("interaction failed: {0}")]
    Interaction(String),

    /// The collaborator did not answer in time.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl WorldError {
    /// The action failure code this error maps to.
    pub const fn failure_reason(&self) -> FailureReason {
        match self {
            Self::MovementFailed(_) => FailureReason::MovementFailed,
            Self::UnknownItem(_) => FailureReason::InvalidItem,
            Self::NoRecipe(_) => FailureReason::NoRecipe,
            Self::ConnectFailed { .. }
            | Self::Disconnected
            | Self::NotInInventory(_)
            | Self::Interaction(_)
            | Self::Timeout(_) => FailureReason::WorldError,
        }
    }
}
