//! Unified error type for Drawhall.

use drawhall_lobby::LobbyError;
use drawhall_protocol::ProtocolError;
use drawhall_round::RoundError;
use drawhall_store::StoreError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// Callers of [`EngineHandle`](crate::EngineHandle) deal with this single
/// type. The `#[from]` variants let `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum DrawhallError {
    /// Encoding or decoding an event failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The persisted store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A round operation was refused (not found, not in progress, expired).
    #[error(transparent)]
    Round(#[from] RoundError),

    /// A matchmaking operation was refused (full, already queued).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The engine task is gone. Every handle call fails with this after
    /// shutdown.
    #[error("engine stopped")]
    EngineStopped,
}
