//! Claims and their verdicts.

use drawhall_protocol::{LateReason, ParticipantId, Pattern};
use serde::{Deserialize, Serialize};

use crate::board::{Board, DrawnSet, FREE};

/// A participant's assertion that their board shows a winning pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub participant_id: ParticipantId,
    pub pattern: Pattern,
    /// The cells of the claimed line. Empty means "any complete line of
    /// this pattern".
    #[serde(default)]
    pub cells: Vec<u8>,
}

impl Claim {
    pub fn new(participant_id: ParticipantId, pattern: Pattern) -> Self {
        Self {
            participant_id,
            pattern,
            cells: Vec::new(),
        }
    }

    pub fn with_cells(mut self, cells: impl Into<Vec<u8>>) -> Self {
        self.cells = cells.into();
        self
    }
}

/// Why a claim was rejected outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimRejection {
    UnknownParticipant,
    /// Disconnected, removed, or a spectator.
    NotActive,
    PatternNotAllowed,
    /// No line of the claimed pattern is fully drawn.
    LineIncomplete,
    /// A line is complete, but not the one listed in the claim.
    CellsMismatch,
    RoundNotInProgress,
    /// The store could not be consulted. The round stays undecided.
    StoreUnavailable,
}

/// What the claimant hears back. Every claim gets exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimVerdict {
    Winner,
    Late(LateReason),
    Invalid(ClaimRejection),
}

impl ClaimVerdict {
    /// A raced claim was valid, so it is accepted but did not win.
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Winner | Self::Late(LateReason::Raced))
    }

    pub fn is_winner(&self) -> bool {
        matches!(self, Self::Winner)
    }

    pub fn late_reason(&self) -> Option<LateReason> {
        match self {
            Self::Late(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// A claim as kept on the round for audit, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Arrival sequence, unique per coordinator.
    pub seq: u64,
    pub claim: Claim,
    pub verdict: ClaimVerdict,
    /// Numbers drawn when the claim arrived.
    pub drawn_count: usize,
}

/// Checks a claim against the board and the numbers drawn so far.
pub(crate) fn validate(
    board: &Board,
    drawn: &DrawnSet,
    pattern: Pattern,
    cells: &[u8],
) -> Result<(), ClaimRejection> {
    let complete: Vec<Vec<u8>> = board
        .lines(pattern)
        .into_iter()
        .filter(|line| drawn.is_complete(line))
        .collect();
    if complete.is_empty() {
        return Err(ClaimRejection::LineIncomplete);
    }
    if cells.is_empty() {
        return Ok(());
    }

    let claimed = normalize(cells);
    if complete.iter().any(|line| normalize(line) == claimed) {
        Ok(())
    } else {
        Err(ClaimRejection::CellsMismatch)
    }
}

fn normalize(cells: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = cells.iter().copied().filter(|&n| n != FREE).collect();
    out.sort_unstable();
    out.dedup();
    out
}
