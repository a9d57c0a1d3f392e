//! The difficulty planner.
//!
//! A pure function over a round: it finds the participant closest to a
//! win and proposes which numbers would complete it. The coordinator
//! decides whether to act on the plan. Nothing here mutates state.

use drawhall_protocol::{ParticipantId, Pattern, Tier};

use crate::board::{DrawnSet, FREE};
use crate::round::Round;

/// Output of [`compute_plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    NoBias,
    Bias {
        target: ParticipantId,
        pattern: Pattern,
        /// The full line, free cell excluded.
        cells: Vec<u8>,
    },
}

impl Plan {
    pub fn should_bias(&self) -> bool {
        matches!(self, Self::Bias { .. })
    }

    /// The number a biased draw should reveal next.
    pub fn next_number(&self, drawn: &DrawnSet) -> Option<u8> {
        match self {
            Self::NoBias => None,
            Self::Bias { cells, .. } => cells.iter().copied().find(|&n| !drawn.contains(n)),
        }
    }
}

/// Finds the line, over all active participants, with the fewest undrawn
/// cells (at least one).
///
/// Lines are scanned rows, columns, diagonals, full house; participants in
/// seat order. Ties go to the first found. Only engages when `difficulty`
/// is [`Tier::Unbeatable`] and the round has no winner.
pub fn compute_plan(round: &Round, difficulty: Tier) -> Plan {
    if difficulty != Tier::Unbeatable || round.winner_claimed || !round.is_in_progress() {
        return Plan::NoBias;
    }

    let mut best: Option<(usize, ParticipantId, Pattern, Vec<u8>)> = None;
    for participant in round.participants.iter().filter(|p| p.is_active()) {
        for pattern in Pattern::PRIORITY {
            if !round.patterns.contains(&pattern) {
                continue;
            }
            for line in participant.board.lines(pattern) {
                let missing = round.drawn.missing(&line).len();
                if missing == 0 {
                    continue;
                }
                if best.as_ref().is_none_or(|(fewest, ..)| missing < *fewest) {
                    let cells = line.into_iter().filter(|&n| n != FREE).collect();
                    best = Some((missing, participant.id, pattern, cells));
                }
            }
        }
    }

    match best {
        Some((_, target, pattern, cells)) => Plan::Bias {
            target,
            pattern,
            cells,
        },
        None => Plan::NoBias,
    }
}
