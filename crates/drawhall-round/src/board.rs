//! Boards and the drawn-number set.
//!
//! A board is a 5×5 grid. Column `c` holds five distinct numbers from
//! `15c+1 ..= 15c+15`, and the centre cell is free (stored as [`FREE`]).
//! Boards are dealt once and never change.

use drawhall_protocol::Pattern;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Size of the number universe. Numbers run `1..=UNIVERSE`.
pub const UNIVERSE: u8 = 75;

/// The free centre cell. Always counts as drawn.
pub const FREE: u8 = 0;

const SIZE: usize = 5;
const COLUMN_SPAN: u8 = 15;

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    cells: [[u8; SIZE]; SIZE],
}

impl Board {
    /// Deals a fresh board.
    pub fn deal<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut cells = [[FREE; SIZE]; SIZE];
        for col in 0..SIZE {
            let low = col as u8 * COLUMN_SPAN + 1;
            let mut pool: Vec<u8> = (low..low + COLUMN_SPAN).collect();
            pool.shuffle(rng);
            for (row, value) in pool.into_iter().take(SIZE).enumerate() {
                cells[row][col] = value;
            }
        }
        cells[2][2] = FREE;
        Self { cells }
    }

    /// Builds a board from explicit rows, without checking column ranges.
    pub fn from_rows(cells: [[u8; SIZE]; SIZE]) -> Self {
        Self { cells }
    }

    pub fn rows(&self) -> &[[u8; SIZE]; SIZE] {
        &self.cells
    }

    pub fn contains(&self, number: u8) -> bool {
        number != FREE && self.cells.iter().flatten().any(|&v| v == number)
    }

    /// Every line of `pattern`, in scan order (top to bottom, left to
    /// right, main diagonal first). A full house is a single 25-cell line.
    pub fn lines(&self, pattern: Pattern) -> Vec<Vec<u8>> {
        let c = &self.cells;
        match pattern {
            Pattern::Row => c.iter().map(|row| row.to_vec()).collect(),
            Pattern::Column => (0..SIZE)
                .map(|col| (0..SIZE).map(|row| c[row][col]).collect())
                .collect(),
            Pattern::Diagonal => vec![
                (0..SIZE).map(|i| c[i][i]).collect(),
                (0..SIZE).map(|i| c[i][SIZE - 1 - i]).collect(),
            ],
            Pattern::FullHouse => vec![c.iter().flatten().copied().collect()],
        }
    }
}

// ---------------------------------------------------------------------------
// DrawnSet
// ---------------------------------------------------------------------------

/// The numbers drawn so far, in order, with O(1) membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawnSet {
    mask: u128,
    order: Vec<u8>,
}

impl DrawnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `FREE` is always drawn.
    pub fn contains(&self, number: u8) -> bool {
        number == FREE || (number <= UNIVERSE && self.mask & (1u128 << number) != 0)
    }

    /// Adds a number. Returns `false` for duplicates and out-of-range values.
    pub fn insert(&mut self, number: u8) -> bool {
        if number == FREE || number > UNIVERSE || self.contains(number) {
            return false;
        }
        self.mask |= 1u128 << number;
        self.order.push(number);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn remaining(&self) -> usize {
        UNIVERSE as usize - self.order.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn last(&self) -> Option<u8> {
        self.order.last().copied()
    }

    /// Numbers in draw order.
    pub fn as_slice(&self) -> &[u8] {
        &self.order
    }

    pub fn undrawn(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=UNIVERSE).filter(|&n| !self.contains(n))
    }

    pub fn is_complete(&self, line: &[u8]) -> bool {
        line.iter().all(|&n| self.contains(n))
    }

    /// Cells of `line` not yet drawn, in line order.
    pub fn missing(&self, line: &[u8]) -> Vec<u8> {
        line.iter().copied().filter(|&n| !self.contains(n)).collect()
    }
}
