// src/transcript/rounds.rs
// Round arithmetic. Always uses the roster size of the current pass.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundTracker {
    roster_size: usize,
}

impl RoundTracker {
    pub fn new(roster_size: usize) -> Self {
        // An empty roster counts as one seat so the division is defined.
        Self {
            roster_size: roster_size.max(1),
        }
    }

    /// Round of the `ordinal`-th matched message (1-indexed).
    pub fn round_for(&self, ordinal: usize) -> u32 {
        (1 + ordinal.saturating_sub(1) / self.roster_size) as u32
    }

    /// The round being filled after `matched` messages.
    pub fn current_round(&self, matched: usize) -> u32 {
        (1 + matched / self.roster_size) as u32
    }
}
