//! Admission capacity — how many instances may be unavailable at once.

/// Number of instances that may be out of service simultaneously.
///
/// `floor((100 - min_healthy_percent) * instance_count / 100)`. Callers
/// validate `min_healthy_percent <= 100`; larger values yield zero.
pub fn max_in_flight(min_healthy_percent: u32, instance_count: u32) -> u32 {
    let spare = 100u64.saturating_sub(min_healthy_percent as u64);
    (spare * instance_count as u64 / 100) as u32
}

/// Inputs to one tick's token release decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRelease {
    /// Instances in the group when the session started.
    pub total: u32,
    /// Live instances that belong to the starting set.
    pub remaining_old: u32,
    /// Tokens released on earlier ticks.
    pub deleted: u32,
    /// Capacity the coordinator currently considers unavailable.
    pub unavailable: u32,
    /// Tokens released but not yet used for admission.
    pub held: u32,
    pub max_in_flight: u32,
}

impl TokenRelease {
    /// Old instances that have left the group and have not yet been
    /// matched by a released token.
    pub fn by_supply(&self) -> u32 {
        self.total
            .saturating_sub(self.remaining_old)
            .saturating_sub(self.deleted)
    }

    /// Room left under `max_in_flight`.
    pub fn by_capacity(&self) -> u32 {
        self.max_in_flight
            .saturating_sub(self.unavailable)
            .saturating_sub(self.held)
    }

    /// Tokens to release this tick. Never negative.
    pub fn count(&self) -> u32 {
        self.by_supply().min(self.by_capacity())
    }
}
