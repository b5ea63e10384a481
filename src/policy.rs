//! Operational policy knobs for a custody ledger instance
use crate::escrow::ForfeiturePolicy;
use crate::sensor::SafeBand;

/// Configuration fixed at service construction. None of these values are
/// baked into the state machine; the required stake is additionally snapshot
/// onto each batch at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustodyPolicy {
    /// Minimum collateral a claimant must stake on the first handover.
    pub required_stake: u64,
    /// Safe temperature and humidity band for the tracked product class.
    pub safe_band: SafeBand,
    /// Destination of the stake when inspection rejects the batch or a
    /// violation was latched in transit.
    pub forfeiture: ForfeiturePolicy,
}

impl Default for CustodyPolicy {
    fn default() -> Self {
        Self {
            required_stake: 100,
            safe_band: SafeBand::default(),
            forfeiture: ForfeiturePolicy::ForfeitToRetailer,
        }
    }
}
