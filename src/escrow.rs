//! Collateral escrow: stake on claim, settle on finalization
//!
//! Monetary value moves only through `stake` and `release`, each callable
//! once per batch lifecycle. The running totals make the conservation
//! invariant checkable: outstanding collateral equals everything ever staked
//! minus everything ever released.
use crate::batch::Batch;
use crate::error::CustodyError;

/// Where forfeited collateral goes when a batch is rejected at inspection or
/// finished transit with a latched violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForfeiturePolicy {
    /// Return the stake to the producer regardless of outcome.
    RefundProducer,
    /// Pay the stake to the retailer who absorbed the bad shipment.
    ForfeitToRetailer,
    /// Destroy the stake. The payout carries no payee.
    Burn,
}

/// Settlement result handed back to the caller at finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub payee: Option<String>,
    pub amount: u64,
}

// Single ledger record holding the running sums across all batches.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct EscrowLedger {
    #[n(0)]
    total_staked: u64,
    #[n(1)]
    total_released: u64,
}

impl EscrowLedger {
    /// Collateral currently locked across all batches.
    pub fn outstanding(&self) -> u64 {
        self.total_staked - self.total_released
    }

    pub fn total_staked(&self) -> u64 {
        self.total_staked
    }

    pub fn total_released(&self) -> u64 {
        self.total_released
    }

    /// Lock `amount` against the batch at claim time. Fails if the batch
    /// already carries collateral or the amount is below the stake the batch
    /// was created with.
    pub fn stake(&mut self, batch: &mut Batch, amount: u64) -> Result<(), CustodyError> {
        if batch.collateral != 0 {
            return Err(CustodyError::AlreadyStaked(batch.id));
        }
        if amount < batch.required_stake {
            return Err(CustodyError::MissingStake {
                id: batch.id,
                required: batch.required_stake,
            });
        }

        batch.collateral = amount;
        self.total_staked += amount;
        Ok(())
    }

    /// Settle the batch's collateral exactly once. A clean accepted batch
    /// pays the producer in full; anything else routes per the forfeiture
    /// policy. Zeroes the batch's collateral either way.
    pub fn release(
        &mut self,
        batch: &mut Batch,
        policy: ForfeiturePolicy,
        accepted: bool,
    ) -> Result<Payout, CustodyError> {
        if batch.released {
            return Err(CustodyError::AlreadyReleased(batch.id));
        }

        let amount = batch.collateral;
        let payee = if accepted && !batch.violation {
            Some(batch.producer.clone())
        } else {
            match policy {
                ForfeiturePolicy::RefundProducer => Some(batch.producer.clone()),
                ForfeiturePolicy::ForfeitToRetailer => Some(batch.current_owner.clone()),
                ForfeiturePolicy::Burn => None,
            }
        };

        batch.collateral = 0;
        batch.released = true;
        self.total_released += amount;

        Ok(Payout { payee, amount })
    }
}
