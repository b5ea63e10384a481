//! Batch records and the custody state machine
//!
//! State lives in one CBOR record per batch. The transition methods here are
//! pure (no storage access) so the state machine can be exercised directly;
//! the service layer handles authorization lookups and persistence around
//! them.
use crate::error::CustodyError;
use crate::escrow::EscrowLedger;
use crate::roles::Role;
use crate::sensor::{self, SafeBand, SensorReading};
use chrono::{DateTime, TimeZone, Utc};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    #[n(0)]
    Created,
    #[n(1)]
    InTransit,
    #[n(2)]
    Finalized,
}

/// Inspection result. Only meaningful once the batch is Finalized.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn plus_days(&self, days: u32) -> Self {
        Self(self.0 + chrono::Duration::days(i64::from(days)))
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

// Draft for a new batch, filled in by the producer before creation.
#[derive(Debug, Default)]
pub struct BatchDetails {
    id: Option<u64>,
    name: Option<String>,
    quantity: u64,
    shelf_life_days: u32,
}

impl BatchDetails {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
    pub fn set_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }
    pub fn set_quantity(mut self, quantity: u64) -> Self {
        self.quantity = quantity;
        self
    }
    pub fn set_shelf_life_days(mut self, days: u32) -> Self {
        self.shelf_life_days = days;
        self
    }

    /// Checks the draft fields and builds the initial batch record. The
    /// expiry is derived from the shelf life at creation time, and the
    /// required claim stake is snapshot from the active policy.
    pub fn validate_and_build(
        self,
        producer: String,
        required_stake: u64,
    ) -> Result<Batch, CustodyError> {
        let id = self
            .id
            .ok_or_else(|| CustodyError::InvalidDetails("batch id is not set".into()))?;
        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(CustodyError::InvalidDetails("product name is empty".into())),
        };
        if self.quantity == 0 {
            return Err(CustodyError::InvalidDetails("quantity is zero".into()));
        }
        if self.shelf_life_days == 0 {
            return Err(CustodyError::InvalidDetails("shelf life is zero".into()));
        }

        let created_at = TimeStamp::new();
        let expiry = created_at.plus_days(self.shelf_life_days);

        Ok(Batch {
            id,
            name,
            quantity: self.quantity,
            created_at,
            expiry,
            current_owner: producer.clone(),
            producer,
            stage: Role::Producer,
            status: BatchStatus::Created,
            outcome: Outcome::Pending,
            collateral: 0,
            required_stake,
            released: false,
            violation: false,
            sensor_log: vec![],
            audit_head: String::new(),
        })
    }
}

// One ledger record per batch, keyed by id. Doubles as the public
// projection: everything a customer trace renders comes from this record.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    #[n(0)]
    pub id: u64,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub quantity: u64,
    #[n(3)]
    pub created_at: TimeStamp<Utc>,
    #[n(4)]
    pub expiry: TimeStamp<Utc>,
    #[n(5)]
    pub producer: String,
    #[n(6)]
    pub current_owner: String,
    #[n(7)]
    pub stage: Role,
    #[n(8)]
    pub status: BatchStatus,
    #[n(9)]
    pub outcome: Outcome,
    #[n(10)]
    pub collateral: u64,
    #[n(11)]
    pub required_stake: u64,
    #[n(12)]
    pub released: bool,
    #[n(13)]
    pub violation: bool,
    #[n(14)]
    pub sensor_log: Vec<SensorReading>,
    #[n(15)]
    pub audit_head: String,
}

impl Batch {
    pub fn ensure_owned_by(&self, caller: &str) -> Result<(), CustodyError> {
        if caller != self.current_owner {
            return Err(CustodyError::NotCurrentOwner(self.id));
        }
        Ok(())
    }

    /// The stage the next handover must target. Finalized batches have no
    /// next stage, and neither does a batch already held by a retailer.
    pub fn next_stage(&self) -> Result<Role, CustodyError> {
        if self.status == BatchStatus::Finalized {
            return Err(CustodyError::BatchFinalized(self.id));
        }
        self.stage
            .next()
            .ok_or(CustodyError::InvalidStageTransition(self.id))
    }

    /// Hand the batch to `new_owner` at stage `next`. The first handover is
    /// the claim: it must carry the collateral stake and moves the batch
    /// into transit. Every later handover must carry none.
    ///
    /// Role membership of `new_owner` is the caller's responsibility; this
    /// method enforces everything that can be decided from the record alone.
    pub fn apply_transfer(
        &mut self,
        new_owner: &str,
        next: Role,
        stake: Option<u64>,
        escrow: &mut EscrowLedger,
    ) -> Result<(), CustodyError> {
        match (self.status, stake) {
            (BatchStatus::Finalized, _) => return Err(CustodyError::BatchFinalized(self.id)),
            (BatchStatus::Created, None) => {
                return Err(CustodyError::MissingStake {
                    id: self.id,
                    required: self.required_stake,
                });
            }
            (BatchStatus::Created, Some(amount)) => {
                escrow.stake(self, amount)?;
                self.status = BatchStatus::InTransit;
            }
            (BatchStatus::InTransit, Some(_)) => return Err(CustodyError::UnexpectedStake(self.id)),
            (BatchStatus::InTransit, None) => {}
        }

        self.current_owner = new_owner.to_owned();
        self.stage = next;
        Ok(())
    }

    /// Append a reading, extend the audit chain and latch the violation flag
    /// if the reading falls outside the safe band. Returns whether this
    /// reading breached the band. Once latched the flag never clears.
    pub fn apply_reading(
        &mut self,
        reading: SensorReading,
        band: &SafeBand,
    ) -> Result<bool, CustodyError> {
        if self.status != BatchStatus::InTransit {
            return Err(CustodyError::InvalidState {
                id: self.id,
                status: self.status,
            });
        }

        let breached = band.breached(&reading);
        self.audit_head = sensor::chain_digest(&self.audit_head, &reading)?;
        self.violation = self.violation || breached;
        self.sensor_log.push(reading);

        Ok(breached)
    }

    /// Terminal inspection. Status moves to Finalized exactly once; escrow
    /// release is handled by the caller right after, in the same commit.
    pub fn apply_finalize(&mut self, accepted: bool) -> Result<(), CustodyError> {
        match self.status {
            BatchStatus::Finalized => Err(CustodyError::BatchFinalized(self.id)),
            BatchStatus::Created => Err(CustodyError::InvalidState {
                id: self.id,
                status: self.status,
            }),
            BatchStatus::InTransit => {
                self.status = BatchStatus::Finalized;
                self.outcome = if accepted {
                    Outcome::Accepted
                } else {
                    Outcome::Rejected
                };
                Ok(())
            }
        }
    }

    /// Recompute the chained digest over the stored log and compare it with
    /// the recorded head. Any caller can run this against a projection.
    pub fn verify_audit_trail(&self) -> Result<bool, CustodyError> {
        Ok(sensor::recompute_head(&self.sensor_log)? == self.audit_head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_cbor_roundtrip() {
        let original = TimeStamp::new();

        let encoded = minicbor::to_vec(&original).unwrap();
        let decoded: TimeStamp<Utc> = minicbor::decode(&encoded).unwrap();

        assert_eq!(original, decoded);
    }

    #[test]
    fn expiry_is_creation_plus_shelf_life() {
        let batch = BatchDetails::new()
            .set_id(1)
            .set_name("Spinach")
            .set_quantity(50)
            .set_shelf_life_days(5)
            .validate_and_build("farm_1".into(), 100)
            .unwrap();

        let shelf = batch.expiry.to_datetime_utc() - batch.created_at.to_datetime_utc();
        assert_eq!(shelf.num_days(), 5);
    }

    #[test]
    fn draft_validation_rejects_incomplete_fields() {
        let missing_id = BatchDetails::new()
            .set_name("Spinach")
            .set_quantity(50)
            .set_shelf_life_days(5);
        assert!(matches!(
            missing_id.validate_and_build("farm_1".into(), 100),
            Err(CustodyError::InvalidDetails(_))
        ));

        let zero_quantity = BatchDetails::new()
            .set_id(1)
            .set_name("Spinach")
            .set_shelf_life_days(5);
        assert!(matches!(
            zero_quantity.validate_and_build("farm_1".into(), 100),
            Err(CustodyError::InvalidDetails(_))
        ));
    }

    #[test]
    fn batch_record_cbor_roundtrip() {
        let mut batch = BatchDetails::new()
            .set_id(7)
            .set_name("Lettuce")
            .set_quantity(12)
            .set_shelf_life_days(3)
            .validate_and_build("farm_1".into(), 100)
            .unwrap();
        let mut escrow = EscrowLedger::default();
        batch
            .apply_transfer("truck_1", Role::Transporter, Some(100), &mut escrow)
            .unwrap();
        batch
            .apply_reading(SensorReading::new(4, 60, "Dock A"), &SafeBand::default())
            .unwrap();

        let encoded = minicbor::to_vec(&batch).unwrap();
        let decoded: Batch = minicbor::decode(&encoded).unwrap();

        assert_eq!(batch, decoded);
    }
}
