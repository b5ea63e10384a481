//! Service layer API for custody ledger operations
//!
//! Every mutating entry point follows the same shape: take the write gate,
//! check the system switch, check authorization, run the pure transition,
//! then commit the touched records in one atomic `apply_batch`. A failed
//! call writes nothing, so retries are safe.
use crate::batch::{Batch, BatchDetails};
use crate::error::CustodyError;
use crate::escrow::{EscrowLedger, Payout};
use crate::policy::CustodyPolicy;
use crate::roles::{Role, RoleRegistry};
use crate::sensor::SensorReading;
use sled::Db;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

const REGISTRY_KEY: &[u8] = b"role_registry";
const ESCROW_KEY: &[u8] = b"escrow_ledger";
const PAUSED_KEY: &[u8] = b"system_paused";

fn batch_key(id: u64) -> String {
    format!("batch/{id}")
}

pub struct CustodyService {
    instance: Arc<Db>,
    policy: CustodyPolicy,
    // Serializes all mutating operations. Reads go straight to sled and see
    // whole-record snapshots, never a half-applied transfer.
    write_gate: Mutex<()>,
}

impl CustodyService {
    /// Open the ledger, initializing the registry, escrow and switch records
    /// on first use. Re-opening an existing ledger keeps the stored admin;
    /// the `admin` argument only seeds a fresh one.
    pub fn bootstrap(
        instance: Arc<Db>,
        admin: String,
        policy: CustodyPolicy,
    ) -> Result<Self, CustodyError> {
        if !instance.contains_key(REGISTRY_KEY)? {
            let registry = RoleRegistry::new(admin);
            let escrow = EscrowLedger::default();

            let mut batch = sled::Batch::default();
            batch.insert(REGISTRY_KEY, minicbor::to_vec(&registry)?);
            batch.insert(ESCROW_KEY, minicbor::to_vec(&escrow)?);
            batch.insert(PAUSED_KEY, vec![0u8]);
            instance.apply_batch(batch)?;

            info!(admin = registry.admin(), "custody ledger initialized");
        }

        Ok(Self {
            instance,
            policy,
            write_gate: Mutex::new(()),
        })
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_registry(&self) -> Result<RoleRegistry, CustodyError> {
        let bytes = self
            .instance
            .get(REGISTRY_KEY)?
            .ok_or(sled::Error::ReportableBug(
                "role registry record missing".into(),
            ))?;
        Ok(minicbor::decode(&bytes)?)
    }

    fn load_escrow(&self) -> Result<EscrowLedger, CustodyError> {
        let bytes = self
            .instance
            .get(ESCROW_KEY)?
            .ok_or(sled::Error::ReportableBug(
                "escrow ledger record missing".into(),
            ))?;
        Ok(minicbor::decode(&bytes)?)
    }

    fn load_batch(&self, id: u64) -> Result<Batch, CustodyError> {
        let bytes = self
            .instance
            .get(batch_key(id))?
            .ok_or(CustodyError::NotFound(id))?;
        Ok(minicbor::decode(&bytes)?)
    }

    fn ensure_live(&self) -> Result<(), CustodyError> {
        if self.is_paused()? {
            return Err(CustodyError::SystemPaused);
        }
        Ok(())
    }

    /// State of the global emergency switch.
    pub fn is_paused(&self) -> Result<bool, CustodyError> {
        Ok(self
            .instance
            .get(PAUSED_KEY)?
            .is_some_and(|bytes| bytes.first() == Some(&1)))
    }

    /// Grant `target` a custody role. Admin only, idempotent.
    pub fn register_role(
        &self,
        caller: &str,
        role: Role,
        target: String,
    ) -> Result<(), CustodyError> {
        let _guard = self.lock_writes();
        self.ensure_live()?;

        let mut registry = self.load_registry()?;
        registry.register(caller, role, target.clone())?;
        self.instance
            .insert(REGISTRY_KEY, minicbor::to_vec(&registry)?)?;

        info!(role = ?role, target = %target, "role granted");
        Ok(())
    }

    /// Flip the emergency switch. Admin only, never gated by the switch
    /// itself. Returns the new state.
    pub fn toggle_pause(&self, caller: &str) -> Result<bool, CustodyError> {
        let _guard = self.lock_writes();

        let registry = self.load_registry()?;
        if caller != registry.admin() {
            return Err(CustodyError::NotAuthorized);
        }

        let paused = !self.is_paused()?;
        self.instance
            .insert(PAUSED_KEY, vec![u8::from(paused)])?;

        info!(paused, "system switch toggled");
        Ok(paused)
    }

    /// Register a new batch. The caller must hold the Producer role and
    /// becomes both the batch's producer of record and its first custodian.
    pub fn create_batch(&self, caller: &str, details: BatchDetails) -> Result<Batch, CustodyError> {
        let _guard = self.lock_writes();
        self.ensure_live()?;

        let registry = self.load_registry()?;
        if !registry.is_authorized(caller, Role::Producer) {
            return Err(CustodyError::NotAuthorized);
        }

        let batch = details.validate_and_build(caller.to_owned(), self.policy.required_stake)?;
        if self.instance.contains_key(batch_key(batch.id))? {
            return Err(CustodyError::DuplicateId(batch.id));
        }

        self.instance
            .insert(batch_key(batch.id), minicbor::to_vec(&batch)?)?;

        info!(batch = batch.id, producer = %caller, "batch created");
        Ok(batch)
    }

    /// Hand the batch to the next custodian in the chain. The first transfer
    /// is the claim and must carry the collateral stake; later transfers
    /// must not.
    pub fn transfer_ownership(
        &self,
        caller: &str,
        id: u64,
        new_owner: &str,
        stake: Option<u64>,
    ) -> Result<Batch, CustodyError> {
        let _guard = self.lock_writes();
        self.ensure_live()?;

        let mut batch = self.load_batch(id)?;
        batch.ensure_owned_by(caller)?;
        let next = batch.next_stage()?;

        let registry = self.load_registry()?;
        if !registry.is_authorized(new_owner, next) {
            return Err(CustodyError::NotAuthorizedRole(next));
        }

        let mut escrow = self.load_escrow()?;
        batch.apply_transfer(new_owner, next, stake, &mut escrow)?;

        let mut commit = sled::Batch::default();
        commit.insert(batch_key(id).into_bytes(), minicbor::to_vec(&batch)?);
        commit.insert(ESCROW_KEY, minicbor::to_vec(&escrow)?);
        self.instance.apply_batch(commit)?;

        info!(
            batch = id,
            previous = %caller,
            owner = %new_owner,
            stage = ?next,
            collateral = batch.collateral,
            "ownership transferred"
        );
        Ok(batch)
    }

    /// Append an environmental reading to the batch's audit trail. Only the
    /// current custodian may log, and only while the batch is in transit.
    pub fn add_sensor_data(
        &self,
        caller: &str,
        id: u64,
        temperature: i64,
        humidity: i64,
        location: &str,
    ) -> Result<Batch, CustodyError> {
        let _guard = self.lock_writes();
        self.ensure_live()?;

        let mut batch = self.load_batch(id)?;
        batch.ensure_owned_by(caller)?;

        let reading = SensorReading::new(temperature, humidity, location);
        let breached = batch.apply_reading(reading, &self.policy.safe_band)?;

        self.instance
            .insert(batch_key(id), minicbor::to_vec(&batch)?)?;

        debug!(batch = id, temperature, humidity, location, "sensor reading appended");
        if breached {
            warn!(batch = id, "reading breached safe band, violation latched");
        }
        Ok(batch)
    }

    /// Terminal retailer inspection: records the outcome and settles the
    /// collateral in the same commit.
    pub fn finalize(
        &self,
        caller: &str,
        id: u64,
        accepted: bool,
    ) -> Result<(Batch, Payout), CustodyError> {
        let _guard = self.lock_writes();
        self.ensure_live()?;

        let mut batch = self.load_batch(id)?;
        batch.ensure_owned_by(caller)?;

        let registry = self.load_registry()?;
        if !registry.is_authorized(caller, Role::Retailer) {
            return Err(CustodyError::NotAuthorized);
        }

        batch.apply_finalize(accepted)?;

        let mut escrow = self.load_escrow()?;
        let payout = escrow.release(&mut batch, self.policy.forfeiture, accepted)?;

        let mut commit = sled::Batch::default();
        commit.insert(batch_key(id).into_bytes(), minicbor::to_vec(&batch)?);
        commit.insert(ESCROW_KEY, minicbor::to_vec(&escrow)?);
        self.instance.apply_batch(commit)?;

        info!(
            batch = id,
            accepted,
            violation = batch.violation,
            amount = payout.amount,
            payee = payout.payee.as_deref().unwrap_or("none"),
            "batch finalized"
        );
        Ok((batch, payout))
    }

    /// Full public projection of a batch, everything a customer trace
    /// renders. Open to any caller.
    pub fn batch_history(&self, id: u64) -> Result<Batch, CustodyError> {
        self.load_batch(id)
    }

    /// The batch's ordered sensor log. Open to any caller.
    pub fn sensor_history(&self, id: u64) -> Result<Vec<SensorReading>, CustodyError> {
        Ok(self.load_batch(id)?.sensor_log)
    }

    /// Running escrow sums, for conservation checks and monitoring.
    pub fn escrow_totals(&self) -> Result<EscrowLedger, CustodyError> {
        self.load_escrow()
    }
}
