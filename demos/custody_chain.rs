//! Walks a batch through the whole custody chain against a local sled db.
//!
//! Run with `cargo run --example custody_chain`. Set RUST_LOG=debug to see
//! the ledger's structured log output.

use freshchain::{
    batch::BatchDetails, policy::CustodyPolicy, roles::Role, service::CustodyService, utils,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let db = sled::open("custody-demo.db")?;

    // start from a clean ledger on every run
    if !db.is_empty() {
        db.clear()?;
    }
    let db = Arc::new(db);

    let admin = utils::new_address("admin_")?;
    let producer = utils::new_address("farm_")?;
    let transporter = utils::new_address("truck_")?;
    let distributor = utils::new_address("depot_")?;
    let retailer = utils::new_address("store_")?;

    let service = CustodyService::bootstrap(db, admin.clone(), CustodyPolicy::default())?;

    service.register_role(&admin, Role::Producer, producer.clone())?;
    service.register_role(&admin, Role::Transporter, transporter.clone())?;
    service.register_role(&admin, Role::Distributor, distributor.clone())?;
    service.register_role(&admin, Role::Retailer, retailer.clone())?;

    let details = BatchDetails::new()
        .set_id(200)
        .set_name("Spinach")
        .set_quantity(50)
        .set_shelf_life_days(5);
    service.create_batch(&producer, details)?;

    // the transporter claims the batch, staking collateral
    service.transfer_ownership(&producer, 200, &transporter, Some(100))?;

    // cold-chain telemetry along the way, the second reading breaches
    service.add_sensor_data(&transporter, 200, 4, 60, "Warehouse1")?;
    service.add_sensor_data(&transporter, 200, 25, 60, "Truck2")?;

    service.transfer_ownership(&transporter, 200, &distributor, None)?;
    service.transfer_ownership(&distributor, 200, &retailer, None)?;

    let (batch, payout) = service.finalize(&retailer, 200, true)?;

    println!("batch:      {:#?}", batch);
    println!("payout:     {:?}", payout);
    println!("audit ok:   {}", batch.verify_audit_trail()?);
    println!("escrow:     {:?}", service.escrow_totals()?);

    Ok(())
}
