//! Example of a federated transaction spanning three catalogs
//!
//! One catalog is written and two are only read. On commit the written
//! catalog finishes first; the read-only catalogs follow in parallel.
//!
//! Run with: cargo run --example federated_transaction

use federate_common::IsolationLevel;
use federate_coordinator::{CoordinatorError, TransactionManager, TransactionManagerConfig};
use federate_memory::{EventLog, MockCatalogProvider, MockConnector};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Federated Transaction Example ===\n");

    // 1. Register catalogs; every backend call lands in one shared log
    let events = EventLog::default();
    let provider = Arc::new(MockCatalogProvider::new());
    for name in ["lakehouse", "orders", "customers"] {
        let connector = MockConnector::new(name)
            .with_events(events.clone())
            .with_commit_delay(Duration::from_millis(10));
        provider.add_catalog(name, Arc::new(connector));
    }
    println!("✓ Registered catalogs: lakehouse, orders, customers");

    // 2. Create the transaction manager and its idle sweep
    let config = TransactionManagerConfig {
        max_finishing_concurrency: 4,
        ..Default::default()
    };
    let manager = Arc::new(TransactionManager::new(config, provider.clone())?);
    manager.start();
    println!("✓ Started transaction manager");

    // 3. Begin an explicit transaction
    let txn = manager.begin(IsolationLevel::ReadCommitted, false, false);
    println!("✓ Began transaction {}", txn);

    // 4. Read from two catalogs, write to a third
    manager.check_and_set_active(txn)?;
    manager.get_catalog_metadata_for_read(txn, "orders")?;
    manager.get_catalog_metadata_for_read(txn, "customers")?;
    let lakehouse = manager.get_catalog_metadata_for_write(txn, "lakehouse")?;
    println!(
        "✓ Writing to {} (schemas: {:?})",
        lakehouse.catalog_name(),
        lakehouse.metadata().list_schema_names()
    );
    manager.set_inactive(txn);

    // 5. A second written catalog is refused
    match manager.get_catalog_metadata_for_write(txn, "orders") {
        Err(CoordinatorError::MultiCatalogWriteConflict { written }) => {
            println!("✓ Write to orders refused, already wrote to {}", written)
        }
        other => println!("✗ Unexpected result: {:?}", other.map(|m| m.catalog_name().clone())),
    }

    let info = manager.get_info(txn)?;
    println!("\nTransaction info:");
    println!("{}", serde_json::to_string_pretty(&info)?);

    // 6. Commit
    manager.commit(txn).await?;
    println!("\n✓ Committed; transaction still listed: {}", manager.transaction_exists(txn));

    println!("\nBackend calls in order:");
    for (i, event) in events.snapshot().iter().enumerate() {
        println!("  {:2}. {:?}", i + 1, event);
    }

    // 7. An aborted transaction never touches commit
    let doomed = manager.begin_default(false);
    manager.get_catalog_metadata_for_read(doomed, "orders")?;
    manager.abort(doomed).await?;
    println!("\n✓ Aborted transaction {}", doomed);

    manager.shutdown();
    println!("\n=== Example completed ===");
    Ok(())
}
