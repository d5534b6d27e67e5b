//! Catalog resolution and write restrictions

mod common;

use common::Fixture;
use federate_common::{CatalogName, ConnectorCapability, IsolationLevel, SecurityManagement};
use federate_coordinator::CoordinatorError;
use federate_memory::{ConnectorEvent, MockConnector};

#[tokio::test]
async fn test_second_written_catalog_is_rejected() {
    let fixture = Fixture::new();
    fixture.catalog("warehouse");
    fixture.catalog("orders");
    let manager = &fixture.manager;

    let id = manager.begin_default(false);
    manager.get_catalog_metadata_for_write(id, "warehouse").unwrap();

    let err = manager.get_catalog_metadata_for_write(id, "orders").unwrap_err();
    match &err {
        CoordinatorError::MultiCatalogWriteConflict { written } => {
            assert_eq!(written.as_str(), "warehouse")
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.error_code(), "MULTI_CATALOG_WRITE_CONFLICT");

    // Reads from the other catalog are still allowed
    assert!(manager.get_catalog_metadata_for_read(id, "orders").unwrap().is_some());
    let info = manager.get_info(id).unwrap();
    assert_eq!(info.written_catalog, Some(CatalogName::new("warehouse")));
}

#[tokio::test]
async fn test_read_only_transaction_rejects_every_write() {
    let fixture = Fixture::new();
    for name in ["warehouse", "orders", "customers"] {
        fixture.catalog(name);
    }
    let manager = &fixture.manager;

    let id = manager.begin(IsolationLevel::RepeatableRead, true, false);
    for name in ["warehouse", "orders", "customers"] {
        let err = manager.get_catalog_metadata_for_write(id, name).unwrap_err();
        assert!(matches!(err, CoordinatorError::ReadOnlyViolation));
    }
    assert_eq!(manager.get_info(id).unwrap().written_catalog, None);
}

#[tokio::test]
async fn test_single_statement_catalog_outside_autocommit() {
    let fixture = Fixture::new();
    fixture.catalog_with(MockConnector::new("search").single_statement_writes_only());
    let manager = &fixture.manager;

    let explicit = manager.begin_default(false);
    let err = manager.get_catalog_metadata_for_write(explicit, "search").unwrap_err();
    assert!(matches!(err, CoordinatorError::AutocommitWriteConflict(ref c) if c.as_str() == "search"));
    assert_eq!(err.error_code(), "AUTOCOMMIT_WRITE_CONFLICT");

    let autocommit = manager.begin_default(true);
    manager.get_catalog_metadata_for_write(autocommit, "search").unwrap();
    manager.commit(autocommit).await.unwrap();
    manager.abort(explicit).await.unwrap();
}

#[tokio::test]
async fn test_unknown_catalog() {
    let fixture = Fixture::new();
    let manager = &fixture.manager;
    let id = manager.begin_default(false);

    assert!(manager.get_catalog_metadata_for_read(id, "ghost").unwrap().is_none());
    assert!(manager.get_catalog_metadata_for_read(id, "ghost").unwrap().is_none());
    let err = manager.get_catalog_metadata_for_write(id, "ghost").unwrap_err();
    assert!(matches!(err, CoordinatorError::CatalogNotFound(ref name) if name == "ghost"));
    assert_eq!(err.error_code(), "NOT_FOUND");

    // A catalog registered later stays invisible to this transaction
    fixture.catalog("ghost");
    assert!(manager.get_catalog_metadata_for_read(id, "ghost").unwrap().is_none());
    assert_eq!(fixture.provider.resolve_calls(), 1);
}

#[tokio::test]
async fn test_backend_sees_transaction_settings() {
    let fixture = Fixture::new();
    let warehouse = fixture.catalog("warehouse");
    let manager = &fixture.manager;

    let id = manager.begin(IsolationLevel::Serializable, true, false);
    manager.get_catalog_metadata_for_read(id, "warehouse").unwrap();
    manager.get_catalog_metadata_for_read(id, "warehouse").unwrap();
    assert_eq!(warehouse.begin_count(), 1);

    for event in fixture.events.snapshot() {
        let ConnectorEvent::Begin {
            connector,
            transaction_id,
            isolation,
            read_only,
        } = &event
        else {
            panic!("unexpected event {:?}", event);
        };
        assert_eq!(*isolation, IsolationLevel::Serializable);
        assert!(*read_only);
        // Only the internal targets bind to the engine transaction id
        if connector == "warehouse" {
            assert_eq!(*transaction_id, None);
        } else {
            assert_eq!(*transaction_id, Some(id));
        }
    }
}

#[tokio::test]
async fn test_catalog_metadata_exposes_all_targets() {
    let fixture = Fixture::new();
    fixture.catalog_with(
        MockConnector::new("warehouse")
            .with_schemas(&["sales", "finance"])
            .with_capability(ConnectorCapability::NotNullColumnConstraint),
    );
    let manager = &fixture.manager;
    let id = manager.begin_default(false);

    let metadata = manager
        .get_catalog_metadata_for_read(id, "warehouse")
        .unwrap()
        .unwrap();
    assert_eq!(metadata.catalog_name().as_str(), "warehouse");
    assert_eq!(metadata.information_schema_id().as_str(), "$info_schema@warehouse");
    assert_eq!(metadata.system_tables_id().as_str(), "$system@warehouse");
    assert_eq!(metadata.security_management(), SecurityManagement::Connector);
    assert!(metadata.capabilities().contains(&ConnectorCapability::NotNullColumnConstraint));
    assert_eq!(metadata.metadata().list_schema_names(), vec!["sales", "finance"]);

    let by_info_schema = manager
        .get_catalog_metadata(id, metadata.information_schema_id())
        .unwrap();
    assert_eq!(by_info_schema.catalog_name(), metadata.catalog_name());
    assert!(metadata.metadata_for(&CatalogName::new("$system@warehouse")).is_some());
    assert!(metadata.metadata_for(&CatalogName::new("orders")).is_none());

    let info = manager.get_info(id).unwrap();
    assert_eq!(
        info.catalog_names,
        vec![
            CatalogName::new("$info_schema@warehouse"),
            CatalogName::new("$system@warehouse"),
            CatalogName::new("warehouse"),
        ]
    );
}

#[tokio::test]
async fn test_catalog_names() {
    let fixture = Fixture::new();
    fixture.catalog("warehouse");
    fixture.catalog("orders");
    let manager = &fixture.manager;
    let id = manager.begin_default(false);

    let names = manager.get_catalog_names(id).unwrap();
    assert_eq!(names.len(), 2);
    assert_eq!(names["orders"], CatalogName::new("orders"));
}

#[tokio::test]
async fn test_info_serializes() {
    let fixture = Fixture::new();
    fixture.catalog("warehouse");
    let manager = &fixture.manager;

    let id = manager.begin(IsolationLevel::ReadCommitted, false, false);
    manager.get_catalog_metadata_for_write(id, "warehouse").unwrap();

    let infos = manager.get_all_transaction_infos();
    assert_eq!(infos.len(), 1);
    let json = serde_json::to_value(&infos[0]).unwrap();
    assert_eq!(json["written_catalog"], "warehouse");
    assert_eq!(json["read_only"], false);
    assert_eq!(json["transaction_id"], id.to_string());
}
