use calamine::{open_workbook, Data, Reader, Xlsx};
use serde::Serialize;
use serde_json::json;
use stockdash_cache::{KeyValueStore, SqliteStore};
use stockdash_core::{
    remap_columns, rows_from_records, ColumnMapping, DirectorySink, ExportOutcome, Exporter,
    InventorySettings, Row, SettingsPatch, SettingsStore, SheetData, DEFAULT_SHEET_LABEL,
    SETTINGS_KEY,
};
use tempfile::TempDir;

#[derive(Serialize)]
struct SlowMover {
    sku: String,
    name: String,
    qty: u32,
    days_since_sale: u32,
}

fn slow_movers() -> Vec<SlowMover> {
    vec![
        SlowMover {
            sku: "X1".to_string(),
            name: "Garden hose, 25m".to_string(),
            qty: 12,
            days_since_sale: 74,
        },
        SlowMover {
            sku: "X2".to_string(),
            name: "Patio heater".to_string(),
            qty: 3,
            days_since_sale: 88,
        },
    ]
}

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().expect("test rows must be objects")
}

#[test]
fn test_settings_survive_reopening_the_database() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("storage.db");

    let saved = {
        let store = SettingsStore::new(SqliteStore::open(&db_path).unwrap());
        let patch = SettingsPatch {
            dead_stock_days: Some(120),
            slow_moving_limit: Some(25),
            ..Default::default()
        };
        store.update(&patch).unwrap()
    };

    let store = SettingsStore::new(SqliteStore::open(&db_path).unwrap());
    assert_eq!(store.load(), saved);
    assert_eq!(store.load().dead_stock_days, 120);
    assert_eq!(store.load().understock_days, InventorySettings::default().understock_days);
}

#[test]
fn test_reset_clears_the_database_entry() {
    let dir = TempDir::new().unwrap();
    let store = SettingsStore::new(SqliteStore::open(dir.path().join("storage.db")).unwrap());

    store.save(&InventorySettings {
        overstock_days: 200,
        ..InventorySettings::default()
    });
    assert!(store.storage().get(SETTINGS_KEY).unwrap().is_some());

    store.reset();
    assert!(store.storage().get(SETTINGS_KEY).unwrap().is_none());
    assert_eq!(store.load(), InventorySettings::default());
}

#[test]
fn test_record_written_by_older_version_is_backfilled() {
    let storage = SqliteStore::open_in_memory().unwrap();
    storage
        .set(SETTINGS_KEY, r#"{"deadStockDays": 45, "slowMovingDays": 30}"#)
        .unwrap();
    let store = SettingsStore::new(storage);

    let loaded = store.load();
    assert_eq!(loaded.dead_stock_days, 45);
    assert_eq!(loaded.slow_moving_days, 30);
    assert_eq!(loaded.category_analysis_days, 30);
    assert!(loaded.validate().is_empty());
}

#[test]
fn test_export_writes_workbook_to_directory() {
    let dir = TempDir::new().unwrap();
    let sink = DirectorySink::new(dir.path().join("exports"));
    let exporter = Exporter::new(sink);

    let rows = rows_from_records(&slow_movers()).unwrap();
    let mapping = ColumnMapping::new()
        .with("sku", "SKU")
        .with("qty", "Quantity")
        .with("days_since_sale", "Days Since Sale");
    let rows = remap_columns(&rows, &mapping);

    let outcome = exporter
        .export_single(&rows, "slow_moving", DEFAULT_SHEET_LABEL)
        .unwrap();

    let ExportOutcome::Delivered { file_name, sheets } = outcome else {
        panic!("expected a delivered file");
    };
    assert_eq!(sheets, vec!["Sheet1".to_string()]);

    let path = exporter.sink().path_for(&file_name);
    let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["Sheet1".to_string()]);

    let range = workbook.worksheet_range("Sheet1").unwrap();
    assert_eq!(range.height(), 3);
    assert_eq!(range.get((0, 0)), Some(&Data::String("SKU".to_string())));
    assert_eq!(range.get((0, 1)), Some(&Data::String("Quantity".to_string())));
    assert_eq!(range.get((0, 2)), Some(&Data::String("Days Since Sale".to_string())));
    assert_eq!(range.get((1, 0)), Some(&Data::String("X1".to_string())));
    assert_eq!(range.get((2, 2)), Some(&Data::Float(88.0)));
}

#[test]
fn test_same_day_export_overwrites() {
    let dir = TempDir::new().unwrap();
    let exporter = Exporter::new(DirectorySink::new(dir.path()));
    let rows = vec![row(json!({"sku": "A", "qty": 1}))];

    let first = exporter.export_single(&rows, "stock", "Stock").unwrap();
    let second = exporter.export_single(&rows, "stock", "Stock").unwrap();
    assert_eq!(first, second);

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn test_multi_sheet_export_with_empty_sheets() {
    let dir = TempDir::new().unwrap();
    let exporter = Exporter::new(DirectorySink::new(dir.path()));

    let sheets = vec![
        SheetData::new("Dead Stock", vec![]),
        SheetData::new("Slow Moving", rows_from_records(&slow_movers()).unwrap()),
        SheetData::new("Overstock", vec![row(json!({"sku": "Z9", "days_of_supply": 400}))]),
    ];

    let outcome = exporter.export_multiple(&sheets, "inventory_report").unwrap();
    match outcome {
        ExportOutcome::Delivered { file_name, sheets } => {
            assert!(file_name.starts_with("inventory_report_"));
            assert_eq!(sheets, vec!["Slow Moving".to_string(), "Overstock".to_string()]);
            let mut workbook: Xlsx<_> = open_workbook(dir.path().join(file_name)).unwrap();
            assert_eq!(
                workbook.sheet_names(),
                vec!["Slow Moving".to_string(), "Overstock".to_string()]
            );
            let overstock = workbook.worksheet_range("Overstock").unwrap();
            assert_eq!(overstock.get((1, 1)), Some(&Data::Float(400.0)));
        }
        ExportOutcome::Skipped => panic!("expected a delivered file"),
    }
}

#[test]
fn test_empty_export_leaves_directory_alone() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("never-created");
    let exporter = Exporter::new(DirectorySink::new(&out));

    let outcome = exporter.export_single(&[], "x", DEFAULT_SHEET_LABEL).unwrap();
    assert_eq!(outcome, ExportOutcome::Skipped);
    assert!(!out.exists());
}
