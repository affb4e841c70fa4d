// Core business logic lives here - settings and spreadsheet exports
pub mod config;
pub mod error;
pub mod export;
pub mod settings;

pub use config::Config;
pub use error::Error;
pub use export::{
    build_workbook, column_width, export_file_name, parse_rows, remap_columns, rows_from_records,
    ColumnMapping, DirectorySink, DownloadSink, ExportOptions, ExportOutcome, ExportSheet,
    Exporter, MemorySink, Row, SheetData, DEFAULT_SHEET_LABEL,
};
pub use settings::{
    validate, InventorySettings, SettingsField, SettingsPatch, SettingsStore, SETTINGS_KEY,
};

/// Result type alias because typing Result<T, Error> everywhere is tedious
pub type Result<T> = std::result::Result<T, Error>;
