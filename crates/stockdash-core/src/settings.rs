use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use stockdash_cache::KeyValueStore;
use tracing::{debug, info, warn};

/// Storage key the settings record lives under
pub const SETTINGS_KEY: &str = "inventory-turnover-settings";

/// Thresholds that drive the inventory turnover analysis
///
/// Always complete. Partial updates go through [`SettingsPatch`] and get
/// merged over a full record, so nobody ever sees a half-filled one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySettings {
    /// Max rows shown in the slow-moving list
    pub slow_moving_limit: u32,
    /// Max rows shown in the stock analysis table
    pub stock_analysis_limit: u32,
    /// No sales for this many days and it's dead stock
    pub dead_stock_days: u32,
    pub slow_moving_days: u32,
    pub sales_analysis_days: u32,
    /// Days of supply above which an item counts as overstocked
    pub overstock_days: u32,
    pub category_analysis_days: u32,
    /// Days of supply below which an item counts as understocked
    pub understock_days: u32,
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            slow_moving_limit: 50,
            stock_analysis_limit: 100,
            dead_stock_days: 90, // a quarter without a sale is a long time on a shelf
            slow_moving_days: 60,
            sales_analysis_days: 30,
            overstock_days: 180,
            category_analysis_days: 30,
            understock_days: 14,
        }
    }
}

impl InventorySettings {
    /// New record with every field present in `patch` taking its value
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        Self {
            slow_moving_limit: patch.slow_moving_limit.unwrap_or(self.slow_moving_limit),
            stock_analysis_limit: patch
                .stock_analysis_limit
                .unwrap_or(self.stock_analysis_limit),
            dead_stock_days: patch.dead_stock_days.unwrap_or(self.dead_stock_days),
            slow_moving_days: patch.slow_moving_days.unwrap_or(self.slow_moving_days),
            sales_analysis_days: patch.sales_analysis_days.unwrap_or(self.sales_analysis_days),
            overstock_days: patch.overstock_days.unwrap_or(self.overstock_days),
            category_analysis_days: patch
                .category_analysis_days
                .unwrap_or(self.category_analysis_days),
            understock_days: patch.understock_days.unwrap_or(self.understock_days),
        }
    }

    pub fn get(&self, field: SettingsField) -> u32 {
        match field {
            SettingsField::SlowMovingLimit => self.slow_moving_limit,
            SettingsField::StockAnalysisLimit => self.stock_analysis_limit,
            SettingsField::DeadStockDays => self.dead_stock_days,
            SettingsField::SlowMovingDays => self.slow_moving_days,
            SettingsField::SalesAnalysisDays => self.sales_analysis_days,
            SettingsField::OverstockDays => self.overstock_days,
            SettingsField::CategoryAnalysisDays => self.category_analysis_days,
            SettingsField::UnderstockDays => self.understock_days,
        }
    }

    /// Check every field against its bounds
    pub fn validate(&self) -> Vec<String> {
        validate(&SettingsPatch::from(self))
    }
}

/// Some subset of the settings fields
///
/// This is also the shape we read back from storage, which is what lets
/// records written by older versions (missing newer fields) load cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_moving_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_analysis_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_stock_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_moving_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_analysis_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overstock_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_analysis_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub understock_days: Option<u32>,
}

impl SettingsPatch {
    pub fn get(&self, field: SettingsField) -> Option<u32> {
        match field {
            SettingsField::SlowMovingLimit => self.slow_moving_limit,
            SettingsField::StockAnalysisLimit => self.stock_analysis_limit,
            SettingsField::DeadStockDays => self.dead_stock_days,
            SettingsField::SlowMovingDays => self.slow_moving_days,
            SettingsField::SalesAnalysisDays => self.sales_analysis_days,
            SettingsField::OverstockDays => self.overstock_days,
            SettingsField::CategoryAnalysisDays => self.category_analysis_days,
            SettingsField::UnderstockDays => self.understock_days,
        }
    }

    pub fn is_empty(&self) -> bool {
        SettingsField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    pub fn validate(&self) -> Vec<String> {
        validate(self)
    }
}

impl From<&InventorySettings> for SettingsPatch {
    fn from(settings: &InventorySettings) -> Self {
        Self {
            slow_moving_limit: Some(settings.slow_moving_limit),
            stock_analysis_limit: Some(settings.stock_analysis_limit),
            dead_stock_days: Some(settings.dead_stock_days),
            slow_moving_days: Some(settings.slow_moving_days),
            sales_analysis_days: Some(settings.sales_analysis_days),
            overstock_days: Some(settings.overstock_days),
            category_analysis_days: Some(settings.category_analysis_days),
            understock_days: Some(settings.understock_days),
        }
    }
}

/// One settings field, in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsField {
    SlowMovingLimit,
    StockAnalysisLimit,
    DeadStockDays,
    SlowMovingDays,
    SalesAnalysisDays,
    OverstockDays,
    CategoryAnalysisDays,
    UnderstockDays,
}

impl SettingsField {
    pub const ALL: [SettingsField; 8] = [
        SettingsField::SlowMovingLimit,
        SettingsField::StockAnalysisLimit,
        SettingsField::DeadStockDays,
        SettingsField::SlowMovingDays,
        SettingsField::SalesAnalysisDays,
        SettingsField::OverstockDays,
        SettingsField::CategoryAnalysisDays,
        SettingsField::UnderstockDays,
    ];

    /// Name of the field in the persisted JSON
    pub fn key(&self) -> &'static str {
        match self {
            SettingsField::SlowMovingLimit => "slowMovingLimit",
            SettingsField::StockAnalysisLimit => "stockAnalysisLimit",
            SettingsField::DeadStockDays => "deadStockDays",
            SettingsField::SlowMovingDays => "slowMovingDays",
            SettingsField::SalesAnalysisDays => "salesAnalysisDays",
            SettingsField::OverstockDays => "overstockDays",
            SettingsField::CategoryAnalysisDays => "categoryAnalysisDays",
            SettingsField::UnderstockDays => "understockDays",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SettingsField::SlowMovingLimit => "Slow moving limit",
            SettingsField::StockAnalysisLimit => "Stock analysis limit",
            SettingsField::DeadStockDays => "Dead stock days",
            SettingsField::SlowMovingDays => "Slow moving days",
            SettingsField::SalesAnalysisDays => "Sales analysis days",
            SettingsField::OverstockDays => "Overstock days",
            SettingsField::CategoryAnalysisDays => "Category analysis days",
            SettingsField::UnderstockDays => "Understock days",
        }
    }

    /// Inclusive (min, max) range
    pub fn bounds(&self) -> (u32, u32) {
        match self {
            SettingsField::SlowMovingLimit | SettingsField::StockAnalysisLimit => (1, 1000),
            SettingsField::UnderstockDays => (1, 90),
            _ => (1, 365),
        }
    }

    pub fn accepts(&self, value: u32) -> bool {
        let (min, max) = self.bounds();
        (min..=max).contains(&value)
    }

    fn range_message(&self) -> String {
        let (min, max) = self.bounds();
        format!("{} must be between {} and {}", self.label(), min, max)
    }
}

/// Check the fields present in `patch` against their ranges
///
/// One message per out-of-range field, in declaration order. Absent fields
/// are not checked, so an empty patch is always valid.
pub fn validate(patch: &SettingsPatch) -> Vec<String> {
    SettingsField::ALL
        .iter()
        .filter_map(|field| {
            let value = patch.get(*field)?;
            (!field.accepts(value)).then(|| field.range_message())
        })
        .collect()
}

/// Loads, saves and resets the settings record in some storage
///
/// `load`, `save` and `reset` never fail: storage problems are logged and we
/// fall back to defaults. The `try_*` versions hand the error back instead.
pub struct SettingsStore<S> {
    storage: S,
}

impl<S: KeyValueStore> SettingsStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Current settings, defaults if nothing usable is stored
    pub fn load(&self) -> InventorySettings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not load inventory settings, using defaults: {}", e);
                InventorySettings::default()
            }
        }
    }

    pub fn try_load(&self) -> Result<InventorySettings> {
        let Some(raw) = self.storage.get(SETTINGS_KEY)? else {
            debug!("No stored inventory settings, using defaults");
            return Ok(InventorySettings::default());
        };

        let patch = parse_stored(&raw)?;
        Ok(InventorySettings::default().merged(&patch))
    }

    /// Persist the whole record. Failures are logged and swallowed.
    pub fn save(&self, settings: &InventorySettings) {
        if let Err(e) = self.try_save(settings) {
            warn!("Could not save inventory settings: {}", e);
        }
    }

    pub fn try_save(&self, settings: &InventorySettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        self.storage.set(SETTINGS_KEY, &json)?;
        debug!("Saved inventory settings");
        Ok(())
    }

    /// Forget the stored record and hand back the defaults
    pub fn reset(&self) -> InventorySettings {
        match self.try_reset() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Could not clear stored inventory settings: {}", e);
                InventorySettings::default()
            }
        }
    }

    pub fn try_reset(&self) -> Result<InventorySettings> {
        self.storage.remove(SETTINGS_KEY)?;
        info!("Inventory settings reset to defaults");
        Ok(InventorySettings::default())
    }

    /// Validate `patch`, merge it over the current settings and persist
    ///
    /// Nothing is written when validation fails.
    pub fn update(&self, patch: &SettingsPatch) -> Result<InventorySettings> {
        let problems = validate(patch);
        if !problems.is_empty() {
            return Err(Error::InvalidSettings(problems));
        }

        let updated = self.load().merged(patch);
        self.try_save(&updated)?;
        Ok(updated)
    }
}

fn parse_stored(raw: &str) -> Result<SettingsPatch> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        return Err(Error::ConfigError(
            "stored inventory settings are not a JSON object".to_string(),
        ));
    }
    Ok(serde_json::from_value(value)?)
}
