use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use stockdash_cache::SqliteStore;
use stockdash_core::{
    parse_rows, remap_columns, ColumnMapping, Config, DirectorySink, Error, ExportOutcome,
    Exporter, InventorySettings, SettingsField, SettingsPatch, SettingsStore, SheetData,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stockdash")]
#[command(version, about = "Inventory turnover settings and spreadsheet exports", long_about = None)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "STOCKDASH_CONFIG")]
    config: Option<PathBuf>,

    /// Settings database to use instead of the configured one
    #[arg(long, global = true, env = "STOCKDASH_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Inspect or change the inventory turnover settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Export a JSON array of rows to a single-sheet workbook
    Export {
        /// JSON file holding an array of objects
        #[arg(short, long)]
        input: PathBuf,
        /// Base file name, the date and .xlsx get appended
        #[arg(short, long)]
        name: String,
        /// Sheet label (defaults to the configured one)
        #[arg(short, long)]
        sheet: Option<String>,
        /// Keep and rename a column, e.g. --map sku=SKU (repeatable, order matters)
        #[arg(short, long = "map", value_name = "SOURCE=DISPLAY")]
        map: Vec<String>,
        /// Directory to write into (defaults to the configured one)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Export several JSON row files as tabs of one workbook
    ExportMulti {
        /// Base file name, the date and .xlsx get appended
        #[arg(short, long)]
        name: String,
        /// A sheet as LABEL=FILE (repeatable, order is kept)
        #[arg(short, long = "sheet", value_name = "LABEL=FILE", required = true)]
        sheets: Vec<String>,
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Show where config and settings live
    Paths,
}

#[derive(clap::Subcommand)]
enum SettingsAction {
    /// Print the current settings
    Show {
        /// Print as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Check values without saving them
    Validate(FieldArgs),
    /// Validate, merge over the current settings and save
    Set(FieldArgs),
    /// Throw away saved settings and go back to defaults
    Reset,
}

#[derive(clap::Args, Debug, Default)]
struct FieldArgs {
    #[arg(long)]
    slow_moving_limit: Option<u32>,
    #[arg(long)]
    stock_analysis_limit: Option<u32>,
    #[arg(long)]
    dead_stock_days: Option<u32>,
    #[arg(long)]
    slow_moving_days: Option<u32>,
    #[arg(long)]
    sales_analysis_days: Option<u32>,
    #[arg(long)]
    overstock_days: Option<u32>,
    #[arg(long)]
    category_analysis_days: Option<u32>,
    #[arg(long)]
    understock_days: Option<u32>,
}

impl From<FieldArgs> for SettingsPatch {
    fn from(args: FieldArgs) -> Self {
        SettingsPatch {
            slow_moving_limit: args.slow_moving_limit,
            stock_analysis_limit: args.stock_analysis_limit,
            dead_stock_days: args.dead_stock_days,
            slow_moving_days: args.slow_moving_days,
            sales_analysis_days: args.sales_analysis_days,
            overstock_days: args.overstock_days,
            category_analysis_days: args.category_analysis_days,
            understock_days: args.understock_days,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging - helps when things go sideways
    // Logs go to stderr so `settings show --json` output stays pipeable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockdash=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    match cli.command {
        Some(Commands::Settings { action }) => {
            run_settings(action, &config, cli.database.as_deref())?;
        }
        Some(Commands::Export {
            input,
            name,
            sheet,
            map,
            out_dir,
        }) => {
            tracing::info!("Exporting {} as {}", input.display(), name);
            let mut rows = read_rows(&input)?;

            if !map.is_empty() {
                let mapping = map
                    .iter()
                    .map(|pair| ColumnMapping::parse_pair(pair))
                    .collect::<Result<ColumnMapping, Error>>()?;
                rows = remap_columns(&rows, &mapping);
            }

            let sheet = sheet.unwrap_or_else(|| config.export.default_sheet_label.clone());
            let exporter = exporter_for(&config, out_dir);
            let outcome = exporter.export_single(&rows, &name, &sheet)?;
            report(&exporter, &outcome);
        }
        Some(Commands::ExportMulti {
            name,
            sheets,
            out_dir,
        }) => {
            let mut data = Vec::with_capacity(sheets.len());
            for entry in &sheets {
                let Some((label, file)) = entry.split_once('=') else {
                    bail!("Invalid sheet '{}', expected LABEL=FILE", entry);
                };
                data.push(SheetData::new(label, read_rows(Path::new(file))?));
            }

            let exporter = exporter_for(&config, out_dir);
            let outcome = exporter.export_multiple(&data, &name)?;
            report(&exporter, &outcome);
        }
        Some(Commands::Paths) => {
            match &cli.config {
                Some(path) => println!("config:   {}", path.display()),
                None => println!("config:   {}", Config::config_path()?.display()),
            }
            println!("database: {}", database_path(&config, cli.database.as_deref())?.display());
            println!("exports:  {}", config.export.output_dir.display());
        }
        None => {
            println!("No command specified. Try --help");
        }
    }

    Ok(())
}

fn run_settings(
    action: SettingsAction,
    config: &Config,
    database: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        // Validation is pure, no need to touch storage for it
        SettingsAction::Validate(fields) => {
            let problems = SettingsPatch::from(fields).validate();
            if problems.is_empty() {
                println!("Settings are valid");
                return Ok(());
            }
            for problem in &problems {
                println!("  - {}", problem);
            }
            bail!("{} setting(s) out of range", problems.len());
        }
        SettingsAction::Show { json } => {
            let settings = open_store(config, database)?.load();
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                print_settings(&settings);
            }
        }
        SettingsAction::Set(fields) => {
            let patch = SettingsPatch::from(fields);
            if patch.is_empty() {
                bail!("Nothing to set. Pass at least one field, see `stockdash settings set --help`");
            }
            match open_store(config, database)?.update(&patch) {
                Ok(settings) => {
                    println!("Settings saved");
                    print_settings(&settings);
                }
                Err(Error::InvalidSettings(problems)) => {
                    for problem in &problems {
                        println!("  - {}", problem);
                    }
                    bail!("{} setting(s) out of range, nothing saved", problems.len());
                }
                Err(e) => return Err(e).context("Failed to save settings"),
            }
        }
        SettingsAction::Reset => {
            let settings = open_store(config, database)?
                .try_reset()
                .context("Failed to reset settings")?;
            println!("Settings reset to defaults");
            print_settings(&settings);
        }
    }

    Ok(())
}

fn open_store(
    config: &Config,
    database: Option<&Path>,
) -> anyhow::Result<SettingsStore<SqliteStore>> {
    let db_path = database_path(config, database)?;
    let storage = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open settings database {}", db_path.display()))?;
    Ok(SettingsStore::new(storage))
}

fn database_path(config: &Config, override_path: Option<&Path>) -> anyhow::Result<PathBuf> {
    match override_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(config.database_path()?),
    }
}

fn read_rows(path: &Path) -> anyhow::Result<Vec<stockdash_core::Row>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_rows(&contents).with_context(|| format!("Failed to parse rows from {}", path.display()))
}

fn exporter_for(config: &Config, out_dir: Option<PathBuf>) -> Exporter<DirectorySink> {
    let dir = out_dir.unwrap_or_else(|| config.export.output_dir.clone());
    Exporter::with_options(DirectorySink::new(dir), config.export.options())
}

fn report(exporter: &Exporter<DirectorySink>, outcome: &ExportOutcome) {
    match outcome {
        ExportOutcome::Delivered { file_name, sheets } => {
            println!(
                "Wrote {} ({})",
                exporter.sink().path_for(file_name).display(),
                sheets.join(", ")
            );
        }
        ExportOutcome::Skipped => println!("Nothing to export"),
    }
}

fn print_settings(settings: &InventorySettings) {
    for field in SettingsField::ALL {
        let (min, max) = field.bounds();
        println!(
            "  {:<24} {:>5}   ({}..={})",
            field.label(),
            settings.get(field),
            min,
            max
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_field_args_become_patch() {
        let cli = Cli::parse_from([
            "stockdash",
            "settings",
            "set",
            "--dead-stock-days",
            "120",
            "--understock-days",
            "7",
        ]);

        let Some(Commands::Settings {
            action: SettingsAction::Set(fields),
        }) = cli.command
        else {
            panic!("expected settings set");
        };

        let patch = SettingsPatch::from(fields);
        assert_eq!(patch.dead_stock_days, Some(120));
        assert_eq!(patch.understock_days, Some(7));
        assert_eq!(patch.slow_moving_limit, None);
    }

    #[test]
    fn test_export_map_is_repeatable() {
        let cli = Cli::parse_from([
            "stockdash", "export", "-i", "rows.json", "-n", "stock", "--map", "sku=SKU", "--map",
            "qty=Quantity",
        ]);

        match cli.command {
            Some(Commands::Export { map, sheet, .. }) => {
                assert_eq!(map, vec!["sku=SKU", "qty=Quantity"]);
                assert!(sheet.is_none());
            }
            _ => panic!("expected export"),
        }
    }
}
