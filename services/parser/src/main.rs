//! Emission Factors Parser - Normalizes the CarbonFootprint 2023 grid
//! electricity workbook into seed tables
//!
//! Responsibilities:
//! - Read the country, Canada, US and Australia sheets
//! - Normalize each sheet to one row per jurisdiction and factor type
//! - Expand rows per gas, GPC reference number and methodology
//! - Write Publisher, DataSource, EmissionsFactor and
//!   DataSourceEmissionsFactor CSV tables
//!
//! Same workbook + same seed = same output, ids included.

mod factors;
mod ids;
mod output;
mod sheets;

use anyhow::{Context, Result};
use calamine::open_workbook_auto;
use clap::Parser;
use factors::{RawFactorRow, DATASET_NAME, LEGACY_METHODOLOGIES, METHODOLOGIES};
use ids::{name_based_id, IdGenerator};
use output::{DataSource, DataSourceEmissionsFactor, EmissionsFactorRecord, Publisher};
use std::path::PathBuf;
use tracing::{info, warn};

const PUBLISHER_NAME: &str = "CarbonFootPrint Ltd";
const PUBLISHER_URL: &str = "https://www.carbonfootprint.com/";
const DATASOURCE_NAME: &str = "CarbonFootPrint";
const DATASOURCE_URL: &str = "https://www.carbonfootprint.com/international_electricity_factors.html";

#[derive(Parser, Debug)]
#[command(name = "ef-parser", about = "Normalizes grid electricity emission factors into seed tables")]
struct Args {
    /// Path to the international factors workbook (xlsx)
    #[arg(long, env = "EF_INPUT_FILE")]
    input: PathBuf,

    /// Directory the CSV tables are written to
    #[arg(long, env = "EF_OUTPUT_DIR", default_value = "./data_processed/CarbonFootPrint_2023")]
    output_dir: PathBuf,

    /// Seed string for reproducible emissions factor ids
    #[arg(long, env = "EF_SEED", default_value = "EmissionsFactor.csv")]
    seed: String,

    /// Use the methodology list of the 2023 release, merged entry included
    #[arg(long, default_value = "false")]
    legacy_methodology_names: bool,

    /// Dry run - parse and expand, but write nothing
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

/// Counts reported at the end of a run
#[derive(Debug, Default, PartialEq)]
struct RunSummary {
    sheet_rows: Vec<(&'static str, usize)>,
    unresolved: usize,
    emissions_factors: usize,
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();
}

fn publisher() -> Publisher {
    Publisher {
        name: PUBLISHER_NAME.to_string(),
        url: PUBLISHER_URL.to_string(),
        publisher_id: name_based_id(PUBLISHER_NAME),
    }
}

fn datasource(publisher: &Publisher) -> DataSource {
    DataSource {
        datasource_name: DATASOURCE_NAME.to_string(),
        dataset_name: DATASET_NAME.to_string(),
        url: DATASOURCE_URL.to_string(),
        publisher_id: publisher.publisher_id,
        datasource_id: name_based_id(DATASET_NAME),
    }
}

/// Concatenate sheets in order, dropping rows without a jurisdiction
fn union_rows(sheets: Vec<Vec<RawFactorRow>>) -> (Vec<RawFactorRow>, usize) {
    let all: Vec<RawFactorRow> = sheets.into_iter().flatten().collect();
    let total = all.len();
    let resolved: Vec<RawFactorRow> = all.into_iter().filter(|r| r.actor_id.is_some()).collect();
    let unresolved = total - resolved.len();
    (resolved, unresolved)
}

fn link_rows(
    datasource: &DataSource,
    records: &[EmissionsFactorRecord],
) -> Vec<DataSourceEmissionsFactor> {
    records
        .iter()
        .map(|record| DataSourceEmissionsFactor {
            datasource_id: datasource.datasource_id,
            emissions_factor_id: record.emissions_factor_id,
        })
        .collect()
}

fn run(args: &Args) -> Result<RunSummary> {
    // Seed before any id is drawn
    let mut ids = IdGenerator::seeded(&args.seed);

    let publisher = publisher();
    let datasource = datasource(&publisher);

    info!(path = %args.input.display(), "opening workbook");
    let mut workbook = open_workbook_auto(&args.input)
        .with_context(|| format!("Failed to open workbook {}", args.input.display()))?;

    let mut summary = RunSummary::default();
    let mut normalized_sheets = Vec::new();
    for rules in &sheets::ALL_SHEETS {
        let rows = sheets::load_sheet(&mut workbook, rules.sheet_name)?;
        let normalized = sheets::normalize_sheet(rules, &rows)?;
        info!(sheet = rules.sheet_name, rows = normalized.len(), "sheet normalized");
        summary.sheet_rows.push((rules.sheet_name, normalized.len()));
        normalized_sheets.push(normalized);
    }

    let (rows, unresolved) = union_rows(normalized_sheets);
    if unresolved > 0 {
        warn!(unresolved, "dropped rows without a resolvable jurisdiction");
    }
    summary.unresolved = unresolved;

    let methodologies = if args.legacy_methodology_names {
        LEGACY_METHODOLOGIES
    } else {
        METHODOLOGIES
    };
    let records = factors::expand(&rows, methodologies, &mut ids);
    summary.emissions_factors = records.len();

    if records.is_empty() {
        anyhow::bail!("No emission factors produced from {}", args.input.display());
    }

    if args.dry_run {
        info!(records = records.len(), "dry run - no tables written");
        return Ok(summary);
    }

    let dir = &args.output_dir;
    output::write_record(dir, "Publisher", &publisher)?;
    output::write_record(dir, "DataSource", &datasource)?;
    output::write_table(dir, "EmissionsFactor", &records)?;
    output::write_table(dir, "DataSourceEmissionsFactor", &link_rows(&datasource, &records))?;

    Ok(summary)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();
    let args = Args::parse();

    info!(
        input = %args.input.display(),
        output_dir = %args.output_dir.display(),
        seed = %args.seed,
        mode = if args.dry_run { "dry-run" } else { "live" },
        "starting emission factors parser"
    );

    let summary = run(&args)?;

    for (sheet, rows) in &summary.sheet_rows {
        info!(sheet, rows, "sheet summary");
    }
    info!(
        unresolved = summary.unresolved,
        emissions_factors = summary.emissions_factors,
        "parsing complete"
    );

    Ok(())
}
