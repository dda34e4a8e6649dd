//! Per-sheet normalization of the CarbonFootprint international factors
//! workbook.
//!
//! Layout conventions:
//! - the first row of a sheet is its header row
//! - blank header cells are named `Unnamed: <column index>`
//! - `skip_rows` counts non-blank rows after the header
//!
//! Column counts are checked after dropping placeholder columns and before
//! renaming. A mismatch means the workbook layout changed, and renaming by
//! position would silently shift values into the wrong fields.

use crate::factors::{format_float, EmissionFactorType, RawFactorRow};
use anyhow::{Context, Result};
use calamine::{Data, Reader, Sheets};
use std::io::{Read, Seek};
use tracing::{debug, warn};

/// How a sheet identifies its jurisdiction
#[derive(Debug, Clone, Copy)]
pub enum Jurisdiction {
    /// `actor_id` and `actor_name` columns, as given
    Columns,
    /// A `Name (CODE)` column, split and prefixed with the country code
    SplitName {
        column: &'static str,
        country_id: &'static str,
    },
    /// `actor_name` looked up in a fixed table
    Lookup(&'static [(&'static str, &'static str)]),
}

#[derive(Debug, Clone, Copy)]
pub struct SheetRules {
    pub sheet_name: &'static str,
    pub drop_columns: &'static [&'static str],
    pub skip_rows: usize,
    pub columns: &'static [&'static str],
    pub measures: &'static [EmissionFactorType],
    pub jurisdiction: Jurisdiction,
    pub fixed_year: Option<i32>,
    pub comment: Option<&'static str>,
}

const TWO_MEASURES: &[EmissionFactorType] = &[
    EmissionFactorType::GridSupplyEnergyConsumed,
    EmissionFactorType::TransmissionAndDistribution,
];

const STATE_COLUMNS: &[&str] = &[
    "name",
    "grid_supply_energy_consumed",
    "transmission_and_distribution",
    "year",
];

pub const AUSTRALIA_STATE_IDS: &[(&str, &str)] = &[
    ("Australian Capital Territory", "AU-ACT"),
    ("New South Wales", "AU-NSW"),
    ("Queensland", "AU-QLD"),
    ("South Australia", "AU-SA"),
    ("Tasmania", "AU-TAS"),
    ("Victoria", "AU-VIC"),
    ("Western Australia", "AU-WA"),
];

pub const COUNTRY: SheetRules = SheetRules {
    sheet_name: "Country 2023 Electricity Factor",
    drop_columns: &[
        "Unnamed: 2",
        "Unnamed: 5",
        "Unnamed: 6",
        "Unnamed: 7",
        "Unnamed: 12",
        "Unnamed: 13",
        "Unnamed: 14",
    ],
    skip_rows: 4,
    columns: &[
        "actor_id",
        "actor_name",
        "grid_supply_energy_consumed",
        "transmission_and_distribution",
        "residual_fuel_mix_factor",
        "datasource_name",
        "year",
        "comments",
    ],
    measures: &[
        EmissionFactorType::GridSupplyEnergyConsumed,
        EmissionFactorType::TransmissionAndDistribution,
        EmissionFactorType::ResidualFuelMixFactor,
    ],
    jurisdiction: Jurisdiction::Columns,
    fixed_year: None,
    comment: None,
};

pub const CANADA: SheetRules = SheetRules {
    sheet_name: "Canada by Province",
    drop_columns: &[],
    skip_rows: 6,
    columns: STATE_COLUMNS,
    measures: TWO_MEASURES,
    jurisdiction: Jurisdiction::SplitName {
        column: "name",
        country_id: "CA",
    },
    fixed_year: Some(2021),
    comment: Some("technical source: Canada Official Greenhouse Gas Inventory"),
};

pub const US: SheetRules = SheetRules {
    sheet_name: "US by State",
    drop_columns: &["Unnamed: 1", "Unnamed: 5", "GGL", "T&D"],
    skip_rows: 5,
    columns: STATE_COLUMNS,
    measures: TWO_MEASURES,
    jurisdiction: Jurisdiction::SplitName {
        column: "name",
        country_id: "US",
    },
    fixed_year: Some(2021),
    comment: Some("technical source: EPA eGrid"),
};

pub const AUSTRALIA: SheetRules = SheetRules {
    sheet_name: "Australia by State",
    drop_columns: &[],
    skip_rows: 5,
    columns: &[
        "actor_name",
        "grid_supply_energy_consumed",
        "transmission_and_distribution",
        "year",
    ],
    measures: TWO_MEASURES,
    jurisdiction: Jurisdiction::Lookup(AUSTRALIA_STATE_IDS),
    fixed_year: None,
    comment: Some("Technical Source: Australian National Greenhouse Accounts Factors"),
};

/// Sheets in union order
pub const ALL_SHEETS: [SheetRules; 4] = [COUNTRY, CANADA, US, AUSTRALIA];

/// Read a sheet as rows of cells, keeping absolute column positions
pub fn load_sheet<RS: Read + Seek>(
    workbook: &mut Sheets<RS>,
    sheet_name: &str,
) -> Result<Vec<Vec<Data>>> {
    let range = workbook
        .worksheet_range(sheet_name)
        .with_context(|| format!("SHEET: failed to read sheet '{}'", sheet_name))?;

    // The range starts at the first used cell; pad so that column indexes
    // match the sheet's.
    let leading = range.start().map(|(_, col)| col as usize).unwrap_or(0);

    Ok(range
        .rows()
        .map(|row| {
            let mut cells = vec![Data::Empty; leading];
            cells.extend(row.iter().cloned());
            cells
        })
        .collect())
}

/// Separate `"Ontario (ON)"` into `("Ontario", Some("CA-ON"))`
pub fn split_name(value: &str, country_id: &str) -> (String, Option<String>) {
    match value.split_once(" (") {
        Some((name, code)) => (
            name.to_string(),
            Some(format!("{}-{}", country_id, code.replace(')', ""))),
        ),
        None => (value.to_string(), None),
    }
}

pub fn lookup_actor_id(table: &[(&str, &str)], actor_name: &str) -> Option<String> {
    table
        .iter()
        .find(|(name, _)| *name == actor_name)
        .map(|(_, id)| id.to_string())
}

static EMPTY: Data = Data::Empty;

/// Jurisdiction and attributes shared by every measure of one data row
struct Actor<'a> {
    actor_id: Option<String>,
    actor_name: String,
    year: Option<i32>,
    comments: Option<String>,
    datasource_name: Option<String>,
    cells: Vec<&'a Data>,
}

/// Normalize one sheet into raw factor rows.
///
/// Rows are melted measure by measure: every row's first measure, then
/// every row's second, and so on.
pub fn normalize_sheet(rules: &SheetRules, rows: &[Vec<Data>]) -> Result<Vec<RawFactorRow>> {
    let header_row = rows
        .first()
        .with_context(|| format!("SHEET: '{}' is empty", rules.sheet_name))?;

    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(idx, cell)| cell_text(Some(cell)).unwrap_or_else(|| format!("Unnamed: {}", idx)))
        .collect();

    for column in rules.drop_columns {
        if !headers.iter().any(|h| h == column) {
            anyhow::bail!(
                "SHEET: '{}' has no column '{}' to drop. Headers: {:?}",
                rules.sheet_name,
                column,
                headers
            );
        }
    }

    let kept: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !rules.drop_columns.contains(&h.as_str()))
        .map(|(idx, _)| idx)
        .collect();

    if kept.len() != rules.columns.len() {
        anyhow::bail!(
            "SHEET: '{}' expected {} columns, found {}. Headers: {:?}",
            rules.sheet_name,
            rules.columns.len(),
            kept.len(),
            headers
        );
    }

    let position = |name: &str| rules.columns.iter().position(|c| *c == name);

    // Fully blank rows are dropped before skipping
    let data_rows = rows
        .iter()
        .skip(1)
        .filter(|row| !row.iter().all(is_blank))
        .skip(rules.skip_rows);

    let mut actors = Vec::new();
    for row in data_rows {
        let cells: Vec<&Data> = kept
            .iter()
            .map(|&idx| row.get(idx).unwrap_or(&EMPTY))
            .collect();

        if cells.iter().all(|cell| is_blank(cell)) {
            continue;
        }

        let column = |name: &str| position(name).map(|i| cells[i]);

        let (actor_name, actor_id) = match rules.jurisdiction {
            Jurisdiction::Columns => (
                cell_text(column("actor_name")).unwrap_or_default(),
                cell_text(column("actor_id")),
            ),
            Jurisdiction::SplitName { column: name_col, country_id } => {
                match cell_text(column(name_col)) {
                    Some(name) => split_name(&name, country_id),
                    None => (String::new(), None),
                }
            }
            Jurisdiction::Lookup(table) => {
                let name = cell_text(column("actor_name")).unwrap_or_default();
                let id = lookup_actor_id(table, &name);
                (name, id)
            }
        };

        let year = rules.fixed_year.or_else(|| cell_year(column("year")));
        let comments = rules
            .comment
            .map(str::to_string)
            .or_else(|| cell_text(column("comments")));
        let datasource_name = cell_text(column("datasource_name"));

        actors.push(Actor {
            actor_id,
            actor_name,
            year,
            comments,
            datasource_name,
            cells,
        });
    }

    let mut out = Vec::new();
    let mut missing_values = 0;

    for measure in rules.measures {
        let idx = position(measure.as_str()).with_context(|| {
            format!(
                "SHEET: '{}' has no '{}' column",
                rules.sheet_name,
                measure.as_str()
            )
        })?;

        for actor in &actors {
            let Some(co2e) = cell_number(actor.cells[idx]) else {
                missing_values += 1;
                continue;
            };

            out.push(RawFactorRow {
                actor_id: actor.actor_id.clone(),
                actor_name: actor.actor_name.clone(),
                year: actor.year,
                emission_factor_type: *measure,
                co2e,
                comments: actor.comments.clone(),
                datasource_name: actor.datasource_name.clone(),
            });
        }
    }

    if missing_values > 0 {
        warn!(
            sheet = rules.sheet_name,
            missing_values, "skipped cells without a numeric CO2e value"
        );
    }
    debug!(sheet = rules.sheet_name, rows = out.len(), "sheet normalized");

    Ok(out)
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_text(cell: Option<&Data>) -> Option<String> {
    match cell? {
        Data::Empty => None,
        Data::String(s) if s.trim().is_empty() => None,
        Data::String(s) => Some(s.trim().to_string()),
        Data::Float(f) => Some(format_float(*f)),
        Data::Int(i) => Some(i.to_string()),
        other => Some(other.to_string()),
    }
}

fn cell_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) if f.is_finite() => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn cell_year(cell: Option<&Data>) -> Option<i32> {
    match cell? {
        Data::Float(f) if f.fract() == 0.0 => Some(*f as i32),
        Data::Int(i) => i32::try_from(*i).ok(),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
