//! Output tables and the CSV writer.
//!
//! Each table lands in `<dir>/<TableName>.csv`. The header comes from the
//! first record's fields, in declaration order, and every later record must
//! carry exactly the same fields.

use crate::factors::EmissionFactorType;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Publisher {
    pub name: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub publisher_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataSource {
    pub datasource_name: String,
    pub dataset_name: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub publisher_id: Uuid,
    pub datasource_id: Uuid,
}

/// One fully expanded row of `EmissionsFactor.csv`
#[derive(Debug, Clone, Serialize)]
pub struct EmissionsFactorRecord {
    pub actor_id: String,
    pub actor_name: String,
    pub datasource_name: String,
    pub year: Option<i32>,
    pub comments: Option<String>,
    pub emission_factor_type: EmissionFactorType,
    pub gas: String,
    pub emission_factor_value: f64,
    #[serde(rename = "GPC_refno")]
    pub gpc_refno: String,
    pub methodology_name: String,
    pub dataset_name: String,
    pub units: String,
    pub metadata: String,
    pub emissions_factor_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataSourceEmissionsFactor {
    pub datasource_id: Uuid,
    pub emissions_factor_id: Uuid,
}

/// Path of a table inside the output directory
pub fn table_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{}.csv", table))
}

/// Write a single-record table
pub fn write_record<T: Serialize>(dir: &Path, table: &str, record: &T) -> Result<usize> {
    write_table(dir, table, std::slice::from_ref(record))
}

/// Write a table of records, creating `dir` if needed
pub fn write_table<T: Serialize>(dir: &Path, table: &str, records: &[T]) -> Result<usize> {
    if records.is_empty() {
        anyhow::bail!("SCHEMA: table '{}' has no records to derive a header from", table);
    }

    let rows = records
        .iter()
        .enumerate()
        .map(|(idx, record)| to_fields(table, idx, record))
        .collect::<Result<Vec<_>>>()?;

    let header: Vec<String> = rows[0].keys().cloned().collect();

    for (idx, row) in rows.iter().enumerate().skip(1) {
        let same_fields =
            row.len() == header.len() && header.iter().all(|field| row.contains_key(field));
        if !same_fields {
            anyhow::bail!(
                "SCHEMA: record {} of table '{}' has fields {:?}, expected {:?}",
                idx,
                table,
                row.keys().collect::<Vec<_>>(),
                header
            );
        }
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let path = table_path(dir, table);
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(&header)?;
    for row in &rows {
        writer.write_record(header.iter().map(|field| field_text(&row[field])))?;
    }
    writer.flush()?;

    info!(table, path = %path.display(), rows = rows.len(), "table written");
    Ok(rows.len())
}

fn to_fields<T: Serialize>(table: &str, idx: usize, record: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(record)
        .with_context(|| format!("Failed to serialize record {} of table '{}'", idx, table))?
    {
        Value::Object(fields) => Ok(fields),
        other => anyhow::bail!(
            "SCHEMA: record {} of table '{}' is not a record: {}",
            idx,
            table,
            other
        ),
    }
}

fn field_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_write_single_record() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher {
            name: "CarbonFootPrint Ltd".to_string(),
            url: "https://www.carbonfootprint.com/".to_string(),
            publisher_id: Uuid::nil(),
        };

        let written = write_record(dir.path(), "Publisher", &publisher).unwrap();
        assert_eq!(written, 1);

        let content = read(&table_path(dir.path(), "Publisher"));
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("name,URL,publisher_id"));
        assert_eq!(
            lines.next(),
            Some("CarbonFootPrint Ltd,https://www.carbonfootprint.com/,00000000-0000-0000-0000-000000000000")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("data_processed").join("CarbonFootPrint_2023");

        let link = DataSourceEmissionsFactor {
            datasource_id: Uuid::nil(),
            emissions_factor_id: Uuid::nil(),
        };
        write_table(&nested, "DataSourceEmissionsFactor", &[link.clone(), link]).unwrap();

        let content = read(&table_path(&nested, "DataSourceEmissionsFactor"));
        assert_eq!(content.lines().count(), 3);
        assert!(content.starts_with("datasource_id,emissions_factor_id\n"));
    }

    #[test]
    fn test_emissions_factor_header_order() {
        let dir = tempfile::tempdir().unwrap();
        let record = EmissionsFactorRecord {
            actor_id: "AU-TAS".to_string(),
            actor_name: "Tasmania".to_string(),
            datasource_name: "Carbon Footprint Ltd".to_string(),
            year: None,
            comments: None,
            emission_factor_type: EmissionFactorType::GridSupplyEnergyConsumed,
            gas: "CO2".to_string(),
            emission_factor_value: 1.0,
            gpc_refno: "I.1.2".to_string(),
            methodology_name: "modeled_data".to_string(),
            dataset_name: "GHG Factors for International Grid Electricity".to_string(),
            units: "kg/kWh".to_string(),
            metadata: "CO2e_value:1.25".to_string(),
            emissions_factor_id: Uuid::nil(),
        };

        write_record(dir.path(), "EmissionsFactor", &record).unwrap();
        let content = read(&table_path(dir.path(), "EmissionsFactor"));
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("actor_id,actor_name,datasource_name,year,comments,emission_factor_type,gas,emission_factor_value,GPC_refno,methodology_name,dataset_name,units,metadata,emissions_factor_id")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("AU-TAS,Tasmania,Carbon Footprint Ltd,,,grid_supply_energy_consumed,CO2,1.0,I.1.2,"));
    }

    #[test]
    fn test_mismatched_fields_fail() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![json!({"a": 1, "b": 2}), json!({"a": 1, "c": 3})];

        let result = write_table(dir.path(), "Mixed", &records);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("SCHEMA"));
        assert!(!table_path(dir.path(), "Mixed").exists());
    }

    #[test]
    fn test_extra_field_fails() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![json!({"a": 1}), json!({"a": 1, "b": 2})];
        assert!(write_table(dir.path(), "Extra", &records).is_err());
    }

    #[test]
    fn test_empty_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<DataSourceEmissionsFactor> = Vec::new();
        let result = write_table(dir.path(), "Empty", &records);
        assert!(result.unwrap_err().to_string().contains("SCHEMA"));
    }

    #[test]
    fn test_non_record_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_table(dir.path(), "Scalars", &[1, 2, 3]);
        assert!(result.unwrap_err().to_string().contains("not a record"));
    }
}
