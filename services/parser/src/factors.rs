//! Fixed lookup tables and the gas / GPC / methodology expansion.
//!
//! Every normalized row fans out in three explicit steps, in this order:
//! one row per gas, then one per GPC reference number, then one per
//! methodology. Identifiers are drawn in that same order, so a seeded run
//! reproduces them exactly.

use crate::ids::IdGenerator;
use crate::output::EmissionsFactorRecord;
use serde::Serialize;

pub const DATASET_NAME: &str = "GHG Factors for International Grid Electricity";
pub const DATASOURCE_LABEL: &str = "Carbon Footprint Ltd";
pub const UNITS: &str = "kg/kWh";

/// Kind of factor a spreadsheet measure column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionFactorType {
    GridSupplyEnergyConsumed,
    TransmissionAndDistribution,
    ResidualFuelMixFactor,
}

impl EmissionFactorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GridSupplyEnergyConsumed => "grid_supply_energy_consumed",
            Self::TransmissionAndDistribution => "transmission_and_distribution",
            Self::ResidualFuelMixFactor => "residual_fuel_mix_factor",
        }
    }

    /// GPC reference numbers this factor applies to
    pub fn gpc_refnos(&self) -> &'static [&'static str] {
        match self {
            Self::GridSupplyEnergyConsumed => GRID_SUPPLY_GPC_REFNOS,
            Self::TransmissionAndDistribution => TRANSMISSION_GPC_REFNOS,
            Self::ResidualFuelMixFactor => &[],
        }
    }
}

const GRID_SUPPLY_GPC_REFNOS: &[&str] = &[
    "I.1.2", "I.2.2", "I.3.2", "I.4.2", "I.5.2", "I.6.2", "II.1.2", "II.2.2", "II.3.2", "II.4.2",
];

const TRANSMISSION_GPC_REFNOS: &[&str] = &[
    "I.1.3", "I.2.3", "I.3.3", "I.4.3", "I.5.3", "I.6.3", "II.1.3", "II.2.3", "II.3.3", "II.4.3",
];

/// Global warming potential of one gas and its share of the CO2e total
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasShare {
    pub gas: &'static str,
    pub gwp: f64,
    pub portion: f64,
}

/// AR6 (2021), 100-year horizon. Portions sum to 1.0.
pub const GWP_100_YEARS: [GasShare; 3] = [
    GasShare { gas: "CO2", gwp: 1.0, portion: 0.80 },
    GasShare { gas: "CH4", gwp: 29.8, portion: 0.15 },
    GasShare { gas: "N2O", gwp: 273.0, portion: 0.05 },
];

/// Stationary energy methodologies
pub const METHODOLOGIES: &[&str] = &[
    "electricity_consumption",
    "energy_consumption",
    "sampling_scaled_data",
    "modeled_data",
];

/// Methodology list as published in the 2023 release. The second entry is
/// two names run together; kept only to reproduce those files.
pub const LEGACY_METHODOLOGIES: &[&str] = &[
    "electricity_consumption",
    "energy_consumptionsampling_scaled_data",
    "modeled_data",
];

/// One normalized spreadsheet row, before gas expansion
#[derive(Debug, Clone, PartialEq)]
pub struct RawFactorRow {
    pub actor_id: Option<String>,
    pub actor_name: String,
    pub year: Option<i32>,
    pub emission_factor_type: EmissionFactorType,
    pub co2e: f64,
    pub comments: Option<String>,
    pub datasource_name: Option<String>,
}

/// A raw row attributed to a single gas
#[derive(Debug, Clone, PartialEq)]
pub struct GasExpandedRow<'a> {
    pub actor_id: &'a str,
    pub gas: &'static str,
    pub emission_factor_value: f64,
}

/// Splits a row's CO2e into one row per gas. Rows without an actor_id
/// produce nothing.
pub fn expand_gases(row: &RawFactorRow) -> Vec<GasExpandedRow<'_>> {
    let Some(actor_id) = row.actor_id.as_deref() else {
        return Vec::new();
    };

    GWP_100_YEARS
        .iter()
        .map(|share| GasExpandedRow {
            actor_id,
            gas: share.gas,
            emission_factor_value: share.portion * row.co2e / share.gwp,
        })
        .collect()
}

/// Full Cartesian expansion: gas x GPC_refno x methodology
pub fn expand(
    rows: &[RawFactorRow],
    methodologies: &[&str],
    ids: &mut IdGenerator,
) -> Vec<EmissionsFactorRecord> {
    let mut records = Vec::new();

    for row in rows {
        let metadata = format!("CO2e_value:{}", format_float(round_to(row.co2e, 3)));

        for gas_row in expand_gases(row) {
            for gpc_refno in row.emission_factor_type.gpc_refnos() {
                for methodology in methodologies {
                    records.push(EmissionsFactorRecord {
                        actor_id: gas_row.actor_id.to_string(),
                        actor_name: row.actor_name.clone(),
                        datasource_name: DATASOURCE_LABEL.to_string(),
                        year: row.year,
                        comments: row.comments.clone(),
                        emission_factor_type: row.emission_factor_type,
                        gas: gas_row.gas.to_string(),
                        emission_factor_value: gas_row.emission_factor_value,
                        gpc_refno: gpc_refno.to_string(),
                        methodology_name: methodology.to_string(),
                        dataset_name: DATASET_NAME.to_string(),
                        units: UNITS.to_string(),
                        metadata: metadata.clone(),
                        emissions_factor_id: ids.next_id(),
                    });
                }
            }
        }
    }

    records
}

/// Round to `decimals` places, ties to even
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}

/// Shortest round-trip form, keeping ".0" on integral values
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
