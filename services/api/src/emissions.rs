//! Citywide emissions lookup by source, locode, year and GPC reference number.

use crate::{AppState, ErrorResponse};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};

const GPC_QUALITY: &str = "high";

// ============================================================================
// Rows and path params
// ============================================================================

/// A `citywide_emissions` row, reduced to the columns the response uses
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct EmissionRecord {
    pub gas_name: String,
    pub emissions_value: f64,
    pub temporal_granularity: Option<String>,
    pub activity_name: Option<String>,
    pub activity_value: Option<f64>,
    pub activity_units: Option<String>,
    pub emission_factor_value: Option<f64>,
    pub emission_factor_units: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmissionsPath {
    pub source_name: String,
    pub locode: String,
    pub year: i32,
    #[serde(rename = "GPC_refno")]
    pub gpc_refno: String,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize, PartialEq)]
pub struct EmissionsSummary {
    pub totals: Totals,
    pub city_emissions_details: CityEmissionsDetails,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Totals {
    pub emissions: GasMasses,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct GasMasses {
    pub co2_mass: String,
    pub ch4_mass: String,
    pub n2o_mass: String,
    pub gpc_quality: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CityEmissionsDetails {
    pub temporal_granularity: String,
    pub activity_name: String,
    pub activity_value: String,
    pub activity_units: String,
    pub gas_name: String,
    pub emission_factor_value: String,
    pub emission_factor_units: String,
}

// ============================================================================
// Query and reshape
// ============================================================================

/// Rows are ordered so the "last row" used for details is deterministic
pub async fn fetch_emissions(
    pool: &PgPool,
    path: &EmissionsPath,
) -> Result<Vec<EmissionRecord>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT gas_name, emissions_value, temporal_granularity, activity_name,
               activity_value, activity_units, emission_factor_value, emission_factor_units
        FROM citywide_emissions
        WHERE source_name = $1
          AND "GPC_refno" = $2
          AND locode = $3
          AND year = $4
        ORDER BY gas_name, emissions_value
        "#,
    )
    .bind(&path.source_name)
    .bind(&path.gpc_refno)
    .bind(&path.locode)
    .bind(path.year)
    .fetch_all(pool)
    .await
}

/// Reshape matching rows; `None` when there are none.
///
/// A gas that appears more than once takes the mass of its last row.
pub fn summarize(records: &[EmissionRecord]) -> Option<EmissionsSummary> {
    let last = records.last()?;

    let (mut co2, mut ch4, mut n2o) = (0.0, 0.0, 0.0);
    for record in records {
        match record.gas_name.as_str() {
            "CO2" => co2 = record.emissions_value,
            "CH4" => ch4 = record.emissions_value,
            "N2O" => n2o = record.emissions_value,
            _ => {}
        }
    }

    Some(EmissionsSummary {
        totals: Totals {
            emissions: GasMasses {
                co2_mass: format_float(co2),
                ch4_mass: format_float(ch4),
                n2o_mass: format_float(n2o),
                gpc_quality: GPC_QUALITY.to_string(),
            },
        },
        city_emissions_details: CityEmissionsDetails {
            temporal_granularity: text(&last.temporal_granularity),
            activity_name: text(&last.activity_name),
            activity_value: number(last.activity_value),
            activity_units: text(&last.activity_units),
            gas_name: last.gas_name.clone(),
            emission_factor_value: number(last.emission_factor_value),
            emission_factor_units: text(&last.emission_factor_units),
        },
    })
}

/// Map a query outcome to an HTTP response
pub fn respond(result: Result<Vec<EmissionRecord>, sqlx::Error>) -> Response {
    match result {
        Ok(records) => match summarize(&records) {
            Some(summary) => Json(summary).into_response(),
            None => {
                debug!("no citywide emissions match");
                (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse {
                        detail: "No data available".to_string(),
                    }),
                )
                    .into_response()
            }
        },
        Err(e) => {
            error!(error = %e, "citywide emissions query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    detail: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub async fn emissions_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<EmissionsPath>,
) -> impl IntoResponse {
    debug!(
        source_name = %path.source_name,
        locode = %path.locode,
        year = path.year,
        gpc_refno = %path.gpc_refno,
        "citywide emissions lookup"
    );
    respond(fetch_emissions(&state.pool, &path).await)
}

/// Shortest round-trip form, keeping ".0" on integral values
fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number(value: Option<f64>) -> String {
    value.map(format_float).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(gas: &str, value: f64) -> EmissionRecord {
        EmissionRecord {
            gas_name: gas.to_string(),
            emissions_value: value,
            temporal_granularity: Some("annual".to_string()),
            activity_name: Some("electricity consumption".to_string()),
            activity_value: Some(1250.5),
            activity_units: Some("MWh".to_string()),
            emission_factor_value: Some(0.35),
            emission_factor_units: Some("kg/kWh".to_string()),
        }
    }

    // -------------------------------------------------------------------------
    // RESHAPE TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_single_co2_row() {
        let summary = summarize(&[record("CO2", 10.0)]).unwrap();
        let masses = &summary.totals.emissions;
        assert_eq!(masses.co2_mass, "10.0");
        assert_eq!(masses.ch4_mass, "0.0");
        assert_eq!(masses.n2o_mass, "0.0");
        assert_eq!(masses.gpc_quality, "high");
    }

    #[test]
    fn test_all_gases() {
        let records = vec![
            record("CH4", 0.25),
            record("CO2", 1200.0),
            record("N2O", 0.0375),
        ];
        let masses = summarize(&records).unwrap().totals.emissions;
        assert_eq!(masses.co2_mass, "1200.0");
        assert_eq!(masses.ch4_mass, "0.25");
        assert_eq!(masses.n2o_mass, "0.0375");
    }

    #[test]
    fn test_details_come_from_last_row() {
        let mut last = record("N2O", 3.0);
        last.activity_name = Some("fuel combustion".to_string());
        last.emission_factor_value = None;

        let summary = summarize(&[record("CO2", 1.0), last]).unwrap();
        let details = summary.city_emissions_details;
        assert_eq!(details.gas_name, "N2O");
        assert_eq!(details.activity_name, "fuel combustion");
        assert_eq!(details.activity_value, "1250.5");
        assert_eq!(details.temporal_granularity, "annual");
        assert_eq!(details.emission_factor_value, "");
        assert_eq!(details.emission_factor_units, "kg/kWh");
    }

    #[test]
    fn test_repeated_gas_takes_last_value() {
        let summary = summarize(&[record("CO2", 1.0), record("CO2", 2.5)]).unwrap();
        assert_eq!(summary.totals.emissions.co2_mass, "2.5");
    }

    #[test]
    fn test_unknown_gas_ignored_in_totals() {
        let summary = summarize(&[record("SF6", 9.0)]).unwrap();
        assert_eq!(summary.totals.emissions.co2_mass, "0.0");
        assert_eq!(summary.city_emissions_details.gas_name, "SF6");
    }

    #[test]
    fn test_no_rows() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_response_shape() {
        let summary = summarize(&[record("CO2", 10.0)]).unwrap();
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["totals"]["emissions"]["co2_mass"], "10.0");
        assert_eq!(json["totals"]["emissions"]["gpc_quality"], "high");
        assert_eq!(json["city_emissions_details"]["activity_units"], "MWh");
        assert_eq!(json["city_emissions_details"]["emission_factor_value"], "0.35");
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    // -------------------------------------------------------------------------
    // STATUS MAPPING TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_respond_ok() {
        let response = respond(Ok(vec![record("CO2", 10.0)]));
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_respond_not_found() {
        let response = respond(Ok(vec![]));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_respond_database_error() {
        let response = respond(Err(sqlx::Error::PoolTimedOut));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let response = respond(Ok(vec![]));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "detail": "No data available" }));
    }

    #[tokio::test]
    async fn test_database_error_body_carries_message() {
        let response = respond(Err(sqlx::Error::PoolTimedOut));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["detail"], sqlx::Error::PoolTimedOut.to_string());
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(10.0), "10.0");
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(0.123), "0.123");
    }
}
