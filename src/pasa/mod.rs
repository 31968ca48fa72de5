pub mod pivot;
pub mod reconcile;
pub mod regions;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Column, Connection, PgConnection, Row};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DbConfig;
pub use regions::RegionId;

#[derive(Error, Debug)]
pub enum PasaError {
    #[error("database connection failed: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("query on table {table} failed: {source}")]
    Query {
        table: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("schema mismatch on table {table}: {detail}")]
    SchemaMismatch { table: String, detail: String },
    #[error("cannot decode column {column} of table {table}: {detail}")]
    Decode {
        table: String,
        column: String,
        detail: String,
    },
}

impl PasaError {
    /// Whether the run must stop. A failed query only costs its own charts.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PasaError::Query { .. })
    }
}

/// A forecast row that may be superseded by a later publication of the same target
pub trait Revision {
    type Target: Ord + Clone;

    fn publish_time(&self) -> NaiveDateTime;

    /// What the forecast is about, excluding when it was published
    fn target(&self) -> Self::Target;

    /// Point in time the forecast refers to, used for the past-horizon cutoff
    fn horizon(&self) -> NaiveDateTime;
}

/// Unit-level MTPASA availability for one day
#[derive(Debug, Clone, PartialEq)]
pub struct MtpasaRecord {
    pub publish_time: NaiveDateTime,
    pub day: NaiveDate,
    pub region: RegionId,
    pub unit: String,
    pub availability_mw: Option<f64>,
    pub latest_offer: Option<NaiveDateTime>,
    pub last_changed: Option<NaiveDateTime>,
}

impl Revision for MtpasaRecord {
    type Target = (NaiveDate, RegionId, String);

    fn publish_time(&self) -> NaiveDateTime {
        self.publish_time
    }

    fn target(&self) -> Self::Target {
        (self.day, self.region.clone(), self.unit.clone())
    }

    fn horizon(&self) -> NaiveDateTime {
        self.day.and_time(chrono::NaiveTime::MIN)
    }
}

/// Region-level STPASA capacity for one interval
#[derive(Debug, Clone, PartialEq)]
pub struct StpasaRecord {
    pub publish_time: NaiveDateTime,
    pub interval: NaiveDateTime,
    pub region: RegionId,
    pub unconstrained_capacity: Option<f64>,
    pub constrained_capacity: Option<f64>,
    pub surplus_reserve: Option<f64>,
}

impl Revision for StpasaRecord {
    type Target = (NaiveDateTime, RegionId);

    fn publish_time(&self) -> NaiveDateTime {
        self.publish_time
    }

    fn target(&self) -> Self::Target {
        (self.interval, self.region.clone())
    }

    fn horizon(&self) -> NaiveDateTime {
        self.interval
    }
}

/// Expected column layout of a source table. Each entry lists the accepted names.
pub struct TableSchema {
    pub columns: &'static [&'static [&'static str]],
}

pub const MTPASA_SCHEMA: TableSchema = TableSchema {
    columns: &[
        &["PublishDatetime"],
        &["Day"],
        &["RegionID"],
        &["DUID", "UnitID"],
        &["PasaAvailability"],
        &["LatestOfferDatetime"],
        &["LastChanged"],
    ],
};

pub const STPASA_SCHEMA: TableSchema = TableSchema {
    columns: &[
        &["PublishDatetime"],
        &["Interval"],
        &["RegionID"],
        &["UnconstrainedCapacity"],
        &["ConstrainedCapacity"],
        &["SurplusReserve"],
    ],
};

// "Publish_Datetime", "publish_datetime" and "PublishDatetime" all name the same column
fn normalize_column(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

impl TableSchema {
    /// Check the returned column names against the expected count, order and names
    pub fn validate(&self, table: &str, actual: &[&str]) -> Result<(), PasaError> {
        if actual.len() != self.columns.len() {
            return Err(PasaError::SchemaMismatch {
                table: table.to_string(),
                detail: format!(
                    "expected {} columns, got {} ({})",
                    self.columns.len(),
                    actual.len(),
                    actual.join(", ")
                ),
            });
        }

        for (position, (accepted, found)) in self.columns.iter().zip(actual).enumerate() {
            let found_key = normalize_column(found);
            if !accepted.iter().any(|name| normalize_column(name) == found_key) {
                return Err(PasaError::SchemaMismatch {
                    table: table.to_string(),
                    detail: format!(
                        "column {} is {:?}, expected {}",
                        position + 1,
                        found,
                        accepted.join(" or ")
                    ),
                });
            }
        }

        Ok(())
    }

    pub fn validate_row(&self, table: &str, row: &PgRow) -> Result<(), PasaError> {
        let names: Vec<&str> = row.columns().iter().map(|c| c.name()).collect();
        self.validate(table, &names)
    }
}

/// Decodes positional columns of a row that already passed schema validation
struct RowReader<'r> {
    table: &'r str,
    row: &'r PgRow,
}

impl<'r> RowReader<'r> {
    fn decode_error(&self, index: usize, err: sqlx::Error) -> PasaError {
        PasaError::Decode {
            table: self.table.to_string(),
            column: self.row.columns()[index].name().to_string(),
            detail: err.to_string(),
        }
    }

    fn text(&self, index: usize) -> Result<String, PasaError> {
        self.row
            .try_get::<String, _>(index)
            .map_err(|e| self.decode_error(index, e))
    }

    fn timestamp(&self, index: usize) -> Result<Option<NaiveDateTime>, PasaError> {
        if let Ok(value) = self.row.try_get::<Option<NaiveDateTime>, _>(index) {
            return Ok(value);
        }
        self.row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .map(|value| value.map(|ts| ts.naive_utc()))
            .map_err(|e| self.decode_error(index, e))
    }

    fn required_timestamp(&self, index: usize) -> Result<NaiveDateTime, PasaError> {
        self.timestamp(index)?.ok_or_else(|| PasaError::Decode {
            table: self.table.to_string(),
            column: self.row.columns()[index].name().to_string(),
            detail: "unexpected NULL".to_string(),
        })
    }

    fn date(&self, index: usize) -> Result<NaiveDate, PasaError> {
        if let Ok(day) = self.row.try_get::<NaiveDate, _>(index) {
            return Ok(day);
        }
        self.required_timestamp(index).map(|ts| ts.date())
    }

    /// Any numeric column type, NULL stays `None`
    fn number(&self, index: usize) -> Result<Option<f64>, PasaError> {
        let row = self.row;
        if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
            return Ok(value);
        }
        if let Ok(value) = row.try_get::<Option<Decimal>, _>(index) {
            return Ok(value.and_then(|d| d.to_f64()));
        }
        if let Ok(value) = row.try_get::<Option<f32>, _>(index) {
            return Ok(value.map(f64::from));
        }
        if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
            return Ok(value.map(|v| v as f64));
        }
        if let Ok(value) = row.try_get::<Option<i32>, _>(index) {
            return Ok(value.map(f64::from));
        }
        row.try_get::<Option<i16>, _>(index)
            .map(|value| value.map(f64::from))
            .map_err(|e| self.decode_error(index, e))
    }
}

impl MtpasaRecord {
    pub fn from_row(table: &str, row: &PgRow) -> Result<Self, PasaError> {
        let r = RowReader { table, row };
        Ok(Self {
            publish_time: r.required_timestamp(0)?,
            day: r.date(1)?,
            region: r.text(2)?,
            unit: r.text(3)?,
            availability_mw: r.number(4)?,
            latest_offer: r.timestamp(5)?,
            last_changed: r.timestamp(6)?,
        })
    }
}

impl StpasaRecord {
    pub fn from_row(table: &str, row: &PgRow) -> Result<Self, PasaError> {
        let r = RowReader { table, row };
        Ok(Self {
            publish_time: r.required_timestamp(0)?,
            interval: r.required_timestamp(1)?,
            region: r.text(2)?,
            unconstrained_capacity: r.number(3)?,
            constrained_capacity: r.number(4)?,
            surplus_reserve: r.number(5)?,
        })
    }
}

/// Read-only handle on the forecast database, owning a single connection
pub struct ForecastStore {
    conn: PgConnection,
    mtpasa_table: String,
    stpasa_table: String,
}

impl ForecastStore {
    pub async fn connect(config: &DbConfig) -> Result<Self, PasaError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password);

        let store =
            Self::connect_with(&options, &config.mtpasa_table, &config.stpasa_table).await?;
        info!(host = %config.host, database = %config.database, "connected to forecast store");
        Ok(store)
    }

    /// Connect with explicit options, reading the two forecast tables by the given names
    pub async fn connect_with(
        options: &PgConnectOptions,
        mtpasa_table: &str,
        stpasa_table: &str,
    ) -> Result<Self, PasaError> {
        let conn = PgConnection::connect_with(options)
            .await
            .map_err(PasaError::Connection)?;

        Ok(Self {
            conn,
            mtpasa_table: mtpasa_table.to_string(),
            stpasa_table: stpasa_table.to_string(),
        })
    }

    /// Fetch every unit-level MTPASA availability row
    pub async fn fetch_mtpasa(&mut self) -> Result<Vec<MtpasaRecord>, PasaError> {
        let table = self.mtpasa_table.clone();
        let rows = self.fetch_table(&table).await?;
        decode_rows(&table, &MTPASA_SCHEMA, &rows, MtpasaRecord::from_row)
    }

    /// Fetch every region-level STPASA row
    pub async fn fetch_stpasa(&mut self) -> Result<Vec<StpasaRecord>, PasaError> {
        let table = self.stpasa_table.clone();
        let rows = self.fetch_table(&table).await?;
        decode_rows(&table, &STPASA_SCHEMA, &rows, StpasaRecord::from_row)
    }

    async fn fetch_table(&mut self, table: &str) -> Result<Vec<PgRow>, PasaError> {
        let statement = format!("SELECT * FROM {}", quote_identifier(table));
        debug!(%statement, "executing query");

        let rows = sqlx::query(&statement)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|source| PasaError::Query {
                table: table.to_string(),
                source,
            })?;

        info!(table, rows = rows.len(), "fetched forecast rows");
        Ok(rows)
    }

    pub async fn close(self) -> Result<(), PasaError> {
        self.conn.close().await.map_err(PasaError::Connection)
    }
}

fn decode_rows<T>(
    table: &str,
    schema: &TableSchema,
    rows: &[PgRow],
    decode: impl Fn(&str, &PgRow) -> Result<T, PasaError>,
) -> Result<Vec<T>, PasaError> {
    // All rows of one result share the column set
    if let Some(first) = rows.first() {
        schema.validate_row(table, first)?;
    }
    rows.iter().map(|row| decode(table, row)).collect()
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_expected_columns() {
        let columns = [
            "Publish_Datetime",
            "Day",
            "RegionID",
            "DUID",
            "PasaAvailability",
            "LatestOfferDatetime",
            "LastChanged",
        ];
        assert!(MTPASA_SCHEMA.validate("mtpasa", &columns).is_ok());
    }

    #[test]
    fn test_validate_is_case_and_underscore_insensitive() {
        let columns = [
            "publish_datetime",
            "interval",
            "regionid",
            "unconstrained_capacity",
            "constrained_capacity",
            "surplus_reserve",
        ];
        assert!(STPASA_SCHEMA.validate("stpasa", &columns).is_ok());
    }

    #[test]
    fn test_validate_accepts_unit_alias() {
        let columns = [
            "PublishDatetime",
            "Day",
            "RegionID",
            "UnitID",
            "PasaAvailability",
            "LatestOfferDatetime",
            "LastChanged",
        ];
        assert!(MTPASA_SCHEMA.validate("mtpasa", &columns).is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_column_count() {
        let columns = ["PublishDatetime", "Interval", "RegionID"];
        let err = STPASA_SCHEMA.validate("stpasa", &columns).unwrap_err();
        assert!(matches!(err, PasaError::SchemaMismatch { .. }));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("expected 6 columns, got 3"));
    }

    #[test]
    fn test_validate_rejects_swapped_columns() {
        let columns = [
            "PublishDatetime",
            "Day",
            "DUID",
            "RegionID",
            "PasaAvailability",
            "LatestOfferDatetime",
            "LastChanged",
        ];
        let err = MTPASA_SCHEMA.validate("mtpasa", &columns).unwrap_err();
        assert!(err.to_string().contains("column 3"));
    }

    #[test]
    fn test_query_errors_are_not_fatal() {
        let err = PasaError::Query {
            table: "STPASA".to_string(),
            source: sqlx::Error::RowNotFound,
        };
        assert!(!err.is_fatal());
        assert!(PasaError::Connection(sqlx::Error::PoolClosed).is_fatal());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("STPASA"), "\"STPASA\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_mtpasa_horizon_is_midnight_of_day() {
        let record = MtpasaRecord {
            publish_time: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            day: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            region: "NSW1".to_string(),
            unit: "A".to_string(),
            availability_mw: Some(100.0),
            latest_offer: None,
            last_changed: None,
        };
        assert_eq!(
            record.horizon(),
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
        assert_eq!(
            record.target(),
            (record.day, "NSW1".to_string(), "A".to_string())
        );
    }
}
