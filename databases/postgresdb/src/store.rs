//! Per-device reading tables.
//!
//! One destination table per device type; each row holds the numeric
//! value(s) of one reading. Provisioning the tables is the schema
//! tooling's job — inserts here assume they exist.

use iotqueue::Envelope;

use crate::client::PostgresClient;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("invalid identifier '{0}' (only [A-Za-z_][A-Za-z0-9_]* allowed)")]
    InvalidIdentifier(String),
}

/// Table names are interpolated into the statement text, so they are held
/// to plain identifier characters. Values always travel as bound params.
fn validate_ident(s: &str) -> Result<(), StoreError> {
    let mut chars = s.chars();
    let first = chars
        .next()
        .ok_or_else(|| StoreError::InvalidIdentifier(s.to_string()))?;
    let ok_first = first.is_ascii_alphabetic() || first == '_';
    let ok_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if ok_first && ok_rest {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(s.to_string()))
    }
}

fn insert_sql(table: &str, reading: &Envelope) -> String {
    match reading {
        Envelope::SmokeSensor { .. } => {
            format!("INSERT INTO {table} (value1, value2) VALUES ($1, $2)")
        }
        _ => format!("INSERT INTO {table} (value) VALUES ($1)"),
    }
}

pub struct SensorStore {
    client: PostgresClient,
}

impl SensorStore {
    pub async fn connect(pg_url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: PostgresClient::connect(pg_url).await?,
        })
    }

    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    /// Parameterized insert of one reading into its destination table.
    /// Returns the number of inserted rows (always 1 on success).
    pub async fn insert_reading(&self, table: &str, reading: &Envelope) -> Result<u64, StoreError> {
        validate_ident(table)?;

        let sql = insert_sql(table, reading);
        let rows = match *reading {
            Envelope::SmokeSensor { value1, value2 } => {
                self.client.execute(&sql, &[&value1, &value2]).await?
            }
            Envelope::MotionSensor { value }
            | Envelope::TemperatureSensor { value }
            | Envelope::HumiditySensor { value } => {
                self.client.execute(&sql, &[&value]).await?
            }
        };

        log::debug!("inserted {rows} row(s) into {table}");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idents_are_held_to_identifier_characters() {
        assert!(validate_ident("temperature_sensor_data").is_ok());
        assert!(validate_ident("_t1").is_ok());
        assert!(validate_ident("").is_err());
        assert!(validate_ident("1table").is_err());
        assert!(validate_ident("data; DROP TABLE x").is_err());
        assert!(validate_ident("data-x").is_err());
    }

    #[test]
    fn single_value_insert_statement() {
        let sql = insert_sql("temperature_sensor_data", &Envelope::temperature(23.45));
        assert_eq!(sql, "INSERT INTO temperature_sensor_data (value) VALUES ($1)");
    }

    #[test]
    fn pair_insert_statement() {
        let sql = insert_sql("smoke_sensor_data", &Envelope::smoke(0.123, 0.045));
        assert_eq!(
            sql,
            "INSERT INTO smoke_sensor_data (value1, value2) VALUES ($1, $2)"
        );
    }
}
