//! Semantic column types: physical storage type, default validation/conformation tags, fake data.

use chrono::{TimeZone, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;

/// Physical type used when neither the column nor its semantic type names one.
pub const FALLBACK_DATA_TYPE: &str = "varchar(50)";

#[derive(Debug)]
pub struct ColumnType {
    pub name: &'static str,
    /// PostgreSQL type used when a column declares no explicit data type.
    pub data_type: &'static str,
    /// Validation tags applied to action inputs of this type (see `action::rules`).
    pub validations: &'static str,
    /// Conformation tags applied to action inputs of this type.
    pub conformations: &'static str,
}

macro_rules! column_type {
    ($name:expr, $data_type:expr) => {
        column_type!($name, $data_type, "", "")
    };
    ($name:expr, $data_type:expr, $validations:expr) => {
        column_type!($name, $data_type, $validations, "")
    };
    ($name:expr, $data_type:expr, $validations:expr, $conformations:expr) => {
        ColumnType {
            name: $name,
            data_type: $data_type,
            validations: $validations,
            conformations: $conformations,
        }
    };
}

pub static COLUMN_TYPES: &[ColumnType] = &[
    column_type!("id", "varchar(20)"),
    column_type!("alias", "varchar(100)"),
    column_type!("date", "timestamp"),
    column_type!("time", "time"),
    column_type!("day", "varchar(10)"),
    column_type!("month", "integer", "min=1,max=12"),
    column_type!("year", "integer", "min=1900,max=2100"),
    column_type!("minute", "integer", "min=0,max=59"),
    column_type!("hour", "integer"),
    column_type!("datetime", "timestamp"),
    column_type!("email", "varchar(100)", "email", "email"),
    column_type!("namespace", "varchar(200)"),
    column_type!("name", "varchar(100)", "required", "name"),
    column_type!("encrypted", "text"),
    column_type!("json", "text"),
    column_type!("password", "varchar(200)", "required"),
    column_type!("value", "varchar(100)"),
    column_type!("truefalse", "boolean"),
    column_type!("timestamp", "timestamp"),
    column_type!("location", "varchar(50)"),
    column_type!("location.latitude", "double precision", "latitude"),
    column_type!("location.longitude", "double precision", "longitude"),
    column_type!("location.altitude", "double precision"),
    column_type!("color", "varchar(50)", "iscolor"),
    column_type!("rating.10", "integer", "min=0,max=10"),
    column_type!("measurement", "integer"),
    column_type!("label", "varchar(100)"),
    column_type!("content", "text"),
    column_type!("file", "text", "base64"),
    column_type!("url", "varchar(500)", "url"),
    column_type!("image", "text", "base64"),
];

pub fn column_type(name: &str) -> Option<&'static ColumnType> {
    COLUMN_TYPES.iter().find(|t| t.name == name)
}

/// Physical type for a column: explicit data type, else its semantic type's, else the fallback.
pub fn physical_type<'a>(column_type_name: &str, explicit: &'a str) -> &'a str {
    if !explicit.is_empty() {
        return explicit;
    }
    column_type(column_type_name)
        .map(|t| t.data_type)
        .unwrap_or(FALLBACK_DATA_TYPE)
}

pub fn is_timestamp_type(data_type: &str) -> bool {
    let lower = data_type.to_lowercase();
    lower.starts_with("timestamp") || lower == "date"
}

const FIRST_NAMES: &[&str] = &["Ada", "Grace", "Alan", "Barbara", "Edsger", "Frances", "Ken", "Radia"];
const LAST_NAMES: &[&str] = &["Lovelace", "Hopper", "Turing", "Liskov", "Dijkstra", "Allen", "Thompson", "Perlman"];
const PRODUCTS: &[&str] = &["Granite Lamp", "Copper Kettle", "Linen Shirt", "Oak Desk", "Wool Scarf", "Steel Pan"];
const WORDS: &[&str] = &["lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit"];
const DAYS: &[&str] = &["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

fn pick<R: Rng>(rng: &mut R, from: &[&str]) -> String {
    from.choose(rng).copied().unwrap_or_default().to_string()
}

fn random_datetime<R: Rng>(rng: &mut R) -> chrono::DateTime<Utc> {
    // 1970-01-01 .. 2070-01-01
    let secs = rng.gen_range(0..3_155_760_000i64);
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

/// Fake value for a semantic type. Unknown types produce an empty string.
pub fn fake_value<R: Rng>(column_type_name: &str, rng: &mut R) -> Value {
    match column_type_name {
        "id" => Value::String(uuid::Uuid::new_v4().simple().to_string()[..20].to_string()),
        "alias" => Value::String(uuid::Uuid::new_v4().to_string()),
        "date" => Value::String(random_datetime(rng).format("%Y-%m-%d").to_string()),
        "time" => Value::String(random_datetime(rng).format("%H:%M:%S").to_string()),
        "datetime" => Value::String(random_datetime(rng).to_rfc3339()),
        "timestamp" => Value::String(random_datetime(rng).to_rfc3339()),
        "day" => Value::String(pick(rng, DAYS)),
        "month" => Value::from(rng.gen_range(1..=12)),
        "year" => Value::from(rng.gen_range(1990..=2018)),
        "minute" => Value::from(rng.gen_range(0..60)),
        "hour" => Value::from(rng.gen_range(0..24)),
        "email" => Value::String(format!(
            "{}.{}@example.com",
            pick(rng, FIRST_NAMES).to_lowercase(),
            pick(rng, LAST_NAMES).to_lowercase()
        )),
        "name" => Value::String(format!("{} {}", pick(rng, FIRST_NAMES), pick(rng, LAST_NAMES))),
        "json" => Value::String("{}".into()),
        "value" => Value::String(rng.gen_range(0..1000).to_string()),
        "truefalse" => Value::Bool(rng.gen_range(0..3) == 1),
        "location.latitude" => Value::from(rng.gen_range(-90.0..90.0)),
        "location.longitude" => Value::from(rng.gen_range(-180.0..180.0)),
        "location" => Value::String(format!(
            "[{:.4}, {:.4}]",
            rng.gen_range(-90.0..90.0),
            rng.gen_range(-180.0..180.0)
        )),
        "location.altitude" => Value::from(rng.gen_range(0..10_000)),
        "color" => Value::String(format!("#{:06x}", rng.gen_range(0..0x1000000))),
        "rating.10" => Value::from(rng.gen_range(0..=10)),
        "measurement" => Value::from(rng.gen_range(0..5000)),
        "label" => Value::String(pick(rng, PRODUCTS)),
        "content" => {
            let words: Vec<String> = (0..12).map(|_| pick(rng, WORDS)).collect();
            Value::String(format!("{}.", words.join(" ")))
        }
        "url" => Value::String("https://places.com/".into()),
        _ => Value::String(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_type_resolution() {
        assert_eq!(physical_type("email", ""), "varchar(100)");
        assert_eq!(physical_type("email", "text"), "text");
        assert_eq!(physical_type("no-such-type", ""), FALLBACK_DATA_TYPE);
    }

    #[test]
    fn fake_values_respect_ranges() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let month = fake_value("month", &mut rng).as_i64().unwrap();
            assert!((1..=12).contains(&month));
            let email = fake_value("email", &mut rng);
            assert!(email.as_str().unwrap().contains('@'));
        }
        assert_eq!(fake_value("password", &mut rng), Value::String(String::new()));
    }
}
