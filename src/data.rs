use std::{cmp::Ordering, collections::BTreeMap, fmt};

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};

pub const SHOP_NAME_KEY: &str = "shop_name";
pub const DATE_KEY: &str = "date";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Chronological position of the value, if it denotes a point in time.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            Value::DateTime(dt) => Some(*dt),
            Value::String(s) => parse_naive_datetime(s)
                .ok()
                .or_else(|| parse_naive_date(s).ok().and_then(|d| d.and_hms_opt(0, 0, 0))),
            _ => None,
        }
    }

    /// Converts a JSON scalar. Strings that look like dates become dates;
    /// `null` maps to `None`, arrays and objects are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Option<Value>> {
        let converted = match value {
            serde_json::Value::Null => return Ok(None),
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    let f = n
                        .as_f64()
                        .ok_or_else(|| anyhow!("Unsupported JSON number {n}"))?;
                    Value::Float(f)
                }
            }
            serde_json::Value::String(s) => return Ok(infer_value(s)),
            other => return Err(anyhow!("Unsupported nested JSON value {other}")),
        };
        Ok(Some(converted))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

/// Sort key for the ledger's primary ordering. Missing dates order first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateKey(pub Option<NaiveDateTime>);

impl Ord for DateKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(left), Some(right)) => left.cmp(right),
        }
    }
}

impl PartialOrd for DateKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A record as delivered by a source, keyed by the source's own field names.
pub type RawRecord = BTreeMap<String, Value>;

/// A normalized ledger row. The provenance tag is also visible under
/// [`SHOP_NAME_KEY`] so it renders like any other column.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    shop_name: String,
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(shop_name: impl Into<String>, mut values: BTreeMap<String, Value>) -> Self {
        let shop_name = shop_name.into();
        values.insert(
            SHOP_NAME_KEY.to_string(),
            Value::String(shop_name.clone()),
        );
        Self { shop_name, values }
    }

    pub fn shop_name(&self) -> &str {
        &self.shop_name
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn date_key(&self) -> DateKey {
        DateKey(self.get(DATE_KEY).and_then(Value::as_datetime))
    }
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日", "%d/%m/%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y/%m/%d %H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

/// Types an untyped text field. Empty input is treated as absent.
pub fn infer_value(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    // Zero-padded order numbers stay textual.
    let zero_padded = trimmed.len() > 1 && trimmed.starts_with('0') && !trimmed.starts_with("0.");
    if !zero_padded {
        if let Ok(i) = trimmed.parse::<i64>() {
            return Some(Value::Integer(i));
        }
        if let Ok(f) = trimmed.parse::<f64>()
            && f.is_finite()
        {
            return Some(Value::Float(f));
        }
    }
    if let Ok(dt) = parse_naive_datetime(trimmed) {
        return Some(Value::DateTime(dt));
    }
    if let Ok(d) = parse_naive_date(trimmed) {
        return Some(Value::Date(d));
    }
    Some(Value::String(raw.to_string()))
}
