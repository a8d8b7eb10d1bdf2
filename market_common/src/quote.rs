//! Quote data model as served by the remote `/stocks` endpoint.
//!
//! A `Quote` is one row of a snapshot: the symbol, a human-readable name, the last
//! price and a handful of optional metrics. Field names on the wire follow the remote
//! API (`full_name`, `change`, `percent_change`, `history`, ...); the price history may
//! arrive either as a JSON array or as a comma-separated string.
use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Deserializer, Serialize};

/// Market quote for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol identifier (e.g., `AAPL`). Unique within a snapshot.
    pub symbol: String,
    /// Company name shown to the user.
    #[serde(
        rename = "full_name",
        alias = "display_name",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub display_name: String,
    /// Last traded price.
    pub price: f64,
    /// Absolute change since the previous close.
    #[serde(rename = "change", default)]
    pub change_abs: Option<f64>,
    /// Percentage change since the previous close.
    #[serde(rename = "percent_change", alias = "change_percent", default)]
    pub change_pct: Option<f64>,
    /// Recent prices, oldest first.
    #[serde(rename = "history", default, deserialize_with = "price_history")]
    pub price_history: Vec<f64>,
    /// Price-to-earnings ratio.
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    /// Market capitalization.
    #[serde(default)]
    pub market_cap: Option<f64>,
    /// 52-week high.
    #[serde(default)]
    pub high_52w: Option<f64>,
    /// 52-week low.
    #[serde(default)]
    pub low_52w: Option<f64>,
    /// Traded volume.
    #[serde(default)]
    pub volume: Option<u64>,
    /// Listing exchange (e.g., `NASDAQ`).
    #[serde(default)]
    pub exchange: Option<String>,
}

impl Quote {
    /// Create a quote with only the mandatory fields set.
    pub fn new(symbol: &str, display_name: &str, price: f64) -> Self {
        Quote {
            symbol: String::from(symbol),
            display_name: String::from(display_name),
            price,
            change_abs: None,
            change_pct: None,
            price_history: Vec::new(),
            pe_ratio: None,
            market_cap: None,
            high_52w: None,
            low_52w: None,
            volume: None,
            exchange: None,
        }
    }

    /// Set the absolute and percentage change.
    pub fn with_change(mut self, change_abs: f64, change_pct: f64) -> Self {
        self.change_abs = Some(change_abs);
        self.change_pct = Some(change_pct);
        self
    }

    /// Percentage change, if the source reported a usable number.
    pub fn defined_change_pct(&self) -> Option<f64> {
        self.change_pct.filter(|pct| !pct.is_nan())
    }

    /// Decode a full `/stocks` response body.
    pub fn list_from_json(bytes: &[u8]) -> crate::Result<Vec<Quote>> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Enforce symbol uniqueness on a freshly fetched list.
///
/// When the source repeats a symbol, the last entry's data wins and keeps the
/// position of the first occurrence.
pub fn unique_by_symbol(quotes: Vec<Quote>) -> Vec<Quote> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(quotes.len());
    let mut unique: Vec<Quote> = Vec::with_capacity(quotes.len());

    for quote in quotes {
        match positions.get(&quote.symbol) {
            Some(&idx) => {
                warn!("Duplicate symbol {} in snapshot, keeping the last entry", quote.symbol);
                unique[idx] = quote;
            }
            None => {
                positions.insert(quote.symbol.clone(), unique.len());
                unique.push(quote);
            }
        }
    }
    unique
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawHistory {
    List(Vec<f64>),
    Csv(String),
}

fn price_history<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawHistory>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(RawHistory::List(prices)) => Ok(prices),
        Some(RawHistory::Csv(raw)) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f64>()
                    .map_err(|e| serde::de::Error::custom(format!("bad history value {s:?}: {e}")))
            })
            .collect(),
    }
}
