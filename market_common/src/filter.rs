//! Ephemeral view state: search text, scope and ordering of the stock list.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Which stocks a view starts from before the text filter is applied.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
    Display,
    EnumString,
    Eq,
    PartialEq,
)]
#[clap(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Scope {
    /// Every stock in the snapshot.
    #[default]
    All,
    /// Only stocks on the user's watchlist.
    WatchlistOnly,
}

/// Ordering applied after filtering. The sort is stable.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
    Display,
    EnumString,
    Eq,
    PartialEq,
)]
#[clap(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum SortOrder {
    /// Keep the order the remote source returned.
    #[default]
    Listed,
    /// Symbol, ascending.
    Symbol,
    /// Percentage change, descending; rows without a change go last.
    ChangePct,
    /// Price, descending.
    Price,
}

/// Search and scope settings for one rendering of the stock list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFilter {
    /// Case-insensitive substring matched against name or symbol.
    pub search_text: String,
    /// All stocks or watchlist only.
    pub scope: Scope,
    /// Ordering of the result.
    pub sort: SortOrder,
}

impl ViewFilter {
    /// Filter over all stocks matching `search_text`, in listed order.
    pub fn search(search_text: &str) -> Self {
        ViewFilter {
            search_text: String::from(search_text),
            ..ViewFilter::default()
        }
    }

    /// Same filter restricted to a different scope.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Same filter with a different ordering.
    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}
