//! Pure derivations over a quote snapshot.
//!
//! - `project`: narrows a snapshot to the rows a view should show, in a stable order.
//! - `top_gainer`: the symbol with the largest defined percentage change.
//!
//! Both functions are deterministic and side-effect free; the same inputs always yield
//! the same ordered output.
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::filter::{Scope, SortOrder, ViewFilter};
use crate::quote::Quote;

/// Rows of `quotes` visible under `filter`.
///
/// With `Scope::WatchlistOnly` the snapshot is first restricted to `watchlist`, then
/// the search text is matched case-insensitively against the display name or symbol.
/// An empty search text matches everything.
pub fn project<'a>(
    quotes: &'a [Quote],
    watchlist: &BTreeSet<String>,
    filter: &ViewFilter,
) -> Vec<&'a Quote> {
    let needle = filter.search_text.to_lowercase();

    let mut rows: Vec<&Quote> = quotes
        .iter()
        .filter(|q| match filter.scope {
            Scope::All => true,
            Scope::WatchlistOnly => watchlist.contains(&q.symbol),
        })
        .filter(|q| {
            needle.is_empty()
                || q.display_name.to_lowercase().contains(&needle)
                || q.symbol.to_lowercase().contains(&needle)
        })
        .collect();

    match filter.sort {
        SortOrder::Listed => {}
        SortOrder::Symbol => rows.sort_by(|a, b| a.symbol.cmp(&b.symbol)),
        SortOrder::ChangePct => rows.sort_by(|a, b| {
            match (a.defined_change_pct(), b.defined_change_pct()) {
                (Some(x), Some(y)) => y.total_cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        }),
        SortOrder::Price => rows.sort_by(|a, b| b.price.total_cmp(&a.price)),
    }
    rows
}

/// Symbol with the highest defined `change_pct`; the first one wins on ties.
pub fn top_gainer(quotes: &[Quote]) -> Option<&str> {
    let mut best: Option<(&Quote, f64)> = None;
    for quote in quotes {
        if let Some(pct) = quote.defined_change_pct() {
            match best {
                Some((_, best_pct)) if pct <= best_pct => {}
                _ => best = Some((quote, pct)),
            }
        }
    }
    best.map(|(q, _)| q.symbol.as_str())
}
