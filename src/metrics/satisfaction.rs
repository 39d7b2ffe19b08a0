//! Satisfaction levels by product category.

use arrow::array::Array;
use arrow::record_batch::RecordBatch;

use super::group::{build_batch, counts_batch, sum_at, value_counts, ColumnData, GroupBy};
use super::Derived;
use crate::error::Result;
use crate::types::{OrderField, OrderTable};

pub const REQUIRES: [OrderField; 1] = [OrderField::SatisfactionLevel];

/// Canonical display order of satisfaction levels, best first.
pub const SATISFACTION_ORDER: [&str; 4] = ["Very Satisfied", "Satisfied", "Neutral", "Dissatisfied"];

#[derive(Debug, Clone)]
pub struct SatisfactionSummary {
    /// Long form: `category`, `satisfaction_level`, `count`, `revenue`,
    /// highest count first
    pub by_category: RecordBatch,
    /// Pivot column order: the canonical levels present, or every level
    /// found when none is canonical
    pub levels: Vec<String>,
    /// `category` followed by one count column per level
    pub count_pivot: RecordBatch,
    /// `category` followed by one revenue column per level
    pub revenue_pivot: RecordBatch,
    /// `satisfaction_level`, `count` over the whole table
    pub distribution: RecordBatch,
}

pub fn satisfaction_summary(table: &OrderTable) -> Result<Derived<SatisfactionSummary>> {
    let missing = table.missing(&REQUIRES);
    if !missing.is_empty() {
        return Ok(Derived::Unavailable { missing });
    }

    let categories = table.required_text(OrderField::Category)?;
    let levels_col = table.required_text(OrderField::SatisfactionLevel)?;
    let amounts = table.required_numeric(OrderField::PurchaseAmount)?;

    let pairs = GroupBy::build((0..table.num_rows()).map(|i| {
        (categories.is_valid(i) && levels_col.is_valid(i))
            .then(|| (categories.value(i).to_string(), levels_col.value(i).to_string()))
    }));

    let mut cells: Vec<(String, String, i64, f64)> = pairs
        .iter()
        .map(|((category, level), rows)| {
            (
                category.clone(),
                level.clone(),
                rows.len() as i64,
                sum_at(&amounts, rows),
            )
        })
        .collect();

    let levels = ordered_levels(cells.iter().map(|c| c.1.as_str()));
    let mut pivot_categories: Vec<String> = Vec::new();
    for (category, ..) in &cells {
        if !pivot_categories.contains(category) {
            pivot_categories.push(category.clone());
        }
    }
    pivot_categories.sort();

    let lookup = |category: &str, level: &str| {
        cells
            .iter()
            .find(|c| c.0 == category && c.1 == level)
            .map(|c| (c.2, c.3))
            .unwrap_or((0, 0.0))
    };

    let mut count_columns = vec![(
        "category",
        ColumnData::Text(pivot_categories.clone()),
    )];
    let mut revenue_columns = vec![(
        "category",
        ColumnData::Text(pivot_categories.clone()),
    )];
    for level in &levels {
        count_columns.push((
            level.as_str(),
            ColumnData::Int(pivot_categories.iter().map(|c| lookup(c, level).0).collect()),
        ));
        revenue_columns.push((
            level.as_str(),
            ColumnData::Float(pivot_categories.iter().map(|c| lookup(c, level).1).collect()),
        ));
    }
    let count_pivot = build_batch(count_columns)?;
    let revenue_pivot = build_batch(revenue_columns)?;

    cells.sort_by(|a, b| b.2.cmp(&a.2));
    let by_category = build_batch(vec![
        (
            "category",
            ColumnData::Text(cells.iter().map(|c| c.0.clone()).collect()),
        ),
        (
            "satisfaction_level",
            ColumnData::Text(cells.iter().map(|c| c.1.clone()).collect()),
        ),
        ("count", ColumnData::Int(cells.iter().map(|c| c.2).collect())),
        ("revenue", ColumnData::Float(cells.iter().map(|c| c.3).collect())),
    ])?;

    let distribution = counts_batch("satisfaction_level", value_counts(&levels_col))?;

    Ok(Derived::Available(SatisfactionSummary {
        by_category,
        levels,
        count_pivot,
        revenue_pivot,
        distribution,
    }))
}

/// Canonical levels that are present, in canonical order. Only when none of
/// them occur do the levels found in the data become the columns.
fn ordered_levels<'a>(present: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: Vec<&str> = Vec::new();
    for level in present {
        if !seen.contains(&level) {
            seen.push(level);
        }
    }
    let canonical: Vec<String> = SATISFACTION_ORDER
        .iter()
        .filter(|level| seen.contains(*level))
        .map(|level| level.to_string())
        .collect();
    if canonical.is_empty() {
        seen.into_iter().map(str::to_string).collect()
    } else {
        canonical
    }
}
