//! Row selection for the detail tables.
//!
//! Filtering never feeds back into the metrics: aggregates are always
//! computed over the raw table, and [`truncate`] only caps what is displayed.

use std::sync::Arc;

use arrow::array::{Array, BooleanArray, StringArray};
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::config::DisplaySettings;
use crate::error::Result;
use crate::types::{OrderField, OrderTable};

/// Columns of the main order detail table, in display order.
pub const DISPLAY_COLUMNS: [OrderField; 12] = [
    OrderField::ProcessedTime,
    OrderField::CustomerId,
    OrderField::Category,
    OrderField::ItemPurchased,
    OrderField::PurchaseAmount,
    OrderField::FinalAmount,
    OrderField::AmountCategory,
    OrderField::CustomerSegment,
    OrderField::SatisfactionLevel,
    OrderField::IsAnomaly,
    OrderField::Location,
    OrderField::ReviewRating,
];

/// Columns of the VIP-Premium detail table.
pub const VIP_DETAIL_COLUMNS: [OrderField; 9] = [
    OrderField::ProcessedTime,
    OrderField::CustomerId,
    OrderField::Category,
    OrderField::ItemPurchased,
    OrderField::PurchaseAmount,
    OrderField::EstimatedClv,
    OrderField::LoyaltyScore,
    OrderField::FrequencyCategory,
    OrderField::Location,
];

/// Rows shown in the VIP-Premium detail table.
pub const VIP_DETAIL_ROWS: usize = 100;

/// Columns of the anomaly detail table.
pub const ANOMALY_DETAIL_COLUMNS: [OrderField; 8] = [
    OrderField::ProcessedTime,
    OrderField::CustomerId,
    OrderField::Category,
    OrderField::PurchaseAmount,
    OrderField::AmountCategory,
    OrderField::Location,
    OrderField::CustomerSegment,
    OrderField::PaymentMethod,
];

/// Keep rows whose category is in `categories` and whose location is in
/// `locations`. An empty set does not filter on that dimension.
pub fn apply(raw: &OrderTable, categories: &[String], locations: &[String]) -> Result<OrderTable> {
    if categories.is_empty() && locations.is_empty() {
        return Ok(raw.clone());
    }

    let category_col = raw.required_text(OrderField::Category)?;
    let location_col = raw.required_text(OrderField::Location)?;
    let mask: BooleanArray = (0..raw.num_rows())
        .map(|i| {
            Some(
                allowed(&category_col, i, categories) && allowed(&location_col, i, locations),
            )
        })
        .collect();
    raw.filter(&mask)
}

fn allowed(column: &StringArray, row: usize, values: &[String]) -> bool {
    values.is_empty() || (column.is_valid(row) && values.iter().any(|v| v == column.value(row)))
}

/// The first `row_limit` rows of `table`.
pub fn truncate(table: &OrderTable, row_limit: usize) -> Result<OrderTable> {
    let len = table.num_rows().min(row_limit);
    OrderTable::try_new(table.batch().slice(0, len))
}

/// The listed columns that are present in `table`, in the listed order.
pub fn project(table: &OrderTable, columns: &[OrderField]) -> Result<RecordBatch> {
    let schema = table.batch().schema();
    let indices: Vec<usize> = columns
        .iter()
        .filter_map(|f| schema.index_of(f.column_name()).ok())
        .collect();
    Ok(table.batch().project(&indices)?)
}

/// The user's current filter choices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub categories: Vec<String>,
    pub locations: Vec<String>,
}

impl FilterSelection {
    pub fn new(categories: Vec<String>, locations: Vec<String>) -> Self {
        Self {
            categories,
            locations,
        }
    }

    pub fn from_settings(settings: &DisplaySettings) -> Self {
        Self::new(settings.categories.clone(), settings.locations.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.locations.is_empty()
    }

    pub fn apply(&self, raw: &OrderTable) -> Result<OrderTable> {
        apply(raw, &self.categories, &self.locations)
    }
}

/// The detail table as displayed.
#[derive(Debug, Clone)]
pub struct DisplayView {
    pub selection: FilterSelection,
    /// Rows that passed the filter
    pub filtered_rows: usize,
    /// Rows actually shown after the display cap
    pub shown_rows: usize,
    /// Shown rows projected to the display columns
    pub table: RecordBatch,
}

impl DisplayView {
    /// Filter, cap and project the raw table.
    pub fn build(raw: &OrderTable, selection: FilterSelection, row_limit: usize) -> Result<Self> {
        let filtered = selection.apply(raw)?;
        let shown = truncate(&filtered, row_limit)?;
        Ok(Self {
            filtered_rows: filtered.num_rows(),
            shown_rows: shown.num_rows(),
            table: project(&shown, &DISPLAY_COLUMNS)?,
            selection,
        })
    }

    /// A view with no rows, shown when the detail table cannot be built.
    pub fn empty(selection: FilterSelection) -> Self {
        Self {
            selection,
            filtered_rows: 0,
            shown_rows: 0,
            table: RecordBatch::new_empty(Arc::new(Schema::empty())),
        }
    }

    pub fn caption(&self) -> String {
        format!("Showing {} of {} orders", self.shown_rows, self.filtered_rows)
    }
}

/// Distinct values offered by the category and location selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub categories: Vec<String>,
    pub locations: Vec<String>,
}

/// Distinct categories and locations of the raw table, in first-seen order.
pub fn filter_options(raw: &OrderTable) -> Result<FilterOptions> {
    Ok(FilterOptions {
        categories: distinct(&raw.required_text(OrderField::Category)?),
        locations: distinct(&raw.required_text(OrderField::Location)?),
    })
}

fn distinct(column: &StringArray) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for value in column.iter().flatten() {
        if !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderRecord;

    fn table() -> OrderTable {
        let rows = [
            ("Clothing", "Ohio", 10.0),
            ("Footwear", "Texas", 20.0),
            ("Clothing", "Texas", 30.0),
            ("Outerwear", "Ohio", 40.0),
        ];
        let records: Vec<OrderRecord> = rows
            .iter()
            .map(|(category, location, amount)| OrderRecord {
                category: category.to_string(),
                location: location.to_string(),
                purchase_amount_usd: *amount,
                ..Default::default()
            })
            .collect();
        OrderTable::from_records(&records).unwrap()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_empty_selection_is_identity() {
        let raw = table();
        let filtered = apply(&raw, &[], &[]).unwrap();
        assert_eq!(filtered.batch(), raw.batch());
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let raw = table();
        let categories = strings(&["Clothing"]);
        let locations = strings(&["Texas"]);

        let both = apply(&raw, &categories, &locations).unwrap();
        let then = apply(&apply(&raw, &categories, &[]).unwrap(), &[], &locations).unwrap();
        assert_eq!(both.num_rows(), 1);
        assert_eq!(both.batch(), then.batch());
        assert_eq!(
            both.required_numeric(OrderField::PurchaseAmount)
                .unwrap()
                .value(0),
            30.0
        );
    }

    #[test]
    fn test_filter_leaves_source_untouched() {
        let raw = table();
        let _ = apply(&raw, &strings(&["Footwear"]), &[]).unwrap();
        assert_eq!(raw.num_rows(), 4);
    }

    #[test]
    fn test_display_view_caps_and_projects() {
        let raw = table();
        let view = DisplayView::build(&raw, FilterSelection::new(vec![], strings(&["Ohio", "Texas"])), 3)
            .unwrap();
        assert_eq!(view.filtered_rows, 4);
        assert_eq!(view.shown_rows, 3);
        assert_eq!(view.caption(), "Showing 3 of 4 orders");

        let names: Vec<String> = view
            .table
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names[0], "processed_time");
        assert!(!names.iter().any(|n| n == "final_amount_usd"));
        assert!(!names.iter().any(|n| n == "age"));
    }

    #[test]
    fn test_filter_options_first_seen() {
        let options = filter_options(&table()).unwrap();
        assert_eq!(options.categories, strings(&["Clothing", "Footwear", "Outerwear"]));
        assert_eq!(options.locations, strings(&["Ohio", "Texas"]));
    }
}
