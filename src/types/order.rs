//! The raw order table: a fixed required core schema plus optional derived
//! fields produced upstream by the enrichment pipeline.

use std::fmt;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray, TimestampSecondArray,
};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};

use crate::error::{DashboardError, Result};

/// Logical kind of an order column, independent of its physical Arrow type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Numeric,
    Flag,
    Timestamp,
}

/// A column of the order table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderField {
    CustomerId,
    Age,
    Gender,
    Category,
    ItemPurchased,
    PurchaseAmount,
    Location,
    ReviewRating,
    SubscriptionStatus,
    PaymentMethod,
    ProcessedTime,
    FinalAmount,
    AmountCategory,
    CustomerSegment,
    SatisfactionLevel,
    IsAnomaly,
    EstimatedClv,
    FrequencyCategory,
    EstimatedProfit,
    SeasonType,
    LoyaltyScore,
}

impl OrderField {
    /// Columns every order table must carry.
    pub const REQUIRED: [OrderField; 11] = [
        OrderField::CustomerId,
        OrderField::Age,
        OrderField::Gender,
        OrderField::Category,
        OrderField::ItemPurchased,
        OrderField::PurchaseAmount,
        OrderField::Location,
        OrderField::ReviewRating,
        OrderField::SubscriptionStatus,
        OrderField::PaymentMethod,
        OrderField::ProcessedTime,
    ];

    /// Derived columns that may be absent while upstream schemas evolve.
    pub const OPTIONAL: [OrderField; 10] = [
        OrderField::FinalAmount,
        OrderField::AmountCategory,
        OrderField::CustomerSegment,
        OrderField::SatisfactionLevel,
        OrderField::IsAnomaly,
        OrderField::EstimatedClv,
        OrderField::FrequencyCategory,
        OrderField::EstimatedProfit,
        OrderField::SeasonType,
        OrderField::LoyaltyScore,
    ];

    /// All columns in warehouse select order.
    pub fn all() -> impl Iterator<Item = OrderField> {
        Self::REQUIRED.into_iter().chain(Self::OPTIONAL)
    }

    /// Warehouse column name.
    pub fn column_name(&self) -> &'static str {
        match self {
            OrderField::CustomerId => "customer_id",
            OrderField::Age => "age",
            OrderField::Gender => "gender",
            OrderField::Category => "category",
            OrderField::ItemPurchased => "item_purchased",
            OrderField::PurchaseAmount => "purchase_amount_usd",
            OrderField::Location => "location",
            OrderField::ReviewRating => "review_rating",
            OrderField::SubscriptionStatus => "subscription_status",
            OrderField::PaymentMethod => "payment_method",
            OrderField::ProcessedTime => "processed_time",
            OrderField::FinalAmount => "final_amount_usd",
            OrderField::AmountCategory => "amount_category",
            OrderField::CustomerSegment => "customer_segment",
            OrderField::SatisfactionLevel => "satisfaction_level",
            OrderField::IsAnomaly => "is_anomaly",
            OrderField::EstimatedClv => "estimated_clv",
            OrderField::FrequencyCategory => "frequency_category",
            OrderField::EstimatedProfit => "estimated_profit_usd",
            OrderField::SeasonType => "season_type",
            OrderField::LoyaltyScore => "loyalty_score",
        }
    }

    /// Look up a field by its warehouse column name.
    pub fn from_column_name(name: &str) -> Option<OrderField> {
        Self::all().find(|f| f.column_name() == name)
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            OrderField::Age | OrderField::LoyaltyScore => FieldKind::Integer,
            OrderField::PurchaseAmount
            | OrderField::ReviewRating
            | OrderField::FinalAmount
            | OrderField::EstimatedClv
            | OrderField::EstimatedProfit => FieldKind::Numeric,
            OrderField::IsAnomaly => FieldKind::Flag,
            OrderField::ProcessedTime => FieldKind::Timestamp,
            _ => FieldKind::Text,
        }
    }

    /// Canonical Arrow type used when this crate builds order tables itself.
    pub fn data_type(&self) -> DataType {
        match self.kind() {
            FieldKind::Text => DataType::Utf8,
            FieldKind::Integer => DataType::Int64,
            FieldKind::Numeric => DataType::Float64,
            FieldKind::Flag => DataType::Boolean,
            FieldKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        }
    }

    pub fn to_arrow(&self) -> Field {
        Field::new(self.column_name(), self.data_type(), true)
    }
}

impl fmt::Display for OrderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// One purchase event, as produced by the warehouse pipeline.
///
/// The derived fields are `None` when upstream has not materialized them.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub customer_id: String,
    pub age: i64,
    pub gender: String,
    pub category: String,
    pub item_purchased: String,
    pub purchase_amount_usd: f64,
    pub location: String,
    pub review_rating: f64,
    pub subscription_status: String,
    pub payment_method: String,
    pub processed_time: DateTime<Utc>,
    pub final_amount_usd: Option<f64>,
    pub amount_category: Option<String>,
    pub customer_segment: Option<String>,
    pub satisfaction_level: Option<String>,
    pub is_anomaly: Option<bool>,
    pub estimated_clv: Option<f64>,
    pub frequency_category: Option<String>,
    pub estimated_profit_usd: Option<f64>,
    pub season_type: Option<String>,
    pub loyalty_score: Option<i64>,
}

impl Default for OrderRecord {
    fn default() -> Self {
        Self {
            customer_id: String::new(),
            age: 0,
            gender: String::new(),
            category: String::new(),
            item_purchased: String::new(),
            purchase_amount_usd: 0.0,
            location: String::new(),
            review_rating: 0.0,
            subscription_status: String::new(),
            payment_method: String::new(),
            processed_time: DateTime::<Utc>::default(),
            final_amount_usd: None,
            amount_category: None,
            customer_segment: None,
            satisfaction_level: None,
            is_anomaly: None,
            estimated_clv: None,
            frequency_category: None,
            estimated_profit_usd: None,
            season_type: None,
            loyalty_score: None,
        }
    }
}

/// The raw order table, freshest first.
///
/// Immutable once built: refreshes replace the whole table.
#[derive(Debug, Clone)]
pub struct OrderTable {
    batch: RecordBatch,
}

impl OrderTable {
    /// Wrap a fetched batch, validating the required core schema.
    ///
    /// A batch with no columns and no rows (what a failed fetch degrades to)
    /// becomes an empty table with the core schema.
    pub fn try_new(batch: RecordBatch) -> Result<Self> {
        if batch.num_columns() == 0 && batch.num_rows() == 0 {
            return Ok(Self::empty());
        }

        let schema = batch.schema();
        let missing: Vec<&str> = OrderField::REQUIRED
            .iter()
            .filter(|f| schema.index_of(f.column_name()).is_err())
            .map(|f| f.column_name())
            .collect();
        if !missing.is_empty() {
            return Err(DashboardError::schema_unavailable(format!(
                "order table is missing required columns: {}",
                missing.join(", ")
            )));
        }

        Ok(Self { batch })
    }

    /// An empty table carrying only the required core columns.
    pub fn empty() -> Self {
        Self {
            batch: RecordBatch::new_empty(Self::core_schema()),
        }
    }

    /// Arrow schema of the required core columns.
    pub fn core_schema() -> SchemaRef {
        Arc::new(Schema::new(
            OrderField::REQUIRED
                .iter()
                .map(|f| f.to_arrow())
                .collect::<Vec<_>>(),
        ))
    }

    /// Build a table from records. An optional column is only emitted when at
    /// least one record carries a value for it.
    pub fn from_records(records: &[OrderRecord]) -> Result<Self> {
        let mut fields = Vec::new();
        let mut columns: Vec<ArrayRef> = Vec::new();

        for field in OrderField::all() {
            let column = record_column(field, records);
            if let Some(column) = column {
                fields.push(field.to_arrow());
                columns.push(column);
            }
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Self::try_new(batch)
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// Whether the column for `field` is present.
    pub fn has(&self, field: OrderField) -> bool {
        self.batch.schema().index_of(field.column_name()).is_ok()
    }

    /// The subset of `fields` absent from this table.
    pub fn missing(&self, fields: &[OrderField]) -> Vec<OrderField> {
        fields.iter().copied().filter(|f| !self.has(*f)).collect()
    }

    /// Optional fields currently available.
    pub fn available_optional_fields(&self) -> Vec<OrderField> {
        OrderField::OPTIONAL
            .iter()
            .copied()
            .filter(|f| self.has(*f))
            .collect()
    }

    pub fn column(&self, field: OrderField) -> Option<&ArrayRef> {
        self.batch.column_by_name(field.column_name())
    }

    /// Values of `field` as text, or `None` when the column is absent.
    pub fn text(&self, field: OrderField) -> Result<Option<StringArray>> {
        self.cast_column::<StringArray>(field, &DataType::Utf8)
    }

    /// Values of `field` as floats, or `None` when the column is absent.
    pub fn numeric(&self, field: OrderField) -> Result<Option<Float64Array>> {
        self.cast_column::<Float64Array>(field, &DataType::Float64)
    }

    /// Values of `field` as booleans, or `None` when the column is absent.
    pub fn flag(&self, field: OrderField) -> Result<Option<BooleanArray>> {
        self.cast_column::<BooleanArray>(field, &DataType::Boolean)
    }

    /// Values of `field` as epoch seconds, or `None` when the column is absent.
    pub fn epoch_seconds(&self, field: OrderField) -> Result<Option<TimestampSecondArray>> {
        self.cast_column::<TimestampSecondArray>(field, &DataType::Timestamp(TimeUnit::Second, None))
    }

    /// Like [`OrderTable::text`] for a required column.
    pub fn required_text(&self, field: OrderField) -> Result<StringArray> {
        self.text(field)?.ok_or_else(|| missing_required(field))
    }

    /// Like [`OrderTable::numeric`] for a required column.
    pub fn required_numeric(&self, field: OrderField) -> Result<Float64Array> {
        self.numeric(field)?.ok_or_else(|| missing_required(field))
    }

    /// Rows where `mask` is true, as a new table. The source is untouched.
    pub fn filter(&self, mask: &BooleanArray) -> Result<OrderTable> {
        Ok(Self {
            batch: filter_record_batch(&self.batch, mask)?,
        })
    }

    fn cast_column<A: Array + Clone + 'static>(
        &self,
        field: OrderField,
        to: &DataType,
    ) -> Result<Option<A>> {
        let Some(column) = self.column(field) else {
            return Ok(None);
        };
        let casted = if column.data_type() == to {
            column.clone()
        } else {
            cast(column, to)?
        };
        casted
            .as_any()
            .downcast_ref::<A>()
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                DashboardError::internal(format!(
                    "column '{}' did not cast to {}",
                    field.column_name(),
                    to
                ))
            })
    }
}

impl Default for OrderTable {
    fn default() -> Self {
        Self::empty()
    }
}

fn missing_required(field: OrderField) -> DashboardError {
    DashboardError::schema_unavailable(format!(
        "required column '{}' is missing",
        field.column_name()
    ))
}

fn record_column(field: OrderField, records: &[OrderRecord]) -> Option<ArrayRef> {
    fn text(values: Vec<Option<&str>>) -> ArrayRef {
        Arc::new(StringArray::from(values))
    }
    fn float(values: Vec<Option<f64>>) -> ArrayRef {
        Arc::new(Float64Array::from(values))
    }
    fn optional<T>(values: Vec<Option<T>>, build: impl FnOnce(Vec<Option<T>>) -> ArrayRef) -> Option<ArrayRef> {
        values.iter().any(Option::is_some).then(|| build(values))
    }

    let column: ArrayRef = match field {
        OrderField::CustomerId => text(records.iter().map(|r| Some(r.customer_id.as_str())).collect()),
        OrderField::Age => Arc::new(Int64Array::from(records.iter().map(|r| r.age).collect::<Vec<_>>())),
        OrderField::Gender => text(records.iter().map(|r| Some(r.gender.as_str())).collect()),
        OrderField::Category => text(records.iter().map(|r| Some(r.category.as_str())).collect()),
        OrderField::ItemPurchased => text(records.iter().map(|r| Some(r.item_purchased.as_str())).collect()),
        OrderField::PurchaseAmount => float(records.iter().map(|r| Some(r.purchase_amount_usd)).collect()),
        OrderField::Location => text(records.iter().map(|r| Some(r.location.as_str())).collect()),
        OrderField::ReviewRating => float(records.iter().map(|r| Some(r.review_rating)).collect()),
        OrderField::SubscriptionStatus => {
            text(records.iter().map(|r| Some(r.subscription_status.as_str())).collect())
        }
        OrderField::PaymentMethod => text(records.iter().map(|r| Some(r.payment_method.as_str())).collect()),
        OrderField::ProcessedTime => Arc::new(
            TimestampMicrosecondArray::from(
                records
                    .iter()
                    .map(|r| r.processed_time.timestamp_micros())
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        ),
        OrderField::FinalAmount => {
            return optional(records.iter().map(|r| r.final_amount_usd).collect(), float)
        }
        OrderField::AmountCategory => {
            return optional(records.iter().map(|r| r.amount_category.as_deref()).collect(), text)
        }
        OrderField::CustomerSegment => {
            return optional(records.iter().map(|r| r.customer_segment.as_deref()).collect(), text)
        }
        OrderField::SatisfactionLevel => {
            return optional(records.iter().map(|r| r.satisfaction_level.as_deref()).collect(), text)
        }
        OrderField::IsAnomaly => {
            return optional(records.iter().map(|r| r.is_anomaly).collect(), |v| {
                Arc::new(BooleanArray::from(v))
            })
        }
        OrderField::EstimatedClv => {
            return optional(records.iter().map(|r| r.estimated_clv).collect(), float)
        }
        OrderField::FrequencyCategory => {
            return optional(records.iter().map(|r| r.frequency_category.as_deref()).collect(), text)
        }
        OrderField::EstimatedProfit => {
            return optional(records.iter().map(|r| r.estimated_profit_usd).collect(), float)
        }
        OrderField::SeasonType => {
            return optional(records.iter().map(|r| r.season_type.as_deref()).collect(), text)
        }
        OrderField::LoyaltyScore => {
            return optional(records.iter().map(|r| r.loyalty_score).collect(), |v| {
                Arc::new(Int64Array::from(v))
            })
        }
    };
    Some(column)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(amount: f64, category: &str) -> OrderRecord {
        OrderRecord {
            customer_id: "c-1".into(),
            category: category.into(),
            purchase_amount_usd: amount,
            ..Default::default()
        }
    }

    #[test]
    fn test_from_records_omits_absent_optional_columns() {
        let table = OrderTable::from_records(&[record(10.0, "Clothing")]).unwrap();
        assert_eq!(table.num_rows(), 1);
        assert!(table.has(OrderField::PurchaseAmount));
        assert!(!table.has(OrderField::CustomerSegment));
        assert!(table.available_optional_fields().is_empty());
    }

    #[test]
    fn test_from_records_emits_partially_filled_optional_column() {
        let mut with_segment = record(10.0, "Clothing");
        with_segment.customer_segment = Some("VIP".into());
        let table =
            OrderTable::from_records(&[with_segment, record(5.0, "Footwear")]).unwrap();
        let segments = table.text(OrderField::CustomerSegment).unwrap().unwrap();
        assert_eq!(segments.value(0), "VIP");
        assert!(segments.is_null(1));
    }

    #[test]
    fn test_try_new_rejects_missing_core_column() {
        let schema = Arc::new(Schema::new(vec![Field::new("category", DataType::Utf8, true)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec!["A"]))]).unwrap();
        let err = OrderTable::try_new(batch).unwrap_err();
        assert!(matches!(err, DashboardError::SchemaUnavailable { .. }));
        assert!(err.to_string().contains("purchase_amount_usd"));
    }

    #[test]
    fn test_try_new_accepts_columnless_empty_batch() {
        let batch = RecordBatch::new_empty(Arc::new(Schema::empty()));
        let table = OrderTable::try_new(batch).unwrap();
        assert!(table.is_empty());
        assert!(table.has(OrderField::Category));
    }

    #[test]
    fn test_numeric_accessor_casts_integers() {
        let table = OrderTable::from_records(&[OrderRecord {
            age: 42,
            ..Default::default()
        }])
        .unwrap();
        let ages = table.numeric(OrderField::Age).unwrap().unwrap();
        assert_eq!(ages.value(0), 42.0);
        assert!(table.numeric(OrderField::EstimatedClv).unwrap().is_none());
    }

    #[test]
    fn test_field_name_round_trip() {
        for field in OrderField::all() {
            assert_eq!(OrderField::from_column_name(field.column_name()), Some(field));
        }
        assert_eq!(OrderField::from_column_name("hour"), None);
    }
}
