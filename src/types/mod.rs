//! Table types shared across the dashboard core.
//!
//! Order data travels as Apache Arrow record batches; [`OrderTable`] wraps
//! the raw batch with the schema contract the aggregations rely on.

mod order;

pub use order::{FieldKind, OrderField, OrderRecord, OrderTable};
