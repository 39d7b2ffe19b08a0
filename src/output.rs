//! Presentation of dashboard frames.
//!
//! The refresh loop hands every frame to a [`Presenter`]. The console
//! presenter renders it in one of three formats:
//! - Table (default, pretty-printed)
//! - CSV
//! - JSON Lines

use std::io::{self, Write};

use arrow::csv::WriterBuilder as CsvWriterBuilder;
use arrow::json::LineDelimitedWriter;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use serde_json::json;

use crate::error::{DashboardError, Result};
use crate::frame::DashboardFrame;
use crate::metrics::Derived;

/// Consumer of rendered frames.
pub trait Presenter {
    /// Render a completed frame. Errors stop the refresh loop.
    fn present(&mut self, frame: &DashboardFrame) -> Result<()>;

    /// Surface a failure that aborted a cycle.
    fn report_error(&mut self, error: &DashboardError);
}

impl<P: Presenter + ?Sized> Presenter for Box<P> {
    fn present(&mut self, frame: &DashboardFrame) -> Result<()> {
        (**self).present(frame)
    }

    fn report_error(&mut self, error: &DashboardError) {
        (**self).report_error(error)
    }
}

/// Output format for rendered tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Pretty-printed table (default)
    #[default]
    Table,
    /// Comma-separated values
    Csv,
    /// JSON Lines (newline-delimited JSON)
    Json,
}

impl OutputFormat {
    /// Parse output format from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "csv" => Ok(Self::Csv),
            "json" | "jsonl" | "ndjson" => Ok(Self::Json),
            _ => Err(DashboardError::invalid_argument(format!(
                "Unknown output format: '{}'. Valid formats: table, csv, json",
                s
            ))),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = DashboardError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        OutputFormat::parse(s)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Csv => write!(f, "csv"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Format record batches as a string in the specified format.
pub fn format_batches(batches: &[RecordBatch], format: OutputFormat) -> Result<String> {
    if batches.is_empty() {
        return Ok(String::new());
    }

    match format {
        OutputFormat::Table => Ok(pretty_format_batches(batches)?.to_string()),
        OutputFormat::Csv => {
            let mut buf = Vec::new();
            {
                let mut writer = CsvWriterBuilder::new().with_header(true).build(&mut buf);
                for batch in batches {
                    writer.write(batch)?;
                }
            }
            String::from_utf8(buf).map_err(|e| DashboardError::internal(e.to_string()))
        }
        OutputFormat::Json => {
            let mut buf = Vec::new();
            {
                let mut writer = LineDelimitedWriter::new(&mut buf);
                for batch in batches {
                    writer.write(batch)?;
                }
                writer.finish()?;
            }
            String::from_utf8(buf).map_err(|e| DashboardError::internal(e.to_string()))
        }
    }
}

/// Writes frames to a text sink, one section per table.
pub struct ConsolePresenter<W: Write> {
    out: W,
    format: OutputFormat,
    /// Write failure from `report_error`, returned by the next `present`
    pending: Option<io::Error>,
}

impl ConsolePresenter<io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            out,
            format,
            pending: None,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&mut self, frame: &DashboardFrame) -> Result<()> {
        let h = &frame.headline;
        match self.format {
            OutputFormat::Json => {
                let header = json!({
                    "section": "headline",
                    "cycle": frame.cycle,
                    "generated_at": frame.generated_at.to_rfc3339(),
                    "total_orders": h.total_orders,
                    "total_revenue": h.total_revenue,
                    "average_order_value": h.average_order_value,
                    "average_rating": h.average_rating,
                    "anomaly_count": h.anomaly_count,
                    "anomaly_rate": h.anomaly_rate,
                    "total_profit": h.total_profit,
                    "vip_orders": h.vip_orders,
                    "final_revenue": h.final_revenue,
                    "defaulted": h.defaulted.iter().map(|f| f.column_name()).collect::<Vec<_>>(),
                    "warnings": frame.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
                });
                writeln!(self.out, "{}", serde_json::to_string(&header)?)?;
            }
            OutputFormat::Table | OutputFormat::Csv => {
                writeln!(
                    self.out,
                    "== orderpulse cycle {} at {} ==",
                    frame.cycle,
                    frame.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
                )?;
                writeln!(
                    self.out,
                    "orders {} | revenue {:.2} | avg order {:.2} | avg rating {:.2} | anomalies {} ({:.1}%) | profit {:.2} | VIP {} | final revenue {:.2}",
                    h.total_orders,
                    h.total_revenue,
                    h.average_order_value,
                    h.average_rating,
                    h.anomaly_count,
                    h.anomaly_rate * 100.0,
                    h.total_profit,
                    h.vip_orders,
                    h.final_revenue,
                )?;
                for warning in &frame.warnings {
                    writeln!(self.out, "warning: {}", warning)?;
                }
            }
        }

        let derived = &frame.derived;
        if let Some(overview) = derived.overview.available() {
            self.section("orders by hour", &overview.hourly)?;
            self.section("top categories by volume", &overview.top_categories_by_volume)?;
            self.section("top categories by revenue", &overview.top_categories_by_revenue)?;
        }
        self.derived_section("revenue by segment", &derived.segments)?;
        if let Some(vip) = derived.vip.available() {
            self.section("VIP premium by category", &vip.by_category)?;
            self.section("VIP premium loyalty", &vip.loyalty_distribution)?;
        }
        if let Some(detail) = &frame.vip_detail {
            self.section("VIP premium orders", detail)?;
        }
        if let Some(anomalies) = derived.anomalies.available() {
            self.section("anomalies by category", &anomalies.by_category)?;
            self.section("anomalies by location", &anomalies.by_location)?;
        }
        if let Some(detail) = &frame.anomaly_detail {
            self.section("anomalous orders", detail)?;
        }
        if let Some(satisfaction) = derived.satisfaction.available() {
            self.section("satisfaction by category", &satisfaction.count_pivot)?;
            self.section("satisfaction revenue by category", &satisfaction.revenue_pivot)?;
        }
        self.derived_section("amount categories", &derived.amount_distribution)?;
        self.derived_section("frequency categories", &derived.frequency_distribution)?;
        for view in &frame.views {
            self.section(view.view.view_name(), &view.table)?;
        }
        self.derived_section("orders by age and gender", &frame.age_gender_pivot)?;

        let caption = frame.display.caption();
        self.section(&caption, &frame.display.table)?;
        self.out.flush()?;
        Ok(())
    }

    fn derived_section(&mut self, title: &str, table: &Derived<RecordBatch>) -> Result<()> {
        match table.available() {
            Some(batch) => self.section(title, batch),
            None => Ok(()),
        }
    }

    fn section(&mut self, title: &str, batch: &RecordBatch) -> Result<()> {
        if batch.num_rows() == 0 {
            return Ok(());
        }
        let body = format_batches(std::slice::from_ref(batch), self.format)?;
        match self.format {
            OutputFormat::Json => {
                writeln!(self.out, "{}", json!({ "section": title }))?;
                write!(self.out, "{}", body)?;
            }
            OutputFormat::Table | OutputFormat::Csv => {
                writeln!(self.out, "\n-- {} --", title)?;
                writeln!(self.out, "{}", body.trim_end())?;
            }
        }
        Ok(())
    }
}

impl<W: Write> Presenter for ConsolePresenter<W> {
    fn present(&mut self, frame: &DashboardFrame) -> Result<()> {
        if let Some(err) = self.pending.take() {
            return Err(DashboardError::presentation(format!(
                "error report was not written: {}",
                err
            )));
        }
        self.render(frame)
            .map_err(|e| DashboardError::presentation(e.to_string()))
    }

    fn report_error(&mut self, error: &DashboardError) {
        let line = match self.format {
            OutputFormat::Json => json!({
                "section": "error",
                "kind": error.kind(),
                "message": error.to_string(),
            })
            .to_string(),
            OutputFormat::Table | OutputFormat::Csv => format!("error [{}]: {}", error.kind(), error),
        };
        if let Err(err) = writeln!(self.out, "{}", line) {
            self.pending = Some(err);
        }
    }
}
