//! Table formatting utilities for structured output.

use comfy_table::{
    Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::semantic::BackfillReport;
use crate::storage::StoreMetadata;
use crate::types::{Payload, Record, SearchResult};

const MAX_CELL_CHARS: usize = 60;

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Add a row of prepared cells.
    pub fn add_cells(mut self, row: Vec<Cell>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Ranked search hits, best first.
pub fn create_results_table(results: &[SearchResult]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec!["#", "Score", "Id", "Text", "Answer"]);

    for (rank, result) in results.iter().enumerate() {
        let score = result.score.get();
        let color = if score >= 0.75 {
            Color::Green
        } else if score >= 0.5 {
            Color::Yellow
        } else {
            Color::Reset
        };
        builder = builder.add_cells(vec![
            Cell::new(rank + 1),
            Cell::new(format!("{score:.3}")).fg(color),
            Cell::new(result.id.as_str()),
            Cell::new(truncate(&result.text)),
            Cell::new(truncate(&payload_summary(&result.payload))),
        ]);
    }

    builder.build()
}

/// All records with their embedding state.
pub fn create_records_table(records: &[(Record, bool)]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec!["Id", "Text", "Answer", "Embedded"]);

    for (record, embedded) in records {
        let marker = if *embedded {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("pending").fg(Color::Yellow)
        };
        builder = builder.add_cells(vec![
            Cell::new(record.id.as_str()),
            Cell::new(truncate(&record.text)),
            Cell::new(truncate(&payload_summary(&record.payload))),
            marker,
        ]);
    }

    builder.build()
}

/// Summary of a finished backfill run.
pub fn create_backfill_table(report: &BackfillReport) -> String {
    let failed_color = if report.failed_ids.is_empty() {
        Color::Reset
    } else {
        Color::Red
    };

    TableBuilder::new()
        .set_headers(vec!["Metric", "Value"])
        .add_row(vec![
            "Missing at start".to_string(),
            report.total_missing.to_string(),
        ])
        .add_cells(vec![
            Cell::new("Generated"),
            Cell::new(report.generated)
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
        ])
        .add_cells(vec![
            Cell::new("Failed records"),
            Cell::new(report.failed_ids.len()).fg(failed_color),
        ])
        .add_row(vec![
            "Failed batches".to_string(),
            report.failed_batches.to_string(),
        ])
        .add_row(vec![
            "Edited during run".to_string(),
            report.stale_skipped.to_string(),
        ])
        .add_row(vec![
            "Deleted during run".to_string(),
            report.vanished_skipped.to_string(),
        ])
        .build()
}

/// Store and model overview for `status`.
pub fn create_status_table(
    metadata: &StoreMetadata,
    missing: usize,
    model: &str,
    semantic: Result<(), &str>,
) -> String {
    let semantic_cell = match semantic {
        Ok(()) => Cell::new("available").fg(Color::Green),
        Err(reason) => Cell::new(format!("disabled: {reason}")).fg(Color::Yellow),
    };

    TableBuilder::new()
        .set_headers(vec!["Property", "Value"])
        .add_row(vec!["Records".to_string(), metadata.record_count.to_string()])
        .add_row(vec![
            "Embeddings".to_string(),
            metadata.embedding_count.to_string(),
        ])
        .add_row(vec!["Missing embeddings".to_string(), missing.to_string()])
        .add_row(vec![
            "Dimension".to_string(),
            metadata
                .dimension
                .map_or_else(|| "-".to_string(), |d| d.to_string()),
        ])
        .add_row(vec![
            "Stored model".to_string(),
            metadata.model_name.clone().unwrap_or_else(|| "-".to_string()),
        ])
        .add_row(vec!["Configured model".to_string(), model.to_string()])
        .add_cells(vec![Cell::new("Semantic search"), semantic_cell])
        .build()
}

/// The `answer` field if present, otherwise the payload as compact JSON.
fn payload_summary(payload: &Payload) -> String {
    match payload.get("answer") {
        Some(serde_json::Value::String(answer)) => answer.clone(),
        Some(other) => other.to_string(),
        None if payload.is_empty() => String::new(),
        None => serde_json::Value::Object(payload.clone()).to_string(),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_CELL_CHARS {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(MAX_CELL_CHARS - 1).collect();
    shortened.push('…');
    shortened
}
