//! Table formatting utilities for structured output.

use comfy_table::{
    Attribute, Cell, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};

use crate::generation::GenerationInfo;
use crate::retrieve::RetrievedDocument;

/// Longest text excerpt shown in a results table cell.
const EXCERPT_CHARS: usize = 120;

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
        table.set_content_arrangement(ContentArrangement::Dynamic);
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

    /// Add a row of pre-styled cells.
    pub fn add_cells(mut self, row: Vec<Cell>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Table of generations on disk, current one highlighted.
pub fn generations_table(generations: &[GenerationInfo]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec![
        "Generation",
        "Current",
        "Vectors",
        "Dim",
        "Model",
        "Created",
    ]);

    for info in generations {
        let current = if info.is_current {
            Cell::new("✓").fg(Color::Green).add_attribute(Attribute::Bold)
        } else {
            Cell::new("")
        };
        let row = match &info.manifest {
            Some(manifest) => vec![
                Cell::new(info.generation),
                current,
                Cell::new(manifest.vector_count),
                Cell::new(manifest.dim),
                Cell::new(&manifest.model),
                Cell::new(&manifest.created_at),
            ],
            None => vec![
                Cell::new(info.generation),
                current,
                Cell::new("?"),
                Cell::new("?"),
                Cell::new("manifest unreadable").fg(Color::Red),
                Cell::new(""),
            ],
        };
        builder = builder.add_cells(row);
    }

    builder.build()
}

/// Table of ranked query results.
pub fn results_table(results: &[RetrievedDocument]) -> String {
    let mut builder =
        TableBuilder::new().set_headers(vec!["Rank", "Row", "Distance", "Cosine", "Document"]);

    for (rank, hit) in results.iter().enumerate() {
        let label = hit
            .document
            .field("title")
            .or_else(|| hit.document.field("path"))
            .map(str::to_string)
            .unwrap_or_else(|| excerpt(&hit.document.text));
        builder = builder.add_row(vec![
            (rank + 1).to_string(),
            hit.document.row_id.to_string(),
            format!("{:.4}", hit.distance),
            format!("{:.4}", hit.cosine_similarity()),
            label,
        ]);
    }

    builder.build()
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    format!("{cut}…")
}
