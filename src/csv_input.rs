// CSV loading for the bulk flows. Rows are deserialized with serde after
// checking the header, so a wrong file gets a message naming the columns.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Read every row of `path`, requiring the `required` header columns.
pub fn load_rows<T: DeserializeOwned>(path: &Path, required: &[&str]) -> Result<Vec<T>> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        bail!(
            "CSV must have columns: {} (missing: {})",
            required.join(","),
            missing.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize().enumerate() {
        // +2: one for the header, one for 1-based numbering
        let row: T = record.with_context(|| format!("Invalid CSV row {}", idx + 2))?;
        rows.push(row);
    }
    if rows.is_empty() {
        bail!("CSV file is empty");
    }
    Ok(rows)
}
