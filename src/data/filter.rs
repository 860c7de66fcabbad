use anyhow::Result;

use super::model::EventTable;

// ---------------------------------------------------------------------------
// Row predicates
// ---------------------------------------------------------------------------

/// Return indices of rows where every listed column is strictly positive.
/// `NaN` cells fail the test.
pub fn positive_indices(table: &EventTable, columns: &[&str]) -> Result<Vec<usize>> {
    let cols = columns
        .iter()
        .map(|name| table.require(name))
        .collect::<Result<Vec<_>>>()?;

    Ok((0..table.n_rows())
        .filter(|&row| cols.iter().all(|col| col[row] > 0.0))
        .collect())
}

/// Keep only rows where every listed column is strictly positive, as log
/// axes require.
pub fn positive_rows(table: &EventTable, columns: &[&str]) -> Result<EventTable> {
    let rows = positive_indices(table, columns)?;
    Ok(table.select_rows(&rows))
}

/// Drop missing (`NaN`) and infinite values.
pub fn drop_missing(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}
