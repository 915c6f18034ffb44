//! Pairwise expansion: one row per (anchor, positive, negative) of every triplet record.

use super::triplet::{ANCHOR_COLUMN, NEGATIVE_COLUMN, POSITIVE_COLUMN, negative_column};
use super::{FOLD_COLUMN, StageContext};
use crate::data::table::Table;
use crate::error::DataError;

/// Flatten records with `n_negatives` negative columns into single-negative rows.
///
/// Tables that are not triplet records (passed through by the triplet stage)
/// come back untouched. Repeated pairs are dropped.
pub fn expand_pairs(
    table: Table,
    ctx: &StageContext<'_>,
    n_negatives: usize,
) -> Result<Table, DataError> {
    if ctx.is_submission()
        || !table.has_column(ANCHOR_COLUMN)
        || !table.has_column(POSITIVE_COLUMN)
    {
        return Ok(table);
    }

    let negatives: Vec<String> = (0..n_negatives)
        .map(|i| negative_column(i, n_negatives))
        .collect();
    let negative_idx = negatives
        .iter()
        .map(|c| {
            table.column_index(c).ok_or_else(|| {
                DataError::invariant(
                    ctx.dataset,
                    ctx.file,
                    format!("triplet records lack column '{c}'"),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let fold_idx = table.column_index(FOLD_COLUMN);

    let carried: Vec<usize> = (0..table.column_count())
        .filter(|i| !negative_idx.contains(i) && Some(*i) != fold_idx)
        .collect();
    let mut columns: Vec<String> = carried.iter().map(|&i| table.columns[i].clone()).collect();
    columns.push(NEGATIVE_COLUMN.to_string());
    if fold_idx.is_some() {
        columns.push(FOLD_COLUMN.to_string());
    }

    let mut rows = Vec::with_capacity(table.row_count() * n_negatives);
    for row in &table.rows {
        for &n in &negative_idx {
            let mut pair: Vec<_> = carried.iter().map(|&i| row[i].clone()).collect();
            pair.push(row[n].clone());
            if let Some(f) = fold_idx {
                pair.push(row[f].clone());
            }
            rows.push(pair);
        }
    }

    let records = table.row_count();
    let mut out = Table::new(columns, rows);
    let dropped = out.drop_duplicates::<&str>(None)?;
    tracing::info!(
        dataset = ctx.dataset,
        file = ctx.file,
        records,
        pairs = out.row_count(),
        dropped,
        "Expanded triplets into pairs"
    );
    Ok(out)
}
