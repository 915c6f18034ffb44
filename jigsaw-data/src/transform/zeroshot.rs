//! Zero-shot reformatting: labelled example columns become extra training rows.
//!
//! A row carrying `positive_example_1`, `negative_example_2`, ... next to its
//! rule contributes one extra `(rule, body, rule_violation)` row per example,
//! labelled 1 for positive examples and 0 for negative ones.

use super::StageContext;
use super::cleaning::remove_duplicates;
use crate::data::table::{Table, Value};
use crate::error::DataError;
use jigsaw_core::ZeroShotFormat;

/// Append the example rows to the feature table and drop duplicates.
///
/// Missing features or example columns are a soft failure: the input comes
/// back unchanged after a warning.
pub fn zero_shot_transform(table: Table, ctx: &StageContext<'_>, format: &ZeroShotFormat) -> Table {
    if ctx.is_submission() {
        return table;
    }
    match expand_examples(&table, ctx, format) {
        Ok(expanded) => {
            tracing::info!(
                dataset = ctx.dataset,
                file = ctx.file,
                rows_before = table.row_count(),
                rows_after = expanded.row_count(),
                "Transformed to zero-shot dataset"
            );
            remove_duplicates(expanded, ctx)
        }
        Err(e) => {
            tracing::warn!(
                dataset = ctx.dataset,
                file = ctx.file,
                error = %e,
                "Error transforming to zero-shot dataset, keeping input"
            );
            table
        }
    }
}

fn expand_examples(
    table: &Table,
    ctx: &StageContext<'_>,
    format: &ZeroShotFormat,
) -> Result<Table, DataError> {
    if ctx.schema.features.is_empty() {
        return Err(DataError::validation("no feature columns declared"));
    }

    let mut base_columns: Vec<&str> = ctx.schema.features.iter().map(String::as_str).collect();
    for target in ctx.schema.target_columns() {
        if table.has_column(target) && !base_columns.contains(&target) {
            base_columns.push(target);
        }
    }

    let mut parts = vec![table.select(&base_columns)?];
    for (prefix, label) in [(&format.positive_prefix, 1), (&format.negative_prefix, 0)] {
        for i in 1..=format.examples_per_polarity {
            let example = format!("{prefix}{i}");
            let mut part = table.select(&[format.key_column.as_str(), example.as_str()])?;
            part.rename_column(&example, &format.text_column);
            part.add_column(&format.target_column, vec![Value::Int(label); part.row_count()])?;
            parts.push(part);
        }
    }

    Ok(Table::concat(parts))
}
