//! Duplicate removal ahead of every other stage.

use super::StageContext;
use crate::data::table::Table;

/// Drop rows repeating an earlier row on the schema's feature columns.
///
/// When the features are undeclared or absent from the table, falls back to
/// exact duplicates over all columns. Submission files pass through.
pub fn remove_duplicates(mut table: Table, ctx: &StageContext<'_>) -> Table {
    if ctx.is_submission() {
        return table;
    }

    let features = &ctx.schema.features;
    let on_features = if features.is_empty() {
        None
    } else {
        table.drop_duplicates(Some(features.as_slice())).ok()
    };

    let dropped = match on_features {
        Some(dropped) => dropped,
        None => {
            tracing::warn!(
                dataset = ctx.dataset,
                file = ctx.file,
                features = ?features,
                "Failed cleaning out duplicates on features, dropping exact duplicates"
            );
            // Over all columns the subset cannot be missing.
            table.drop_duplicates::<&str>(None).unwrap_or(0)
        }
    };

    tracing::info!(
        dataset = ctx.dataset,
        file = ctx.file,
        dropped,
        rows = table.row_count(),
        "Cleaned out duplicates"
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::{FileRole, SchemaRegistry};
    use crate::data::table::Value;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_yaml_str(
            "d:\n  columns: { body: str, rule: str, label: int }\n  features: [body, rule]\n  target: label\n",
        )
        .unwrap()
    }

    fn table() -> Table {
        Table::new(
            vec!["body".into(), "rule".into(), "label".into()],
            vec![
                vec!["a".into(), "r".into(), Value::Int(1)],
                vec!["a".into(), "r".into(), Value::Int(0)],
                vec!["b".into(), "r".into(), Value::Int(0)],
                vec!["b".into(), "r".into(), Value::Int(0)],
            ],
        )
    }

    #[test]
    fn test_dedup_on_features() {
        let registry = registry();
        let ctx = StageContext {
            dataset: "d",
            file: "train.csv",
            role: FileRole::Train,
            schema: registry.get("d").unwrap(),
        };
        let out = remove_duplicates(table(), &ctx);
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.rows[0][2], Value::Int(1));
    }

    #[test]
    fn test_missing_features_fall_back_to_exact() {
        let registry = registry();
        let ctx = StageContext {
            dataset: "d",
            file: "train.csv",
            role: FileRole::Train,
            schema: registry.get("d").unwrap(),
        };
        let out = remove_duplicates(table().drop_columns(&["rule"]), &ctx);
        assert_eq!(out.row_count(), 3);
    }

    #[test]
    fn test_submission_passes_through() {
        let registry = registry();
        let ctx = StageContext {
            dataset: "d",
            file: "sample_submission.csv",
            role: FileRole::Submission,
            schema: registry.get("d").unwrap(),
        };
        assert_eq!(remove_duplicates(table(), &ctx).row_count(), 4);
    }
}
