//! Triplet sampling: pair every base row with negatives sharing its anchor.
//!
//! Rows of a binary-labelled table are split into a *base* side (class 1 by
//! default) that is repeated `n_samples` times, and a *pool* side (class 0)
//! that negatives are drawn from. `reversed` swaps the two sides. Pool rows are
//! dealt per anchor value from a shuffled bucket without replacement; an
//! exhausted bucket is reshuffled and dealt again, so every record gets
//! exactly `n_negatives` negatives.

use super::{FOLD_COLUMN, StageContext};
use crate::data::schema::{DataSchema, FileRole};
use crate::data::table::{Table, Value};
use crate::error::DataError;
use jigsaw_core::TripletConfig;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashMap;

pub const ANCHOR_COLUMN: &str = "anchor";
pub const POSITIVE_COLUMN: &str = "positive";
pub const NEGATIVE_COLUMN: &str = "negative";

/// Name of the `i`-th negative column. A single negative is just `negative`.
pub fn negative_column(i: usize, n_negatives: usize) -> String {
    if n_negatives == 1 {
        NEGATIVE_COLUMN.to_string()
    } else {
        format!("{NEGATIVE_COLUMN}_{i}")
    }
}

/// Result of [`build_triplets`].
#[derive(Debug, Clone, PartialEq)]
pub struct TripletOutput {
    pub table: Table,
    /// Records produced before duplicate removal.
    pub generated: usize,
    pub duplicates_dropped: usize,
    /// The input was returned untouched (submission file or foreign columns).
    pub passed_through: bool,
}

impl TripletOutput {
    fn pass_through(table: Table) -> Self {
        Self {
            table,
            generated: 0,
            duplicates_dropped: 0,
            passed_through: true,
        }
    }
}

/// Shuffled deal of the pool rows sharing one anchor value.
#[derive(Debug, Clone)]
struct Bucket {
    rows: Vec<usize>,
    cursor: usize,
    refills: usize,
}

impl Bucket {
    fn remaining(&self) -> usize {
        self.rows.len() - self.cursor
    }

    /// Reshuffle and restart the deal. Rows in `chosen` go to the back so a
    /// record does not repeat a negative while other rows are available.
    fn refill<R: Rng + ?Sized>(&mut self, chosen: &[usize], rng: &mut R) {
        self.rows.shuffle(rng);
        let (mut fresh, used): (Vec<usize>, Vec<usize>) =
            self.rows.iter().partition(|r| !chosen.contains(r));
        fresh.extend(used);
        self.rows = fresh;
        self.cursor = 0;
        self.refills += 1;
    }
}

/// Arena of buckets indexed by anchor value.
#[derive(Debug, Clone)]
struct AnchorBuckets {
    buckets: Vec<Bucket>,
    index: HashMap<Value, usize>,
}

impl AnchorBuckets {
    /// Group pool rows by anchor, in first-seen order, and shuffle each deal.
    fn build<R: Rng + ?Sized>(anchors: &[&Value], rng: &mut R) -> Self {
        let mut buckets: Vec<Bucket> = Vec::new();
        let mut index: HashMap<Value, usize> = HashMap::new();
        for (row, &anchor) in anchors.iter().enumerate() {
            let next = buckets.len();
            let slot = *index.entry(anchor.clone()).or_insert(next);
            if slot == next {
                buckets.push(Bucket {
                    rows: Vec::new(),
                    cursor: 0,
                    refills: 0,
                });
            }
            buckets[slot].rows.push(row);
        }
        for bucket in &mut buckets {
            bucket.rows.shuffle(rng);
        }
        Self { buckets, index }
    }

    /// Draw `n` pool rows for `anchor`, refilling the bucket as often as needed.
    ///
    /// Returns `None` when no pool row carries this anchor.
    fn draw<R: Rng + ?Sized>(&mut self, anchor: &Value, n: usize, rng: &mut R) -> Option<Vec<usize>> {
        let bucket = &mut self.buckets[*self.index.get(anchor)?];
        let mut chosen = Vec::with_capacity(n);
        while chosen.len() < n {
            if bucket.remaining() == 0 {
                bucket.refill(&chosen, rng);
            }
            chosen.push(bucket.rows[bucket.cursor]);
            bucket.cursor += 1;
        }
        Some(chosen)
    }

    fn refills(&self) -> usize {
        self.buckets.iter().map(|b| b.refills).sum()
    }
}

/// The single binary target column of the schema.
fn binary_target<'a>(ctx: &StageContext<'a>) -> Result<&'a str, DataError> {
    match ctx.schema.target_columns().as_slice() {
        [target] => Ok(*target),
        _ => Err(DataError::transformation(
            ctx.dataset,
            ctx.file,
            "triplet conversion needs exactly one target column",
        )),
    }
}

/// The anchor and sample columns must be features of `schema`.
pub fn check_triplet_columns(
    dataset: &str,
    schema: &DataSchema,
    config: &TripletConfig,
) -> Result<(), DataError> {
    for required in [&config.anchor_column, &config.sample_column] {
        if !schema.features.contains(required) {
            return Err(DataError::configuration(format!(
                "triplet column '{required}' is not a feature of dataset '{dataset}'"
            )));
        }
    }
    Ok(())
}

/// Split row indices into (class 1, class 0), rejecting anything but two 0/1 classes.
fn split_classes(
    table: &Table,
    target: &str,
    ctx: &StageContext<'_>,
) -> Result<(Vec<usize>, Vec<usize>), DataError> {
    let mut ones = Vec::new();
    let mut zeros = Vec::new();
    for (row, value) in table.column_values(target)?.into_iter().enumerate() {
        match value {
            Value::Int(1) => ones.push(row),
            Value::Int(0) => zeros.push(row),
            other => {
                return Err(DataError::transformation(
                    ctx.dataset,
                    ctx.file,
                    format!("target '{target}' holds non-binary value '{other}'"),
                ));
            }
        }
    }
    if ones.is_empty() || zeros.is_empty() {
        return Err(DataError::transformation(
            ctx.dataset,
            ctx.file,
            format!("target '{target}' must hold exactly two classes"),
        ));
    }
    Ok((ones, zeros))
}

/// Build anchor/positive/negative records from a binary-labelled table.
///
/// Only train files are converted: test and submission files, and tables
/// lacking the schema's feature and target columns, pass through untouched.
/// An anchor or sample column outside the schema features is a configuration
/// error. A non-binary target or an anchor with no pool rows is a
/// transformation error. A record count or negative width differing from the
/// configuration is an invariant violation.
pub fn build_triplets<R: Rng + ?Sized>(
    table: Table,
    ctx: &StageContext<'_>,
    config: &TripletConfig,
    rng: &mut R,
) -> Result<TripletOutput, DataError> {
    if ctx.role != FileRole::Train {
        return Ok(TripletOutput::pass_through(table));
    }
    let target = binary_target(ctx)?;

    let mut columns = ctx.schema.feature_and_target_columns();
    if columns.iter().any(|c| !table.has_column(c)) {
        tracing::debug!(
            dataset = ctx.dataset,
            file = ctx.file,
            "Columns differ from schema features and target, skipping triplets"
        );
        return Ok(TripletOutput::pass_through(table));
    }
    check_triplet_columns(ctx.dataset, ctx.schema, config)?;
    let has_fold = table.has_column(FOLD_COLUMN) && !columns.contains(&FOLD_COLUMN);
    if has_fold {
        columns.push(FOLD_COLUMN);
    }
    let data = table.select(&columns)?;

    let (ones, zeros) = split_classes(&data, target, ctx)?;
    let (base, pool) = if config.reversed {
        (zeros, ones)
    } else {
        (ones, zeros)
    };

    let anchor_idx = data
        .column_index(&config.anchor_column)
        .ok_or_else(|| DataError::missing_column(&config.anchor_column))?;
    let sample_idx = data
        .column_index(&config.sample_column)
        .ok_or_else(|| DataError::missing_column(&config.sample_column))?;
    let target_idx = data
        .column_index(target)
        .ok_or_else(|| DataError::missing_column(target))?;
    let fold_idx = data.column_index(FOLD_COLUMN).filter(|_| has_fold);

    let pool_anchors: Vec<&Value> = pool.iter().map(|&r| &data.rows[r][anchor_idx]).collect();
    let mut buckets = AnchorBuckets::build(&pool_anchors, rng);

    tracing::info!(
        dataset = ctx.dataset,
        file = ctx.file,
        n_samples = config.n_samples,
        n_negatives = config.n_negatives,
        base_rows = base.len(),
        pool_rows = pool.len(),
        reversed = config.reversed,
        "Generating triplets"
    );

    // Output layout: carried columns (anchor and positive renamed), negatives, fold.
    let carried: Vec<usize> = (0..data.column_count())
        .filter(|&i| i != target_idx && Some(i) != fold_idx)
        .collect();
    let mut out_columns: Vec<String> = carried
        .iter()
        .map(|&i| match i {
            i if i == anchor_idx => ANCHOR_COLUMN.to_string(),
            i if i == sample_idx => POSITIVE_COLUMN.to_string(),
            i => data.columns[i].clone(),
        })
        .collect();
    out_columns.extend((0..config.n_negatives).map(|i| negative_column(i, config.n_negatives)));
    if has_fold {
        out_columns.push(FOLD_COLUMN.to_string());
    }

    let mut rows = Vec::with_capacity(base.len() * config.n_samples);
    for _ in 0..config.n_samples {
        for &b in &base {
            let row = &data.rows[b];
            let anchor = &row[anchor_idx];
            let drawn = buckets
                .draw(anchor, config.n_negatives, rng)
                .ok_or_else(|| {
                    DataError::transformation(
                        ctx.dataset,
                        ctx.file,
                        format!("no pool rows for anchor '{anchor}'"),
                    )
                })?;
            if drawn.len() != config.n_negatives {
                return Err(DataError::invariant(
                    ctx.dataset,
                    ctx.file,
                    format!("drew {} negatives, expected {}", drawn.len(), config.n_negatives),
                ));
            }

            let mut record: Vec<Value> = carried.iter().map(|&i| row[i].clone()).collect();
            record.extend(drawn.iter().map(|&p| data.rows[pool[p]][sample_idx].clone()));
            if let Some(f) = fold_idx {
                record.push(row[f].clone());
            }
            rows.push(record);
        }
    }

    let generated = rows.len();
    if generated != base.len() * config.n_samples {
        return Err(DataError::invariant(
            ctx.dataset,
            ctx.file,
            format!(
                "generated {generated} records, expected {} x {}",
                base.len(),
                config.n_samples
            ),
        ));
    }

    let mut out = Table::new(out_columns, rows);
    let duplicates_dropped = out.drop_duplicates::<&str>(None)?;

    tracing::info!(
        dataset = ctx.dataset,
        file = ctx.file,
        generated,
        duplicates_dropped,
        refills = buckets.refills(),
        "Generated triplets"
    );

    Ok(TripletOutput {
        table: out,
        generated,
        duplicates_dropped,
        passed_through: false,
    })
}
