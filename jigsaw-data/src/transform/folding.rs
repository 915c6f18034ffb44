//! Fold assignment: plain, stratified and multilabel-stratified K-fold.
//!
//! The request is classified up front by [`plan_folds`]: when the label
//! columns are absent or cannot be encoded, the plan is plain K-fold with the
//! reason attached, and no stratified attempt is made.
//!
//! Every variant balances fold membership to within one row per
//! stratification group (the whole table for plain K-fold, a label value for
//! stratified, a label combination for multilabel). All randomness comes
//! from the caller's RNG, so the fold column is a function of row order and
//! RNG state.

use super::{FOLD_COLUMN, StageContext};
use crate::data::schema::DataSchema;
use crate::data::table::{Table, Value};
use crate::error::DataError;
use jigsaw_core::{LabelSpec, SplitKind, SplitterConfig};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashMap;

/// Fold value of a row not yet assigned.
pub const UNASSIGNED: i64 = -1;

/// How a table will be split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldPlan {
    /// `reason` is set when stratification was requested but is not possible.
    Plain { reason: Option<String> },
    Stratified { column: String },
    Multilabel { columns: Vec<String> },
}

impl FoldPlan {
    pub fn kind(&self) -> SplitKind {
        match self {
            FoldPlan::Plain { .. } => SplitKind::Kfold,
            FoldPlan::Stratified { .. } => SplitKind::Skfold,
            FoldPlan::Multilabel { .. } => SplitKind::Mlskfold,
        }
    }
}

/// Label columns and forced strategy for a splitter section applied to `schema`.
///
/// Explicit `labels` always stratify. Without them the schema target is used,
/// except that `type = "kfold"` forces plain K-fold.
pub fn resolve_request(
    splitter: &SplitterConfig,
    schema: &DataSchema,
) -> (Option<LabelSpec>, Option<SplitKind>) {
    match (&splitter.labels, splitter.kind) {
        (Some(labels), _) => (Some(labels.clone()), None),
        (None, SplitKind::Kfold) => (schema.target.clone(), Some(SplitKind::Kfold)),
        (None, _) => (schema.target.clone(), None),
    }
}

/// Classify a fold request against the table it will run on.
///
/// Without a forced kind, a multi-column label list selects multilabel
/// stratification, and a single column (or one-element list) selects
/// stratified K-fold.
pub fn plan_folds(table: &Table, labels: Option<&LabelSpec>, forced: Option<SplitKind>) -> FoldPlan {
    if forced == Some(SplitKind::Kfold) {
        return FoldPlan::Plain { reason: None };
    }
    let Some(labels) = labels.filter(|l| !l.is_empty()) else {
        return FoldPlan::Plain {
            reason: Some("no label columns given".to_string()),
        };
    };

    for column in labels.columns() {
        if let Err(reason) = check_encodable(table, column) {
            return FoldPlan::Plain {
                reason: Some(reason),
            };
        }
    }

    match (labels.collapse(), forced) {
        (LabelSpec::Single(column), Some(SplitKind::Mlskfold)) => FoldPlan::Multilabel {
            columns: vec![column],
        },
        (LabelSpec::Single(column), _) => FoldPlan::Stratified { column },
        (LabelSpec::Multi(columns), _) => FoldPlan::Multilabel { columns },
    }
}

fn check_encodable(table: &Table, column: &str) -> Result<(), String> {
    let values = table
        .column_values(column)
        .map_err(|_| format!("label column '{column}' not found"))?;
    if values.iter().any(|v| v.is_null()) {
        return Err(format!("label column '{column}' has missing values"));
    }
    Ok(())
}

/// Class codes of one label column, built and dropped within one assignment.
///
/// Integer columns keep their numeric order; other columns are coded by
/// first appearance.
struct LabelEncoding {
    codes: Vec<usize>,
    classes: usize,
}

impl LabelEncoding {
    fn fit(values: &[&Value]) -> Self {
        let mut distinct: Vec<&Value> = Vec::new();
        let mut index: HashMap<&Value, usize> = HashMap::new();
        for &v in values {
            if !index.contains_key(v) {
                index.insert(v, distinct.len());
                distinct.push(v);
            }
        }

        if distinct.iter().all(|v| v.as_int().is_some()) {
            distinct.sort_by_key(|v| v.as_int());
            for (code, v) in distinct.iter().enumerate() {
                index.insert(*v, code);
            }
        }

        let codes = values.iter().map(|v| index[v]).collect();
        Self {
            codes,
            classes: distinct.len(),
        }
    }
}

fn encode(table: &Table, columns: &[&str]) -> Result<Vec<LabelEncoding>, DataError> {
    columns
        .iter()
        .map(|c| Ok(LabelEncoding::fit(&table.column_values(c)?)))
        .collect()
}

/// Fold index of every row under `plan`.
pub fn fold_indices<R: Rng + ?Sized>(
    table: &Table,
    plan: &FoldPlan,
    n_splits: usize,
    rng: &mut R,
) -> Result<Vec<i64>, DataError> {
    if n_splits < 2 {
        return Err(DataError::InvalidSplits(n_splits));
    }
    let n = table.row_count();
    Ok(match plan {
        FoldPlan::Plain { .. } => plain_folds(n, n_splits, rng),
        FoldPlan::Stratified { column } => {
            let encoding = encode(table, &[column.as_str()])?;
            stratified_folds(&encoding[0], n_splits, rng)
        }
        FoldPlan::Multilabel { columns } => {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            multilabel_folds(&encode(table, &columns)?, n, n_splits, rng)
        }
    })
}

/// Shuffle, then cut into contiguous folds; the first `n % k` folds get one extra row.
fn plain_folds<R: Rng + ?Sized>(n: usize, k: usize, rng: &mut R) -> Vec<i64> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);

    let mut folds = vec![UNASSIGNED; n];
    let (base, extra) = (n / k, n % k);
    let mut rows = order.into_iter();
    for fold in 0..k {
        let size = base + usize::from(fold < extra);
        for row in rows.by_ref().take(size) {
            folds[row] = fold as i64;
        }
    }
    folds
}

/// Lay the shuffled rows of each class end to end and deal positions round-robin.
///
/// A class occupies a contiguous run of positions, so each fold receives
/// `floor` or `ceil` of its size over `k`; the totals stay within one as well.
fn stratified_folds<R: Rng + ?Sized>(encoding: &LabelEncoding, k: usize, rng: &mut R) -> Vec<i64> {
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); encoding.classes];
    for (row, &code) in encoding.codes.iter().enumerate() {
        by_class[code].push(row);
    }

    let mut folds = vec![UNASSIGNED; encoding.codes.len()];
    let mut position = 0usize;
    for mut rows in by_class {
        rows.shuffle(rng);
        for row in rows {
            folds[row] = (position % k) as i64;
            position += 1;
        }
    }
    folds
}

/// Running per-fold state of multilabel assignment.
struct FoldState {
    folds: Vec<i64>,
    sizes: Vec<usize>,
    /// `counts[fold][column][class]`
    counts: Vec<Vec<Vec<usize>>>,
}

impl FoldState {
    fn new(n: usize, k: usize, encodings: &[LabelEncoding]) -> Self {
        let per_fold: Vec<Vec<usize>> = encodings.iter().map(|e| vec![0; e.classes]).collect();
        Self {
            folds: vec![UNASSIGNED; n],
            sizes: vec![0; k],
            counts: vec![per_fold; k],
        }
    }

    fn place(&mut self, row: usize, fold: usize, combo: &[usize]) {
        self.folds[row] = fold as i64;
        self.sizes[fold] += 1;
        for (column, &class) in combo.iter().enumerate() {
            self.counts[fold][column][class] += 1;
        }
    }

    fn representation(&self, fold: usize, combo: &[usize]) -> usize {
        combo
            .iter()
            .enumerate()
            .map(|(column, &class)| self.counts[fold][column][class])
            .sum()
    }
}

/// Iterative stratification over label combinations, rarest combination first.
///
/// Every fold takes `c / k` rows of a combination with `c` rows. The
/// remaining `c % k` rows go to distinct folds, each to the fold with the
/// least representation of the row's label values, then the smallest fold,
/// then a fold order drawn once from the RNG.
fn multilabel_folds<R: Rng + ?Sized>(
    encodings: &[LabelEncoding],
    n: usize,
    k: usize,
    rng: &mut R,
) -> Vec<i64> {
    let mut groups: Vec<(Vec<usize>, Vec<usize>)> = Vec::new();
    let mut group_of: HashMap<Vec<usize>, usize> = HashMap::new();
    for row in 0..n {
        let combo: Vec<usize> = encodings.iter().map(|e| e.codes[row]).collect();
        let next = groups.len();
        let g = *group_of.entry(combo.clone()).or_insert(next);
        if g == next {
            groups.push((combo, Vec::new()));
        }
        groups[g].1.push(row);
    }
    groups.sort_by_key(|(_, rows)| rows.len());

    let mut priority: Vec<usize> = (0..k).collect();
    priority.shuffle(rng);
    let mut rank = vec![0usize; k];
    for (r, &fold) in priority.iter().enumerate() {
        rank[fold] = r;
    }

    let mut state = FoldState::new(n, k, encodings);
    for (combo, mut rows) in groups {
        rows.shuffle(rng);
        let (even, rest) = rows.split_at(rows.len() / k * k);
        for (i, &row) in even.iter().enumerate() {
            state.place(row, i % k, &combo);
        }

        let mut used = vec![false; k];
        for &row in rest {
            let best = (0..k)
                .filter(|&f| !used[f])
                .min_by_key(|&f| (state.representation(f, &combo), state.sizes[f], rank[f]));
            if let Some(fold) = best {
                used[fold] = true;
                state.place(row, fold, &combo);
            }
        }
    }
    state.folds
}

/// Add a `fold` column to `table`.
///
/// An empty table or fewer than two splits is a hard error. A stratified
/// request that cannot run degrades to plain K-fold with a warning.
pub fn assign_folds<R: Rng + ?Sized>(
    mut table: Table,
    ctx: &StageContext<'_>,
    labels: Option<&LabelSpec>,
    n_splits: usize,
    forced: Option<SplitKind>,
    rng: &mut R,
) -> Result<Table, DataError> {
    if n_splits < 2 {
        return Err(DataError::InvalidSplits(n_splits));
    }
    if table.is_empty() {
        return Err(DataError::EmptyTable);
    }

    let plan = plan_folds(&table, labels, forced);
    if let FoldPlan::Plain {
        reason: Some(reason),
    } = &plan
    {
        tracing::warn!(
            dataset = ctx.dataset,
            file = ctx.file,
            reason = %reason,
            "Labels unusable for stratified folding, using plain kfold"
        );
    }

    let folds = fold_indices(&table, &plan, n_splits, rng)?;
    if folds.contains(&UNASSIGNED) {
        return Err(DataError::invariant(
            ctx.dataset,
            ctx.file,
            "fold assignment left rows unassigned",
        ));
    }

    tracing::info!(
        dataset = ctx.dataset,
        file = ctx.file,
        kind = %plan.kind(),
        n_splits,
        rows = table.row_count(),
        "Folded table"
    );
    table.add_column(FOLD_COLUMN, folds.into_iter().map(Value::Int).collect())?;
    Ok(table)
}
