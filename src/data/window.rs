//! Grouped trailing aggregates
//!
//! Every historical feature is a call to [`trailing_aggregate`]: the aggregate
//! for a row covers only earlier time steps of the same group, so a race never
//! sees its own results, including those of a teammate in the same race.
//!
//! A time step is one race. All rows of a group that share a step are folded
//! into one step value (their mean, or their sum), windows count steps, null
//! values are skipped, and a window without a single observation yields `None`.
//! A trailing window of 5 is therefore 5 races, not 5 rows, even for a team
//! with two drivers per race.

use std::collections::HashMap;
use std::hash::Hash;

/// How values are combined, both within a step and across the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Mean,
    Sum,
}

/// Which prior steps of a group are aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Every prior step of the group
    Expanding,
    /// At most the last `n` prior steps of the group
    Trailing(usize),
}

struct GroupHistory<S> {
    closed: Vec<Option<f64>>,
    open: Option<(S, Vec<f64>)>,
    // Running totals over the non-null closed steps
    total: f64,
    observed: usize,
}

impl<S> GroupHistory<S> {
    fn close_step(&mut self, aggregate: Aggregate) {
        if let Some((_, observed)) = self.open.take() {
            let step_value = combine(&observed, aggregate);
            if let Some(v) = step_value {
                self.total += v;
                self.observed += 1;
            }
            self.closed.push(step_value);
        }
    }

    fn expanding(&self, aggregate: Aggregate) -> Option<f64> {
        match (self.observed, aggregate) {
            (0, _) => None,
            (n, Aggregate::Mean) => Some(self.total / n as f64),
            (_, Aggregate::Sum) => Some(self.total),
        }
    }

    fn trailing(&self, n: usize, aggregate: Aggregate) -> Option<f64> {
        let start = self.closed.len().saturating_sub(n);
        let prior: Vec<f64> = self.closed[start..].iter().flatten().copied().collect();
        combine(&prior, aggregate)
    }
}

/// Aggregate over the prior steps of each row's group, excluding the row's own step
///
/// `values`, `keys` and `steps` are aligned row-for-row. Rows are taken in
/// input order, which must be chronological (steps never go backwards within
/// a group).
pub fn trailing_aggregate<K, S>(
    values: &[Option<f64>],
    keys: &[K],
    steps: &[S],
    aggregate: Aggregate,
    window: Window,
) -> Vec<Option<f64>>
where
    K: Eq + Hash,
    S: Copy + PartialEq,
{
    debug_assert_eq!(values.len(), keys.len());
    debug_assert_eq!(values.len(), steps.len());

    let mut groups: HashMap<&K, GroupHistory<S>> = HashMap::new();
    let mut out = Vec::with_capacity(values.len());

    for ((value, key), step) in values.iter().zip(keys).zip(steps) {
        let group = groups.entry(key).or_insert_with(|| GroupHistory {
            closed: Vec::new(),
            open: None,
            total: 0.0,
            observed: 0,
        });

        let same_step = matches!(&group.open, Some((s, _)) if s == step);
        if !same_step {
            group.close_step(aggregate);
            group.open = Some((*step, Vec::new()));
        }

        out.push(match window {
            Window::Expanding => group.expanding(aggregate),
            Window::Trailing(n) => group.trailing(n, aggregate),
        });

        if let (Some(v), Some((_, observed))) = (value, group.open.as_mut()) {
            observed.push(*v);
        }
    }

    out
}

/// Aggregate each group's values and broadcast the result back to every row
/// of the group (same-group statistic, not historical)
pub fn group_transform<K, F>(values: &[Option<f64>], keys: &[K], reduce: F) -> Vec<Option<f64>>
where
    K: Eq + Hash,
    F: Fn(&[f64]) -> Option<f64>,
{
    debug_assert_eq!(values.len(), keys.len());

    let mut groups: HashMap<&K, Vec<f64>> = HashMap::new();
    for (value, key) in values.iter().zip(keys) {
        let observed = groups.entry(key).or_default();
        if let Some(v) = value {
            observed.push(*v);
        }
    }

    let reduced: HashMap<&K, Option<f64>> = groups
        .into_iter()
        .map(|(k, observed)| (k, reduce(&observed)))
        .collect();

    keys.iter()
        .map(|k| reduced.get(k).copied().flatten())
        .collect()
}

/// Minimum of observed values
pub fn min_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// Mean of observed values
pub fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn combine(observed: &[f64], aggregate: Aggregate) -> Option<f64> {
    match aggregate {
        Aggregate::Mean => mean_of(observed),
        Aggregate::Sum if observed.is_empty() => None,
        Aggregate::Sum => Some(observed.iter().sum()),
    }
}
