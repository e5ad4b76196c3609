//! Chain resolution: settle every open forecast derived from a resolved one.
//!
//! Children inherit the parent's settlement price and outcome polarity, never
//! its numeric return. Traversal is depth-first over an explicit stack of
//! sibling iterators, with a visited set so a cyclic parent graph terminates
//! and is reported instead of recursing forever.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::domain::error::SettlerError;
use crate::domain::evaluator::settle;
use crate::domain::forecast::{Loaded, Outcome, Status, status_code};
use crate::ports::forecast_store::ForecastStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub resolved: usize,
    pub errors: usize,
    pub cycles: usize,
}

impl CascadeReport {
    pub fn failures(&self) -> usize {
        self.errors + self.cycles
    }
}

pub fn cascade(
    store: &dyn ForecastStore,
    parent_id: &str,
    settlement_price: f64,
    outcome: Outcome,
    now: DateTime<Utc>,
) -> CascadeReport {
    let mut report = CascadeReport::default();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(parent_id.to_string());

    let mut stack: Vec<std::vec::IntoIter<Loaded>> = Vec::new();
    if let Some(children) = open_children(store, parent_id, &mut report) {
        stack.push(children);
    }

    while let Some(frame) = stack.last_mut() {
        let Some(next) = frame.next() else {
            stack.pop();
            continue;
        };

        let child = match next {
            Ok(child) => child,
            Err(malformed) => {
                warn!(id = %malformed.id, reason = %malformed.reason, "skipping malformed child forecast");
                report.errors += 1;
                continue;
            }
        };

        if !visited.insert(child.id.clone()) {
            warn!(
                id = %child.id,
                parent = parent_id,
                "forecast reached twice while cascading, parent graph has a cycle"
            );
            report.cycles += 1;
            continue;
        }

        let resolution = settle(&child, outcome, settlement_price, now);
        match store.resolve_if_open(&child.id, &resolution) {
            Ok(true) => {
                report.resolved += 1;
                info!(
                    id = %child.id,
                    parent = child.parent_id.as_deref().unwrap_or_default(),
                    status = status_code(resolution.outcome, resolution.mode),
                    profit_rate = resolution.profit_rate,
                    "resolved followed forecast"
                );
                if let Some(grandchildren) = open_children(store, &child.id, &mut report) {
                    stack.push(grandchildren);
                }
            }
            Ok(false) => {
                debug!(id = %child.id, "followed forecast already resolved elsewhere");
            }
            Err(e) => {
                error!(id = %child.id, error = %e, "failed to resolve followed forecast");
                report.errors += 1;
            }
        }
    }

    report
}

fn open_children(
    store: &dyn ForecastStore,
    parent_id: &str,
    report: &mut CascadeReport,
) -> Option<std::vec::IntoIter<Loaded>> {
    match store.list_open_children(parent_id) {
        Ok(children) => {
            if !children.is_empty() {
                debug!(parent = parent_id, count = children.len(), "found followed forecasts");
            }
            Some(children.into_iter())
        }
        Err(e) => {
            error!(parent = parent_id, error = %e, "failed to list followed forecasts");
            report.errors += 1;
            None
        }
    }
}

/// Cascade from a forecast that is already resolved, automatically or by
/// hand. Manual statuses cascade with their recorded polarity.
pub fn settle_chain(
    store: &dyn ForecastStore,
    id: &str,
    now: DateTime<Utc>,
) -> Result<CascadeReport, SettlerError> {
    let forecast = store
        .find(id)?
        .ok_or_else(|| SettlerError::NotFound { id: id.to_string() })??;

    match &forecast.status {
        Status::Open => Err(SettlerError::NotResolved { id: id.to_string() }),
        Status::Resolved(resolution) => Ok(cascade(
            store,
            &forecast.id,
            resolution.end_price,
            resolution.outcome,
            now,
        )),
    }
}
