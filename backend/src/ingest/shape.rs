//! Shape stage: canonical fact construction and pre-insert deduplication.

use std::collections::HashSet;

use super::resolver::EnrichedRow;
use crate::api::{CanonicalFact, DateRange, OperationType, SourceSystem};

/// Build the canonical fact of an enriched row.
///
/// Unloading reveals the inbound cargo, so it takes the current cargo group;
/// loading takes the next one.
pub fn to_fact(row: EnrichedRow, source: SourceSystem, parking: f64) -> CanonicalFact {
    let cargo = match row.cleaned.type_op {
        OperationType::Unloading => row.cargo_current,
        OperationType::Loading => row.cargo_next,
    };
    CanonicalFact {
        date_rep: row.cleaned.report_date,
        load_from: source,
        st_code: row.st_code,
        st_code_from: row.st_code_from,
        st_code_to: row.st_code_to,
        org_id: row.org_id,
        client_sap_id: row.client_sap_id,
        type_op: row.cleaned.type_op,
        wagon_num: row.cleaned.wagon_num,
        rps_short: row.rps_short,
        cargo_group_num: cargo.group_num(),
        parking,
    }
}

/// Drop facts whose natural key was already seen, keeping the first occurrence.
///
/// Returns the retained facts and the number removed.
pub fn dedup(facts: Vec<CanonicalFact>) -> (Vec<CanonicalFact>, usize) {
    let before = facts.len();
    let mut seen = HashSet::with_capacity(before);
    let kept: Vec<CanonicalFact> = facts
        .into_iter()
        .filter(|fact| seen.insert(fact.natural_key()))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

/// [min(date), max(date)] of a fact set.
pub fn date_span(facts: &[CanonicalFact]) -> Option<DateRange> {
    let from = facts.iter().map(|f| f.date_rep).min()?;
    let to = facts.iter().map(|f| f.date_rep).max()?;
    Some(DateRange { from, to })
}
