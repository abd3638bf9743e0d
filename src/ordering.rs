//! Stop ordering within a line.
//!
//! Stops carry `prev_id`/`next_id` pointers that must form one chain with no cycles.
//! The `stops` vector order is storage order only; `walk` gives the travel order.

use crate::transit_types::{TransitLine, TransitStop};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("no stop without a predecessor")]
    NoHead,
    #[error("more than one stop without a predecessor: {0:?}")]
    MultipleHeads(Vec<String>),
    #[error("cycle detected at stop {0}")]
    Cycle(String),
    #[error("stop {stop} points to unknown stop {target}")]
    Dangling { stop: String, target: String },
    #[error("stop {to} does not point back to {from}")]
    Mismatch { from: String, to: String },
    #[error("{0} stop(s) not reachable from the first stop")]
    Disconnected(usize),
}

/// Links stops in slice order: the first has no predecessor, the last no successor.
pub fn link_in_order(stops: &mut [TransitStop]) {
    let ids: Vec<String> = stops.iter().map(|s| s.id.clone()).collect();
    for (i, stop) in stops.iter_mut().enumerate() {
        stop.prev_id = i.checked_sub(1).map(|p| ids[p].clone());
        stop.next_id = ids.get(i + 1).cloned();
    }
}

/// Returns the stops in chain order.
pub fn walk(line: &TransitLine) -> Result<Vec<&TransitStop>, ChainError> {
    if line.stops.is_empty() {
        return Ok(Vec::new());
    }

    let by_id: HashMap<&str, &TransitStop> =
        line.stops.iter().map(|s| (s.id.as_str(), s)).collect();

    for stop in &line.stops {
        for target in [&stop.prev_id, &stop.next_id].into_iter().flatten() {
            if !by_id.contains_key(target.as_str()) {
                return Err(ChainError::Dangling {
                    stop: stop.id.clone(),
                    target: target.clone(),
                });
            }
        }
    }

    let heads: Vec<&TransitStop> = line.stops.iter().filter(|s| s.prev_id.is_none()).collect();
    let head = match heads.as_slice() {
        [] => return Err(ChainError::NoHead),
        [head] => *head,
        _ => {
            return Err(ChainError::MultipleHeads(
                heads.iter().map(|s| s.id.clone()).collect(),
            ));
        }
    };

    let mut ordered = vec![head];
    let mut visited: HashSet<&str> = HashSet::from([head.id.as_str()]);
    let mut current = head;
    while let Some(next_id) = &current.next_id {
        let next = by_id[next_id.as_str()];
        if !visited.insert(next.id.as_str()) {
            return Err(ChainError::Cycle(next.id.clone()));
        }
        if next.prev_id.as_deref() != Some(current.id.as_str()) {
            return Err(ChainError::Mismatch {
                from: current.id.clone(),
                to: next.id.clone(),
            });
        }
        ordered.push(next);
        current = next;
    }

    if ordered.len() != line.stops.len() {
        return Err(ChainError::Disconnected(line.stops.len() - ordered.len()));
    }
    Ok(ordered)
}

/// Links `stop` after the current tail and pushes it.
pub fn append(line: &mut TransitLine, mut stop: TransitStop) {
    let tail_id = match walk(line) {
        Ok(ordered) => ordered.last().map(|s| s.id.clone()),
        Err(e) => {
            log::warn!(
                "Line {} has a broken chain ({}); appending after last stored stop",
                line.id,
                e
            );
            line.stops.last().map(|s| s.id.clone())
        }
    };

    if let Some(tail_id) = &tail_id {
        if let Some(tail) = line.stops.iter_mut().find(|s| &s.id == tail_id) {
            tail.next_id = Some(stop.id.clone());
        }
    }
    stop.prev_id = tail_id;
    stop.next_id = None;
    line.stops.push(stop);
}

/// Links `stop` between `after` and its current successor, or in front of the
/// current head when `after` is `None` or no longer on the line. `index` is the
/// storage position, clamped to the end.
pub fn insert_after(line: &mut TransitLine, after: Option<&str>, mut stop: TransitStop, index: usize) {
    let prev = after.and_then(|id| line.stops.iter().find(|s| s.id == id));
    let next_id = match prev {
        Some(prev) => prev.next_id.clone(),
        None => line
            .stops
            .iter()
            .find(|s| s.prev_id.is_none())
            .map(|s| s.id.clone()),
    };
    stop.prev_id = prev.map(|s| s.id.clone());
    stop.next_id = next_id;

    for other in line.stops.iter_mut() {
        if Some(&other.id) == stop.prev_id.as_ref() {
            other.next_id = Some(stop.id.clone());
        }
        if Some(&other.id) == stop.next_id.as_ref() {
            other.prev_id = Some(stop.id.clone());
        }
    }
    let index = index.min(line.stops.len());
    line.stops.insert(index, stop);
}

/// Removes a stop and reconnects its neighbours to each other.
pub fn splice_out(line: &mut TransitLine, stop_id: &str) -> Option<TransitStop> {
    let index = line.stops.iter().position(|s| s.id == stop_id)?;
    let removed = line.stops.remove(index);

    for stop in line.stops.iter_mut() {
        if stop.prev_id.as_deref() == Some(stop_id) {
            stop.prev_id = removed.prev_id.clone();
        }
        if stop.next_id.as_deref() == Some(stop_id) {
            stop.next_id = removed.next_id.clone();
        }
    }
    Some(removed)
}
