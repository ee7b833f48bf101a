//! Decision table between the local cache and the remote prefix.
//!
//! Pure: builds no I/O, owns no state. Snapshots are keyed by cache file
//! name so the output comes out sorted by name, one decision per name in
//! the union of both sides.
//!
//! | local | remote | times              | action |
//! |-------|--------|--------------------|--------|
//! | no    | yes    |                    | Pull   |
//! | yes   | no     |                    | Push   |
//! | yes   | yes    | local newer        | Push   |
//! | yes   | yes    | remote newer/equal | None   |

use crate::local_cache::is_sync_candidate;
use crate::store::KeyLayout;
use crate::types::{CachedFile, RemoteObject, SyncAction, SyncDecision};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::trace;

/// Modification times keyed by cache file name.
pub type Snapshot = BTreeMap<String, DateTime<Utc>>;

/// Builds the local side of a reconciliation.
pub fn local_snapshot(files: &[CachedFile]) -> Snapshot {
    files
        .iter()
        .map(|f| (f.name.clone(), f.modified))
        .collect()
}

/// Builds the remote side, dropping keys that do not map to a cache file.
pub fn remote_snapshot(objects: &[RemoteObject], layout: &KeyLayout) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for object in objects {
        match layout.file_name(&object.key) {
            // Never visible locally, so it would be pulled on every pass.
            Some(name) if !is_sync_candidate(name) => {
                trace!(key = %object.key, "ignoring temporary or hidden object");
            }
            Some(name) => {
                snapshot.insert(name.to_string(), object.modified);
            }
            None => trace!(key = %object.key, "ignoring key outside the cache layout"),
        }
    }
    snapshot
}

/// Applies the decision table to one name.
///
/// Times are compared in whole seconds: the object store reports
/// last-modified at that resolution, so sub-second differences are noise.
pub fn decide(local: Option<DateTime<Utc>>, remote: Option<DateTime<Utc>>) -> SyncAction {
    match (local, remote) {
        (None, Some(_)) => SyncAction::Pull,
        (Some(_), None) => SyncAction::Push,
        (Some(local), Some(remote)) if local.timestamp() > remote.timestamp() => SyncAction::Push,
        _ => SyncAction::None,
    }
}

/// One decision per name present on either side, ordered by name.
pub fn reconcile(local: &Snapshot, remote: &Snapshot) -> Vec<SyncDecision> {
    let mut decisions = Vec::with_capacity(local.len().max(remote.len()));
    let mut remote_iter = remote.iter().peekable();

    for (name, &local_time) in local {
        while let Some((remote_name, &remote_time)) =
            remote_iter.next_if(|(remote_name, _)| remote_name.as_str() < name.as_str())
        {
            decisions.push(SyncDecision::new(
                remote_name.clone(),
                decide(None, Some(remote_time)),
            ));
        }
        let remote_time = remote_iter
            .next_if(|(remote_name, _)| remote_name.as_str() == name.as_str())
            .map(|(_, &t)| t);
        decisions.push(SyncDecision::new(
            name.clone(),
            decide(Some(local_time), remote_time),
        ));
    }
    for (remote_name, &remote_time) in remote_iter {
        decisions.push(SyncDecision::new(
            remote_name.clone(),
            decide(None, Some(remote_time)),
        ));
    }

    decisions
}

/// Counts decisions by action: (pull, push, none).
pub fn tally(decisions: &[SyncDecision]) -> (usize, usize, usize) {
    decisions
        .iter()
        .fold((0, 0, 0), |(pull, push, none), d| match d.action {
            SyncAction::Pull => (pull + 1, push, none),
            SyncAction::Push => (pull, push + 1, none),
            SyncAction::None => (pull, push, none + 1),
        })
}
