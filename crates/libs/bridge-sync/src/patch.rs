//! Root-level patches built from a [`DiffResult`].

use std::collections::HashMap;

use bridge_ipc::{ComponentNode, IpcError, StateHash, UiPatch, UiSnapshot};

use crate::differ::DiffResult;
use crate::hash::calculate_state_hash;

/// Build the patch that turns `baseline` into `current`.
///
/// `diff` must be the result of diffing the same two snapshots and
/// `base_hash` the hash of `baseline`.
///
/// A root is resent whenever it is not identical to its baseline
/// counterpart, which is wider than the diff's changed set: the diff matches
/// children by id and ignores their order, while applying the patch must
/// reproduce `current` exactly.
pub fn build_patch(
    baseline: &UiSnapshot,
    base_hash: StateHash,
    current: &UiSnapshot,
    diff: &DiffResult,
    revision: u64,
) -> UiPatch {
    debug_assert_eq!(baseline.screen_id, current.screen_id);
    let previous: HashMap<&str, &ComponentNode> = baseline
        .components
        .iter()
        .map(|node| (node.id.as_str(), node))
        .collect();

    UiPatch {
        screen_id: current.screen_id.clone(),
        revision,
        base_hash,
        title: diff.title_changed.then(|| current.title.clone()),
        data: diff.data_changed.then(|| current.data.clone()),
        upserted: current
            .components
            .iter()
            .filter(|node| previous.get(node.id.as_str()) != Some(node))
            .cloned()
            .collect(),
        removed: diff.removed_component_ids.clone(),
        order: current.root_ids(),
        timestamp: current.timestamp,
    }
}

/// Apply `patch` after checking it was built against `baseline`.
pub fn apply_verified(patch: &UiPatch, baseline: &UiSnapshot) -> Result<UiSnapshot, IpcError> {
    let actual = calculate_state_hash(baseline);
    if actual != patch.base_hash {
        return Err(IpcError::invalid(format!(
            "patch rev={} expects base {} but baseline is {}",
            patch.revision, patch.base_hash, actual
        )));
    }
    patch.apply(baseline)
}
