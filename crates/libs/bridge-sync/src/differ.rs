//! Root-level structural diff between two snapshots of a plugin screen.
//!
//! Roots are matched by id. A root counts as changed when anything in its
//! subtree differs (type, properties, or children matched by id with the same
//! rule); deeper paths are never reported on their own.

use std::collections::{HashMap, HashSet};

use bridge_ipc::{ComponentId, ComponentNode, UiSnapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiffResult {
    pub has_changes: bool,
    pub title_changed: bool,
    pub data_changed: bool,
    pub components_changed: bool,
    pub added_component_ids: Vec<ComponentId>,
    pub removed_component_ids: Vec<ComponentId>,
    pub changed_component_ids: Vec<ComponentId>,
    /// Share of `current`'s roots that need not be retransmitted, in `0.0..=1.0`.
    pub estimated_payload_reduction: f64,
}

impl DiffResult {
    /// Everything in `current` is new: no baseline, or a different screen.
    pub fn full_change(current: &UiSnapshot) -> Self {
        Self {
            has_changes: true,
            title_changed: true,
            data_changed: true,
            components_changed: true,
            added_component_ids: current.root_ids(),
            removed_component_ids: Vec::new(),
            changed_component_ids: Vec::new(),
            estimated_payload_reduction: 0.0,
        }
    }

    /// Roots that must be sent again: the added ones and the changed ones.
    pub fn retransmitted_count(&self) -> usize {
        self.added_component_ids.len() + self.changed_component_ids.len()
    }
}

/// Compare `current` against the previously pushed snapshot.
pub fn diff(previous: Option<&UiSnapshot>, current: &UiSnapshot) -> DiffResult {
    let previous = match previous {
        Some(previous) if previous.screen_id == current.screen_id => previous,
        _ => return DiffResult::full_change(current),
    };

    let title_changed = previous.title != current.title;
    let data_changed = previous.data != current.data;

    let previous_roots: HashMap<&str, &ComponentNode> = previous
        .components
        .iter()
        .map(|node| (node.id.as_str(), node))
        .collect();
    let current_ids: HashSet<&str> = current
        .components
        .iter()
        .map(|node| node.id.as_str())
        .collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();
    for node in &current.components {
        match previous_roots.get(node.id.as_str()) {
            None => added.push(node.id.clone()),
            Some(before) if !nodes_equal(before, node) => changed.push(node.id.clone()),
            Some(_) => {}
        }
    }
    let removed: Vec<ComponentId> = previous
        .components
        .iter()
        .filter(|node| !current_ids.contains(node.id.as_str()))
        .map(|node| node.id.clone())
        .collect();

    let components_changed = !added.is_empty() || !removed.is_empty() || !changed.is_empty();
    let has_changes = title_changed || data_changed || components_changed;

    let estimated_payload_reduction = if has_changes {
        let retransmitted = (added.len() + changed.len()) as f64;
        let total = current.components.len().max(1) as f64;
        (1.0 - retransmitted / total).clamp(0.0, 1.0)
    } else {
        1.0
    };

    log::trace!(
        "differ: {} +{} -{} ~{} title={} data={}",
        current.screen_id,
        added.len(),
        removed.len(),
        changed.len(),
        title_changed,
        data_changed
    );

    DiffResult {
        has_changes,
        title_changed,
        data_changed,
        components_changed,
        added_component_ids: added,
        removed_component_ids: removed,
        changed_component_ids: changed,
        estimated_payload_reduction,
    }
}

pub fn should_update(diff: &DiffResult) -> bool {
    diff.has_changes
}

fn nodes_equal(a: &ComponentNode, b: &ComponentNode) -> bool {
    a.kind == b.kind && a.properties == b.properties && children_equal(&a.children, &b.children)
}

fn children_equal(a: &[ComponentNode], b: &[ComponentNode]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let by_id: HashMap<&str, &ComponentNode> =
        a.iter().map(|node| (node.id.as_str(), node)).collect();
    b.iter().all(|node| {
        by_id
            .get(node.id.as_str())
            .is_some_and(|before| nodes_equal(before, node))
    })
}
