//! Tag reconciliation: decide the minimal tag mutation per column
//!
//! Pure decision functions. Nothing here touches the catalog; the
//! orchestrator performs the mutation and records it.

use crate::types::{SensitivityLabel, TagAction, TagState};

/// Decide what to do with a column's tag given a freshly classified label
///
/// - same label → `NoOp`
/// - no tag → `Apply`
/// - different or unrecognized tag → `Update`
pub fn reconcile(column: &str, current: &TagState, new_label: SensitivityLabel) -> TagAction {
    let action = match current {
        TagState::Labeled(existing) if *existing == new_label => TagAction::NoOp,
        TagState::Labeled(existing) => TagAction::Update {
            from: Some(*existing),
            to: new_label,
        },
        TagState::Unrecognized(_) => TagAction::Update {
            from: None,
            to: new_label,
        },
        TagState::Absent => TagAction::Apply(new_label),
    };

    tracing::trace!(column, current = %current, new = %new_label, ?action, "Tag reconciled");
    action
}

/// Tag state the catalog holds after `action` has been applied to `current`
pub fn state_after(current: &TagState, action: &TagAction) -> TagState {
    match action.target() {
        Some(label) => TagState::Labeled(label),
        None => current.clone(),
    }
}
