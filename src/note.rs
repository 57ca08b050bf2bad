//! Human-readable update notes attached to archived owner rows.

use std::fmt;

use crate::types::DisplayFields;

/// What happened to the owner or one of its dependents.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// A dependent interval was opened.
    Created,
    /// An interval was closed and a replacement opened, or the entity itself
    /// changed.
    Updated,
    /// An interval was closed without replacement.
    Removed,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Created => "Created",
            Action::Updated => "Updated",
            Action::Removed => "Removed",
        })
    }
}

/// `"<Action> <relation label> with <other label> '<name-or-number>'"`, or
/// `"<Action> <relation label>"` when the other side has nothing to show.
pub fn relation_note(
    action: Action,
    relation_label: &str,
    other_label: Option<&str>,
    other: Option<&DisplayFields>,
) -> String {
    match (other_label, other.and_then(DisplayFields::label)) {
        (Some(kind), Some(shown)) => {
            format!("{action} {relation_label} with {kind} '{shown}'")
        }
        _ => format!("{action} {relation_label}"),
    }
}

/// `"<Action> <type label> '<name-or-number>'"` for an entity's own change.
pub fn entity_note(action: Action, type_label: &str, display: &DisplayFields) -> String {
    match display.label() {
        Some(shown) => format!("{action} {type_label} '{shown}'"),
        None => format!("{action} {type_label}"),
    }
}

/// Joins the notes of several changes coalesced into one iteration.
pub fn join_notes<'a, I>(notes: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for note in notes {
        if !out.is_empty() {
            out.push_str("; ");
        }
        out.push_str(note);
    }
    (!out.is_empty()).then_some(out)
}
