use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of evaluating a request against one policy set, or of combining
/// a sequence of such outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Effect {
    Permit,
    Deny,
    NotApplicable,
    Indeterminate,
}

impl Effect {
    /// PERMIT and DENY settle the request; the other two defer to the next
    /// policy set in the requested order.
    pub fn is_decisive(&self) -> bool {
        matches!(self, Effect::Permit | Effect::Deny)
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Permit => write!(f, "PERMIT"),
            Effect::Deny => write!(f, "DENY"),
            Effect::NotApplicable => write!(f, "NOT_APPLICABLE"),
            Effect::Indeterminate => write!(f, "INDETERMINATE"),
        }
    }
}

/// Combines per-policy-set effects evaluated in request order: the first
/// decisive effect wins. When no policy set is decisive, NOT_APPLICABLE is
/// reported in preference to INDETERMINATE, and an empty sequence is
/// NOT_APPLICABLE.
pub fn combine_effects(effects: impl IntoIterator<Item = Effect>) -> Effect {
    let mut saw_not_applicable = false;
    let mut saw_indeterminate = false;
    for effect in effects {
        match effect {
            Effect::Permit | Effect::Deny => return effect,
            Effect::NotApplicable => saw_not_applicable = true,
            Effect::Indeterminate => saw_indeterminate = true,
        }
    }
    if saw_indeterminate && !saw_not_applicable {
        Effect::Indeterminate
    } else {
        Effect::NotApplicable
    }
}
