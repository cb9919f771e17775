//! Call states and the transition table
//!
//! States are ordered by their position in the call lifecycle; several rules
//! compare states ("at or past `early`"), so the derived `Ord` is part of the
//! contract.
//!
//! ```text
//!   new ─┬─ requesting ── trying ─┬─ early ──┐
//!        │                        └──────────┼─ active ⇄ held
//!        ├─ ringing ─────┬─ answering ───────┘
//!        └─ recovering ──┘
//!
//!   (not yet hung up) ── hangup ── destroy      (any) ── purge ── destroy
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    New,
    Requesting,
    Trying,
    Recovering,
    Ringing,
    Answering,
    Early,
    Active,
    Held,
    Hangup,
    Destroy,
    Purge,
}

impl CallState {
    pub const ALL: [CallState; 12] = [
        CallState::New,
        CallState::Requesting,
        CallState::Trying,
        CallState::Recovering,
        CallState::Ringing,
        CallState::Answering,
        CallState::Early,
        CallState::Active,
        CallState::Held,
        CallState::Hangup,
        CallState::Destroy,
        CallState::Purge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::New => "new",
            CallState::Requesting => "requesting",
            CallState::Trying => "trying",
            CallState::Recovering => "recovering",
            CallState::Ringing => "ringing",
            CallState::Answering => "answering",
            CallState::Early => "early",
            CallState::Active => "active",
            CallState::Held => "held",
            CallState::Hangup => "hangup",
            CallState::Destroy => "destroy",
            CallState::Purge => "purge",
        }
    }

    /// Targets reachable from this state, not counting `purge`
    pub fn allowed_targets(&self) -> &'static [CallState] {
        use CallState::*;
        match self {
            New => &[Requesting, Recovering, Ringing, Destroy, Answering],
            Requesting => &[Trying, Hangup],
            Recovering => &[Answering, Hangup],
            Trying => &[Active, Early, Hangup],
            Ringing => &[Answering, Hangup],
            Answering => &[Active, Hangup],
            Active => &[Hangup, Held],
            Held => &[Hangup, Active],
            Early => &[Hangup, Active],
            Hangup => &[Destroy],
            Destroy => &[],
            Purge => &[Destroy],
        }
    }

    /// Whether `self -> to` is a legal transition.
    ///
    /// `purge` is reachable from every state.
    pub fn can_transition(&self, to: CallState) -> bool {
        to == CallState::Purge || self.allowed_targets().contains(&to)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Destroy)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who originated the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Inbound => f.write_str("inbound"),
            CallDirection::Outbound => f.write_str("outbound"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinal_order() {
        assert!(CallState::New < CallState::Requesting);
        assert!(CallState::Trying < CallState::Early);
        assert!(CallState::Early < CallState::Active);
        assert!(CallState::Held < CallState::Hangup);
        assert!(CallState::Destroy < CallState::Purge);

        let mut sorted = CallState::ALL;
        sorted.sort();
        assert_eq!(sorted, CallState::ALL);
    }

    #[test]
    fn test_purge_reachable_from_everywhere() {
        for state in CallState::ALL {
            assert!(state.can_transition(CallState::Purge), "{} -> purge", state);
        }
    }

    #[test]
    fn test_self_transitions_are_illegal() {
        for state in CallState::ALL {
            if state != CallState::Purge {
                assert!(!state.can_transition(state), "{} -> {}", state, state);
            }
        }
    }

    #[test]
    fn test_destroy_is_terminal() {
        assert!(CallState::Destroy.allowed_targets().is_empty());
        assert!(CallState::Destroy.is_terminal());
        assert!(!CallState::Hangup.is_terminal());
    }
}
