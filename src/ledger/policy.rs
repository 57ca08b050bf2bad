use rustc_hash::FxHashSet;

/// Lifecycle collaborator: decides whether a pure state transition is a
/// change worth a new iteration.
pub trait StatePolicy: Send + Sync {
    /// `true` when moving from `from` to `to` must advance the ledger.
    fn bumps_iteration(&self, from: Option<&str>, to: Option<&str>) -> bool;
}

/// Every state transition advances the ledger.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysBump;

impl StatePolicy for AlwaysBump {
    fn bumps_iteration(&self, _from: Option<&str>, _to: Option<&str>) -> bool {
        true
    }
}

/// Transitions into any of the listed states update in place.
#[derive(Clone, Debug, Default)]
pub struct InPlaceStates {
    states: FxHashSet<String>,
}

impl InPlaceStates {
    /// Builds the policy from state names.
    pub fn new<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            states: states.into_iter().map(Into::into).collect(),
        }
    }
}

impl StatePolicy for InPlaceStates {
    fn bumps_iteration(&self, _from: Option<&str>, to: Option<&str>) -> bool {
        !to.is_some_and(|state| self.states.contains(state))
    }
}

impl<F> StatePolicy for F
where
    F: Fn(Option<&str>, Option<&str>) -> bool + Send + Sync,
{
    fn bumps_iteration(&self, from: Option<&str>, to: Option<&str>) -> bool {
        self(from, to)
    }
}
