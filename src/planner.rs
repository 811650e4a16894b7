use alloc::{collections::BTreeMap, sync::Arc};
use parking_lot::Mutex;
use tracing::{debug, info_span};

use crate::{
    analysis,
    catalog::Catalog,
    diagnostics::Diagnostics,
    lower::lower,
    plan::ExecutionPlan,
    rules::Module,
    sources_scope::InstanceSourcesScope,
    symbols::TypeQueries,
    types::TypeId,
    validator::validate,
};

/// Everything one planning request produced: the diagnostics always, the
/// plan only when validation passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    pub plan: Option<ExecutionPlan>,
    pub diagnostics: Diagnostics,
}

impl PlanOutcome {
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.plan.is_some()
    }
}

/// The planning front door: builds the catalog and scope table once, then
/// validates and lowers per requested root.
///
/// Planning is purely functional over the immutable catalog, so a `Planner`
/// can serve concurrent requests; outcomes are memoized per
/// `(root, asynchronous)` and repeated requests return the same allocation.
pub struct Planner {
    scope: InstanceSourcesScope,
    outcomes: Mutex<BTreeMap<(TypeId, bool), Arc<PlanOutcome>>>,
}

impl Planner {
    /// Builds the merged catalog for `module` and returns the planner plus
    /// the catalog-shape diagnostics. Entries with shape errors are dropped;
    /// planning proceeds with the rest.
    #[must_use]
    pub fn new(module: &Module, host: Arc<dyn TypeQueries + Send + Sync>) -> (Self, Diagnostics) {
        let (catalog, diagnostics) = Catalog::build(module, &*host);
        let scope = InstanceSourcesScope::new(Arc::new(catalog), host);
        (
            Self {
                scope,
                outcomes: Mutex::new(BTreeMap::new()),
            },
            diagnostics,
        )
    }

    #[inline]
    #[must_use]
    pub fn scope(&self) -> &InstanceSourcesScope {
        &self.scope
    }

    /// Validates `root` and, when valid, lowers it into an execution plan.
    ///
    /// Graph errors are fatal for this root only; other roots of the same
    /// planner are unaffected.
    pub fn plan(&self, root: TypeId, asynchronous: bool) -> Arc<PlanOutcome> {
        if let Some(outcome) = self.outcomes.lock().get(&(root, asynchronous)) {
            debug!(root = %self.scope.host().type_info(root), "returning memoized outcome");
            return outcome.clone();
        }

        let span = info_span!("plan", root = %self.scope.host().type_info(root), asynchronous);
        let _guard = span.enter();

        let mut diagnostics = Diagnostics::new();
        let plan = if validate(root, asynchronous, &self.scope, &mut diagnostics) {
            let source = self.scope.lookup(root).expect("a validated root resolves");
            Some(lower(&source, &self.scope, asynchronous))
        } else {
            None
        };

        let outcome = Arc::new(PlanOutcome { plan, diagnostics });
        self.outcomes.lock().insert((root, asynchronous), outcome.clone());
        outcome
    }

    /// Whether resolving `root` must happen on an asynchronous boundary.
    #[must_use]
    pub fn requires_async(&self, root: TypeId) -> bool {
        self.scope
            .lookup(root)
            .map(|source| analysis::requires_async(&source, &self.scope))
            .unwrap_or(false)
    }

    /// Whether resolving `root` produces values needing release bookkeeping.
    #[must_use]
    pub fn requires_disposal(&self, root: TypeId) -> bool {
        self.scope
            .lookup(root)
            .map(|source| analysis::requires_disposal(&source, &self.scope))
            .unwrap_or(false)
    }
}
