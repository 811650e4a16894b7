use alloc::{
    collections::BTreeSet,
    string::String,
    sync::Arc,
    vec::Vec,
};
use tracing::{debug, info_span};

use crate::{
    diagnostics::Diagnostics,
    errors::{ResolveErrorKind, ResolveNoteKind, ResolveWarningKind},
    scope::Scope,
    source::{InstanceSource, SourceId, SourceRef},
    sources_scope::{InstanceSourcesScope, LookupError},
    types::TypeId,
    visitor::{walk, SourceVisitor},
};

/// Hard ceiling on the resolution path length. Legitimately deep graphs stay
/// far below it; exceeding it is fatal for the requested root.
pub const MAX_RESOLUTION_DEPTH: usize = 200;

/// Validates the dependency graph reachable from `root`.
///
/// `asynchronous` states whether the top-level resolution boundary awaits.
/// Findings are accumulated into `diagnostics`; the return value is `false`
/// iff the walk added at least one error, in which case no plan should be
/// lowered for this root. Sibling roots are unaffected.
pub fn validate(root: TypeId, asynchronous: bool, scope: &InstanceSourcesScope, diagnostics: &mut Diagnostics) -> bool {
    let span = info_span!("validate", root = %scope.host().type_info(root), asynchronous);
    let _guard = span.enter();

    let errors_before = diagnostics.errors().count();

    match scope.lookup(root) {
        Ok(source) => {
            let mut validation = Validation {
                diagnostics: &mut *diagnostics,
                used_parameters: BTreeSet::new(),
                depth_reported: false,
            };
            let state = ValidationState {
                path: Vec::new(),
                delegate_depth: 0,
                singleton_depth: 0,
                immediate_async: asynchronous,
                any_async: asynchronous,
            };
            walk(&mut validation, &source, scope, &state);
        }
        Err(LookupError::NoSource { ty }) => diagnostics.push(ResolveErrorKind::NoSource { ty }),
        Err(LookupError::Ambiguous { ty, count }) => diagnostics.push(ResolveErrorKind::AmbiguousSource { ty, count }),
    }

    diagnostics.errors().count() == errors_before
}

#[derive(Clone)]
struct PathEntry {
    id: SourceId,
    delegate_depth: u32,
    singleton_depth: u32,
    label: Arc<str>,
}

/// Copy-on-descent traversal state; sibling subtrees never see each other's
/// mutations.
#[derive(Clone)]
struct ValidationState {
    path: Vec<PathEntry>,
    delegate_depth: u32,
    singleton_depth: u32,
    /// The immediately enclosing resolution boundary awaits.
    immediate_async: bool,
    /// At least one enclosing resolution boundary awaits.
    any_async: bool,
}

impl ValidationState {
    fn trace(&self) -> String {
        let mut rendered = String::new();
        for entry in &self.path {
            if !rendered.is_empty() {
                rendered.push_str(" -> ");
            }
            rendered.push_str(&entry.label);
        }
        rendered
    }

    fn trace_with(&self, label: &str) -> String {
        let mut rendered = self.trace();
        if !rendered.is_empty() {
            rendered.push_str(" -> ");
        }
        rendered.push_str(label);
        rendered
    }
}

struct Validation<'a> {
    diagnostics: &'a mut Diagnostics,
    /// `(delegate identity, parameter index)` pairs consumed somewhere in
    /// the delegate's return resolution.
    used_parameters: BTreeSet<(SourceId, usize)>,
    depth_reported: bool,
}

impl SourceVisitor for Validation<'_> {
    type State = ValidationState;

    fn should_visit(&mut self, source: &SourceRef, _scope: &InstanceSourcesScope, state: &ValidationState) -> bool {
        if state.path.len() >= MAX_RESOLUTION_DEPTH {
            if !self.depth_reported {
                self.depth_reported = true;
                self.diagnostics.push_traced(
                    ResolveErrorKind::DepthExceeded {
                        limit: MAX_RESOLUTION_DEPTH,
                    },
                    state.trace_with(&source.described()),
                );
            }
            return false;
        }

        let id = SourceId::of(source);
        if let Some(entry) = state.path.iter().rev().find(|entry| entry.id == id) {
            if entry.delegate_depth == state.delegate_depth && entry.singleton_depth == state.singleton_depth {
                self.diagnostics.push_traced(
                    ResolveErrorKind::CyclicDependency {
                        ty: source.of_type().clone(),
                    },
                    state.trace_with(&source.described()),
                );
            } else {
                // The revisit crosses a delegate or single-instance boundary;
                // the value is lazily produced there, which breaks the cycle.
                debug!(source = %source.of_type(), "revisit across a lazy boundary");
            }
            return false;
        }

        true
    }

    fn enter(&mut self, source: &SourceRef, _scope: &InstanceSourcesScope, state: &ValidationState) -> ValidationState {
        if source.requires_await() {
            if source.scope() == Scope::SingleInstance {
                // Paid once, lazily: any enclosing asynchronous boundary can
                // carry the cost.
                if !state.any_async {
                    self.diagnostics.push_traced(
                        ResolveErrorKind::AsyncSingleInstanceWithoutAsyncBoundary {
                            ty: source.of_type().clone(),
                        },
                        state.trace_with(&source.described()),
                    );
                }
            } else if !state.immediate_async {
                self.diagnostics.push_traced(
                    ResolveErrorKind::AsyncSourceInSyncResolution {
                        ty: source.of_type().clone(),
                    },
                    state.trace_with(&source.described()),
                );
            }
        }

        match &**source {
            InstanceSource::Delegate(delegate) => {
                let mut seen: BTreeSet<TypeId> = BTreeSet::new();
                let mut reported: BTreeSet<TypeId> = BTreeSet::new();
                for parameter in &delegate.parameters {
                    if !seen.insert(parameter.ty.id) && reported.insert(parameter.ty.id) {
                        self.diagnostics.push_traced(
                            ResolveErrorKind::DuplicateDelegateParameters {
                                delegate: delegate.delegate_type.clone(),
                                ty: parameter.ty.clone(),
                            },
                            state.trace_with(&source.described()),
                        );
                    }
                    if parameter.by_ref {
                        self.diagnostics.push_traced(
                            ResolveErrorKind::ByRefDelegateParameter {
                                delegate: delegate.delegate_type.clone(),
                                parameter: parameter.name.clone(),
                            },
                            state.trace_with(&source.described()),
                        );
                    }
                }
            }
            InstanceSource::Array(array) => {
                if array.items.is_empty() {
                    self.diagnostics.push_traced(
                        ResolveWarningKind::EmptyCollection {
                            element: array.element.clone(),
                        },
                        state.trace_with(&source.described()),
                    );
                }
            }
            InstanceSource::DelegateParameter(parameter) => {
                self.used_parameters.insert((parameter.owner, parameter.index));
            }
            _ => {}
        }

        let mut inner = state.clone();
        inner.path.push(PathEntry {
            id: SourceId::of(source),
            delegate_depth: state.delegate_depth,
            singleton_depth: state.singleton_depth,
            label: Arc::from(source.described().as_str()),
        });
        match &**source {
            InstanceSource::Delegate(delegate) => {
                inner.delegate_depth += 1;
                inner.immediate_async = delegate.is_async;
                inner.any_async = state.any_async || delegate.is_async;
            }
            InstanceSource::Owned(owned) => {
                inner.immediate_async = owned.is_async;
                inner.any_async = state.any_async || owned.is_async;
            }
            _ => {}
        }
        if source.scope() == Scope::SingleInstance {
            inner.singleton_depth += 1;
        }
        inner
    }

    fn exit(&mut self, source: &SourceRef, _scope: &InstanceSourcesScope, _state: &ValidationState) {
        let InstanceSource::Delegate(delegate) = &**source else {
            return;
        };
        let id = SourceId::of(source);
        for (index, parameter) in delegate.parameters.iter().enumerate() {
            if parameter.by_ref {
                continue;
            }
            if !self.used_parameters.contains(&(id, index)) {
                self.diagnostics.push(ResolveWarningKind::UnusedDelegateParameter {
                    delegate: delegate.delegate_type.clone(),
                    parameter: parameter.name.clone(),
                });
            }
        }
    }

    fn on_lookup_error(
        &mut self,
        _owner: &SourceRef,
        parameter: Option<&crate::symbols::Parameter>,
        error: LookupError,
        state: &ValidationState,
    ) {
        match error {
            LookupError::NoSource { ty } => {
                if let Some(parameter) = parameter.filter(|parameter| parameter.is_optional) {
                    self.diagnostics.push(ResolveNoteKind::OptionalParameterDefaulted {
                        ty,
                        parameter: parameter.name.clone(),
                    });
                } else {
                    self.diagnostics.push_traced(ResolveErrorKind::NoSource { ty }, state.trace());
                }
            }
            LookupError::Ambiguous { ty, count } => {
                self.diagnostics
                    .push_traced(ResolveErrorKind::AmbiguousSource { ty, count }, state.trace());
            }
        }
    }

    fn on_delegate_return(&mut self, delegate: &SourceRef, ret: &SourceRef, _scope: &InstanceSourcesScope, _state: &ValidationState) {
        let InstanceSource::Delegate(source) = &**delegate else {
            return;
        };
        let target = InstanceSource::unforwarded(ret);

        // Three shapes of the same phenomenon: the delegate's result cannot
        // change between invocations. Kept as distinct codes.
        match &**target {
            InstanceSource::DelegateParameter(parameter) if parameter.owner == SourceId::of(delegate) => {
                self.diagnostics.push(ResolveWarningKind::ReturnsOwnParameter {
                    delegate: source.delegate_type.clone(),
                });
            }
            InstanceSource::DelegateParameter(_) => {
                self.diagnostics.push(ResolveWarningKind::ReturnsEnclosingParameter {
                    delegate: source.delegate_type.clone(),
                });
            }
            _ if target.scope() == Scope::SingleInstance => {
                self.diagnostics.push(ResolveWarningKind::ReturnsSingleInstance {
                    delegate: source.delegate_type.clone(),
                });
            }
            _ => {}
        }
    }
}
