use crate::{
    source::{InstanceSource, SourceRef},
    sources_scope::{InstanceSourcesScope, LookupError},
    symbols::Parameter,
};

/// Hooks of one concrete traversal over an instance-source graph.
///
/// Every analysis (validation, async/disposal requirement checks, lowering)
/// implements this trait and shares the single recursion shape of [`walk`],
/// so all of them visit the same children of every variant.
///
/// State is copy-on-descent: `enter` produces the value the subtree is
/// walked with, sibling subtrees never alias each other's state.
pub(crate) trait SourceVisitor {
    type State: Clone;

    /// Decide whether to descend into `source` before the state is updated.
    /// Cycle short-circuits and memoization cutoffs live here.
    fn should_visit(&mut self, source: &SourceRef, scope: &InstanceSourcesScope, state: &Self::State) -> bool;

    /// Produce the state the subtree of `source` is walked with.
    fn enter(&mut self, source: &SourceRef, scope: &InstanceSourcesScope, state: &Self::State) -> Self::State;

    /// Called after the subtree of `source` has been walked, with the state
    /// produced by `enter`.
    fn exit(&mut self, source: &SourceRef, scope: &InstanceSourcesScope, state: &Self::State) {
        let _ = (source, scope, state);
    }

    /// A child lookup failed while walking `owner`. `parameter` is the
    /// requesting parameter when the child was a parameter lookup.
    fn on_lookup_error(&mut self, owner: &SourceRef, parameter: Option<&Parameter>, error: LookupError, state: &Self::State) {
        let _ = (owner, parameter, error, state);
    }

    /// Observes the resolved return source of a delegate before its subtree
    /// is walked; `scope` is the delegate's own parameter scope.
    fn on_delegate_return(&mut self, delegate: &SourceRef, ret: &SourceRef, scope: &InstanceSourcesScope, state: &Self::State) {
        let _ = (delegate, ret, scope, state);
    }
}

/// Walks `source` with `visitor`, recursing into the constituent sources of
/// each variant: constructor and method parameters (resolved through
/// `scope`), a factory's underlying object, a decorator's parameters with
/// the designated slot receiving the decorated value, array items, a
/// delegate's return resolution inside its own parameter scope, and the
/// inner value of owned/forwarded wrappers.
pub(crate) fn walk<V: SourceVisitor>(visitor: &mut V, source: &SourceRef, scope: &InstanceSourcesScope, state: &V::State) {
    if !visitor.should_visit(source, scope, state) {
        return;
    }
    let inner_state = visitor.enter(source, scope, state);

    match &**source {
        InstanceSource::Registration(registration) => {
            for parameter in &registration.constructor.parameters {
                walk_parameter(visitor, source, parameter, scope, &inner_state);
            }
        }
        InstanceSource::FactoryMethod(factory_method) => {
            for parameter in &factory_method.method.parameters {
                walk_parameter(visitor, source, parameter, scope, &inner_state);
            }
        }
        InstanceSource::Factory(factory) => {
            walk(visitor, &factory.factory, scope, &inner_state);
        }
        InstanceSource::WrappedDecorator(wrapped) => {
            let (parameters, slot) = decorator_shape(&wrapped.decorator);
            for (index, parameter) in parameters.iter().enumerate() {
                if index == slot {
                    walk(visitor, &wrapped.underlying, scope, &inner_state);
                } else {
                    walk_parameter(visitor, source, parameter, scope, &inner_state);
                }
            }
        }
        InstanceSource::Delegate(delegate) => {
            let delegate_scope = scope.enter_delegate(source);
            match delegate_scope.lookup(delegate.return_type.id) {
                Ok(ret) => {
                    visitor.on_delegate_return(source, &ret, &delegate_scope, &inner_state);
                    walk(visitor, &ret, &delegate_scope, &inner_state);
                }
                Err(error) => visitor.on_lookup_error(source, None, error, &inner_state),
            }
        }
        InstanceSource::Array(array) => {
            for item in &array.items {
                walk(visitor, item, scope, &inner_state);
            }
        }
        InstanceSource::Forwarded(forwarded) => {
            walk(visitor, &forwarded.underlying, scope, &inner_state);
        }
        InstanceSource::Owned(owned) => {
            walk(visitor, &owned.inner, scope, &inner_state);
        }
        // Leaves. Bare decorator nodes are only reachable through
        // WrappedDecorator, which walks their parameters itself.
        InstanceSource::DelegateParameter(_)
        | InstanceSource::InstanceMember(_)
        | InstanceSource::DecoratorRegistration(_)
        | InstanceSource::DecoratorFactoryMethod(_) => {}
    }

    visitor.exit(source, scope, &inner_state);
}

fn walk_parameter<V: SourceVisitor>(
    visitor: &mut V,
    owner: &SourceRef,
    parameter: &Parameter,
    scope: &InstanceSourcesScope,
    state: &V::State,
) {
    match scope.lookup(parameter.ty.id) {
        Ok(child) => walk(visitor, &child, scope, state),
        Err(error) => visitor.on_lookup_error(owner, Some(parameter), error, state),
    }
}

/// Parameter list and decorated slot of a decorator node.
pub(crate) fn decorator_shape(decorator: &SourceRef) -> (&[Parameter], usize) {
    match &**decorator {
        InstanceSource::DecoratorRegistration(registration) => (&registration.constructor.parameters, registration.decorated_parameter),
        InstanceSource::DecoratorFactoryMethod(method) => (&method.method.parameters, method.decorated_parameter),
        _ => (&[], usize::MAX),
    }
}

#[cfg(test)]
mod tests {
    use alloc::{string::String, sync::Arc, vec, vec::Vec};

    use super::{walk, SourceVisitor};
    use crate::{
        catalog::Catalog,
        rules::{Module, Rule},
        source::SourceRef,
        sources_scope::InstanceSourcesScope,
        symbols::SymbolTable,
    };

    struct Collecting {
        entered: Vec<String>,
        depths: Vec<u32>,
    }

    impl SourceVisitor for Collecting {
        type State = u32;

        fn should_visit(&mut self, _: &SourceRef, _: &InstanceSourcesScope, state: &u32) -> bool {
            // Trivial runaway guard for the test double.
            *state < 16
        }

        fn enter(&mut self, source: &SourceRef, scope: &InstanceSourcesScope, state: &u32) -> u32 {
            self.entered.push(source.described());
            self.depths.push(scope.depth());
            state + 1
        }
    }

    #[test]
    fn test_walks_constructor_parameters_and_delegate_scope() {
        let mut symbols = SymbolTable::new();
        let a = symbols.declare("A");
        let b = symbols.declare("B");
        let fn_b = symbols.declare("Fn() -> B");
        symbols.set_delegate(fn_b, vec![], b, false);
        symbols.constructed_with(a, vec![symbols.parameter(fn_b)]);

        let module = Module::new("root")
            .rule(Rule::for_type(symbols.info(a)))
            .rule(Rule::for_type(symbols.info(b)));
        let (catalog, diagnostics) = Catalog::build(&module, &symbols);
        assert!(diagnostics.is_empty());
        let scope = InstanceSourcesScope::new(Arc::new(catalog), Arc::new(symbols));

        let root = scope.lookup(a).unwrap();
        let mut visitor = Collecting {
            entered: Vec::new(),
            depths: Vec::new(),
        };
        walk(&mut visitor, &root, &scope, &0);

        assert_eq!(
            visitor.entered,
            ["`A` via constructor", "`Fn() -> B` via delegate", "`B` via constructor"]
        );
        // The delegate's return subtree is walked inside its parameter scope.
        assert_eq!(visitor.depths, [0, 0, 1]);
    }
}
