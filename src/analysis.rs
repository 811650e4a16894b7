use alloc::vec::Vec;

use crate::{
    source::{InstanceSource, SourceId, SourceRef},
    sources_scope::InstanceSourcesScope,
    visitor::{walk, SourceVisitor},
};

/// Whether resolving `source` requires awaiting.
///
/// Deferred boundaries (delegates, owned routines) pay their own cost at
/// invocation time and are not descended into.
#[must_use]
pub fn requires_async(source: &SourceRef, scope: &InstanceSourcesScope) -> bool {
    let mut analysis = RequiresAsync {
        result: false,
        visited: Vec::new(),
    };
    walk(&mut analysis, source, scope, &());
    analysis.result
}

struct RequiresAsync {
    result: bool,
    visited: Vec<SourceId>,
}

impl SourceVisitor for RequiresAsync {
    type State = ();

    fn should_visit(&mut self, source: &SourceRef, _scope: &InstanceSourcesScope, _state: &()) -> bool {
        if self.result {
            return false;
        }
        if matches!(&**source, InstanceSource::Delegate(_) | InstanceSource::Owned(_)) {
            return false;
        }
        let id = SourceId::of(source);
        if self.visited.contains(&id) {
            return false;
        }
        self.visited.push(id);
        true
    }

    fn enter(&mut self, source: &SourceRef, _scope: &InstanceSourcesScope, _state: &()) {
        if source.requires_await() {
            self.result = true;
        }
    }
}

/// Whether any value produced while resolving `source` needs release
/// bookkeeping. Owned handles are the caller's responsibility and do not
/// count, but their creation routines are still descended into, since the
/// routine itself must release on failure.
#[must_use]
pub fn requires_disposal(source: &SourceRef, scope: &InstanceSourcesScope) -> bool {
    let mut analysis = RequiresDisposal {
        result: false,
        visited: Vec::new(),
    };
    walk(&mut analysis, source, scope, &());
    analysis.result
}

struct RequiresDisposal {
    result: bool,
    visited: Vec<SourceId>,
}

impl SourceVisitor for RequiresDisposal {
    type State = ();

    fn should_visit(&mut self, source: &SourceRef, _scope: &InstanceSourcesScope, _state: &()) -> bool {
        if self.result {
            return false;
        }
        let id = SourceId::of(source);
        if self.visited.contains(&id) {
            return false;
        }
        self.visited.push(id);
        true
    }

    fn enter(&mut self, source: &SourceRef, scope: &InstanceSourcesScope, _state: &()) {
        let constructs = matches!(
            &**source,
            InstanceSource::Registration(_)
                | InstanceSource::Factory(_)
                | InstanceSource::FactoryMethod(_)
                | InstanceSource::WrappedDecorator(_)
        );
        if constructs && scope.host().disposal(source.of_type().id).is_some() {
            self.result = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::{sync::Arc, vec};

    use super::{requires_async, requires_disposal};
    use crate::{
        catalog::Catalog,
        rules::{Module, Rule},
        sources_scope::InstanceSourcesScope,
        symbols::{DisposalKind, InitializerKind, SymbolTable},
    };

    fn scope_of(module: &Module, symbols: SymbolTable) -> InstanceSourcesScope {
        let (catalog, diagnostics) = Catalog::build(module, &symbols);
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
        InstanceSourcesScope::new(Arc::new(catalog), Arc::new(symbols))
    }

    #[test]
    fn test_requires_async_sees_through_constructors() {
        let mut symbols = SymbolTable::new();
        let a = symbols.declare("A");
        let b = symbols.declare("B");
        symbols.constructed_with(a, vec![symbols.parameter(b)]);
        symbols.set_initializer(b, InitializerKind::Async);

        let module = Module::new("root")
            .rule(Rule::for_type(symbols.info(a)))
            .rule(Rule::for_type(symbols.info(b)));
        let scope = scope_of(&module, symbols);

        let root = scope.lookup(a).unwrap();
        assert!(requires_async(&root, &scope));
    }

    #[test]
    fn test_requires_async_stops_at_delegate_boundary() {
        let mut symbols = SymbolTable::new();
        let a = symbols.declare("A");
        let b = symbols.declare("B");
        let fn_b = symbols.declare("Fn() -> B");
        symbols.set_initializer(b, InitializerKind::Async);
        symbols.set_delegate(fn_b, vec![], b, true);
        symbols.constructed_with(a, vec![symbols.parameter(fn_b)]);

        let module = Module::new("root")
            .rule(Rule::for_type(symbols.info(a)))
            .rule(Rule::for_type(symbols.info(b)));
        let scope = scope_of(&module, symbols);

        // B's asynchronous initializer is paid inside the delegate, not by
        // whoever creates the closure.
        let root = scope.lookup(a).unwrap();
        assert!(!requires_async(&root, &scope));
    }

    #[test]
    fn test_requires_disposal() {
        let mut symbols = SymbolTable::new();
        let a = symbols.declare("A");
        let b = symbols.declare("B");
        symbols.constructed_with(a, vec![symbols.parameter(b)]);

        let clean = Module::new("root")
            .rule(Rule::for_type(symbols.info(a)))
            .rule(Rule::for_type(symbols.info(b)));
        let scope = scope_of(&clean, symbols.clone());
        let root = scope.lookup(a).unwrap();
        assert!(!requires_disposal(&root, &scope));

        symbols.set_disposal(b, DisposalKind::Sync);
        let scope = scope_of(&clean, symbols);
        let root = scope.lookup(a).unwrap();
        assert!(requires_disposal(&root, &scope));
    }
}
