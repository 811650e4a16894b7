use alloc::{format, string::String, sync::Arc, vec::Vec};

use crate::{
    rules::{FactoryMethodSymbol, InstanceMemberSymbol},
    scope::Scope,
    symbols::{Constructor, InitializerKind, Parameter},
    types::TypeInfo,
};

/// Shared handle to an instance source.
///
/// Sources are interned by the catalog and the scope table, so one node is
/// reachable through many paths; identity (not value equality) is what the
/// cycle and memoization bookkeeping compare.
pub type SourceRef = Arc<InstanceSource>;

/// Identity of an instance source, derived from its shared allocation.
///
/// Used only for identity tests and set membership; never for ordering
/// anything user-visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceId(usize);

impl SourceId {
    #[inline]
    #[must_use]
    pub fn of(source: &SourceRef) -> Self {
        Self(Arc::as_ptr(source).cast::<()>() as usize)
    }
}

/// A concrete type produced through its selected public constructor.
#[derive(Debug, Clone)]
pub struct Registration {
    pub produced: TypeInfo,
    pub scope: Scope,
    pub constructor: Constructor,
    pub registered_as: Vec<TypeInfo>,
    pub initializer: Option<InitializerKind>,
}

/// Resolve the factory object, then invoke its creation capability.
#[derive(Debug, Clone)]
pub struct FactorySource {
    pub target: TypeInfo,
    pub factory: SourceRef,
    pub scope: Scope,
    pub is_async: bool,
}

/// A user-declared factory method with parameters resolved like
/// constructor parameters.
#[derive(Debug, Clone)]
pub struct FactoryMethod {
    pub method: FactoryMethodSymbol,
    pub scope: Scope,
}

/// Like [`Registration`], with one constructor parameter designated as the
/// decorated-value slot. Only reachable through [`WrappedDecorator`].
#[derive(Debug, Clone)]
pub struct DecoratorRegistration {
    pub produced: TypeInfo,
    pub constructor: Constructor,
    pub decorated_parameter: usize,
    pub initializer: Option<InitializerKind>,
}

/// A decorator declared as a factory method; `decorated_parameter` names the
/// slot receiving the undecorated value.
#[derive(Debug, Clone)]
pub struct DecoratorFactoryMethod {
    pub method: FactoryMethodSymbol,
    pub decorated_parameter: usize,
}

/// A requested callable type whose invocation starts a fresh, parameterized
/// sub-resolution of its return type.
#[derive(Debug, Clone)]
pub struct DelegateSource {
    pub delegate_type: TypeInfo,
    pub parameters: Vec<Parameter>,
    pub return_type: TypeInfo,
    pub is_async: bool,
}

/// A leaf bound to one of the enclosing delegate's parameters.
#[derive(Debug, Clone)]
pub struct DelegateParameter {
    pub parameter: Parameter,
    pub index: usize,
    /// Identity of the owning [`DelegateSource`] node.
    pub owner: SourceId,
}

/// A pre-existing externally supplied value; always available without
/// further construction work.
#[derive(Debug, Clone)]
pub struct InstanceMember {
    pub member: InstanceMemberSymbol,
}

/// The ordered collection of every source registered for an element type.
/// Synthesized ad hoc, never separately registered.
#[derive(Debug, Clone)]
pub struct ArraySource {
    pub array_type: TypeInfo,
    pub element: TypeInfo,
    pub items: Vec<SourceRef>,
}

/// A decorator paired with the underlying source it decorates; chains.
#[derive(Debug, Clone)]
pub struct WrappedDecorator {
    /// A [`DecoratorRegistration`] or [`DecoratorFactoryMethod`] node.
    pub decorator: SourceRef,
    pub underlying: SourceRef,
}

/// A source reinterpreted as a different compatible type; no construction
/// work, pure view.
#[derive(Debug, Clone)]
pub struct Forwarded {
    pub as_type: TypeInfo,
    pub underlying: SourceRef,
}

/// Wraps a source so its lifetime is handed to the caller for manual
/// release, decoupled from the enclosing scope's automatic disposal.
#[derive(Debug, Clone)]
pub struct OwnedSource {
    pub owned_type: TypeInfo,
    pub inner: SourceRef,
    pub is_async: bool,
}

/// One concrete strategy for producing a value of a given type.
///
/// Closed set: the walker, the validator and the lowerer all match
/// exhaustively, so adding a variant is a compile-visible event everywhere.
#[derive(Debug, Clone)]
pub enum InstanceSource {
    Registration(Registration),
    Factory(FactorySource),
    FactoryMethod(FactoryMethod),
    DecoratorRegistration(DecoratorRegistration),
    DecoratorFactoryMethod(DecoratorFactoryMethod),
    Delegate(DelegateSource),
    DelegateParameter(DelegateParameter),
    InstanceMember(InstanceMember),
    Array(ArraySource),
    WrappedDecorator(WrappedDecorator),
    Forwarded(Forwarded),
    Owned(OwnedSource),
}

impl InstanceSource {
    /// The type this source ultimately produces.
    #[must_use]
    pub fn of_type(&self) -> &TypeInfo {
        match self {
            InstanceSource::Registration(src) => &src.produced,
            InstanceSource::Factory(src) => &src.target,
            InstanceSource::FactoryMethod(src) => &src.method.returns,
            InstanceSource::DecoratorRegistration(src) => &src.produced,
            InstanceSource::DecoratorFactoryMethod(src) => &src.method.returns,
            InstanceSource::Delegate(src) => &src.delegate_type,
            InstanceSource::DelegateParameter(src) => &src.parameter.ty,
            InstanceSource::InstanceMember(src) => &src.member.ty,
            InstanceSource::Array(src) => &src.array_type,
            InstanceSource::WrappedDecorator(src) => src.underlying.of_type(),
            InstanceSource::Forwarded(src) => &src.as_type,
            InstanceSource::Owned(src) => &src.owned_type,
        }
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        match self {
            InstanceSource::Registration(src) => src.scope,
            InstanceSource::Factory(src) => src.scope,
            InstanceSource::FactoryMethod(src) => src.scope,
            // Decorators take the sharing of whatever they wrap; bare
            // decorator nodes are only reachable through WrappedDecorator.
            InstanceSource::DecoratorRegistration(_) | InstanceSource::DecoratorFactoryMethod(_) => Scope::InstancePerDependency,
            InstanceSource::Delegate(_) | InstanceSource::DelegateParameter(_) | InstanceSource::InstanceMember(_) => {
                Scope::InstancePerResolution
            }
            InstanceSource::Array(_) | InstanceSource::Owned(_) => Scope::InstancePerDependency,
            InstanceSource::WrappedDecorator(src) => src.underlying.scope(),
            InstanceSource::Forwarded(src) => src.underlying.scope(),
        }
    }

    /// Whether producing this value, transitively, requires awaiting.
    #[must_use]
    pub fn is_async(&self) -> bool {
        match self {
            InstanceSource::Registration(src) => matches!(src.initializer, Some(InitializerKind::Async)),
            InstanceSource::Factory(src) => src.is_async,
            InstanceSource::FactoryMethod(src) => src.method.is_async,
            InstanceSource::DecoratorRegistration(src) => matches!(src.initializer, Some(InitializerKind::Async)),
            InstanceSource::DecoratorFactoryMethod(src) => src.method.is_async,
            InstanceSource::Delegate(src) => src.is_async,
            InstanceSource::DelegateParameter(_) | InstanceSource::InstanceMember(_) => false,
            InstanceSource::Array(src) => src.items.iter().any(|item| item.is_async()),
            InstanceSource::WrappedDecorator(src) => src.decorator.is_async() || src.underlying.is_async(),
            InstanceSource::Forwarded(src) => src.underlying.is_async(),
            InstanceSource::Owned(src) => src.is_async,
        }
    }

    /// Whether this node's *own* production step awaits, aggregates and
    /// deferred boundaries excluded. This is what the sync/async
    /// compatibility check inspects.
    #[must_use]
    pub(crate) fn requires_await(&self) -> bool {
        match self {
            InstanceSource::Registration(src) => matches!(src.initializer, Some(InitializerKind::Async)),
            InstanceSource::Factory(src) => src.is_async,
            InstanceSource::FactoryMethod(src) => src.method.is_async,
            InstanceSource::DecoratorRegistration(src) => matches!(src.initializer, Some(InitializerKind::Async)),
            InstanceSource::DecoratorFactoryMethod(src) => src.method.is_async,
            InstanceSource::WrappedDecorator(src) => src.decorator.requires_await(),
            InstanceSource::Delegate(_)
            | InstanceSource::DelegateParameter(_)
            | InstanceSource::InstanceMember(_)
            | InstanceSource::Array(_)
            | InstanceSource::Forwarded(_)
            | InstanceSource::Owned(_) => false,
        }
    }

    /// Human-readable "resolving `T` via ..." fragment for traces.
    #[must_use]
    pub fn described(&self) -> String {
        let via: String = match self {
            InstanceSource::Registration(_) => "constructor".into(),
            InstanceSource::Factory(_) => "factory".into(),
            InstanceSource::FactoryMethod(src) => format!("factory method `{}`", src.method.name),
            InstanceSource::DecoratorRegistration(_) => "decorator constructor".into(),
            InstanceSource::DecoratorFactoryMethod(src) => format!("decorator method `{}`", src.method.name),
            InstanceSource::Delegate(_) => "delegate".into(),
            InstanceSource::DelegateParameter(src) => format!("delegate parameter `{}`", src.parameter.name),
            InstanceSource::InstanceMember(src) => format!("instance member `{}`", src.member.name),
            InstanceSource::Array(_) => "collection".into(),
            InstanceSource::WrappedDecorator(src) => return src.decorator.described(),
            InstanceSource::Forwarded(src) => format!("forwarded `{}`", src.underlying.of_type()),
            InstanceSource::Owned(_) => "owned value".into(),
        };
        format!("`{}` via {}", self.of_type(), via)
    }

    /// Peels pure views ([`Forwarded`]) off a source.
    #[must_use]
    pub(crate) fn unforwarded(source: &SourceRef) -> &SourceRef {
        let mut current = source;
        while let InstanceSource::Forwarded(fwd) = &**current {
            current = &fwd.underlying;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use alloc::{sync::Arc, vec};

    use super::{ArraySource, DelegateSource, InstanceSource, Registration, SourceId, SourceRef};
    use crate::{
        scope::Scope,
        symbols::{Constructor, InitializerKind},
        types::{TypeId, TypeInfo},
    };

    fn registration(name: &str, id: u64, scope: Scope) -> SourceRef {
        Arc::new(InstanceSource::Registration(Registration {
            produced: TypeInfo::new(TypeId(id), name),
            scope,
            constructor: Constructor::default(),
            registered_as: vec![],
            initializer: None,
        }))
    }

    #[test]
    fn test_identity_is_allocation() {
        let a = registration("A", 1, Scope::default());
        let b = a.clone();
        let c = registration("A", 1, Scope::default());

        assert_eq!(SourceId::of(&a), SourceId::of(&b));
        assert_ne!(SourceId::of(&a), SourceId::of(&c));
    }

    #[test]
    fn test_async_aggregation() {
        let sync = registration("A", 1, Scope::default());
        let init = Arc::new(InstanceSource::Registration(Registration {
            produced: TypeInfo::new(TypeId(2), "B"),
            scope: Scope::default(),
            constructor: Constructor::default(),
            registered_as: vec![],
            initializer: Some(InitializerKind::Async),
        }));

        let array = InstanceSource::Array(ArraySource {
            array_type: TypeInfo::new(TypeId(3), "Vec<I>"),
            element: TypeInfo::new(TypeId(4), "I"),
            items: vec![sync.clone(), init],
        });
        assert!(array.is_async());
        assert!(!array.requires_await());

        let all_sync = InstanceSource::Array(ArraySource {
            array_type: TypeInfo::new(TypeId(3), "Vec<I>"),
            element: TypeInfo::new(TypeId(4), "I"),
            items: vec![sync],
        });
        assert!(!all_sync.is_async());
    }

    #[test]
    fn test_described() {
        let delegate = InstanceSource::Delegate(DelegateSource {
            delegate_type: TypeInfo::new(TypeId(9), "Fn(A) -> B"),
            parameters: vec![],
            return_type: TypeInfo::new(TypeId(2), "B"),
            is_async: false,
        });
        assert_eq!(delegate.described(), "`Fn(A) -> B` via delegate");
    }
}
