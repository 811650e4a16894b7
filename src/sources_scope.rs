use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    catalog::{Catalog, Entry},
    source::{ArraySource, DelegateParameter, DelegateSource, InstanceSource, OwnedSource, SourceId, SourceRef, WrappedDecorator},
    symbols::TypeQueries,
    types::{TypeId, TypeInfo},
};

/// A failed lookup; the validator maps this onto its diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    NoSource { ty: TypeInfo },
    Ambiguous { ty: TypeInfo, count: usize },
}

/// One delegate-parameter nesting level of the scope table.
#[derive(Debug)]
struct DelegateFrame {
    parameters: Vec<SourceRef>,
    depth: u32,
    parent: Option<Arc<DelegateFrame>>,
}

#[derive(Default)]
struct Interned {
    decorated: BTreeMap<TypeId, SourceRef>,
    delegates: BTreeMap<TypeId, SourceRef>,
    arrays: BTreeMap<TypeId, SourceRef>,
}

/// Lexically scoped mapping from a requested type to its single best source.
///
/// Built once per container from its catalog and reused immutably by every
/// traversal; entering a delegate pushes a transient parameter frame that
/// shadows the same types coming from outer scopes. Ad-hoc sources
/// (delegates, collections, decorated chains) are interned so repeated
/// lookups return identity-stable nodes, which the cycle and memoization
/// bookkeeping relies on.
#[derive(Clone)]
pub struct InstanceSourcesScope {
    catalog: Arc<Catalog>,
    host: Arc<dyn TypeQueries + Send + Sync>,
    frame: Option<Arc<DelegateFrame>>,
    interned: Arc<Mutex<Interned>>,
}

impl InstanceSourcesScope {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, host: Arc<dyn TypeQueries + Send + Sync>) -> Self {
        Self {
            catalog,
            host,
            frame: None,
            interned: Arc::new(Mutex::new(Interned::default())),
        }
    }

    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[inline]
    #[must_use]
    pub fn host(&self) -> &dyn TypeQueries {
        &*self.host
    }

    /// Delegate-nesting depth; the cycle bookkeeping compares entries by it.
    #[inline]
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.frame.as_ref().map_or(0, |frame| frame.depth)
    }

    /// Enters `delegate`'s parameter scope.
    ///
    /// # Panics
    /// Panics if `delegate` is not a [`InstanceSource::Delegate`] node; the
    /// walker only calls this for delegate nodes.
    #[must_use]
    pub fn enter_delegate(&self, delegate: &SourceRef) -> Self {
        let InstanceSource::Delegate(source) = &**delegate else {
            panic!("entered a non-delegate source");
        };

        let owner = SourceId::of(delegate);
        let parameters = source
            .parameters
            .iter()
            .enumerate()
            .map(|(index, parameter)| {
                Arc::new(InstanceSource::DelegateParameter(DelegateParameter {
                    parameter: parameter.clone(),
                    index,
                    owner,
                })) as SourceRef
            })
            .collect();

        Self {
            catalog: self.catalog.clone(),
            host: self.host.clone(),
            frame: Some(Arc::new(DelegateFrame {
                parameters,
                depth: self.depth() + 1,
                parent: self.frame.clone(),
            })),
            interned: self.interned.clone(),
        }
    }

    /// Resolves `ty` to its single best source.
    ///
    /// Lookup order: delegate parameters innermost-out (shadowing), then the
    /// catalog (wrapped in its registered decorator chain), then ad-hoc
    /// synthesis for delegate, owned and collection shapes.
    ///
    /// # Errors
    /// [`LookupError::NoSource`] when nothing matches;
    /// [`LookupError::Ambiguous`] when more than one equally eligible
    /// candidate remains.
    pub fn lookup(&self, ty: TypeId) -> Result<SourceRef, LookupError> {
        let mut frame = self.frame.as_deref();
        while let Some(current) = frame {
            for parameter in &current.parameters {
                if parameter.of_type().id == ty {
                    return Ok(parameter.clone());
                }
            }
            frame = current.parent.as_deref();
        }

        if let Some(entry) = self.catalog.entry(ty) {
            return match entry {
                Entry::Unique(registered) => Ok(self.decorated(ty, &registered.source)),
                Entry::Ambiguous(_) => Err(LookupError::Ambiguous {
                    ty: self.host.type_info(ty),
                    count: entry.candidate_count(),
                }),
            };
        }

        if let Some(signature) = self.host.delegate_signature(ty) {
            return Ok(self.delegate(ty, signature));
        }

        if let Some(shape) = self.host.owned_shape(ty) {
            let inner = self.lookup(shape.inner.id)?;
            return Ok(Arc::new(InstanceSource::Owned(OwnedSource {
                owned_type: self.host.type_info(ty),
                inner,
                is_async: shape.is_async,
            })));
        }

        if let Some(element) = self.host.collection_element(ty) {
            return Ok(self.array(ty, &element));
        }

        Err(LookupError::NoSource {
            ty: self.host.type_info(ty),
        })
    }

    fn decorated(&self, ty: TypeId, source: &SourceRef) -> SourceRef {
        if self.catalog.decorators_for(ty).is_empty() {
            return source.clone();
        }
        let mut interned = self.interned.lock();
        if let Some(existing) = interned.decorated.get(&ty) {
            return existing.clone();
        }
        let wrapped = self.wrap_decorators(ty, source.clone());
        interned.decorated.insert(ty, wrapped.clone());
        wrapped
    }

    fn wrap_decorators(&self, ty: TypeId, source: SourceRef) -> SourceRef {
        self.catalog.decorators_for(ty).iter().fold(source, |underlying, decorator| {
            Arc::new(InstanceSource::WrappedDecorator(WrappedDecorator {
                decorator: decorator.clone(),
                underlying,
            }))
        })
    }

    fn delegate(&self, ty: TypeId, signature: crate::symbols::DelegateSignature) -> SourceRef {
        let mut interned = self.interned.lock();
        if let Some(existing) = interned.delegates.get(&ty) {
            return existing.clone();
        }
        debug!(delegate = %self.host.type_info(ty), "synthesizing delegate source");
        let source: SourceRef = Arc::new(InstanceSource::Delegate(DelegateSource {
            delegate_type: self.host.type_info(ty),
            parameters: signature.parameters,
            return_type: signature.return_type,
            is_async: signature.is_async,
        }));
        interned.delegates.insert(ty, source.clone());
        source
    }

    fn array(&self, ty: TypeId, element: &TypeInfo) -> SourceRef {
        let mut interned = self.interned.lock();
        if let Some(existing) = interned.arrays.get(&ty) {
            return existing.clone();
        }
        let items = self
            .catalog
            .all_for(element.id)
            .iter()
            .map(|item| self.wrap_decorators(element.id, item.clone()))
            .collect::<Vec<_>>();
        debug!(element = %element, items = items.len(), "synthesizing collection source");
        let source: SourceRef = Arc::new(InstanceSource::Array(ArraySource {
            array_type: self.host.type_info(ty),
            element: element.clone(),
            items,
        }));
        interned.arrays.insert(ty, source.clone());
        source
    }
}
