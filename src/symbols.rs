use alloc::{collections::BTreeMap, string::String, sync::Arc, vec, vec::Vec};

use crate::types::{TypeId, TypeInfo};

/// A formal parameter of a constructor, factory method or delegate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub ty: TypeInfo,
    pub name: Arc<str>,
    /// An optional parameter falls back to its declared default value when
    /// no source is registered for its type.
    pub is_optional: bool,
    /// By-reference parameters cannot be captured across a deferred
    /// boundary; only meaningful on delegate signatures.
    pub by_ref: bool,
}

impl Parameter {
    #[must_use]
    pub fn new(ty: TypeInfo) -> Self {
        let name = ty.short_name().to_lowercase();
        Self {
            ty,
            name: Arc::from(name.as_str()),
            is_optional: false,
            by_ref: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = Arc::from(name);
        self
    }

    #[inline]
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn by_ref(mut self) -> Self {
        self.by_ref = true;
        self
    }
}

/// A public constructor as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Constructor {
    pub parameters: Vec<Parameter>,
}

impl Constructor {
    #[inline]
    #[must_use]
    pub fn new(parameters: Vec<Parameter>) -> Self {
        Self { parameters }
    }

    #[inline]
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// The callable shape of a delegate type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateSignature {
    pub parameters: Vec<Parameter>,
    pub return_type: TypeInfo,
    pub is_async: bool,
}

/// Factory capability of a type: it can produce values of `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryShape {
    pub target: TypeInfo,
    pub is_async: bool,
}

/// Shape of a caller-owned wrapper type: `Owned<T>`-like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedShape {
    pub inner: TypeInfo,
    pub is_async: bool,
}

/// How a value is released when discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposalKind {
    Sync,
    Async,
}

/// Post-construction initialization step required by a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializerKind {
    Sync,
    Async,
}

/// The opaque seam to the host type system.
///
/// The planner asks; it never discovers types itself. Implementations must
/// be pure: the same id always yields the same answers within one planning
/// session.
pub trait TypeQueries {
    fn type_info(&self, id: TypeId) -> TypeInfo;

    /// Public constructors only; non-public members are never consulted.
    fn constructors(&self, id: TypeId) -> Vec<Constructor>;

    /// Base types and implemented interfaces, generic arguments already
    /// substituted.
    fn base_types(&self, id: TypeId) -> Vec<TypeId>;

    fn is_open_generic(&self, id: TypeId) -> bool;

    fn is_value_type(&self, id: TypeId) -> bool;

    /// Visible at the container's accessibility boundary.
    fn is_publicly_reachable(&self, id: TypeId) -> bool;

    fn factory_shape(&self, id: TypeId) -> Option<FactoryShape>;

    fn delegate_signature(&self, id: TypeId) -> Option<DelegateSignature>;

    fn owned_shape(&self, id: TypeId) -> Option<OwnedShape>;

    /// `Some(element)` when `id` is a collection-of-all-matches type.
    fn collection_element(&self, id: TypeId) -> Option<TypeInfo>;

    fn disposal(&self, id: TypeId) -> Option<DisposalKind>;

    fn initializer(&self, id: TypeId) -> Option<InitializerKind>;
}

#[derive(Debug, Clone)]
struct SymbolRecord {
    info: TypeInfo,
    constructors: Vec<Constructor>,
    bases: Vec<TypeId>,
    open_generic: bool,
    value_type: bool,
    reachable: bool,
    factory: Option<FactoryShape>,
    delegate: Option<DelegateSignature>,
    owned: Option<OwnedShape>,
    collection_element: Option<TypeInfo>,
    disposal: Option<DisposalKind>,
    initializer: Option<InitializerKind>,
}

/// In-memory implementation of [`TypeQueries`].
///
/// Embedders materialize their compiler's or reflection layer's view of the
/// world into this table once, then hand it to the planner. `declare` yields
/// a fresh id with a single public no-arg constructor; the mutators adjust
/// the record afterwards.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: BTreeMap<TypeId, SymbolRecord>,
    next_id: u64,
}

impl SymbolTable {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: &str) -> TypeId {
        let id = TypeId(self.next_id);
        self.next_id += 1;
        self.symbols.insert(
            id,
            SymbolRecord {
                info: TypeInfo::new(id, name),
                constructors: vec![Constructor::default()],
                bases: Vec::new(),
                open_generic: false,
                value_type: false,
                reachable: true,
                factory: None,
                delegate: None,
                owned: None,
                collection_element: None,
                disposal: None,
                initializer: None,
            },
        );
        id
    }

    #[inline]
    #[must_use]
    pub fn info(&self, id: TypeId) -> TypeInfo {
        self.type_info(id)
    }

    /// Convenience for building signatures: a parameter of the given type.
    #[inline]
    #[must_use]
    pub fn parameter(&self, id: TypeId) -> Parameter {
        Parameter::new(self.info(id))
    }

    pub fn set_constructors(&mut self, id: TypeId, constructors: Vec<Constructor>) {
        if let Some(record) = self.symbols.get_mut(&id) {
            record.constructors = constructors;
        }
    }

    pub fn add_constructor(&mut self, id: TypeId, parameters: Vec<Parameter>) {
        if let Some(record) = self.symbols.get_mut(&id) {
            record.constructors.push(Constructor::new(parameters));
        }
    }

    /// Replaces the default no-arg constructor with one taking `parameters`.
    pub fn constructed_with(&mut self, id: TypeId, parameters: Vec<Parameter>) {
        self.set_constructors(id, vec![Constructor::new(parameters)]);
    }

    pub fn add_base(&mut self, id: TypeId, base: TypeId) {
        if let Some(record) = self.symbols.get_mut(&id) {
            record.bases.push(base);
        }
    }

    pub fn mark_value_type(&mut self, id: TypeId) {
        if let Some(record) = self.symbols.get_mut(&id) {
            record.value_type = true;
        }
    }

    pub fn mark_open_generic(&mut self, id: TypeId) {
        if let Some(record) = self.symbols.get_mut(&id) {
            record.open_generic = true;
        }
    }

    pub fn mark_unreachable(&mut self, id: TypeId) {
        if let Some(record) = self.symbols.get_mut(&id) {
            record.reachable = false;
        }
    }

    pub fn set_factory(&mut self, id: TypeId, target: TypeId, is_async: bool) {
        let target = self.info(target);
        if let Some(record) = self.symbols.get_mut(&id) {
            record.factory = Some(FactoryShape { target, is_async });
        }
    }

    pub fn set_delegate(&mut self, id: TypeId, parameters: Vec<Parameter>, return_type: TypeId, is_async: bool) {
        let return_type = self.info(return_type);
        if let Some(record) = self.symbols.get_mut(&id) {
            record.delegate = Some(DelegateSignature {
                parameters,
                return_type,
                is_async,
            });
        }
    }

    pub fn set_owned(&mut self, id: TypeId, inner: TypeId, is_async: bool) {
        let inner = self.info(inner);
        if let Some(record) = self.symbols.get_mut(&id) {
            record.owned = Some(OwnedShape { inner, is_async });
        }
    }

    pub fn set_collection(&mut self, id: TypeId, element: TypeId) {
        let element = self.info(element);
        if let Some(record) = self.symbols.get_mut(&id) {
            record.collection_element = Some(element);
        }
    }

    pub fn set_disposal(&mut self, id: TypeId, kind: DisposalKind) {
        if let Some(record) = self.symbols.get_mut(&id) {
            record.disposal = Some(kind);
        }
    }

    pub fn set_initializer(&mut self, id: TypeId, kind: InitializerKind) {
        if let Some(record) = self.symbols.get_mut(&id) {
            record.initializer = Some(kind);
        }
    }
}

impl TypeQueries for SymbolTable {
    fn type_info(&self, id: TypeId) -> TypeInfo {
        self.symbols
            .get(&id)
            .map_or_else(|| TypeInfo::new(id, unknown_name(id)), |record| record.info.clone())
    }

    fn constructors(&self, id: TypeId) -> Vec<Constructor> {
        self.symbols.get(&id).map(|record| record.constructors.clone()).unwrap_or_default()
    }

    fn base_types(&self, id: TypeId) -> Vec<TypeId> {
        self.symbols.get(&id).map(|record| record.bases.clone()).unwrap_or_default()
    }

    fn is_open_generic(&self, id: TypeId) -> bool {
        self.symbols.get(&id).is_some_and(|record| record.open_generic)
    }

    fn is_value_type(&self, id: TypeId) -> bool {
        self.symbols.get(&id).is_some_and(|record| record.value_type)
    }

    fn is_publicly_reachable(&self, id: TypeId) -> bool {
        self.symbols.get(&id).map_or(true, |record| record.reachable)
    }

    fn factory_shape(&self, id: TypeId) -> Option<FactoryShape> {
        self.symbols.get(&id).and_then(|record| record.factory.clone())
    }

    fn delegate_signature(&self, id: TypeId) -> Option<DelegateSignature> {
        self.symbols.get(&id).and_then(|record| record.delegate.clone())
    }

    fn owned_shape(&self, id: TypeId) -> Option<OwnedShape> {
        self.symbols.get(&id).and_then(|record| record.owned.clone())
    }

    fn collection_element(&self, id: TypeId) -> Option<TypeInfo> {
        self.symbols.get(&id).and_then(|record| record.collection_element.clone())
    }

    fn disposal(&self, id: TypeId) -> Option<DisposalKind> {
        self.symbols.get(&id).and_then(|record| record.disposal)
    }

    fn initializer(&self, id: TypeId) -> Option<InitializerKind> {
        self.symbols.get(&id).and_then(|record| record.initializer)
    }
}

fn unknown_name(id: TypeId) -> String {
    use alloc::format;

    format!("<unknown type #{}>", id.0)
}

#[cfg(test)]
mod tests {
    use super::{DisposalKind, SymbolTable, TypeQueries as _};

    #[test]
    fn test_declare_defaults() {
        let mut symbols = SymbolTable::new();
        let a = symbols.declare("A");

        assert_eq!(&*symbols.info(a).name, "A");
        let constructors = symbols.constructors(a);
        assert_eq!(constructors.len(), 1);
        assert!(constructors[0].is_default());
        assert!(symbols.is_publicly_reachable(a));
        assert!(!symbols.is_value_type(a));
    }

    #[test]
    fn test_mutators() {
        let mut symbols = SymbolTable::new();
        let repo = symbols.declare("PostgresRepo");
        let iface = symbols.declare("Repo");

        symbols.add_base(repo, iface);
        symbols.mark_unreachable(iface);
        symbols.set_disposal(repo, DisposalKind::Sync);

        assert_eq!(symbols.base_types(repo), [iface]);
        assert!(!symbols.is_publicly_reachable(iface));
        assert_eq!(symbols.disposal(repo), Some(DisposalKind::Sync));
    }

    #[test]
    fn test_constructed_with() {
        let mut symbols = SymbolTable::new();
        let a = symbols.declare("A");
        let b = symbols.declare("B");

        symbols.constructed_with(a, alloc::vec![symbols.parameter(b).named("dep")]);

        let constructors = symbols.constructors(a);
        assert_eq!(constructors.len(), 1);
        assert_eq!(&*constructors[0].parameters[0].name, "dep");
        assert_eq!(constructors[0].parameters[0].ty.id, b);
    }
}
