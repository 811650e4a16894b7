use alloc::{collections::BTreeMap, sync::Arc, vec::Vec};
use tracing::debug;

use crate::{
    diagnostics::Diagnostics,
    errors::CatalogErrorKind,
    rules::{Module, Provider, Rule},
    scope::Scope,
    source::{
        DecoratorFactoryMethod, DecoratorRegistration, FactoryMethod, FactorySource, Forwarded, InstanceMember, InstanceSource,
        Registration, SourceId, SourceRef,
    },
    symbols::{Constructor, TypeQueries},
    types::{TypeId, TypeInfo},
};

/// Identity of a module declaration, used to deduplicate the same module
/// imported twice through different paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ModuleKey(usize);

impl ModuleKey {
    fn of(module: &Module) -> Self {
        Self(module as *const Module as usize)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Registered {
    pub(crate) source: SourceRef,
    /// The module whose declaration produced this entry.
    origin: ModuleKey,
}

/// Best-source state of one target type.
#[derive(Debug, Clone)]
pub(crate) enum Entry {
    Unique(Registered),
    /// Kept so graph validation can report an ambiguous rather than a
    /// missing source; [`Catalog::get`] treats it as absent.
    Ambiguous(Vec<Registered>),
}

impl Entry {
    fn candidates(&self) -> &[Registered] {
        match self {
            Entry::Unique(registered) => core::slice::from_ref(registered),
            Entry::Ambiguous(candidates) => candidates,
        }
    }

    pub(crate) fn candidate_count(&self) -> usize {
        self.candidates().len()
    }
}

/// The merged, validated set of instance sources available to a container.
///
/// Built once from a [`Module`] tree, then shared immutably by every
/// traversal. All maps are keyed by [`TypeId`], so every observable order is
/// deterministic for a given module tree.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<TypeId, Entry>,
    all_sources: BTreeMap<TypeId, Vec<SourceRef>>,
    decorators: BTreeMap<TypeId, Vec<SourceRef>>,
}

impl Catalog {
    /// Builds the catalog for `module`, merging its imports.
    ///
    /// Shape errors drop the affected entry only; everything else is kept,
    /// and the diagnostics record what was dropped and why.
    #[must_use]
    pub fn build(module: &Module, host: &dyn TypeQueries) -> (Self, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let mut builder = Builder {
            host,
            built: BTreeMap::new(),
        };
        let catalog = builder.build_module(module, &mut diagnostics);
        (catalog, diagnostics)
    }

    /// The single best source for `ty`, if exactly one candidate remains
    /// after direct-registration priority and exclusion lists.
    #[must_use]
    pub fn get(&self, ty: TypeId) -> Option<&SourceRef> {
        match self.entries.get(&ty) {
            Some(Entry::Unique(registered)) => Some(&registered.source),
            Some(Entry::Ambiguous(_)) | None => None,
        }
    }

    pub(crate) fn entry(&self, ty: TypeId) -> Option<&Entry> {
        self.entries.get(&ty)
    }

    /// Every source registered for `ty`, in declaration order; feeds
    /// collection synthesis.
    pub(crate) fn all_for(&self, ty: TypeId) -> &[SourceRef] {
        self.all_sources.get(&ty).map_or(&[], Vec::as_slice)
    }

    /// Decorators for `ty` in application order: imported first, local
    /// last, so locally declared decorators end up outermost.
    pub(crate) fn decorators_for(&self, ty: TypeId) -> &[SourceRef] {
        self.decorators.get(&ty).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct ImportedCandidate {
    registered: Registered,
    /// Index of the importing declaration in `module.imports`.
    via: usize,
}

struct Builder<'a> {
    host: &'a dyn TypeQueries,
    built: BTreeMap<ModuleKey, Arc<Catalog>>,
}

impl Builder<'_> {
    fn build_module(&mut self, module: &Module, diagnostics: &mut Diagnostics) -> Catalog {
        let key = ModuleKey::of(module);

        // Local declarations first; they shadow anything imported.
        let mut local: BTreeMap<TypeId, Vec<Registered>> = BTreeMap::new();
        let mut all_sources: BTreeMap<TypeId, Vec<SourceRef>> = BTreeMap::new();
        let mut local_decorators: BTreeMap<TypeId, Vec<SourceRef>> = BTreeMap::new();

        for rule in &module.rules {
            let outcome = self.build_rule(rule, diagnostics);
            for (target, source) in outcome.entries {
                local.entry(target).or_default().push(Registered {
                    source: source.clone(),
                    origin: key,
                });
                push_unique(all_sources.entry(target).or_default(), source);
            }
            if let Some((decorated, decorator)) = outcome.decorator {
                local_decorators.entry(decorated).or_default().push(decorator);
            }
        }

        // Imported declarations, deduplicated by origin so a transitively
        // shared module contributes once regardless of the import path.
        let mut imported: BTreeMap<TypeId, Vec<ImportedCandidate>> = BTreeMap::new();
        let mut imported_decorators: BTreeMap<TypeId, Vec<SourceRef>> = BTreeMap::new();

        for (via, import) in module.imports.iter().enumerate() {
            let sub = self.build_import(&import.module, diagnostics);

            for (&ty, entry) in &sub.entries {
                if import.exclusions.contains(&ty) {
                    continue;
                }
                let candidates = imported.entry(ty).or_default();
                for registered in entry.candidates() {
                    if candidates.iter().any(|candidate| candidate.registered.origin == registered.origin) {
                        continue;
                    }
                    candidates.push(ImportedCandidate {
                        registered: registered.clone(),
                        via,
                    });
                }
            }

            for (&ty, sources) in &sub.all_sources {
                if import.exclusions.contains(&ty) {
                    continue;
                }
                let merged = all_sources.entry(ty).or_default();
                for source in sources {
                    push_unique(merged, source.clone());
                }
            }

            for (&ty, decorators) in &sub.decorators {
                if import.exclusions.contains(&ty) {
                    continue;
                }
                let merged = imported_decorators.entry(ty).or_default();
                for decorator in decorators {
                    push_unique(merged, decorator.clone());
                }
            }
        }

        let mut entries: BTreeMap<TypeId, Entry> = BTreeMap::new();

        for (ty, mut candidates) in local {
            if candidates.len() == 1 {
                entries.insert(ty, Entry::Unique(candidates.pop().expect("one candidate")));
            } else {
                diagnostics.push(CatalogErrorKind::DuplicateRegistration {
                    ty: type_info_of(&candidates[0].source),
                    module: module.name.clone(),
                });
                entries.insert(ty, Entry::Ambiguous(candidates));
            }
        }

        for (ty, candidates) in imported {
            if entries.contains_key(&ty) {
                debug!(ty = ?ty, "direct registration shadows imported one");
                continue;
            }
            let distinct_origins = {
                let mut origins: Vec<ModuleKey> = candidates.iter().map(|candidate| candidate.registered.origin).collect();
                origins.sort_unstable();
                origins.dedup();
                origins.len()
            };
            if candidates.len() == 1 {
                let candidate = candidates.into_iter().next().expect("one candidate");
                entries.insert(ty, Entry::Unique(candidate.registered));
            } else {
                // One diagnostic per importing declaration, but only when the
                // conflict arises here; a submodule that was already ambiguous
                // has reported it itself.
                let mut vias: Vec<usize> = candidates.iter().map(|candidate| candidate.via).collect();
                vias.sort_unstable();
                vias.dedup();
                if distinct_origins > 1 && vias.len() > 1 {
                    let ty_info = type_info_of(&candidates[0].registered.source);
                    for via in vias {
                        diagnostics.push(CatalogErrorKind::ConflictingImport {
                            ty: ty_info.clone(),
                            module: module.imports[via].module.name.clone(),
                        });
                    }
                }
                entries.insert(
                    ty,
                    Entry::Ambiguous(candidates.into_iter().map(|candidate| candidate.registered).collect()),
                );
            }
        }

        // Decorator application order: imported first, local last.
        let mut decorators = imported_decorators;
        for (ty, local_list) in local_decorators {
            decorators.entry(ty).or_default().extend(local_list);
        }

        Catalog {
            entries,
            all_sources,
            decorators,
        }
    }

    fn build_import(&mut self, module: &Arc<Module>, diagnostics: &mut Diagnostics) -> Arc<Catalog> {
        let key = ModuleKey::of(module);
        if let Some(built) = self.built.get(&key) {
            return built.clone();
        }
        let built = Arc::new(self.build_module(module, diagnostics));
        self.built.insert(key, built.clone());
        built
    }

    fn build_rule(&self, rule: &Rule, diagnostics: &mut Diagnostics) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();
        let produced = &rule.produced;

        if self.host.is_open_generic(produced.id) {
            diagnostics.push(CatalogErrorKind::OpenGeneric { ty: produced.clone() });
            return outcome;
        }
        if !self.host.is_publicly_reachable(produced.id) {
            diagnostics.push(CatalogErrorKind::NotReachable { ty: produced.clone() });
            return outcome;
        }
        if rule.scope == Scope::SingleInstance && self.host.is_value_type(produced.id) {
            diagnostics.push(CatalogErrorKind::SingleInstanceValueType { ty: produced.clone() });
            return outcome;
        }

        if let Some(slot) = rule.decorated_parameter {
            if let Some((decorated, decorator)) = self.build_decorator(rule, slot, diagnostics) {
                outcome.decorator = Some((decorated, decorator));
            }
            return outcome;
        }

        let base: SourceRef = match &rule.provider {
            Provider::Constructor => {
                let Some(constructor) = self.select_constructor(produced, diagnostics) else {
                    return outcome;
                };
                Arc::new(InstanceSource::Registration(Registration {
                    produced: produced.clone(),
                    scope: rule.scope,
                    constructor,
                    registered_as: rule.targets(),
                    initializer: self.host.initializer(produced.id),
                }))
            }
            Provider::FactoryMethod(method) => Arc::new(InstanceSource::FactoryMethod(FactoryMethod {
                method: method.clone(),
                scope: rule.scope,
            })),
            Provider::InstanceMember(member) => Arc::new(InstanceSource::InstanceMember(InstanceMember { member: member.clone() })),
        };

        let bases = self.host.base_types(produced.id);
        for target in rule.targets() {
            if target.id != produced.id && !bases.contains(&target.id) {
                diagnostics.push(CatalogErrorKind::NotRegisterableAs {
                    ty: produced.clone(),
                    as_ty: target,
                });
                continue;
            }
            if !self.host.is_publicly_reachable(target.id) {
                diagnostics.push(CatalogErrorKind::NotReachable { ty: target });
                continue;
            }
            let source = if target.id == produced.id {
                base.clone()
            } else {
                Arc::new(InstanceSource::Forwarded(Forwarded {
                    as_type: target.clone(),
                    underlying: base.clone(),
                }))
            };
            outcome.entries.push((target.id, source));
        }

        // A produced type with a factory capability also serves its target,
        // delegating through the factory object.
        if let Some(shape) = self.host.factory_shape(produced.id) {
            outcome.entries.push((
                shape.target.id,
                Arc::new(InstanceSource::Factory(FactorySource {
                    target: shape.target,
                    factory: base,
                    scope: rule.scope,
                    is_async: shape.is_async,
                })),
            ));
        }

        outcome
    }

    fn build_decorator(&self, rule: &Rule, slot: usize, diagnostics: &mut Diagnostics) -> Option<(TypeId, SourceRef)> {
        let produced = &rule.produced;
        match &rule.provider {
            Provider::Constructor => {
                let constructor = self.select_constructor(produced, diagnostics)?;
                if !decorated_slot_matches(&constructor.parameters, slot, produced) {
                    diagnostics.push(CatalogErrorKind::InvalidDecoratedParameter {
                        ty: produced.clone(),
                        expected: produced.clone(),
                        slot,
                    });
                    return None;
                }
                Some((
                    produced.id,
                    Arc::new(InstanceSource::DecoratorRegistration(DecoratorRegistration {
                        produced: produced.clone(),
                        constructor,
                        decorated_parameter: slot,
                        initializer: self.host.initializer(produced.id),
                    })),
                ))
            }
            Provider::FactoryMethod(method) => {
                if !decorated_slot_matches(&method.parameters, slot, &method.returns) {
                    diagnostics.push(CatalogErrorKind::InvalidDecoratedParameter {
                        ty: method.returns.clone(),
                        expected: method.returns.clone(),
                        slot,
                    });
                    return None;
                }
                Some((
                    method.returns.id,
                    Arc::new(InstanceSource::DecoratorFactoryMethod(DecoratorFactoryMethod {
                        method: method.clone(),
                        decorated_parameter: slot,
                    })),
                ))
            }
            Provider::InstanceMember(_) => {
                diagnostics.push(CatalogErrorKind::InvalidDecoratedParameter {
                    ty: produced.clone(),
                    expected: produced.clone(),
                    slot,
                });
                None
            }
        }
    }

    /// One public constructor is used as-is; among several, exactly one
    /// non-default must remain. Non-public constructors are never consulted.
    fn select_constructor(&self, produced: &TypeInfo, diagnostics: &mut Diagnostics) -> Option<Constructor> {
        let mut constructors = self.host.constructors(produced.id);
        match constructors.len() {
            0 => {
                diagnostics.push(CatalogErrorKind::NoPublicConstructor { ty: produced.clone() });
                None
            }
            1 => Some(constructors.remove(0)),
            count => {
                let mut non_default: Vec<Constructor> = constructors.into_iter().filter(|ctor| !ctor.is_default()).collect();
                if non_default.len() == 1 {
                    Some(non_default.remove(0))
                } else {
                    diagnostics.push(CatalogErrorKind::MultiplePublicConstructors {
                        ty: produced.clone(),
                        count,
                    });
                    None
                }
            }
        }
    }
}

#[derive(Default)]
struct RuleOutcome {
    entries: Vec<(TypeId, SourceRef)>,
    decorator: Option<(TypeId, SourceRef)>,
}

fn decorated_slot_matches(parameters: &[crate::symbols::Parameter], slot: usize, expected: &TypeInfo) -> bool {
    parameters.get(slot).is_some_and(|parameter| parameter.ty.id == expected.id)
}

fn push_unique(list: &mut Vec<SourceRef>, source: SourceRef) {
    if !list.iter().any(|existing| SourceId::of(existing) == SourceId::of(&source)) {
        list.push(source);
    }
}

fn type_info_of(source: &SourceRef) -> TypeInfo {
    source.of_type().clone()
}

#[cfg(test)]
mod tests {
    use alloc::{sync::Arc, vec, vec::Vec};

    use super::Catalog;
    use crate::{
        diagnostics::Diagnostics,
        rules::{FactoryMethodSymbol, Module, Rule},
        scope::Scope,
        source::InstanceSource,
        symbols::{Constructor, SymbolTable},
        types::TypeId,
    };

    fn codes(diagnostics: &Diagnostics) -> Vec<&'static str> {
        diagnostics.iter().map(|diagnostic| diagnostic.code).collect()
    }

    #[test]
    fn test_direct_rule_wins_over_import_silently() {
        let mut symbols = SymbolTable::new();
        let a = symbols.declare("A");

        let imported = Arc::new(Module::new("imported").rule(Rule::for_type(symbols.info(a))));
        let root = Module::new("root").rule(Rule::for_type(symbols.info(a))).import(imported);

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        assert!(diagnostics.is_empty());
        assert!(catalog.get(a).is_some());
    }

    #[test]
    fn test_conflicting_imports_two_diagnostics_and_absent() {
        let mut symbols = SymbolTable::new();
        let a = symbols.declare("A");

        let left = Arc::new(Module::new("left").rule(Rule::for_type(symbols.info(a))));
        let right = Arc::new(Module::new("right").rule(Rule::for_type(symbols.info(a))));
        let root = Module::new("root").import(left).import(right);

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        assert_eq!(codes(&diagnostics), ["WP0108", "WP0108"]);
        assert!(catalog.get(a).is_none());
    }

    #[test]
    fn test_exclusion_resolves_conflict() {
        let mut symbols = SymbolTable::new();
        let a = symbols.declare("A");

        let left = Arc::new(Module::new("left").rule(Rule::for_type(symbols.info(a))));
        let right = Arc::new(Module::new("right").rule(Rule::for_type(symbols.info(a))));
        let root = Module::new("root").import(left).import_excluding(right, [a]);

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        assert!(diagnostics.is_empty());
        assert!(catalog.get(a).is_some());
    }

    #[test]
    fn test_diamond_import_is_not_a_conflict() {
        let mut symbols = SymbolTable::new();
        let a = symbols.declare("A");

        let shared = Arc::new(Module::new("shared").rule(Rule::for_type(symbols.info(a))));
        let left = Arc::new(Module::new("left").import(shared.clone()));
        let right = Arc::new(Module::new("right").import(shared));
        let root = Module::new("root").import(left).import(right);

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        assert!(diagnostics.is_empty());
        assert!(catalog.get(a).is_some());
    }

    #[test]
    fn test_duplicate_registration_same_module() {
        let mut symbols = SymbolTable::new();
        let a = symbols.declare("A");

        let root = Module::new("root")
            .rule(Rule::for_type(symbols.info(a)))
            .rule(Rule::for_type(symbols.info(a)));

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        assert_eq!(codes(&diagnostics), ["WP0107"]);
        assert!(catalog.get(a).is_none());
    }

    #[test]
    fn test_registered_as_validated_individually() {
        let mut symbols = SymbolTable::new();
        let repo = symbols.declare("PostgresRepo");
        let iface = symbols.declare("Repo");
        let unrelated = symbols.declare("Logger");
        symbols.add_base(repo, iface);

        let root = Module::new("root").rule(
            Rule::for_type(symbols.info(repo))
                .register_as(symbols.info(iface))
                .register_as(symbols.info(unrelated)),
        );

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        assert_eq!(codes(&diagnostics), ["WP0103"]);
        // The valid registered-as type still contributes.
        assert!(catalog.get(iface).is_some());
        assert!(catalog.get(unrelated).is_none());

        let forwarded = catalog.get(iface).unwrap();
        assert!(matches!(&**forwarded, InstanceSource::Forwarded(_)));
    }

    #[test]
    fn test_constructor_selection() {
        let mut symbols = SymbolTable::new();
        let none = symbols.declare("NoCtor");
        symbols.set_constructors(none, vec![]);

        let many = symbols.declare("ManyCtors");
        let dep = symbols.declare("Dep");
        symbols.set_constructors(
            many,
            vec![
                Constructor::new(vec![symbols.parameter(dep)]),
                Constructor::new(vec![symbols.parameter(dep), symbols.parameter(dep)]),
            ],
        );

        let disambiguated = symbols.declare("DefaultAndOne");
        symbols.add_constructor(disambiguated, vec![symbols.parameter(dep)]);

        let root = Module::new("root")
            .rule(Rule::for_type(symbols.info(none)))
            .rule(Rule::for_type(symbols.info(many)))
            .rule(Rule::for_type(symbols.info(disambiguated)));

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        assert_eq!(codes(&diagnostics), ["WP0104", "WP0105"]);
        assert!(catalog.get(none).is_none());
        assert!(catalog.get(many).is_none());

        let selected = catalog.get(disambiguated).unwrap();
        let InstanceSource::Registration(registration) = &**selected else {
            panic!("expected a registration");
        };
        assert_eq!(registration.constructor.parameters.len(), 1);
    }

    #[test]
    fn test_value_type_single_instance_rejected() {
        let mut symbols = SymbolTable::new();
        let config = symbols.declare("ConfigSnapshot");
        symbols.mark_value_type(config);

        let root = Module::new("root").rule(Rule::for_type(symbols.info(config)).scoped(Scope::SingleInstance));

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        assert_eq!(codes(&diagnostics), ["WP0106"]);
        assert!(catalog.get(config).is_none());
    }

    #[test]
    fn test_open_generic_and_unreachable_rejected() {
        let mut symbols = SymbolTable::new();
        let open = symbols.declare("Repo<T>");
        symbols.mark_open_generic(open);
        let hidden = symbols.declare("internal::Hidden");
        symbols.mark_unreachable(hidden);

        let root = Module::new("root")
            .rule(Rule::for_type(symbols.info(open)))
            .rule(Rule::for_type(symbols.info(hidden)));

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        assert_eq!(codes(&diagnostics), ["WP0101", "WP0102"]);
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_factory_capability_yields_target_entry() {
        let mut symbols = SymbolTable::new();
        let factory = symbols.declare("WidgetFactory");
        let widget = symbols.declare("Widget");
        symbols.set_factory(factory, widget, false);

        let root = Module::new("root").rule(Rule::for_type(symbols.info(factory)));

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        assert!(diagnostics.is_empty());
        assert!(catalog.get(factory).is_some());

        let through = catalog.get(widget).expect("factory target entry");
        assert!(matches!(&**through, InstanceSource::Factory(_)));
    }

    #[test]
    fn test_decorator_rules_do_not_create_entries() {
        let mut symbols = SymbolTable::new();
        let service = symbols.declare("Service");
        let decorator = symbols.declare("LoggingService");
        symbols.constructed_with(decorator, vec![symbols.parameter(service)]);
        // Decorator of `Service` produced by a method taking the undecorated value.
        let method = FactoryMethodSymbol::new("wrap", vec![symbols.parameter(service)], symbols.info(service));

        let root = Module::new("root")
            .rule(Rule::for_type(symbols.info(service)))
            .rule(Rule::from_factory_method(method).decorating(0));

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        assert!(diagnostics.is_empty());
        assert_eq!(catalog.decorators_for(service).len(), 1);
        // The entry for Service is the plain registration; decoration
        // happens at lookup time.
        assert!(matches!(&**catalog.get(service).unwrap(), InstanceSource::Registration(_)));
    }

    #[test]
    fn test_invalid_decorated_slot() {
        let mut symbols = SymbolTable::new();
        let service = symbols.declare("Service");
        let other = symbols.declare("Other");
        let method = FactoryMethodSymbol::new("wrap", vec![symbols.parameter(other)], symbols.info(service));

        let root = Module::new("root")
            .rule(Rule::for_type(symbols.info(service)))
            .rule(Rule::from_factory_method(method).decorating(0));

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        assert_eq!(codes(&diagnostics), ["WP0109"]);
        assert!(catalog.decorators_for(service).is_empty());
    }

    #[test]
    fn test_all_sources_collects_local_and_imported() {
        let mut symbols = SymbolTable::new();
        let iface = symbols.declare("Handler");
        let local_impl = symbols.declare("LocalHandler");
        let imported_impl = symbols.declare("ImportedHandler");
        symbols.add_base(local_impl, iface);
        symbols.add_base(imported_impl, iface);

        let imported = Arc::new(Module::new("imported").rule(Rule::for_type(symbols.info(imported_impl)).register_as(symbols.info(iface))));
        let root = Module::new("root")
            .rule(Rule::for_type(symbols.info(local_impl)).register_as(symbols.info(iface)))
            .import(imported);

        let (catalog, diagnostics) = Catalog::build(&root, &symbols);
        // The local registration shadows the imported one for single-best
        // lookup, but the collection view still sees both.
        assert_eq!(codes(&diagnostics), Vec::<&str>::new());
        assert!(catalog.get(iface).is_some(), "local registration wins");
        assert_eq!(catalog.all_for(iface).len(), 2);
    }
}
