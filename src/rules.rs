use alloc::{collections::BTreeSet, sync::Arc, vec::Vec};

use crate::{
    scope::Scope,
    symbols::Parameter,
    types::{TypeId, TypeInfo},
};

/// A user-declared factory method: parameters are resolved like
/// constructor parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryMethodSymbol {
    pub name: Arc<str>,
    pub parameters: Vec<Parameter>,
    pub returns: TypeInfo,
    pub is_async: bool,
}

impl FactoryMethodSymbol {
    #[must_use]
    pub fn new(name: &str, parameters: Vec<Parameter>, returns: TypeInfo) -> Self {
        Self {
            name: Arc::from(name),
            parameters,
            returns,
            is_async: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }
}

/// A pre-existing externally supplied value, exposed as a field or property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceMemberSymbol {
    pub name: Arc<str>,
    pub ty: TypeInfo,
}

impl InstanceMemberSymbol {
    #[must_use]
    pub fn new(name: &str, ty: TypeInfo) -> Self {
        Self { name: Arc::from(name), ty }
    }
}

/// How a rule produces its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// Construct via the produced type's selected public constructor.
    Constructor,
    FactoryMethod(FactoryMethodSymbol),
    InstanceMember(InstanceMemberSymbol),
}

/// One declared production rule, as materialized by the configuration or
/// attribute front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub produced: TypeInfo,
    /// Types the rule is registered as. Empty means the produced type itself.
    pub registered_as: Vec<TypeInfo>,
    pub scope: Scope,
    pub provider: Provider,
    /// `Some(slot)` marks a decorator rule: the constructor or factory-method
    /// parameter at `slot` receives the previously resolved, undecorated
    /// value.
    pub decorated_parameter: Option<usize>,
}

impl Rule {
    #[must_use]
    pub fn for_type(produced: TypeInfo) -> Self {
        Self {
            produced,
            registered_as: Vec::new(),
            scope: Scope::default(),
            provider: Provider::Constructor,
            decorated_parameter: None,
        }
    }

    #[must_use]
    pub fn from_factory_method(method: FactoryMethodSymbol) -> Self {
        Self {
            produced: method.returns.clone(),
            registered_as: Vec::new(),
            scope: Scope::default(),
            provider: Provider::FactoryMethod(method),
            decorated_parameter: None,
        }
    }

    #[must_use]
    pub fn from_instance_member(member: InstanceMemberSymbol) -> Self {
        Self {
            produced: member.ty.clone(),
            registered_as: Vec::new(),
            scope: Scope::default(),
            provider: Provider::InstanceMember(member),
            decorated_parameter: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn register_as(mut self, ty: TypeInfo) -> Self {
        self.registered_as.push(ty);
        self
    }

    #[inline]
    #[must_use]
    pub fn scoped(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Marks this rule as a decorator of its own produced type, substituting
    /// the undecorated value into the parameter at `slot`.
    #[inline]
    #[must_use]
    pub fn decorating(mut self, slot: usize) -> Self {
        self.decorated_parameter = Some(slot);
        self
    }

    /// The types this rule is registered as, defaulting to the produced type.
    pub(crate) fn targets(&self) -> Vec<TypeInfo> {
        if self.registered_as.is_empty() {
            alloc::vec![self.produced.clone()]
        } else {
            self.registered_as.clone()
        }
    }
}

/// A reference to an imported sub-catalog with its exclusion list.
#[derive(Debug, Clone)]
pub struct ModuleImport {
    pub module: Arc<Module>,
    pub exclusions: BTreeSet<TypeId>,
}

/// A named catalog of rules plus imported sub-catalogs.
///
/// Module identity (for diamond-import deduplication) is the `Arc` the
/// module is shared through, not its name.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: Arc<str>,
    pub rules: Vec<Rule>,
    pub imports: Vec<ModuleImport>,
}

impl Module {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            rules: Vec::new(),
            imports: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    #[inline]
    #[must_use]
    pub fn import(mut self, module: Arc<Module>) -> Self {
        self.imports.push(ModuleImport {
            module,
            exclusions: BTreeSet::new(),
        });
        self
    }

    #[inline]
    #[must_use]
    pub fn import_excluding(mut self, module: Arc<Module>, exclusions: impl IntoIterator<Item = TypeId>) -> Self {
        self.imports.push(ModuleImport {
            module,
            exclusions: exclusions.into_iter().collect(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{Module, Rule};
    use crate::{
        scope::Scope,
        types::{TypeId, TypeInfo},
    };

    #[test]
    fn test_targets_default_to_produced() {
        let produced = TypeInfo::new(TypeId(1), "A");
        let rule = Rule::for_type(produced.clone());
        assert_eq!(rule.targets(), [produced.clone()]);

        let iface = TypeInfo::new(TypeId(2), "IA");
        let rule = Rule::for_type(produced).register_as(iface.clone());
        assert_eq!(rule.targets(), [iface]);
    }

    #[test]
    fn test_builder_chain() {
        let produced = TypeInfo::new(TypeId(1), "A");
        let rule = Rule::for_type(produced).scoped(Scope::SingleInstance).decorating(0);
        assert_eq!(rule.scope, Scope::SingleInstance);
        assert_eq!(rule.decorated_parameter, Some(0));

        let module = Module::new("root").rule(rule);
        assert_eq!(module.rules.len(), 1);
        assert_eq!(&*module.name, "root");
    }
}
