#![no_std]

extern crate alloc;

pub(crate) mod analysis;
pub(crate) mod catalog;
pub(crate) mod diagnostics;
pub(crate) mod errors;
pub(crate) mod lower;
pub(crate) mod plan;
pub(crate) mod planner;
pub(crate) mod rules;
pub(crate) mod scope;
pub(crate) mod source;
pub(crate) mod sources_scope;
pub(crate) mod symbols;
pub(crate) mod types;
pub(crate) mod validator;
pub(crate) mod visitor;

pub use analysis::{requires_async, requires_disposal};
pub use catalog::Catalog;
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use errors::{CatalogErrorKind, ResolveErrorKind, ResolveNoteKind, ResolveWarningKind};
pub use lower::lower;
pub use plan::{CallSite, ExecutionPlan, OpId, Operation, SingletonDefinition, Statement, Variable};
pub use planner::{PlanOutcome, Planner};
pub use rules::{FactoryMethodSymbol, InstanceMemberSymbol, Module, ModuleImport, Provider, Rule};
pub use scope::Scope;
pub use source::{
    ArraySource, DecoratorFactoryMethod, DecoratorRegistration, DelegateParameter, DelegateSource, FactoryMethod, FactorySource,
    Forwarded, InstanceMember, InstanceSource, OwnedSource, Registration, SourceId, SourceRef, WrappedDecorator,
};
pub use sources_scope::{InstanceSourcesScope, LookupError};
pub use symbols::{
    Constructor, DelegateSignature, DisposalKind, FactoryShape, InitializerKind, OwnedShape, Parameter, SymbolTable, TypeQueries,
};
pub use types::{TypeId, TypeInfo};
pub use validator::{validate, MAX_RESOLUTION_DEPTH};
