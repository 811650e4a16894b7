use alloc::{sync::Arc, vec::Vec};
use core::fmt::{self, Display, Formatter};

use crate::{
    symbols::{DisposalKind, Parameter},
    types::TypeInfo,
};

/// A numbered local of the lowered plan; renders as `_0`, `_1`, ...
///
/// Numbering is global across the plan and its sub-plans, in creation
/// order, so two lowerings of the same graph name everything identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable(pub u32);

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.0)
    }
}

/// Identity of an operation; unique across the whole plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OpId(pub u32);

/// What a construct operation invokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallSite {
    Constructor,
    Method(Arc<str>),
    /// Invoke the creation capability of an already-resolved factory object;
    /// the factory is the sole argument.
    FactoryCreate,
}

/// One step of the execution plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Invoke a constructor, method or factory. An asynchronous construct
    /// produces a pending task that a later [`Statement::Await`] completes.
    Construct {
        target: TypeInfo,
        call: CallSite,
        arguments: Vec<Variable>,
        is_async: bool,
    },
    /// Complete a pending task.
    Await { task: Variable },
    /// Run a post-construction initializer on `value`. An asynchronous
    /// initializer produces a pending task.
    Initialize { value: Variable, is_async: bool },
    /// Create the delegate closure from its independently lowered body.
    CreateDelegate {
        delegate_type: TypeInfo,
        parameters: Vec<Parameter>,
        is_async: bool,
        body: ExecutionPlan,
    },
    /// Re-create a delegate whose body is currently being defined in an
    /// enclosing boundary. The executor re-enters that routine instead of
    /// expanding the body again; this is how a cycle broken by a delegate
    /// boundary stays finite in the plan.
    RecurseDelegate { delegate_type: TypeInfo },
    /// Create a caller-owned handle through a reusable creation routine
    /// wrapping the nested body.
    CreateOwned { owned_type: TypeInfo, body: ExecutionPlan },
    /// Reference the container-wide lazily initialized definition at
    /// `singleton` in the outermost plan's definition list.
    AcquireSingleton { singleton: usize, is_async: bool },
    /// Reference a pre-existing externally supplied member.
    ReferenceMember { member: Arc<str>, ty: TypeInfo },
    /// Reference a parameter of the enclosing delegate body.
    ReferenceParameter { name: Arc<str>, index: usize, ty: TypeInfo },
    /// Collect previously produced items into the collection value.
    CollectArray {
        array_type: TypeInfo,
        element: TypeInfo,
        items: Vec<Variable>,
    },
    /// An optional parameter's declared default value.
    UseDefault { ty: TypeInfo },
}

impl Statement {
    /// Awaits are scheduled lazily; everything else eagerly.
    #[inline]
    #[must_use]
    pub fn is_await(&self) -> bool {
        matches!(self, Statement::Await { .. })
    }
}

/// One operation of the linearized plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub id: OpId,
    pub statement: Statement,
    /// Operations that must have run before this one.
    pub depends_on: Vec<OpId>,
    /// How to release the produced value if a later step of the same
    /// resolution fails or the value is discarded. `None` when the value is
    /// not independently disposable or its release belongs elsewhere
    /// (caller-owned handles, container-teardown singletons).
    pub disposal: Option<DisposalKind>,
    pub produces: Option<Variable>,
}

/// Container-wide lazily initialized definition of a single-instance value.
///
/// Initialization is idempotent under races: concurrent first-time creators
/// all run the body, the first to finish wins the shared slot, and every
/// caller observes that winner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingletonDefinition {
    pub index: usize,
    pub target: TypeInfo,
    pub body: ExecutionPlan,
    /// Deferred to container teardown, never released at resolution end.
    pub disposal: Option<DisposalKind>,
    pub is_async: bool,
}

/// The lowered, dependency-ordered operation list of one resolution
/// boundary. Consumed read-only by the code-emission back end.
///
/// The linear order doubles as the failure contract: when a later operation
/// fails, everything already produced in this boundary is released in
/// reverse order (per each operation's `disposal`) before the failure
/// propagates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Operations in execution order; dependency edges always point
    /// backwards in this list.
    pub operations: Vec<Operation>,
    /// The operation producing the root value.
    pub root_op: OpId,
    /// The variable holding the root value.
    pub root: Variable,
    /// Whether this boundary may await.
    pub asynchronous: bool,
    /// Hoisted singleton definitions; populated on the outermost plan only.
    pub singletons: Vec<SingletonDefinition>,
}

impl ExecutionPlan {
    #[must_use]
    pub fn operation(&self, id: OpId) -> Option<&Operation> {
        self.operations.iter().find(|operation| operation.id == id)
    }

    /// Whether this plan, a nested body, or a hoisted definition records any
    /// release obligation.
    #[must_use]
    pub fn requires_disposal(&self) -> bool {
        self.operations.iter().any(|operation| {
            operation.disposal.is_some()
                || match &operation.statement {
                    Statement::CreateDelegate { body, .. } | Statement::CreateOwned { body, .. } => body.requires_disposal(),
                    _ => false,
                }
        }) || self.singletons.iter().any(|definition| definition.disposal.is_some() || definition.body.requires_disposal())
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::{CallSite, ExecutionPlan, OpId, Operation, Statement, Variable};
    use crate::{
        symbols::DisposalKind,
        types::{TypeId, TypeInfo},
    };

    #[test]
    fn test_variable_rendering() {
        assert_eq!(alloc::format!("{}", Variable(0)), "_0");
        assert_eq!(alloc::format!("{}", Variable(17)), "_17");
    }

    #[test]
    fn test_requires_disposal_sees_nested_bodies() {
        let ty = TypeInfo::new(TypeId(1), "A");
        let construct = |disposal: Option<DisposalKind>| Operation {
            id: OpId(0),
            statement: Statement::Construct {
                target: ty.clone(),
                call: CallSite::Constructor,
                arguments: vec![],
                is_async: false,
            },
            depends_on: vec![],
            disposal,
            produces: Some(Variable(0)),
        };

        let clean = ExecutionPlan {
            operations: vec![construct(None)],
            root_op: OpId(0),
            root: Variable(0),
            asynchronous: false,
            singletons: vec![],
        };
        assert!(!clean.requires_disposal());

        let body = ExecutionPlan {
            operations: vec![construct(Some(DisposalKind::Sync))],
            root_op: OpId(0),
            root: Variable(0),
            asynchronous: false,
            singletons: vec![],
        };
        let wrapping = ExecutionPlan {
            operations: vec![Operation {
                id: OpId(1),
                statement: Statement::CreateOwned {
                    owned_type: ty,
                    body,
                },
                depends_on: vec![],
                disposal: None,
                produces: Some(Variable(1)),
            }],
            root_op: OpId(1),
            root: Variable(1),
            asynchronous: false,
            singletons: vec![],
        };
        assert!(wrapping.requires_disposal());
    }
}
