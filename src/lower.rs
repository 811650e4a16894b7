use alloc::{collections::BTreeMap, vec, vec::Vec};
use tracing::{debug, info_span};

use crate::{
    analysis::requires_async,
    plan::{CallSite, ExecutionPlan, OpId, Operation, SingletonDefinition, Statement, Variable},
    scope::Scope,
    source::{InstanceSource, SourceId, SourceRef},
    sources_scope::InstanceSourcesScope,
    symbols::{DisposalKind, InitializerKind},
    types::TypeInfo,
    visitor::{decorator_shape, walk, SourceVisitor},
};

/// Lowers a *validated* graph rooted at `root` into an execution plan.
///
/// `asynchronous` is the flavor of the top-level resolution boundary; the
/// validator has already proven every await reachable from `root` is legal
/// under it. Lowering the same validated graph twice yields structurally
/// identical plans.
#[must_use]
pub fn lower(root: &SourceRef, scope: &InstanceSourcesScope, asynchronous: bool) -> ExecutionPlan {
    let span = info_span!("lower", root = %root.of_type(), asynchronous);
    let _guard = span.enter();

    let mut lowerer = Lowerer {
        next_var: 0,
        next_op: 0,
        frames: vec![Frame::new(asynchronous)],
        results: Vec::new(),
        singleton_slots: Vec::new(),
        singleton_index: Vec::new(),
        open_delegates: Vec::new(),
    };
    walk(&mut lowerer, root, scope, &());

    let result = lowerer.results.pop().expect("the walk leaves exactly the root result");
    debug_assert!(lowerer.results.is_empty());

    let mut plan = lowerer.finish_frame(result);
    plan.singletons = lowerer
        .singleton_slots
        .into_iter()
        .map(|slot| slot.expect("every reserved definition is completed"))
        .collect();
    plan
}

#[derive(Debug, Clone, Copy)]
struct OpResult {
    op: OpId,
    var: Variable,
}

/// One resolution boundary being lowered: the top-level resolution, a
/// delegate body, an owned creation routine, or a singleton definition.
struct Frame {
    ops: Vec<Operation>,
    /// Per-resolution memo of this boundary; never visible to sub-frames.
    memo: Vec<(SourceId, OpResult)>,
    asynchronous: bool,
}

impl Frame {
    fn new(asynchronous: bool) -> Self {
        Self {
            ops: Vec::new(),
            memo: Vec::new(),
            asynchronous,
        }
    }
}

struct Lowerer {
    next_var: u32,
    next_op: u32,
    frames: Vec<Frame>,
    /// Child results in walk order; parents pop their children on exit.
    results: Vec<OpResult>,
    singleton_slots: Vec<Option<SingletonDefinition>>,
    singleton_index: Vec<(SourceId, usize)>,
    /// Delegates whose bodies are being lowered right now; revisiting one
    /// recurses into the open routine instead of expanding it again.
    open_delegates: Vec<SourceId>,
}

impl Lowerer {
    fn fresh_var(&mut self) -> Variable {
        let var = Variable(self.next_var);
        self.next_var += 1;
        var
    }

    fn frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("a frame is always open")
    }

    fn push_op(&mut self, statement: Statement, depends_on: Vec<OpId>, disposal: Option<DisposalKind>, produces: Option<Variable>) -> OpId {
        let id = OpId(self.next_op);
        self.next_op += 1;
        self.frame().ops.push(Operation {
            id,
            statement,
            depends_on,
            disposal,
            produces,
        });
        id
    }

    fn memo_get(&self, id: SourceId) -> Option<OpResult> {
        let frame = self.frames.last().expect("a frame is always open");
        frame.memo.iter().find(|(memoized, _)| *memoized == id).map(|(_, result)| *result)
    }

    fn memoize(&mut self, id: SourceId, result: OpResult) {
        self.frame().memo.push((id, result));
    }

    fn singleton_of(&self, id: SourceId) -> Option<usize> {
        self.singleton_index
            .iter()
            .find(|(reserved, _)| *reserved == id)
            .map(|(_, index)| *index)
    }

    fn pop_results(&mut self, count: usize) -> Vec<OpResult> {
        let at = self.results.len().checked_sub(count).expect("children pushed their results");
        self.results.split_off(at)
    }

    /// Construct plus its await/initializer companions; returns the
    /// operation consumers must depend on and the value variable.
    fn emit_construct(
        &mut self,
        target: TypeInfo,
        call: CallSite,
        args: Vec<OpResult>,
        is_async: bool,
        initializer: Option<InitializerKind>,
        disposal: Option<DisposalKind>,
    ) -> OpResult {
        let depends_on = args.iter().map(|result| result.op).collect();
        let arguments = args.iter().map(|result| result.var).collect();

        let var = self.fresh_var();
        let construct_disposal = if is_async { None } else { disposal };
        let op = self.push_op(
            Statement::Construct {
                target,
                call,
                arguments,
                is_async,
            },
            depends_on,
            construct_disposal,
            Some(var),
        );
        let mut result = OpResult { op, var };

        if is_async {
            let value = self.fresh_var();
            let await_op = self.push_op(Statement::Await { task: var }, vec![op], disposal, Some(value));
            result = OpResult { op: await_op, var: value };
        }

        if let Some(kind) = initializer {
            let init_async = matches!(kind, InitializerKind::Async);
            let task = if init_async { Some(self.fresh_var()) } else { None };
            let init_op = self.push_op(
                Statement::Initialize {
                    value: result.var,
                    is_async: init_async,
                },
                vec![result.op],
                None,
                task,
            );
            result.op = init_op;
            if let Some(task) = task {
                result.op = self.push_op(Statement::Await { task }, vec![init_op], None, None);
            }
        }

        result
    }

    fn emit_acquire(&mut self, singleton: usize, is_async: bool) -> OpResult {
        let var = self.fresh_var();
        let op = self.push_op(Statement::AcquireSingleton { singleton, is_async }, vec![], None, Some(var));
        if is_async {
            let value = self.fresh_var();
            let await_op = self.push_op(Statement::Await { task: var }, vec![op], None, Some(value));
            OpResult { op: await_op, var: value }
        } else {
            OpResult { op, var }
        }
    }

    /// Publishes a freshly produced value: singleton sources close their
    /// definition frame and are referenced through it, memoized sources are
    /// recorded in the current boundary.
    fn finish_source(&mut self, source: &SourceRef, scope: &InstanceSourcesScope, result: OpResult) {
        let id = SourceId::of(source);
        match source.scope() {
            Scope::SingleInstance => {
                let body = self.finish_frame(result);
                let is_async = body.asynchronous;
                let index = self.singleton_of(id).expect("reserved when the definition was entered");
                self.singleton_slots[index] = Some(SingletonDefinition {
                    index,
                    target: source.of_type().clone(),
                    body,
                    disposal: scope.host().disposal(source.of_type().id),
                    is_async,
                });
                let reference = self.emit_acquire(index, is_async);
                self.memoize(id, reference);
                self.results.push(reference);
            }
            Scope::InstancePerResolution => {
                self.memoize(id, result);
                self.results.push(result);
            }
            Scope::InstancePerDependency => self.results.push(result),
        }
    }

    fn finish_frame(&mut self, root: OpResult) -> ExecutionPlan {
        let frame = self.frames.pop().expect("a frame is always open");
        ExecutionPlan {
            operations: schedule(frame.ops),
            root_op: root.op,
            root: root.var,
            asynchronous: frame.asynchronous,
            singletons: Vec::new(),
        }
    }
}

impl SourceVisitor for Lowerer {
    type State = ();

    fn should_visit(&mut self, source: &SourceRef, scope: &InstanceSourcesScope, _state: &()) -> bool {
        // Pure views pass through; the underlying source owns the memo.
        if matches!(&**source, InstanceSource::Forwarded(_)) {
            return true;
        }

        let id = SourceId::of(source);
        match source.scope() {
            Scope::InstancePerDependency => true,
            Scope::InstancePerResolution => match self.memo_get(id) {
                Some(result) => {
                    debug!(source = %source.of_type(), "reusing memoized value");
                    self.results.push(result);
                    false
                }
                None => {
                    if let InstanceSource::Delegate(delegate) = &**source {
                        if self.open_delegates.contains(&id) {
                            let var = self.fresh_var();
                            let op = self.push_op(
                                Statement::RecurseDelegate {
                                    delegate_type: delegate.delegate_type.clone(),
                                },
                                vec![],
                                None,
                                Some(var),
                            );
                            let result = OpResult { op, var };
                            self.memoize(id, result);
                            self.results.push(result);
                            return false;
                        }
                    }
                    true
                }
            },
            Scope::SingleInstance => {
                if let Some(result) = self.memo_get(id) {
                    self.results.push(result);
                    return false;
                }
                if let Some(index) = self.singleton_of(id) {
                    // Already (or still being) defined; reference it.
                    let reference = self.emit_acquire(index, requires_async(source, scope));
                    self.memoize(id, reference);
                    self.results.push(reference);
                    return false;
                }
                true
            }
        }
    }

    fn enter(&mut self, source: &SourceRef, scope: &InstanceSourcesScope, _state: &()) {
        match &**source {
            InstanceSource::Delegate(delegate) => {
                self.open_delegates.push(SourceId::of(source));
                self.frames.push(Frame::new(delegate.is_async));
            }
            InstanceSource::Owned(owned) => self.frames.push(Frame::new(owned.is_async)),
            _ => {
                if source.scope() == Scope::SingleInstance {
                    let index = self.singleton_slots.len();
                    self.singleton_slots.push(None);
                    self.singleton_index.push((SourceId::of(source), index));
                    self.frames.push(Frame::new(requires_async(source, scope)));
                }
            }
        }
    }

    fn exit(&mut self, source: &SourceRef, scope: &InstanceSourcesScope, _state: &()) {
        match &**source {
            InstanceSource::Registration(registration) => {
                let args = self.pop_results(registration.constructor.parameters.len());
                let disposal = resolution_disposal(source, scope);
                let result = self.emit_construct(
                    registration.produced.clone(),
                    CallSite::Constructor,
                    args,
                    false,
                    registration.initializer,
                    disposal,
                );
                self.finish_source(source, scope, result);
            }
            InstanceSource::FactoryMethod(factory_method) => {
                let args = self.pop_results(factory_method.method.parameters.len());
                let disposal = resolution_disposal(source, scope);
                let result = self.emit_construct(
                    factory_method.method.returns.clone(),
                    CallSite::Method(factory_method.method.name.clone()),
                    args,
                    factory_method.method.is_async,
                    None,
                    disposal,
                );
                self.finish_source(source, scope, result);
            }
            InstanceSource::Factory(factory) => {
                let args = self.pop_results(1);
                let disposal = resolution_disposal(source, scope);
                let result = self.emit_construct(factory.target.clone(), CallSite::FactoryCreate, args, factory.is_async, None, disposal);
                self.finish_source(source, scope, result);
            }
            InstanceSource::WrappedDecorator(wrapped) => {
                let (parameters, _) = decorator_shape(&wrapped.decorator);
                let args = self.pop_results(parameters.len());
                let (call, initializer) = match &*wrapped.decorator {
                    InstanceSource::DecoratorRegistration(decorator) => (CallSite::Constructor, decorator.initializer),
                    InstanceSource::DecoratorFactoryMethod(decorator) => (CallSite::Method(decorator.method.name.clone()), None),
                    _ => (CallSite::Constructor, None),
                };
                let disposal = resolution_disposal(source, scope);
                let result = self.emit_construct(
                    source.of_type().clone(),
                    call,
                    args,
                    wrapped.decorator.requires_await(),
                    initializer,
                    disposal,
                );
                self.finish_source(source, scope, result);
            }
            InstanceSource::Delegate(delegate) => {
                let ret = self.pop_results(1)[0];
                let body = self.finish_frame(ret);
                self.open_delegates.pop();
                let var = self.fresh_var();
                let op = self.push_op(
                    Statement::CreateDelegate {
                        delegate_type: delegate.delegate_type.clone(),
                        parameters: delegate.parameters.clone(),
                        is_async: delegate.is_async,
                        body,
                    },
                    vec![],
                    None,
                    Some(var),
                );
                let result = OpResult { op, var };
                self.memoize(SourceId::of(source), result);
                self.results.push(result);
            }
            InstanceSource::Owned(owned) => {
                let inner = self.pop_results(1)[0];
                let body = self.finish_frame(inner);
                let var = self.fresh_var();
                // The handle is the caller's to release; the routine body
                // still releases its intermediates on failure.
                let op = self.push_op(
                    Statement::CreateOwned {
                        owned_type: owned.owned_type.clone(),
                        body,
                    },
                    vec![],
                    None,
                    Some(var),
                );
                self.results.push(OpResult { op, var });
            }
            InstanceSource::Array(array) => {
                let items = self.pop_results(array.items.len());
                let depends_on = items.iter().map(|item| item.op).collect();
                let item_vars = items.iter().map(|item| item.var).collect();
                let var = self.fresh_var();
                let op = self.push_op(
                    Statement::CollectArray {
                        array_type: array.array_type.clone(),
                        element: array.element.clone(),
                        items: item_vars,
                    },
                    depends_on,
                    None,
                    Some(var),
                );
                self.results.push(OpResult { op, var });
            }
            InstanceSource::DelegateParameter(parameter) => {
                let var = self.fresh_var();
                let op = self.push_op(
                    Statement::ReferenceParameter {
                        name: parameter.parameter.name.clone(),
                        index: parameter.index,
                        ty: parameter.parameter.ty.clone(),
                    },
                    vec![],
                    None,
                    Some(var),
                );
                let result = OpResult { op, var };
                self.memoize(SourceId::of(source), result);
                self.results.push(result);
            }
            InstanceSource::InstanceMember(member) => {
                let var = self.fresh_var();
                let op = self.push_op(
                    Statement::ReferenceMember {
                        member: member.member.name.clone(),
                        ty: member.member.ty.clone(),
                    },
                    vec![],
                    None,
                    Some(var),
                );
                let result = OpResult { op, var };
                self.memoize(SourceId::of(source), result);
                self.results.push(result);
            }
            // The child result on the stack stands for the view itself.
            InstanceSource::Forwarded(_) => {}
            // Only reachable through WrappedDecorator, which emits for them.
            InstanceSource::DecoratorRegistration(_) | InstanceSource::DecoratorFactoryMethod(_) => {}
        }
    }

    fn on_lookup_error(
        &mut self,
        _owner: &SourceRef,
        parameter: Option<&crate::symbols::Parameter>,
        error: crate::sources_scope::LookupError,
        _state: &(),
    ) {
        // The graph is validated: the only reachable failure is an optional
        // parameter with nothing registered, which falls back to its default.
        debug_assert!(parameter.map_or(false, |parameter| parameter.is_optional), "unvalidated graph: {error:?}");
        let ty = parameter.map_or_else(
            || match error {
                crate::sources_scope::LookupError::NoSource { ty } | crate::sources_scope::LookupError::Ambiguous { ty, .. } => ty,
            },
            |parameter| parameter.ty.clone(),
        );
        let var = self.fresh_var();
        let op = self.push_op(Statement::UseDefault { ty }, vec![], None, Some(var));
        self.results.push(OpResult { op, var });
    }
}

fn resolution_disposal(source: &SourceRef, scope: &InstanceSourcesScope) -> Option<DisposalKind> {
    // Singleton values are released at container teardown, not with the
    // resolution; their definition records the obligation instead.
    if source.scope() == Scope::SingleInstance {
        None
    } else {
        scope.host().disposal(source.of_type().id)
    }
}

/// Deterministic linearization: repeatedly emit an operation whose
/// dependencies are already emitted. Non-await operations are preferred in
/// creation order, so asynchronous work is started as early as possible;
/// awaits are deferred until nothing else is ready, and among ready awaits
/// the one heading the longest outstanding chain of downstream awaits is
/// emitted first (ties by creation order), favoring parallel progress over
/// minimal waiting.
fn schedule(ops: Vec<Operation>) -> Vec<Operation> {
    let count = ops.len();
    let position: BTreeMap<OpId, usize> = ops.iter().enumerate().map(|(index, op)| (op.id, index)).collect();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (index, op) in ops.iter().enumerate() {
        for dependency in &op.depends_on {
            dependents[position[dependency]].push(index);
        }
    }

    // Longest downstream chain ending in an await, computed in reverse
    // creation order (dependencies always precede dependents).
    let mut chain = vec![0usize; count];
    for index in (0..count).rev() {
        let mut deepest = 0;
        for &dependent in &dependents[index] {
            deepest = deepest.max(chain[dependent]);
        }
        chain[index] = deepest + usize::from(ops[index].statement.is_await());
    }

    let mut emitted = vec![false; count];
    let mut order = Vec::with_capacity(count);
    while order.len() < count {
        let mut eager = None;
        let mut deferred: Option<usize> = None;
        for index in 0..count {
            if emitted[index] || !ops[index].depends_on.iter().all(|dependency| emitted[position[dependency]]) {
                continue;
            }
            if !ops[index].statement.is_await() {
                eager = Some(index);
                break;
            }
            match deferred {
                Some(best) if chain[index] <= chain[best] => {}
                _ => deferred = Some(index),
            }
        }
        let pick = eager.or(deferred).expect("dependency edges form a DAG");
        emitted[pick] = true;
        order.push(pick);
    }

    order.into_iter().map(|index| ops[index].clone()).collect()
}
