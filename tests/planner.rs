use std::sync::Arc;

use wireplan::{
    lower, validate, Diagnostics, Module, Planner, Rule, Scope, Statement, SymbolTable, TypeId,
};

/// The `{A -> (B, C), B -> (C, D), C, D -> (C)}` catalog used across this
/// suite: C is shared three ways, D only feeds B.
fn diamond(symbols: &mut SymbolTable) -> [TypeId; 4] {
    let a = symbols.declare("A");
    let b = symbols.declare("B");
    let c = symbols.declare("C");
    let d = symbols.declare("D");
    symbols.constructed_with(a, vec![symbols.parameter(b), symbols.parameter(c)]);
    symbols.constructed_with(b, vec![symbols.parameter(c), symbols.parameter(d)]);
    symbols.constructed_with(d, vec![symbols.parameter(c)]);
    [a, b, c, d]
}

fn diamond_module(symbols: &SymbolTable, ids: [TypeId; 4], d_scope: Scope) -> Module {
    let [a, b, c, d] = ids;
    Module::new("root")
        .rule(Rule::for_type(symbols.info(a)))
        .rule(Rule::for_type(symbols.info(b)))
        .rule(Rule::for_type(symbols.info(c)))
        .rule(Rule::for_type(symbols.info(d)).scoped(d_scope))
}

fn construction_order(plan: &wireplan::ExecutionPlan) -> Vec<String> {
    plan.operations
        .iter()
        .filter_map(|operation| match &operation.statement {
            Statement::Construct { target, .. } => Some(target.name.to_string()),
            _ => None,
        })
        .collect()
}

#[test]
fn acyclic_graph_plans_to_a_single_sink_dag() {
    let mut symbols = SymbolTable::new();
    let ids = diamond(&mut symbols);
    let module = diamond_module(&symbols, ids, Scope::default());

    let (planner, diagnostics) = Planner::new(&module, Arc::new(symbols));
    assert!(diagnostics.is_empty());

    let outcome = planner.plan(ids[0], false);
    assert!(outcome.is_ok());
    assert!(outcome.diagnostics.is_empty());

    let plan = outcome.plan.as_ref().unwrap();
    assert_eq!(construction_order(plan), ["C", "D", "B", "A"]);

    // Dependency edges always point backwards in the linearized list, and
    // the only sink is the root operation.
    for (position, operation) in plan.operations.iter().enumerate() {
        for dependency in &operation.depends_on {
            let dependency_position = plan
                .operations
                .iter()
                .position(|other| other.id == *dependency)
                .expect("dependency edges stay within the plan");
            assert!(dependency_position < position);
        }
    }
    let sinks: Vec<_> = plan
        .operations
        .iter()
        .filter(|operation| !plan.operations.iter().any(|other| other.depends_on.contains(&operation.id)))
        .collect();
    assert_eq!(sinks.len(), 1);
    assert_eq!(sinks[0].id, plan.root_op);
}

#[test]
fn rooting_lower_ignores_unused_types() {
    let mut symbols = SymbolTable::new();
    let ids = diamond(&mut symbols);
    let module = diamond_module(&symbols, ids, Scope::default());

    let (planner, _) = Planner::new(&module, Arc::new(symbols));
    let outcome = planner.plan(ids[1], false);
    assert_eq!(construction_order(outcome.plan.as_ref().unwrap()), ["C", "D", "B"]);
}

#[test]
fn single_instance_is_cached_and_referenced() {
    let mut symbols = SymbolTable::new();
    let ids = diamond(&mut symbols);
    let module = diamond_module(&symbols, ids, Scope::SingleInstance);

    let (planner, _) = Planner::new(&module, Arc::new(symbols));
    let outcome = planner.plan(ids[0], false);
    assert!(outcome.is_ok());

    let plan = outcome.plan.as_ref().unwrap();
    assert_eq!(plan.singletons.len(), 1);
    assert_eq!(&*plan.singletons[0].target.name, "D");
    // D is referenced through its lazy definition, never reconstructed in
    // the resolution body.
    assert_eq!(construction_order(plan), ["C", "B", "A"]);
    assert!(plan
        .operations
        .iter()
        .any(|operation| matches!(operation.statement, Statement::AcquireSingleton { singleton: 0, .. })));
}

#[test]
fn self_dependency_fails_with_a_cycle_naming_the_type() {
    let mut symbols = SymbolTable::new();
    let a = symbols.declare("A");
    let b = symbols.declare("B");
    let c = symbols.declare("C");
    symbols.constructed_with(a, vec![symbols.parameter(b), symbols.parameter(c), symbols.parameter(a)]);

    let module = Module::new("root")
        .rule(Rule::for_type(symbols.info(a)))
        .rule(Rule::for_type(symbols.info(b)))
        .rule(Rule::for_type(symbols.info(c)));
    let (planner, _) = Planner::new(&module, Arc::new(symbols));

    let outcome = planner.plan(a, false);
    assert!(!outcome.is_ok());
    let errors: Vec<_> = outcome.diagnostics.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "WP0203");
    assert!(errors[0].message.contains("`A`"));
}

#[test]
fn missing_transitive_source_is_reported_once() {
    let mut symbols = SymbolTable::new();
    let a = symbols.declare("A");
    let b = symbols.declare("B");
    let d = symbols.declare("D");
    symbols.constructed_with(a, vec![symbols.parameter(b)]);
    symbols.constructed_with(b, vec![symbols.parameter(d)]);

    let module = Module::new("root")
        .rule(Rule::for_type(symbols.info(a)))
        .rule(Rule::for_type(symbols.info(b)));
    let (planner, _) = Planner::new(&module, Arc::new(symbols));

    let outcome = planner.plan(a, false);
    assert!(!outcome.is_ok());
    let errors: Vec<_> = outcome.diagnostics.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "WP0201");
    assert!(errors[0].message.contains("`D`"));
}

#[test]
fn planning_is_deterministic_end_to_end() {
    let build = || {
        let mut symbols = SymbolTable::new();
        let ids = diamond(&mut symbols);
        let module = diamond_module(&symbols, ids, Scope::SingleInstance);
        let (planner, _) = Planner::new(&module, Arc::new(symbols));
        planner.plan(ids[0], false).as_ref().clone()
    };

    let first = build();
    let second = build();
    assert_eq!(first, second);
}

#[test]
fn validate_and_lower_compose_without_the_facade() {
    let mut symbols = SymbolTable::new();
    let ids = diamond(&mut symbols);
    let module = diamond_module(&symbols, ids, Scope::default());

    let (catalog, build_diagnostics) = wireplan::Catalog::build(&module, &symbols);
    assert!(build_diagnostics.is_empty());
    let scope = wireplan::InstanceSourcesScope::new(Arc::new(catalog), Arc::new(symbols));

    let mut diagnostics = Diagnostics::new();
    assert!(validate(ids[0], false, &scope, &mut diagnostics));
    assert!(diagnostics.is_empty());

    let plan = lower(&scope.lookup(ids[0]).unwrap(), &scope, false);
    assert_eq!(construction_order(&plan), ["C", "D", "B", "A"]);
}

#[test]
fn direct_registration_beats_import_and_conflicts_stay_absent() {
    let mut symbols = SymbolTable::new();
    let shadowed = symbols.declare("Shadowed");
    let conflicted = symbols.declare("Conflicted");

    let left = Arc::new(
        Module::new("left")
            .rule(Rule::for_type(symbols.info(shadowed)))
            .rule(Rule::for_type(symbols.info(conflicted))),
    );
    let right = Arc::new(Module::new("right").rule(Rule::for_type(symbols.info(conflicted))));
    let module = Module::new("root")
        .rule(Rule::for_type(symbols.info(shadowed)))
        .import(left)
        .import(right);

    let (catalog, diagnostics) = wireplan::Catalog::build(&module, &symbols);
    let codes: Vec<_> = diagnostics.iter().map(|diagnostic| diagnostic.code).collect();
    assert_eq!(codes, ["WP0108", "WP0108"]);
    assert!(catalog.get(shadowed).is_some());
    assert!(catalog.get(conflicted).is_none());
}
