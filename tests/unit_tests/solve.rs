use nalgebra::{dmatrix, DVector};

use parfem::constraint::{MpConstraint, SpConstraint};
use parfem::domain::{Domain, NodalLoad};
use parfem::handler::{
    ConstraintHandler, LagrangeHandler, PenaltyHandler, PlainHandler, TransformationHandler,
};

use super::models::{spring_chain, static_analysis};

/// Chain of three springs (k = 2), first node fixed to `prescribed`, unit
/// load at the tip.
fn fixed_chain(prescribed: f64) -> Domain {
    let mut domain = spring_chain(4, 2.0);
    domain
        .add_sp_constraint(SpConstraint::new(1, 1, 0, prescribed))
        .unwrap();
    domain
        .add_nodal_load(NodalLoad::constant(1, 4, DVector::from_column_slice(&[1.0])))
        .unwrap();
    domain
}

fn solve_steps(domain: &mut Domain, handler: Box<dyn ConstraintHandler>, steps: usize) {
    let mut analysis = static_analysis(handler);
    domain.apply_load(1.0);
    for _ in 0..steps {
        analysis.analyze_step(domain, &mut [], None).unwrap();
    }
}

#[test]
fn fixed_chain_stretches_in_series() {
    let mut domain = fixed_chain(0.0);
    solve_steps(&mut domain, Box::new(PlainHandler::new()), 1);

    // Unit load through three springs of stiffness 2: each stretches by 0.5.
    for (tag, expected) in [(1, 0.0), (2, 0.5), (3, 1.0), (4, 1.5)] {
        let u = domain.node(tag).unwrap().trial_disp()[0];
        assert!((u - expected).abs() < 1e-12, "node {}: {} != {}", tag, u, expected);
    }
}

#[test]
fn all_handlers_agree_on_the_tip_displacement() {
    let cases: Vec<(Box<dyn ConstraintHandler>, f64)> = vec![
        (Box::new(PlainHandler::new()), 1e-12),
        (Box::new(TransformationHandler::new()), 1e-12),
        (Box::new(LagrangeHandler::new(1.0)), 1e-10),
        (Box::new(PenaltyHandler::new(1e8)), 1e-4),
    ];
    for (handler, tol) in cases {
        let name = handler.method();
        let mut domain = fixed_chain(0.0);
        solve_steps(&mut domain, handler, 2);
        let tip = domain.node(4).unwrap().trial_disp()[0];
        assert!((tip - 1.5).abs() < tol, "{} handler: tip = {}", name, tip);
    }
}

#[test]
fn nonzero_prescribed_values_shift_the_whole_chain() {
    let cases: Vec<(Box<dyn ConstraintHandler>, f64)> = vec![
        (Box::new(PlainHandler::new()), 1e-12),
        (Box::new(TransformationHandler::new()), 1e-12),
        (Box::new(LagrangeHandler::new(1.0)), 1e-10),
        (Box::new(PenaltyHandler::new(1e8)), 1e-4),
    ];
    for (handler, tol) in cases {
        let name = handler.method();
        let mut domain = fixed_chain(0.25);
        // Direct elimination imposes the prescribed value after the first
        // solve; a second step restores equilibrium around it.
        solve_steps(&mut domain, handler, 2);
        let base = domain.node(1).unwrap().trial_disp()[0];
        let tip = domain.node(4).unwrap().trial_disp()[0];
        assert!((base - 0.25).abs() < tol, "{} handler: base = {}", name, base);
        assert!((tip - 1.75).abs() < tol, "{} handler: tip = {}", name, tip);
    }
}

/// Two springs with the middle node tied to half the tip displacement.
fn mp_chain() -> Domain {
    let mut domain = spring_chain(3, 2.0);
    domain
        .add_sp_constraint(SpConstraint::new(1, 1, 0, 0.0))
        .unwrap();
    domain
        .add_mp_constraint(
            MpConstraint::single_retained(1, 2, vec![0], 3, vec![0], dmatrix![0.5]).unwrap(),
        )
        .unwrap();
    domain
        .add_nodal_load(NodalLoad::constant(1, 3, DVector::from_column_slice(&[1.0])))
        .unwrap();
    domain
}

#[test]
fn mp_constrained_chain_agrees_across_handlers() {
    // Condensing u2 = 0.5 u3 gives a reduced stiffness of 1, so u3 = 1.
    let cases: Vec<(Box<dyn ConstraintHandler>, f64)> = vec![
        (Box::new(TransformationHandler::new()), 1e-12),
        (Box::new(LagrangeHandler::new(1.0)), 1e-10),
        (Box::new(PenaltyHandler::new(1e8)), 1e-4),
    ];
    for (handler, tol) in cases {
        let name = handler.method();
        let mut domain = mp_chain();
        solve_steps(&mut domain, handler, 2);
        let u2 = domain.node(2).unwrap().trial_disp()[0];
        let u3 = domain.node(3).unwrap().trial_disp()[0];
        assert!((u3 - 1.0).abs() < tol, "{} handler: u3 = {}", name, u3);
        assert!((u2 - 0.5).abs() < tol, "{} handler: u2 = {}", name, u2);
    }
}

#[test]
fn load_on_a_constrained_dof_reaches_the_retained_equation() {
    // Two unit springs, u1 fixed, u2 = 0.5 u3, unit load applied directly to
    // the constrained node 2. Condensation routes it as Tᵀ P, so the exact
    // solution is u3 = 1, u2 = 0.5 under every method.
    let cases: Vec<(Box<dyn ConstraintHandler>, f64)> = vec![
        (Box::new(TransformationHandler::new()), 1e-12),
        (Box::new(LagrangeHandler::new(1.0)), 1e-10),
        (Box::new(PenaltyHandler::new(1e8)), 1e-4),
    ];
    for (handler, tol) in cases {
        let name = handler.method();
        let mut domain = spring_chain(3, 1.0);
        domain
            .add_sp_constraint(SpConstraint::new(1, 1, 0, 0.0))
            .unwrap();
        domain
            .add_mp_constraint(
                MpConstraint::single_retained(1, 2, vec![0], 3, vec![0], dmatrix![0.5]).unwrap(),
            )
            .unwrap();
        domain
            .add_nodal_load(NodalLoad::constant(1, 2, DVector::from_column_slice(&[1.0])))
            .unwrap();

        solve_steps(&mut domain, handler, 2);
        let u2 = domain.node(2).unwrap().trial_disp()[0];
        let u3 = domain.node(3).unwrap().trial_disp()[0];
        assert!((u3 - 1.0).abs() < tol, "{} handler: u3 = {}", name, u3);
        assert!((u2 - 0.5).abs() < tol, "{} handler: u2 = {}", name, u2);
    }
}

#[test]
fn repeated_steps_leave_a_converged_solution_alone() {
    let mut domain = fixed_chain(0.0);
    let mut analysis = static_analysis(Box::new(LagrangeHandler::new(1.0)));
    domain.apply_load(1.0);
    analysis.analyze_step(&mut domain, &mut [], None).unwrap();
    let first = domain.node(4).unwrap().trial_disp()[0];

    analysis.analyze_step(&mut domain, &mut [], None).unwrap();
    let second = domain.node(4).unwrap().trial_disp()[0];
    assert!((first - second).abs() < 1e-10);
}

#[test]
fn time_varying_loads_scale_with_the_domain_time() {
    let mut domain = spring_chain(2, 2.0);
    domain
        .add_sp_constraint(SpConstraint::new(1, 1, 0, 0.0))
        .unwrap();
    domain
        .add_nodal_load(NodalLoad::linear(1, 2, DVector::from_column_slice(&[1.0])))
        .unwrap();

    let mut analysis = static_analysis(Box::new(PlainHandler::new()));
    domain.apply_load(2.0);
    analysis.analyze_step(&mut domain, &mut [], None).unwrap();
    assert!((domain.node(2).unwrap().trial_disp()[0] - 1.0).abs() < 1e-12);
}
