use nalgebra::dmatrix;
use proptest::prelude::*;

use parfem::analysis::AnalysisModel;
use parfem::constraint::{MpConstraint, SpConstraint};
use parfem::dof::DofState;
use parfem::handler::{
    ConstraintHandler, LagrangeHandler, PenaltyHandler, PlainHandler, TransformationHandler,
};

use super::models::spring_chain;

fn handle(handler: &mut dyn ConstraintHandler, domain: &parfem::domain::Domain) -> AnalysisModel {
    let mut model = AnalysisModel::new();
    handler.handle(domain, &[], &mut model, None).unwrap();
    model
}

#[test]
fn constraint_free_models_number_every_dof() {
    let domain = spring_chain(4, 1.0);
    let mut handlers: Vec<Box<dyn ConstraintHandler>> = vec![
        Box::new(PlainHandler::new()),
        Box::new(PenaltyHandler::new(1e8)),
        Box::new(LagrangeHandler::new(1.0)),
        Box::new(TransformationHandler::new()),
    ];
    for handler in &mut handlers {
        let model = handle(handler.as_mut(), &domain);
        assert_eq!(model.num_eqn(), 4, "{} handler", handler.method());
    }
}

#[test]
fn sp_constraints_shift_the_equation_count_per_method() {
    let mut domain = spring_chain(4, 1.0);
    domain.add_sp_constraint(SpConstraint::new(1, 1, 0, 0.0)).unwrap();
    domain.add_sp_constraint(SpConstraint::new(2, 4, 0, 0.0)).unwrap();

    let cases: Vec<(Box<dyn ConstraintHandler>, usize)> = vec![
        (Box::new(PlainHandler::new()), 2),
        (Box::new(TransformationHandler::new()), 2),
        (Box::new(PenaltyHandler::new(1e8)), 4),
        (Box::new(LagrangeHandler::new(1.0)), 6),
    ];
    for (mut handler, expected) in cases {
        let model = handle(handler.as_mut(), &domain);
        assert_eq!(model.num_eqn(), expected, "{} handler", handler.method());
    }
}

#[test]
fn lagrange_adds_one_equation_per_constraint_row() {
    let mut domain = spring_chain(3, 1.0);
    domain
        .add_mp_constraint(
            MpConstraint::single_retained(1, 2, vec![0], 3, vec![0], dmatrix![0.5]).unwrap(),
        )
        .unwrap();

    let model = handle(&mut LagrangeHandler::new(1.0), &domain);
    assert_eq!(model.num_eqn(), 4);

    let model = handle(&mut PenaltyHandler::new(1e8), &domain);
    assert_eq!(model.num_eqn(), 3);
}

#[test]
fn plain_ignores_non_identity_mp_constraints() {
    let mut domain = spring_chain(3, 1.0);
    domain
        .add_mp_constraint(
            MpConstraint::single_retained(1, 2, vec![0], 3, vec![0], dmatrix![0.5]).unwrap(),
        )
        .unwrap();

    let model = handle(&mut PlainHandler::new(), &domain);
    // The constrained DOF stays numbered; the constraint is dropped with a
    // warning.
    assert_eq!(model.num_eqn(), 3);
    let group = model.group(model.node_group_index(2));
    assert!(matches!(group.state(0), DofState::Equation(_)));
}

#[test]
fn plain_eliminates_identity_mp_constraints() {
    let mut domain = spring_chain(3, 1.0);
    domain
        .add_mp_constraint(
            MpConstraint::single_retained(1, 2, vec![0], 3, vec![0], dmatrix![1.0]).unwrap(),
        )
        .unwrap();

    let model = handle(&mut PlainHandler::new(), &domain);
    assert_eq!(model.num_eqn(), 2);
    let group = model.group(model.node_group_index(2));
    assert_eq!(group.state(0), DofState::Eliminated);
}

#[test]
fn transformation_eliminates_general_mp_constraints() {
    let mut domain = spring_chain(3, 1.0);
    domain
        .add_mp_constraint(
            MpConstraint::single_retained(1, 2, vec![0], 3, vec![0], dmatrix![0.5]).unwrap(),
        )
        .unwrap();

    let model = handle(&mut TransformationHandler::new(), &domain);
    assert_eq!(model.num_eqn(), 2);
    let group = model.group(model.node_group_index(2));
    assert_eq!(group.state(0), DofState::Eliminated);
}

#[test]
fn fixing_one_dof_of_a_cantilever_drops_one_equation() {
    let unconstrained = spring_chain(2, 1.0);
    let model = handle(&mut TransformationHandler::new(), &unconstrained);
    let baseline = model.num_eqn();

    let mut fixed = spring_chain(2, 1.0);
    fixed.add_sp_constraint(SpConstraint::new(1, 1, 0, 0.0)).unwrap();
    let model = handle(&mut TransformationHandler::new(), &fixed);
    assert_eq!(model.num_eqn(), baseline - 1);
}

#[test]
fn boundary_nodes_are_numbered_last() {
    let domain = spring_chain(3, 1.0);
    let mut handler = PlainHandler::new();
    let mut model = AnalysisModel::new();
    let set_aside = handler.handle(&domain, &[], &mut model, Some(&[1])).unwrap();

    assert_eq!(set_aside, 1);
    assert_eq!(model.num_boundary_eqn(), 1);
    let group = model.group(model.node_group_index(1));
    assert_eq!(group.state(0), DofState::Equation(2));
}

#[test]
fn handling_twice_reproduces_the_numbering() {
    let mut domain = spring_chain(4, 1.0);
    domain.add_sp_constraint(SpConstraint::new(1, 2, 0, 0.0)).unwrap();
    domain
        .add_mp_constraint(
            MpConstraint::single_retained(1, 3, vec![0], 4, vec![0], dmatrix![2.0]).unwrap(),
        )
        .unwrap();

    let mut handlers: Vec<Box<dyn ConstraintHandler>> = vec![
        Box::new(PlainHandler::new()),
        Box::new(PenaltyHandler::new(1e8)),
        Box::new(LagrangeHandler::new(1.0)),
        Box::new(TransformationHandler::new()),
    ];
    for handler in &mut handlers {
        let first = handle(handler.as_mut(), &domain);
        let second = handle(handler.as_mut(), &domain);
        let states = |m: &AnalysisModel| -> Vec<Vec<DofState>> {
            m.groups().iter().map(|g| g.states().to_vec()).collect()
        };
        assert_eq!(
            states(&first),
            states(&second),
            "{} handler numbering drifted between passes",
            handler.method()
        );
    }
}

proptest! {
    /// One equation disappears per fixed node under plain handling, for any
    /// pattern of fixed nodes.
    #[test]
    fn plain_equation_count_tracks_sp_eliminations(fixed in proptest::collection::vec(any::<bool>(), 2..12)) {
        let n = fixed.len();
        let mut domain = spring_chain(n, 1.0);
        let mut num_fixed = 0;
        for (i, &fix) in fixed.iter().enumerate() {
            if fix {
                domain.add_sp_constraint(SpConstraint::new(i + 1, i + 1, 0, 0.0)).unwrap();
                num_fixed += 1;
            }
        }
        let model = handle(&mut PlainHandler::new(), &domain);
        prop_assert_eq!(model.num_eqn(), n - num_fixed);
    }

    /// Numbering is deterministic for any pattern of fixed nodes.
    #[test]
    fn numbering_is_reproducible(fixed in proptest::collection::vec(any::<bool>(), 2..12)) {
        let mut domain = spring_chain(fixed.len(), 1.0);
        for (i, &fix) in fixed.iter().enumerate() {
            if fix {
                domain.add_sp_constraint(SpConstraint::new(i + 1, i + 1, 0, 0.0)).unwrap();
            }
        }
        let mut handler = PlainHandler::new();
        let first = handle(&mut handler, &domain);
        let second = handle(&mut handler, &domain);
        let states = |m: &AnalysisModel| -> Vec<Vec<DofState>> {
            m.groups().iter().map(|g| g.states().to_vec()).collect()
        };
        prop_assert_eq!(states(&first), states(&second));
    }
}
