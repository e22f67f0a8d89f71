//! Contract checks every registered stepper must pass.

use proptest::prelude::*;
use qss_core::{CoreError, ModelPolynomial, SimTime, Tolerance};
use qss_solver::{
    DerivativeError, FnDerivative, QuantizedStepper, SolverError, StepperRegistry,
};

fn at(secs: f64) -> SimTime {
    SimTime::new(secs).unwrap()
}

fn integrator_of_input() -> FnDerivative<impl FnMut(SimTime, &[f64], &[f64], &mut [f64]) -> Result<(), DerivativeError>> {
    FnDerivative::new(1, 1, |_, _, u, out| {
        out[0] = u[0];
        Ok(())
    })
}

fn build(name: &str) -> Box<dyn QuantizedStepper> {
    let registry = StepperRegistry::with_builtin();
    (registry.get(name).unwrap())().unwrap()
}

fn ready(name: &str, slope: f64) -> Box<dyn QuantizedStepper> {
    let mut stepper = build(name);
    stepper.bind(Box::new(integrator_of_input())).unwrap();
    stepper.set_simulation_time(at(0.0)).unwrap();
    stepper.set_state_value(0, 0.0).unwrap();
    stepper
        .set_quantization_tolerance(0, Tolerance::new(1e-3, 1e-3).unwrap())
        .unwrap();
    stepper
        .add_input_model(0, ModelPolynomial::constant(1, slope, at(0.0)))
        .unwrap();
    stepper.validate().unwrap();
    stepper
}

#[test]
fn validate_reports_missing_pieces_in_order() {
    let mut stepper = build("QSS1");
    assert!(matches!(stepper.validate(), Err(SolverError::Validation { .. })));

    stepper.bind(Box::new(integrator_of_input())).unwrap();
    let err = stepper.validate().unwrap_err().to_string();
    assert!(err.contains("simulation time"), "{err}");

    stepper.set_simulation_time(at(0.0)).unwrap();
    let err = stepper.validate().unwrap_err().to_string();
    assert!(err.contains("initial value for state 0"), "{err}");

    stepper.set_state_value(0, 1.0).unwrap();
    let err = stepper.validate().unwrap_err().to_string();
    assert!(err.contains("input variable 0"), "{err}");

    stepper
        .add_input_model(0, ModelPolynomial::new(0))
        .unwrap();
    stepper.validate().unwrap();
}

#[test]
fn configuration_before_bind_is_rejected() {
    let mut stepper = build("QSS2Fd");
    assert!(matches!(
        stepper.set_state_value(0, 1.0),
        Err(SolverError::NotBound { .. })
    ));
    assert_eq!(stepper.state_count(), 0);
}

#[test]
fn binding_and_time_are_set_once() {
    let mut stepper = build("QSS1");
    stepper.bind(Box::new(integrator_of_input())).unwrap();
    assert!(matches!(
        stepper.bind(Box::new(integrator_of_input())),
        Err(SolverError::AlreadyInitialized { .. })
    ));
    stepper.set_simulation_time(at(1.0)).unwrap();
    assert!(stepper.set_simulation_time(at(2.0)).is_err());
    assert_eq!(stepper.current_simulation_time(), Some(at(1.0)));
}

#[test]
fn step_requires_forward_time_and_no_pending_quantization() {
    let mut stepper = ready("QSS1", 1.0);
    assert_eq!(stepper.need_quantization_event_index(), Some(0));
    assert!(matches!(
        stepper.step_to_time(at(0.5)),
        Err(SolverError::PendingQuantization { index: 0 })
    ));
    stepper.trigger_quantization_event(0).unwrap();
    assert!(matches!(
        stepper.step_to_time(at(0.0)),
        Err(SolverError::TimeMustAdvance { .. })
    ));
}

#[test]
fn ceiling_hides_late_events() {
    let mut stepper = ready("QSS1", 1.0);
    stepper.trigger_quantization_event(0).unwrap();
    stepper.trigger_rate_event().unwrap();
    let next = stepper.predict_quantization_event_time_earliest();
    assert!(next.seconds() > 0.0 && next.seconds() < 1.0);

    stepper.set_event_time_ceiling(at(next.seconds() / 2.0)).unwrap();
    assert_eq!(
        stepper.predict_quantization_event_time_earliest(),
        SimTime::POSITIVE_INFINITY
    );
}

#[test]
fn negative_tolerance_is_rejected() {
    let mut stepper = build("QSS1");
    stepper.bind(Box::new(integrator_of_input())).unwrap();
    let err = stepper
        .set_quantization_tolerance(
            0,
            Tolerance {
                absolute: -1.0,
                relative: 0.0,
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SolverError::Core(CoreError::InvalidTolerance { .. })
    ));
}

#[test]
fn batch_quantization_over_two_states() {
    let mut stepper = build("QSS1");
    stepper
        .bind(Box::new(FnDerivative::new(2, 1, |_, _, u, out| {
            out[0] = u[0];
            out[1] = 2.0 * u[0];
            Ok(())
        })))
        .unwrap();
    stepper.set_simulation_time(at(0.0)).unwrap();
    for index in 0..2 {
        stepper.set_state_value(index, 0.0).unwrap();
        stepper
            .set_quantization_tolerance(index, Tolerance::new(0.1, 0.0).unwrap())
            .unwrap();
    }
    stepper
        .add_input_model(0, ModelPolynomial::constant(1, 1.0, at(0.0)))
        .unwrap();
    stepper.validate().unwrap();

    assert_eq!(stepper.need_quantization_event_indexes(), vec![0, 1]);
    assert_eq!(stepper.trigger_quantization_events(false).unwrap(), vec![0, 1]);
    assert!(stepper.need_quantization_event_indexes().is_empty());
    stepper.trigger_rate_event().unwrap();

    // the faster state leaves its band first
    let (t, states) = stepper.earliest_quantization_events();
    assert_eq!(states, vec![1]);
    assert!((t.seconds() - 0.05).abs() < 1e-12, "{t}");

    assert_eq!(stepper.trigger_quantization_events(true).unwrap(), vec![0, 1]);
}

#[test]
fn unbound_stepper_predicts_nothing() {
    let mut stepper = build("LIQSS1");
    assert_eq!(
        stepper.predict_quantization_event_time_earliest(),
        SimTime::POSITIVE_INFINITY
    );
    assert!(stepper.earliest_quantization_events().1.is_empty());
}

#[test]
fn every_builtin_integrates_a_constant_rate() {
    for name in StepperRegistry::with_builtin().names() {
        let mut stepper = ready(&name, 2.0);
        stepper.trigger_quantization_event(0).unwrap();
        stepper.trigger_rate_event().unwrap();
        let mut t = SimTime::ZERO;
        for _ in 0..20 {
            let next = stepper.predict_quantization_event_time_earliest();
            if next.is_positive_infinite() {
                break;
            }
            assert!(next > t, "{name}: {next} not after {t}");
            stepper.advance_to_time(next).unwrap();
            t = next;
        }
        let end = t.add_secs(0.25);
        stepper.step_to_time(end).unwrap();
        let x = stepper.evaluate_state_model_continuous(0, end).unwrap();
        assert!((x - 2.0 * end.seconds()).abs() < 1e-9, "{name}: x = {x}");
    }
}

proptest! {
    #[test]
    fn qss1_events_are_one_quantum_apart(slope in 0.1f64..10.0, dq in 1e-4f64..1e-1) {
        let mut stepper = build("QSS1");
        stepper.bind(Box::new(integrator_of_input())).unwrap();
        stepper.set_simulation_time(SimTime::ZERO).unwrap();
        stepper.set_state_value(0, 0.0).unwrap();
        stepper.set_quantization_tolerance(0, Tolerance::new(dq, 0.0).unwrap()).unwrap();
        stepper.add_input_model(0, ModelPolynomial::constant(1, slope, SimTime::ZERO)).unwrap();
        stepper.validate().unwrap();
        stepper.trigger_quantization_event(0).unwrap();
        stepper.trigger_rate_event().unwrap();

        let mut previous = stepper.state_model(0).unwrap().value();
        for _ in 0..10 {
            let next = stepper.predict_quantization_event_time_earliest();
            stepper.advance_to_time(next).unwrap();
            let value = stepper.state_model(0).unwrap().value();
            prop_assert!(value - previous >= dq * (1.0 - 1e-9));
            prop_assert!(value - previous <= dq * (1.0 + 1e-9));
            previous = value;
        }
    }
}
