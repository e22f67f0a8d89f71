//! Turn a validated scenario into a director and a network.

use std::collections::HashMap;

use qss_core::{SimTime, Tolerance, s};
use qss_sim::{InputSource, IntegratorParams, NetworkNode, QssDirector};

use crate::schema::{InputDef, Scenario};
use crate::validate::validate_scenario;
use crate::{ProjectResult, ValidationError};

pub fn compile_scenario(scenario: &Scenario) -> ProjectResult<(QssDirector, Vec<NetworkNode>)> {
    validate_scenario(scenario)?;

    let def = &scenario.director;
    let mut director = QssDirector::new();
    director.set_error_tolerance(def.error_tolerance)?;
    director.select_stepper_kind(def.solver.as_str());
    let start = SimTime::try_from(s(def.start_time)).map_err(qss_sim::SimError::from)?;
    let stop = match def.stop_time {
        Some(stop) => SimTime::try_from(s(stop)).map_err(qss_sim::SimError::from)?,
        None => SimTime::POSITIVE_INFINITY,
    };
    director.set_time_window(start, stop)?;

    let index: HashMap<&str, usize> = scenario
        .integrators
        .iter()
        .enumerate()
        .map(|(i, integrator)| (integrator.id.as_str(), i))
        .collect();

    let mut nodes = Vec::with_capacity(scenario.integrators.len());
    for integrator in &scenario.integrators {
        let tolerance = match integrator.tolerance {
            Some(t) => Some(
                Tolerance::new(t.absolute, t.relative).map_err(qss_sim::SimError::from)?,
            ),
            None => None,
        };
        let input = match &integrator.input {
            InputDef::Constant { value } => InputSource::Constant(*value),
            InputDef::Steps { steps } => InputSource::Steps(
                steps
                    .iter()
                    .map(|step| -> Result<(SimTime, f64), qss_core::CoreError> {
                        Ok((SimTime::try_from(s(step.time))?, step.value))
                    })
                    .collect::<Result<_, _>>()
                    .map_err(qss_sim::SimError::from)?,
            ),
            InputDef::Integrator { source, gain } => {
                let source = *index.get(source.as_str()).ok_or_else(|| {
                    ValidationError::MissingReference {
                        id: source.clone(),
                        context: format!("input of {}", integrator.id),
                    }
                })?;
                InputSource::Integrator {
                    source,
                    gain: *gain,
                }
            }
        };
        nodes.push(NetworkNode {
            name: integrator.id.clone(),
            params: IntegratorParams {
                initial_state: integrator.initial_value,
                tolerance,
                propagate_derivatives: integrator.propagate_derivatives,
            },
            input,
        });
    }
    Ok((director, nodes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DirectorDef, IntegratorDef, StepDef, ToleranceDef};

    fn integrator(id: &str, input: InputDef) -> IntegratorDef {
        IntegratorDef {
            id: id.to_string(),
            initial_value: 1.0,
            tolerance: None,
            propagate_derivatives: false,
            input,
        }
    }

    #[test]
    fn director_settings_are_carried_over() {
        let scenario = Scenario {
            version: 1,
            name: "c".to_string(),
            director: DirectorDef {
                error_tolerance: 1e-3,
                solver: "QSS2Fd".to_string(),
                start_time: 0.5,
                stop_time: Some(2.0),
            },
            integrators: vec![],
        };
        let (director, nodes) = compile_scenario(&scenario).unwrap();
        assert!(nodes.is_empty());
        assert_eq!(director.error_tolerance(), 1e-3);
        assert_eq!(director.stepper_kind(), "QSS2Fd");
        assert_eq!(director.start_time(), SimTime::new(0.5).unwrap());
        assert_eq!(director.stop_time(), SimTime::new(2.0).unwrap());
    }

    #[test]
    fn inputs_resolve_to_indices() {
        let mut y = integrator(
            "y",
            InputDef::Integrator {
                source: "x".to_string(),
                gain: -2.0,
            },
        );
        y.tolerance = Some(ToleranceDef {
            absolute: 1e-2,
            relative: 0.0,
        });
        let scenario = Scenario {
            version: 1,
            name: "c".to_string(),
            director: DirectorDef::default(),
            integrators: vec![
                integrator(
                    "x",
                    InputDef::Steps {
                        steps: vec![StepDef {
                            time: 1.0,
                            value: 3.0,
                        }],
                    },
                ),
                y,
            ],
        };
        let (_, nodes) = compile_scenario(&scenario).unwrap();
        assert_eq!(
            nodes[0].input,
            InputSource::Steps(vec![(SimTime::new(1.0).unwrap(), 3.0)])
        );
        assert_eq!(nodes[1].input, InputSource::Integrator { source: 0, gain: -2.0 });
        assert_eq!(
            nodes[1].params.tolerance,
            Some(Tolerance {
                absolute: 1e-2,
                relative: 0.0
            })
        );
    }
}
