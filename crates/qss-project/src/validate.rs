//! Scenario validation logic.

use std::collections::HashSet;

use crate::schema::{InputDef, IntegratorDef, Scenario, ToleranceDef};

pub const LATEST_VERSION: u32 = 1;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: impl Into<String>, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn finite(field: impl Into<String>, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(invalid(field, value, "must be finite"));
    }
    Ok(())
}

fn non_negative(field: impl Into<String>, value: f64) -> Result<(), ValidationError> {
    let field = field.into();
    finite(field.clone(), value)?;
    if value < 0.0 {
        return Err(invalid(field, value, "must be >= 0"));
    }
    Ok(())
}

pub fn validate_scenario(scenario: &Scenario) -> Result<(), ValidationError> {
    if scenario.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: scenario.version,
        });
    }

    let director = &scenario.director;
    non_negative("director.error_tolerance", director.error_tolerance)?;
    if director.solver.trim().is_empty() {
        return Err(invalid("director.solver", "", "must name a stepper"));
    }
    finite("director.start_time", director.start_time)?;
    if let Some(stop) = director.stop_time {
        if stop.is_nan() || stop < director.start_time {
            return Err(invalid(
                "director.stop_time",
                stop,
                "must not be before start_time",
            ));
        }
    }

    let mut ids = HashSet::new();
    for integrator in &scenario.integrators {
        if integrator.id.is_empty() {
            return Err(invalid("integrators.id", "", "must not be empty"));
        }
        if !ids.insert(integrator.id.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: integrator.id.clone(),
                context: "integrators".to_string(),
            });
        }
    }

    for integrator in &scenario.integrators {
        validate_integrator(integrator, &ids)?;
    }
    Ok(())
}

fn validate_integrator(def: &IntegratorDef, ids: &HashSet<&str>) -> Result<(), ValidationError> {
    let field = |name: &str| format!("{}.{name}", def.id);
    finite(field("initial_value"), def.initial_value)?;
    if let Some(ToleranceDef { absolute, relative }) = def.tolerance {
        non_negative(field("tolerance.absolute"), absolute)?;
        non_negative(field("tolerance.relative"), relative)?;
    }
    match &def.input {
        InputDef::Constant { value } => finite(field("input.value"), *value)?,
        InputDef::Steps { steps } => {
            for step in steps {
                finite(field("input.steps.time"), step.time)?;
                finite(field("input.steps.value"), step.value)?;
            }
        }
        InputDef::Integrator { source, gain } => {
            if !ids.contains(source.as_str()) {
                return Err(ValidationError::MissingReference {
                    id: source.clone(),
                    context: format!("input of {}", def.id),
                });
            }
            finite(field("input.gain"), *gain)?;
        }
    }
    Ok(())
}
