//! Scenario schema definitions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub director: DirectorDef,
    #[serde(default)]
    pub integrators: Vec<IntegratorDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectorDef {
    #[serde(default = "default_error_tolerance")]
    pub error_tolerance: f64,
    #[serde(default = "default_solver")]
    pub solver: String,
    #[serde(default)]
    pub start_time: f64,
    /// Omitted means the run ends when no integrator has anything left to do.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<f64>,
}

impl Default for DirectorDef {
    fn default() -> Self {
        Self {
            error_tolerance: default_error_tolerance(),
            solver: default_solver(),
            start_time: 0.0,
            stop_time: None,
        }
    }
}

fn default_error_tolerance() -> f64 {
    qss_core::DEFAULT_ERROR_TOLERANCE
}

fn default_solver() -> String {
    "QSS1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegratorDef {
    pub id: String,
    #[serde(default)]
    pub initial_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<ToleranceDef>,
    #[serde(default)]
    pub propagate_derivatives: bool,
    pub input: InputDef,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ToleranceDef {
    pub absolute: f64,
    pub relative: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputDef {
    Constant {
        value: f64,
    },
    Steps {
        steps: Vec<StepDef>,
    },
    Integrator {
        source: String,
        #[serde(default = "unit_gain")]
        gain: f64,
    },
}

fn unit_gain() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StepDef {
    pub time: f64,
    pub value: f64,
}
