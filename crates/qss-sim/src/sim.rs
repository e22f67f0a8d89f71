//! Run a small network of integrators on the reference calendar.

use qss_core::timing::{RunTimings, Timer};
use qss_core::{ActorId, SimTime, SmoothValue};
use tracing::info;

use crate::director::QssDirector;
use crate::error::{SimError, SimResult};
use crate::integrator::{Integrator, IntegratorParams, IntegratorStats};
use crate::scheduler::{EventCalendar, Scheduler};

/// Where an integrator's input comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    /// Delivered once, at the start of the run.
    Constant(f64),
    /// Piecewise constant: each value holds from its time on.
    Steps(Vec<(SimTime, f64)>),
    /// Another integrator's output times `gain`.
    Integrator { source: usize, gain: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkNode {
    pub name: String,
    pub params: IntegratorParams,
    pub input: InputSource,
}

/// Options for network runs.
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Abort after this many integrator firings.
    pub max_firings: u64,
    /// Keep every published output in the record.
    pub record_outputs: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            max_firings: 1_000_000,
            record_outputs: true,
        }
    }
}

/// One published output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputSample {
    pub time: SimTime,
    pub actor: usize,
    pub value: f64,
}

/// Record of a network run.
#[derive(Debug, Clone)]
pub struct SimRecord {
    pub names: Vec<String>,
    pub samples: Vec<OutputSample>,
    pub stats: Vec<IntegratorStats>,
    pub firings: u64,
    pub end_time: SimTime,
    pub timings: RunTimings,
}

impl SimRecord {
    /// Published `(time, value)` pairs of one integrator.
    pub fn series(&self, actor: usize) -> Vec<(SimTime, f64)> {
        self.samples
            .iter()
            .filter(|s| s.actor == actor)
            .map(|s| (s.time, s.value))
            .collect()
    }

    pub fn total_quantization_events(&self) -> u64 {
        self.stats.iter().map(|s| s.quantization_events).sum()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Step changes of one `Steps` source after the start of the run.
struct StepSource {
    id: ActorId,
    target: usize,
    steps: Vec<(SimTime, f64)>,
}

impl StepSource {
    fn value_at(&self, t: SimTime) -> Option<f64> {
        self.steps
            .iter()
            .take_while(|(when, _)| *when <= t)
            .last()
            .map(|(_, v)| *v)
    }
}

/// Simulate `nodes` under `director` until the calendar runs dry or passes
/// the director's stop time.
///
/// Each instant fires every due integrator plus every consumer of a new
/// value, then postfires all of them with the inputs gathered.
pub fn run_network(
    director: QssDirector,
    nodes: &[NetworkNode],
    opts: &SimOptions,
) -> SimResult<SimRecord> {
    let setup_timer = Timer::start();
    for node in nodes {
        if let InputSource::Integrator { source, .. } = node.input {
            if source >= nodes.len() {
                return Err(SimError::UnknownActor {
                    name: format!("integrator {source} (input of {})", node.name),
                });
            }
        }
    }

    let mut calendar = EventCalendar::with_director(director);
    let start = calendar.current_time();
    let n = nodes.len();

    let mut integrators: Vec<Integrator> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| Integrator::new(ActorId::from_index(i as u32), &node.name, node.params))
        .collect();
    for integrator in &mut integrators {
        integrator.initialize(&mut calendar)?;
    }

    let mut pending_input: Vec<Option<SmoothValue>> = vec![None; n];
    let mut step_sources = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        match &node.input {
            InputSource::Constant(v) => pending_input[i] = Some(SmoothValue::new(*v)),
            InputSource::Steps(steps) => {
                let mut steps = steps.clone();
                steps.sort_by(|a, b| a.0.cmp(&b.0));
                let source = StepSource {
                    id: ActorId::from_index((n + step_sources.len()) as u32),
                    target: i,
                    steps,
                };
                pending_input[i] = source.value_at(start).map(SmoothValue::new);
                for (t, _) in source.steps.iter().filter(|(t, _)| *t > start) {
                    calendar.fire_at(source.id, *t)?;
                }
                step_sources.push(source);
            }
            InputSource::Integrator { .. } => {}
        }
    }
    let consumers: Vec<Vec<(usize, f64)>> = (0..n)
        .map(|src| {
            nodes
                .iter()
                .enumerate()
                .filter_map(|(j, node)| match node.input {
                    InputSource::Integrator { source, gain } if source == src => Some((j, gain)),
                    _ => None,
                })
                .collect()
        })
        .collect();

    let setup_time_s = setup_timer.stop().unwrap_or(0.0);
    let run_timer = Timer::start();
    info!(integrators = n, %start, stop = %calendar.model_stop_time(), "run started");

    let mut samples = Vec::new();
    let mut firings = 0u64;
    while let Some((now, due)) = calendar.advance() {
        let mut worklist: Vec<usize> = Vec::new();
        for id in due {
            let index = id.index() as usize;
            if index < n {
                worklist.push(index);
            } else if let Some(source) = step_sources.get(index - n) {
                pending_input[source.target] = source.value_at(now).map(SmoothValue::new);
                worklist.push(source.target);
            }
        }

        let mut fired = vec![false; n];
        while let Some(i) = worklist.pop() {
            if fired[i] {
                continue;
            }
            fired[i] = true;
            firings += 1;
            if firings > opts.max_firings {
                return Err(SimError::FiringLimit {
                    limit: opts.max_firings,
                });
            }
            if let Some(output) = integrators[i].fire(&mut calendar)? {
                if opts.record_outputs {
                    samples.push(OutputSample {
                        time: now,
                        actor: i,
                        value: output.value(),
                    });
                }
                for &(j, gain) in &consumers[i] {
                    pending_input[j] = Some(&output * gain);
                    worklist.push(j);
                }
            }
        }

        for (i, integrator) in integrators.iter_mut().enumerate() {
            if fired[i] {
                integrator.postfire(&mut calendar, pending_input[i].take().as_ref())?;
            }
        }
    }

    let end_time = calendar.current_time();
    let run_time_s = run_timer.stop().unwrap_or(0.0);
    info!(%end_time, firings, "run finished");
    Ok(SimRecord {
        names: nodes.iter().map(|node| node.name.clone()).collect(),
        samples,
        stats: integrators.iter().map(Integrator::stats).collect(),
        firings,
        end_time,
        timings: RunTimings {
            setup_time_s,
            run_time_s,
            firings: firings as usize,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: f64) -> SimTime {
        SimTime::new(secs).unwrap()
    }

    fn node(name: &str, initial_state: f64, input: InputSource) -> NetworkNode {
        NetworkNode {
            name: name.to_string(),
            params: IntegratorParams {
                initial_state,
                ..IntegratorParams::default()
            },
            input,
        }
    }

    fn director(stop: f64) -> QssDirector {
        let mut director = QssDirector::new();
        director.set_time_window(at(0.0), at(stop)).unwrap();
        director
    }

    #[test]
    fn dangling_source_is_rejected() {
        let nodes = [node("x", 0.0, InputSource::Integrator { source: 3, gain: 1.0 })];
        let err = run_network(director(1.0), &nodes, &SimOptions::default()).unwrap_err();
        assert!(matches!(err, SimError::UnknownActor { .. }));
    }

    #[test]
    fn zero_input_publishes_only_the_initial_value() {
        let nodes = [node("x", 2.5, InputSource::Constant(0.0))];
        let record = run_network(director(10.0), &nodes, &SimOptions::default()).unwrap();
        assert_eq!(record.series(0), vec![(at(0.0), 2.5)]);
        assert_eq!(record.end_time, at(0.0));
    }

    #[test]
    fn step_input_changes_the_slope() {
        let nodes = [node(
            "x",
            0.0,
            InputSource::Steps(vec![(at(0.0), 0.0), (at(1.0), 1.0)]),
        )];
        let mut director = director(2.0);
        director.set_error_tolerance(0.1).unwrap();
        let record = run_network(director, &nodes, &SimOptions::default()).unwrap();
        let series = record.series(0);
        assert_eq!(series[0], (at(0.0), 0.0));
        assert!(series[1..].iter().all(|(t, _)| *t > at(1.0)));
        let (_, last) = *series.last().unwrap();
        assert!((last - 1.0).abs() <= 0.1 + 1e-9, "last = {last}");
    }

    #[test]
    fn firing_limit_stops_runaway_runs() {
        let nodes = [node("x", 0.0, InputSource::Constant(1.0))];
        let opts = SimOptions {
            max_firings: 5,
            ..SimOptions::default()
        };
        let err = run_network(director(100.0), &nodes, &opts).unwrap_err();
        assert_eq!(err, SimError::FiringLimit { limit: 5 });
    }
}
