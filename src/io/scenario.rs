//! Scenario JSON load/write (spec §6 "Scenario JSON"). The wire format
//! (`ScenarioFile`) is deliberately looser than the domain type
//! (`Scenario`): it accepts either `wcet` or `utilization`, an optional
//! `relative_deadline`, and an optional job list, then the loader applies
//! spec §6's defaulting and validation rules to produce a fully-resolved
//! `Scenario`.

use crate::error::{Error, Result};
use crate::ids::TaskId;
use crate::time::{Duration, TimePoint};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

#[derive(Serialize, Deserialize)]
struct JobSpec {
    arrival: f64,
    duration: f64,
}

#[derive(Serialize, Deserialize)]
struct TaskSpec {
    id: u32,
    period: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    relative_deadline: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wcet: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    utilization: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jobs: Option<Vec<JobSpec>>,
}

#[derive(Serialize, Deserialize)]
struct ScenarioFile {
    tasks: Vec<TaskSpec>,
}

/// A single job pre-declared in the scenario (as opposed to one the
/// workload generator synthesizes at run time).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScenarioJob {
    pub arrival: TimePoint,
    pub duration: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioTask {
    pub id: TaskId,
    pub period: Duration,
    pub relative_deadline: Duration,
    pub wcet: Duration,
    /// Sorted by arrival (spec §6 "jobs are sorted by arrival on load").
    pub jobs: Vec<ScenarioJob>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scenario {
    pub tasks: Vec<ScenarioTask>,
}

impl Scenario {
    pub fn load_from_str(text: &str) -> Result<Scenario> {
        let file: ScenarioFile = serde_json::from_str(text).map_err(|e| Error::LoaderError(format!("scenario JSON: {e}")))?;
        Self::from_file(file)
    }

    pub fn load<R: Read>(mut reader: R) -> Result<Scenario> {
        let mut text = String::new();
        reader.read_to_string(&mut text).map_err(|e| Error::LoaderError(format!("reading scenario: {e}")))?;
        Self::load_from_str(&text)
    }

    fn from_file(file: ScenarioFile) -> Result<Scenario> {
        let mut tasks = Vec::with_capacity(file.tasks.len());
        for t in file.tasks {
            if t.period <= 0.0 {
                return Err(Error::LoaderError(format!("task {}: period must be > 0", t.id)));
            }
            let period = Duration::from_secs_f64(t.period);
            let wcet = match (t.wcet, t.utilization) {
                (Some(w), _) => Duration::from_secs_f64(w),
                (None, Some(u)) => {
                    if !(u > 0.0 && u <= 1.0) {
                        return Err(Error::LoaderError(format!("task {}: utilization must be in (0, 1]", t.id)));
                    }
                    period * u
                }
                (None, None) => {
                    return Err(Error::LoaderError(format!("task {}: neither wcet nor utilization was given", t.id)))
                }
            };
            let relative_deadline = match t.relative_deadline {
                Some(d) => Duration::from_secs_f64(d),
                None => period,
            };
            if relative_deadline < wcet {
                return Err(Error::LoaderError(format!("task {}: relative_deadline must be >= wcet", t.id)));
            }

            let mut jobs = Vec::new();
            for j in t.jobs.into_iter().flatten() {
                if j.duration <= 0.0 {
                    return Err(Error::LoaderError(format!("task {}: job duration must be > 0", t.id)));
                }
                jobs.push(ScenarioJob {
                    arrival: TimePoint::ZERO + Duration::from_secs_f64(j.arrival),
                    duration: Duration::from_secs_f64(j.duration),
                });
            }
            jobs.sort_by_key(|j| j.arrival);

            tasks.push(ScenarioTask { id: TaskId(t.id), period, relative_deadline, wcet, jobs });
        }
        Ok(Scenario { tasks })
    }

    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        let file = ScenarioFile {
            tasks: self
                .tasks
                .iter()
                .map(|t| TaskSpec {
                    id: t.id.0,
                    period: t.period.as_secs_f64(),
                    relative_deadline: Some(t.relative_deadline.as_secs_f64()),
                    wcet: Some(t.wcet.as_secs_f64()),
                    utilization: None,
                    jobs: if t.jobs.is_empty() {
                        None
                    } else {
                        Some(t.jobs.iter().map(|j| JobSpec { arrival: j.arrival.as_secs_f64(), duration: j.duration.as_secs_f64() }).collect())
                    },
                })
                .collect(),
        };
        serde_json::to_writer_pretty(writer, &file).map_err(|e| Error::LoaderError(format!("writing scenario: {e}")))
    }
}
