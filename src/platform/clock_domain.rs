//! Clock domain and DVFS transitions (spec §3 "ClockDomain", §4.4).

use crate::ids::{ClockDomainId, ProcessorId};
use crate::time::{Duration, Frequency, Power};
use serde::{Deserialize, Serialize};

/// Cubic power coefficients: `P(f) = a0 + a1*f + a2*f^2 + a3*f^3`, `f` in
/// GHz.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PowerCoefficients {
    pub a0: f64,
    pub a1: f64,
    pub a2: f64,
    pub a3: f64,
}

impl PowerCoefficients {
    pub fn power_at(&self, freq: Frequency) -> Power {
        let ghz = freq.value() / 1000.0;
        Power(self.a0 + self.a1 * ghz + self.a2 * ghz.powi(2) + self.a3 * ghz.powi(3))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClockDomain {
    pub id: ClockDomainId,
    pub current_freq: Frequency,
    pub freq_min: Frequency,
    pub freq_max: Frequency,
    /// Discrete Operating Performance Points, sorted ascending. `None`
    /// means free scaling within `[freq_min, freq_max]` (spec §9 "the
    /// free-scaling flag... should be modelled by simply not supplying
    /// an OPP list").
    pub opps: Option<Vec<Frequency>>,
    /// Below this threshold DPM may be preferred over DVFS.
    pub efficient_freq: Option<Frequency>,
    pub power_model: Option<PowerCoefficients>,
    pub transition_delay: Duration,
    pub locked: bool,
    pub transitioning: bool,
    pub pending_freq: Option<Frequency>,
    pub processors: Vec<ProcessorId>,
}

impl ClockDomain {
    pub fn new(
        id: ClockDomainId,
        freq_min: Frequency,
        freq_max: Frequency,
        transition_delay: Duration,
    ) -> Self {
        ClockDomain {
            id,
            current_freq: freq_max,
            freq_min,
            freq_max,
            opps: None,
            efficient_freq: None,
            power_model: None,
            transition_delay,
            locked: false,
            transitioning: false,
            pending_freq: None,
            processors: Vec::new(),
        }
    }

    /// Validates a requested frequency; does not mutate state (spec
    /// §4.4 "set_frequency").
    pub fn validate_frequency(&self, f: Frequency) -> crate::error::Result<()> {
        if self.locked {
            return Err(crate::error::Error::InvalidState(format!(
                "clock domain {} is locked",
                self.id
            )));
        }
        if self.transitioning {
            return Err(crate::error::Error::InvalidState(format!(
                "clock domain {} is already transitioning",
                self.id
            )));
        }
        if f < self.freq_min || f > self.freq_max {
            return Err(crate::error::Error::OutOfRange(format!(
                "frequency {:?} outside [{:?}, {:?}]",
                f, self.freq_min, self.freq_max
            )));
        }
        Ok(())
    }

    /// Smallest OPP ≥ `f`, clamped to the domain's supported range; with
    /// no OPP table, simply clamps to `[freq_min, freq_max]` (spec
    /// §4.4 "ceil_to_mode").
    pub fn ceil_to_mode(&self, f: Frequency) -> Frequency {
        match &self.opps {
            Some(opps) if !opps.is_empty() => {
                opps.iter().copied().find(|&o| o >= f).unwrap_or(*opps.last().unwrap())
            }
            _ => {
                if f < self.freq_min {
                    self.freq_min
                } else if f > self.freq_max {
                    self.freq_max
                } else {
                    f
                }
            }
        }
    }

    pub(crate) fn add_processor(&mut self, proc: ProcessorId) {
        self.processors.push(proc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_to_mode_picks_smallest_opp_at_or_above() {
        let mut cd = ClockDomain::new(ClockDomainId(0), Frequency(200.0), Frequency(2000.0), Duration::ZERO);
        cd.opps = Some(vec![200.0, 500.0, 800.0, 1000.0, 1500.0, 2000.0].into_iter().map(Frequency).collect());
        assert_eq!(cd.ceil_to_mode(Frequency(201.0)), Frequency(500.0));
        assert_eq!(cd.ceil_to_mode(Frequency(2000.0)), Frequency(2000.0));
        assert_eq!(cd.ceil_to_mode(Frequency(2500.0)), Frequency(2000.0));
    }

    #[test]
    fn ceil_to_mode_without_opps_clamps() {
        let cd = ClockDomain::new(ClockDomainId(0), Frequency(1000.0), Frequency(2000.0), Duration::ZERO);
        assert_eq!(cd.ceil_to_mode(Frequency(500.0)), Frequency(1000.0));
        assert_eq!(cd.ceil_to_mode(Frequency(3000.0)), Frequency(2000.0));
    }
}
