//! Campaign runner: many seeds with shared parameters, collecting pass/fail
//! results and the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::oracle::InvariantViolation;
use crate::remote::FaultConfig;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Parameters shared by every seed of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Seeds to execute, e.g. `0..100`.
    pub seed_range: Range<u64>,
    pub rounds: u64,
    pub remote_edit_percent: u8,
    pub save_percent: u8,
    /// Percentage of remote calls failing as unavailable.
    pub fault_unavailable_percent: u8,
    /// Percentage of uploads racing a concurrent remote edit.
    pub fault_race_percent: u8,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            rounds: sim.rounds,
            remote_edit_percent: sim.remote_edit_percent,
            save_percent: sim.save_percent,
            fault_unavailable_percent: sim.fault.unavailable_percent,
            fault_race_percent: sim.fault.race_percent,
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub const fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            rounds: self.rounds,
            remote_edit_percent: self.remote_edit_percent,
            save_percent: self.save_percent,
            fault: FaultConfig {
                unavailable_percent: self.fault_unavailable_percent,
                race_percent: self.fault_race_percent,
            },
        }
    }

    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.sim_config_for_seed(self.seed_range.start).validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that resolved a conflict or retried a stale upload.
    pub interesting_states_reached: usize,
    pub uploads: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Full result of replaying one seed.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    pub seed: u64,
    pub result: SimulationResult,
}

impl DetailedTrace {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.result.violations.is_empty()
    }
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation hits an
/// internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
        uploads: 0,
    };

    for seed in config.seed_range.clone() {
        report.seeds_run += 1;
        let result = run_seed(seed, config)?;
        report.uploads += result.uploads;
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }
        if result.violations.is_empty() {
            report.seeds_passed += 1;
            continue;
        }
        report.first_failure.get_or_insert(seed);
        report.failures.push(SeedFailure {
            seed,
            violations: result.violations.iter().map(format_violation).collect(),
        });
    }

    Ok(report)
}

/// Run a single seed; `Ok(Err(violations))` when an invariant failed.
///
/// # Errors
///
/// Returns an error if the simulation itself fails.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let result = run_seed(seed, config)?;
    if result.violations.is_empty() {
        Ok(Ok(()))
    } else {
        Ok(Err(result.violations))
    }
}

/// Replay a single seed with its full trace.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    Ok(DetailedTrace {
        seed,
        result: run_seed(seed, config)?,
    })
}

fn run_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    Simulator::new(config.sim_config_for_seed(seed))?.run()
}

/// Human-readable form of a violation.
#[must_use]
pub fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::ParentIndex { way, node } => {
            format!("ParentIndex: {way} and {node} disagree about membership")
        }
        InvariantViolation::SpatialIndex { missing, extra } => {
            format!("SpatialIndex: tree query differs from a full scan (missing={missing:?}, extra={extra:?})")
        }
        InvariantViolation::UndoRedo { index, detail } => {
            format!("UndoRedo: at edit {index}: {detail}")
        }
        InvariantViolation::SavedHistory { detail } => format!("SavedHistory: {detail}"),
        InvariantViolation::RemoteEditLost {
            id,
            key,
            expected,
            found,
        } => {
            format!("RemoteEditLost: {id} {key}={expected:?} was overwritten with {found:?}")
        }
        InvariantViolation::SaveRollback { before, after } => {
            format!("SaveRollback: stack had {before} edits before the save and {after} after")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> CampaignConfig {
        CampaignConfig {
            seed_range: 0..10,
            rounds: 24,
            fault_unavailable_percent: 0,
            fault_race_percent: 0,
            ..CampaignConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(CampaignConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_seed_range_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_rounds_rejected() {
        let config = CampaignConfig {
            rounds: 0,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sim_config_for_seed_uses_correct_seed() {
        let config = CampaignConfig::default();
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.rounds, config.rounds);
        assert_eq!(sim.fault.race_percent, config.fault_race_percent);
    }

    #[test]
    fn quiet_campaign_passes() {
        let report = run_campaign(&quiet()).expect("campaign should not error");
        assert_eq!(report.seeds_run, 10);
        assert!(report.all_passed(), "{:?}", report.failures);
        assert!(report.first_failure.is_none());
    }

    #[test]
    fn faulty_campaign_passes_and_gets_interesting() {
        let config = CampaignConfig {
            seed_range: 0..40,
            rounds: 40,
            remote_edit_percent: 60,
            save_percent: 25,
            fault_unavailable_percent: 10,
            fault_race_percent: 30,
        };
        let report = run_campaign(&config).expect("campaign should not error");
        assert!(
            report.all_passed(),
            "{} failures, first at seed {:?}: {:?}",
            report.failures.len(),
            report.first_failure,
            report.failures.first()
        );
        assert!(report.interesting_states_reached > 0);
        assert!(report.uploads > 0);
    }

    #[test]
    fn single_seed_passes() {
        let outcome = run_single_seed(0, &quiet()).expect("sim should not error");
        assert!(outcome.is_ok(), "{outcome:?}");
    }

    #[test]
    fn replay_is_deterministic() {
        let config = CampaignConfig::default();
        let a = replay_seed(7, &config).expect("replay 1");
        let b = replay_seed(7, &config).expect("replay 2");
        assert_eq!(a.result, b.result);
        assert!(!a.result.trace.is_empty());
    }

    #[test]
    fn report_serializes_to_json() {
        let report = CampaignReport {
            seeds_run: 10,
            seeds_passed: 9,
            first_failure: Some(7),
            failures: vec![SeedFailure {
                seed: 7,
                violations: vec!["SaveRollback: stack had 3 edits before the save and 4 after".into()],
            }],
            interesting_states_reached: 5,
            uploads: 12,
        };
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"seeds_run\":10"));
        assert!(json.contains("\"first_failure\":7"));
    }

    #[test]
    fn violations_format_readably() {
        let v = InvariantViolation::RemoteEditLost {
            id: "w1".parse().expect("id"),
            key: "name".into(),
            expected: "remote 3".into(),
            found: Some("local 9".into()),
        };
        let s = format_violation(&v);
        assert!(s.starts_with("RemoteEditLost"));
        assert!(s.contains("w1 name"));
    }
}
