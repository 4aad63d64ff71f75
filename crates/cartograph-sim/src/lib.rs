//! cartograph-sim: deterministic simulation of editing sessions.
//!
//! A [`Simulator`] drives one session against a [`remote::SimulatedRemote`]
//! for a number of rounds. Each round may let another mapper edit the
//! remote, then either saves or applies one random local edit, and finally
//! runs the [`oracle`] checks. Everything is derived from one seed, so a
//! failing seed replays exactly.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` for simulation plumbing; invariant
//!   failures are data ([`oracle::InvariantViolation`]), never errors.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod campaign;
pub mod oracle;
pub mod remote;
pub mod rng;
pub mod session;

use anyhow::{Context, Result, bail};
use cartograph_core::config::{HistoryConfig, MergeConfig, SaveConfig};
use cartograph_core::save::{RemoteError, SaveCoordinator, SaveError, SaveOutcome};
use cartograph_core::{Entity, EntityId, EntityKind, Loc, Strategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::oracle::InvariantViolation;
use crate::remote::{FaultConfig, RemoteStats, SimulatedRemote};
use crate::rng::DeterministicRng;
use crate::session::{KEYS, LocalOp, Session, grid_loc};

/// Saves attempted per round before the session gives up on its conflicts.
const MAX_SAVE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub rounds: u64,
    /// Chance per round that another mapper edits the remote first.
    pub remote_edit_percent: u8,
    /// Chance per round of saving instead of editing locally.
    pub save_percent: u8,
    pub fault: FaultConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            rounds: 40,
            remote_edit_percent: 30,
            save_percent: 15,
            fault: FaultConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns an error if a parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        for (name, percent) in [
            ("remote_edit_percent", self.remote_edit_percent),
            ("save_percent", self.save_percent),
            ("unavailable_percent", self.fault.unavailable_percent),
            ("race_percent", self.fault.race_percent),
        ] {
            if percent > 100 {
                bail!("{name} must be at most 100, got {percent}");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    RemoteTag { id: EntityId, key: String, value: String },
    RemoteMove { id: EntityId, to: Loc },
    Local { op: LocalOp, applied: bool },
    Conflicts { ids: Vec<EntityId>, resolved: Vec<Strategy> },
    Uploaded { modified: usize, created: usize, deleted: usize },
    NothingToSave,
    SaveFailed { error: String },
    /// The session was thrown away and loaded again from the remote.
    Reload { entities: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub round: u64,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub trace: Vec<TraceEvent>,
    pub violations: Vec<InvariantViolation>,
    pub uploads: usize,
    pub conflicts_resolved: usize,
    pub remote: RemoteStats,
    /// At least one conflict was resolved or one stale upload was retried.
    pub interesting_state_reached: bool,
}

/// The starting map: three streets of four vertices each, and three points.
fn seed_map() -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut next_node = 0_i64;
    for street in 0..3_i64 {
        let y = f64::from(u8::try_from(street).unwrap_or(0)) * 3.0;
        let mut nodes = Vec::new();
        for x in 0..4_u8 {
            next_node += 1;
            let id = EntityId::from_parts(EntityKind::Node, next_node);
            entities.push(Entity::node(id.clone(), [f64::from(x) * 2.0, y]).with_version(1));
            nodes.push(id);
        }
        entities.push(
            Entity::way(EntityId::from_parts(EntityKind::Way, street + 1), nodes)
                .with_version(1)
                .with_tag("highway", "residential")
                .with_tag("name", format!("Street {}", street + 1)),
        );
    }
    for (i, x) in [1.0, 4.0, 7.0].into_iter().enumerate() {
        next_node += 1;
        entities.push(
            Entity::node(EntityId::from_parts(EntityKind::Node, next_node), [x, 1.5])
                .with_version(1)
                .with_tag("amenity", if i % 2 == 0 { "bench" } else { "cafe" }),
        );
    }
    entities
}

pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    remote: SimulatedRemote,
    session: Session,
    history_config: HistoryConfig,
    coordinator: SaveCoordinator,
    trace: Vec<TraceEvent>,
    violations: Vec<InvariantViolation>,
    uploads: usize,
    conflicts_resolved: usize,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate().context("invalid simulation config")?;
        let rng = DeterministicRng::new(config.seed);
        let remote = SimulatedRemote::new(rng.fork(1), config.fault, seed_map());
        let history_config = HistoryConfig {
            transition_ms: 0,
            ..HistoryConfig::default()
        };
        let session = Session::load(&remote, &history_config);
        Ok(Self {
            config,
            rng: rng.fork(2),
            remote,
            session,
            history_config,
            coordinator: SaveCoordinator::new(SaveConfig::default(), MergeConfig::default()),
            trace: Vec::new(),
            violations: Vec::new(),
            uploads: 0,
            conflicts_resolved: 0,
        })
    }

    /// Run every round.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving a conflict fails, which only happens
    /// when the save flow hands out an item without choices.
    pub fn run(&mut self) -> Result<SimulationResult> {
        for round in 0..self.config.rounds {
            if self.rng.hit_rate_percent(self.config.remote_edit_percent) {
                self.remote_edit(round);
            }
            if self.rng.hit_rate_percent(self.config.save_percent) {
                self.save(round)?;
            } else if let Some(op) = self.session.plan(&mut self.rng) {
                let applied = self.session.apply(&op);
                self.record(round, TraceEventKind::Local { op, applied });
            }
            let checked = oracle::check_session(&mut self.session, &self.history_config);
            self.flag(round, checked.violations);
        }

        let remote = self.remote.stats();
        Ok(SimulationResult {
            trace: self.trace.clone(),
            violations: self.violations.clone(),
            uploads: self.uploads,
            conflicts_resolved: self.conflicts_resolved,
            remote,
            interesting_state_reached: self.conflicts_resolved > 0 || remote.uploads_stale > 0,
        })
    }

    fn record(&mut self, round: u64, kind: TraceEventKind) {
        self.trace.push(TraceEvent { round, kind });
    }

    fn flag(&mut self, round: u64, violations: impl IntoIterator<Item = InvariantViolation>) {
        for violation in violations {
            warn!(round, ?violation, "invariant violated");
            self.violations.push(violation);
        }
    }

    fn remote_edit(&mut self, round: u64) {
        let mut ids = self.remote.ids_of(EntityKind::Node);
        ids.extend(self.remote.ids_of(EntityKind::Way));
        let Some(id) = self.rng.pick(&ids).cloned() else {
            return;
        };
        if id.kind() == EntityKind::Node && self.rng.hit_rate_percent(30) {
            let to = grid_loc(&mut self.rng);
            if self.remote.move_node(&id, to) {
                self.record(round, TraceEventKind::RemoteMove { id, to });
            }
            return;
        }
        let Some(key) = self.rng.pick(&KEYS).map(|k| (*k).to_string()) else {
            return;
        };
        let value = format!("remote {round}");
        if self.remote.edit_tag(&id, &key, &value) {
            self.session.note_remote_edit(id.clone(), &key, &value);
            self.record(round, TraceEventKind::RemoteTag { id, key, value });
        }
    }

    fn reload(&mut self, round: u64) {
        self.session = Session::load(&self.remote, &self.history_config);
        let entities = self.session.history().base().entities().len();
        self.record(round, TraceEventKind::Reload { entities });
    }

    fn save(&mut self, round: u64) -> Result<()> {
        for attempt in 0..MAX_SAVE_ATTEMPTS {
            let before_len = self.session.history().len();
            let before = self.session.history().graph().clone();
            let outcome = self
                .coordinator
                .save(self.session.history_mut(), &mut self.remote);
            debug!(round, attempt, "save attempt finished");

            match outcome {
                Ok(SaveOutcome::NoChanges) => {
                    let rollback = oracle::check_rollback(before_len, &before, self.session.history());
                    self.flag(round, rollback);
                    self.record(round, TraceEventKind::NothingToSave);
                    return Ok(());
                }
                Ok(SaveOutcome::Conflicts(items)) => {
                    let rollback = oracle::check_rollback(before_len, &before, self.session.history());
                    self.flag(round, rollback);
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in &items {
                        let choice = self.rng.index(item.choices.len()).unwrap_or(item.chosen);
                        let strategy = item
                            .choices
                            .get(choice)
                            .map(|c| c.strategy)
                            .context("conflict offered no choices")?;
                        let graph = self.session.history().graph().clone();
                        self.session.note_resolution(item, strategy, &graph);
                        self.coordinator
                            .resolve(self.session.history_mut(), item, choice)
                            .context("resolving a conflict")?;
                        resolved.push(strategy);
                    }
                    self.conflicts_resolved += items.len();
                    let ids = items.into_iter().map(|item| item.id).collect();
                    self.record(round, TraceEventKind::Conflicts { ids, resolved });
                }
                Ok(SaveOutcome::Uploaded { changes }) => {
                    let lost = oracle::check_remote_edits(&self.session, &self.remote);
                    self.flag(round, lost);
                    self.uploads += 1;
                    self.record(
                        round,
                        TraceEventKind::Uploaded {
                            modified: changes.modified.len(),
                            created: changes.created.len(),
                            deleted: changes.deleted.len(),
                        },
                    );
                    self.reload(round);
                    return Ok(());
                }
                Err(e) => {
                    let rollback = oracle::check_rollback(before_len, &before, self.session.history());
                    self.flag(round, rollback);
                    self.record(round, TraceEventKind::SaveFailed { error: e.to_string() });
                    // Local edits the remote keeps rejecting are abandoned.
                    if e == SaveError::Remote(RemoteError::VersionConflict) {
                        self.reload(round);
                    }
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
