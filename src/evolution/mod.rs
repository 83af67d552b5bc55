//! Evolutionary search over test suites.
//!
//! # Overview
//!
//! The search engine consists of:
//!
//! - **Islands** (`island`, `island_model`): elitist populations with tournament
//!   selection, evolved in lockstep with periodic ring migration
//! - **Bandits** (`bandit`): UCB1 selection of mutation strategies and backends
//! - **Novelty Archive** (`novelty`): structural deduplication of candidates
//! - **Saturation Detector** (`saturation`): plateau detection that gates
//!   exploratory mutation
//! - **Fitness** (`fitness`): weighted combination of coverage, bug detection,
//!   efficiency and maintainability
//! - **Oracles** (`oracle`, `command`): the mutation and fitness contracts, and
//!   adapters running external programs
//!
//! # Example
//!
//! ```rust,no_run
//! use shinka_qa::evolution::{EvolutionRun, OracleError, RunOracles};
//! use shinka_qa::schema::{EngineConfig, Evaluation};
//!
//! let mutate = |code: &str, _target: &str, strategy: &str| -> Result<String, OracleError> {
//!     Ok(format!("{code}\n# {strategy}"))
//! };
//! let score = |code: &str| -> Result<Evaluation, OracleError> {
//!     Ok(Evaluation::new(code.lines().count() as f64))
//! };
//!
//! let mut run = EvolutionRun::new(&EngineConfig::default(), "calculator.py")?;
//! let result = run.run("def test_add(): pass", 10, RunOracles::new(&mutate, &score), |record| {
//!     println!("Generation {}: best fitness = {:.3}", record.generation, record.best_fitness);
//! })?;
//! println!("Improved by {:.3}", result.improvement());
//! # Ok::<(), shinka_qa::evolution::EngineError>(())
//! ```

mod bandit;
mod command;
mod error;
mod fitness;
mod island;
mod island_model;
mod novelty;
mod oracle;
mod run;
mod saturation;
mod shared;

pub use bandit::{AdaptiveBanditSelector, Arm, ModelBandit, Selection, StrategyBandit, Ucb1Bandit};
pub use command::{CommandOracle, STRATEGY_ENV, TARGET_ENV};
pub use error::{EngineError, OracleError, OracleKind};
pub use fitness::{
    Baseline, CodeQuality, METRIC_BUGS_DETECTED, METRIC_COVERAGE, METRIC_COVERAGE_IMPROVEMENT,
    METRIC_EFFICIENCY, METRIC_EXECUTION_TIME, METRIC_MAINTAINABILITY, QualityMeasurement,
    QualityMeter, QualityScorer, ScoredFitness,
};
pub use island::{GenerationPlan, Island, OffspringPlan, breed};
pub use island_model::IslandModel;
pub use novelty::{ArchiveEntry, CodeFeatures, CodeHash, NoveltyArchive, content_hash};
pub use oracle::{FitnessOracle, FixedStrategy, MutationOracle, Oracles, StrategySelector, TimeLimited};
pub use run::{EvolutionRun, RunOracles};
pub use saturation::{CoverageRecord, SaturationDetector};
pub use shared::Shared;
