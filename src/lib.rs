//! Shinka QA - Evolutionary search for high-quality test suites.
//!
//! This crate evolves a test suite against a fixed target program with an
//! island-model genetic algorithm. Candidates are opaque text; a mutation
//! oracle rewrites them and a fitness oracle scores them.
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `schema`: Configuration and record types (serde-serializable)
//! - `evolution`: The search engine (islands, bandits, novelty archive,
//!   saturation detector, fitness weighting, oracles)
//! - `report`: Writing finished runs to disk
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use shinka_qa::{
//!     evolution::{CommandOracle, EvolutionRun, RunOracles},
//!     report::write_report,
//!     schema::RunConfig,
//! };
//!
//! let config = RunConfig::default();
//! let timeout = Duration::from_secs(config.commands.timeout_secs);
//! let mutate = CommandOracle::from_argv("mutate", &config.commands.mutate, timeout)?;
//! let evaluate = CommandOracle::from_argv("evaluate", &config.commands.evaluate, timeout)?;
//!
//! let seed = std::fs::read_to_string(&config.target.seed_path)?;
//! let mut run = EvolutionRun::new(&config.engine, config.target.descriptor.clone())?;
//! let result = run.run(&seed, config.generations, RunOracles::new(&mutate, &evaluate), |_| {})?;
//!
//! write_report(&config.output_dir, &result)?;
//! println!("Best fitness: {:.3}", result.best.fitness);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod evolution;
pub mod report;
pub mod schema;

// Re-export commonly used types
pub use evolution::{EngineError, EvolutionRun, IslandModel, OracleError, RunOracles};
pub use schema::{EngineConfig, Evaluation, Individual, RunConfig, RunResult};
