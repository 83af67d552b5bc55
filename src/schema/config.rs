//! Configuration types for the evolutionary test-suite search.
//!
//! Every section carries the defaults the engine was tuned with and can be
//! partially specified in JSON; missing fields fall back to those defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level engine configuration consumed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Island topology and per-island selection settings.
    #[serde(default)]
    pub islands: IslandConfig,
    /// Strategy/model bandit settings.
    #[serde(default)]
    pub bandit: BanditConfig,
    /// Novelty archive settings.
    #[serde(default)]
    pub novelty: NoveltyConfig,
    /// Coverage saturation detector settings.
    #[serde(default)]
    pub saturation: SaturationConfig,
    /// Weights for the composite fitness.
    #[serde(default)]
    pub fitness: FitnessWeights,
    /// Evaluate offspring concurrently.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Worker threads for offspring evaluation. `None` uses one per core.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            islands: IslandConfig::default(),
            bandit: BanditConfig::default(),
            novelty: NoveltyConfig::default(),
            saturation: SaturationConfig::default(),
            fitness: FitnessWeights::default(),
            parallel: default_parallel(),
            workers: None,
            random_seed: None,
        }
    }
}

fn default_parallel() -> bool {
    true
}

/// Island model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IslandConfig {
    /// Number of independently evolving islands.
    #[serde(default = "default_num_islands")]
    pub num_islands: usize,
    /// Individuals per island.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Generations between ring migrations.
    #[serde(default = "default_migration_interval")]
    pub migration_interval: usize,
    /// Fraction of the population sent to the neighbor on migration.
    #[serde(default = "default_migration_rate")]
    pub migration_rate: f64,
    /// Fraction of the population carried forward unchanged.
    #[serde(default = "default_elite_ratio")]
    pub elite_ratio: f64,
    /// Tournament sample size (capped at the population size).
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
}

impl Default for IslandConfig {
    fn default() -> Self {
        Self {
            num_islands: default_num_islands(),
            population_size: default_population_size(),
            migration_interval: default_migration_interval(),
            migration_rate: default_migration_rate(),
            elite_ratio: default_elite_ratio(),
            tournament_size: default_tournament_size(),
        }
    }
}

impl IslandConfig {
    /// Number of elites carried forward each generation.
    pub fn elite_count(&self) -> usize {
        ((self.population_size as f64 * self.elite_ratio).floor() as usize).max(1)
    }
}

fn default_num_islands() -> usize {
    4
}
fn default_population_size() -> usize {
    20
}
fn default_migration_interval() -> usize {
    10
}
fn default_migration_rate() -> f64 {
    0.1
}
fn default_elite_ratio() -> f64 {
    0.3
}
fn default_tournament_size() -> usize {
    3
}

/// Bandit configuration for strategy and model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditConfig {
    /// UCB1 exploration coefficient.
    #[serde(default = "default_exploration_coefficient")]
    pub exploration_coefficient: f64,
    /// Mutation strategy names, in registration order.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<String>,
    /// Generation backend names. Empty disables model selection.
    #[serde(default)]
    pub models: Vec<String>,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            exploration_coefficient: default_exploration_coefficient(),
            strategies: default_strategies(),
            models: Vec::new(),
        }
    }
}

fn default_exploration_coefficient() -> f64 {
    1.0
}
fn default_strategies() -> Vec<String> {
    [
        "add_edge_cases",
        "add_assertions",
        "parametrize",
        "add_exception_tests",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Novelty archive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyConfig {
    /// Candidates at least this similar to an archived one are rejected.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Maximum archive size.
    #[serde(default = "default_archive_size")]
    pub archive_size: usize,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            archive_size: default_archive_size(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.9
}
fn default_archive_size() -> usize {
    100
}

/// Coverage saturation detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaturationConfig {
    /// Trailing window compared for improvement.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Improvement at or below this value counts as a plateau.
    #[serde(default = "default_improvement_threshold")]
    pub improvement_threshold: f64,
    /// Records required before saturation can be declared.
    #[serde(default = "default_min_generations")]
    pub min_generations: usize,
    /// Metric tracked by the detector. Falls back to fitness when absent.
    #[serde(default = "default_saturation_metric")]
    pub metric: String,
}

impl Default for SaturationConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            improvement_threshold: default_improvement_threshold(),
            min_generations: default_min_generations(),
            metric: default_saturation_metric(),
        }
    }
}

fn default_window_size() -> usize {
    5
}
fn default_improvement_threshold() -> f64 {
    0.5
}
fn default_min_generations() -> usize {
    10
}
fn default_saturation_metric() -> String {
    "coverage".to_string()
}

/// Weights of the composite fitness components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessWeights {
    /// Weight of normalized coverage improvement.
    #[serde(default = "default_coverage_weight")]
    pub coverage: f64,
    /// Weight of the seeded-bug detection rate.
    #[serde(default = "default_bug_detection_weight")]
    pub bug_detection: f64,
    /// Weight of execution efficiency.
    #[serde(default = "default_efficiency_weight")]
    pub efficiency: f64,
    /// Weight of test-code quality.
    #[serde(default = "default_maintainability_weight")]
    pub maintainability: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            coverage: default_coverage_weight(),
            bug_detection: default_bug_detection_weight(),
            efficiency: default_efficiency_weight(),
            maintainability: default_maintainability_weight(),
        }
    }
}

fn default_coverage_weight() -> f64 {
    0.4
}
fn default_bug_detection_weight() -> f64 {
    0.35
}
fn default_efficiency_weight() -> f64 {
    0.15
}
fn default_maintainability_weight() -> f64 {
    0.1
}

/// Configuration for the command-line driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// What is being tested and where the seed suite lives.
    pub target: TargetConfig,
    /// External programs acting as oracles.
    pub commands: CommandConfig,
    /// Generations to evolve.
    #[serde(default = "default_generations")]
    pub generations: usize,
    /// Directory receiving the run report.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_generations() -> usize {
    10
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

/// Target program description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Opaque descriptor handed to the mutation oracle (usually a module path).
    pub descriptor: String,
    /// Initial test suite.
    pub seed_path: PathBuf,
    /// Bugs seeded into the target's faulty build.
    #[serde(default = "default_seeded_bugs")]
    pub seeded_bugs: usize,
}

fn default_seeded_bugs() -> usize {
    5
}

/// What the fitness command prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluateOutput {
    /// Raw measurements, weighted by the engine's fitness weights.
    #[default]
    Measurement,
    /// A finished evaluation (`fitness` plus metrics); weights are not applied.
    Evaluation,
}

/// External oracle commands. Each is a program followed by its arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Standard mutation command.
    pub mutate: Vec<String>,
    /// Mutation command used once coverage saturates.
    #[serde(default)]
    pub explore: Option<Vec<String>>,
    /// Fitness command.
    pub evaluate: Vec<String>,
    /// Output format of the fitness command.
    #[serde(default)]
    pub evaluate_output: EvaluateOutput,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            target: TargetConfig {
                descriptor: "calculator.py".to_string(),
                seed_path: PathBuf::from("test_calculator_initial.py"),
                seeded_bugs: default_seeded_bugs(),
            },
            commands: CommandConfig {
                mutate: vec!["python3".to_string(), "mutate.py".to_string()],
                explore: None,
                evaluate: vec!["python3".to_string(), "evaluate.py".to_string()],
                evaluate_output: EvaluateOutput::default(),
                timeout_secs: default_timeout_secs(),
            },
            generations: default_generations(),
            output_dir: default_output_dir(),
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Number of islands must be at least 1")]
    NoIslands,
    #[error("Population size must be at least 1")]
    PopulationTooSmall,
    #[error("Migration interval must be at least 1")]
    InvalidMigrationInterval,
    #[error("Tournament size must be at least 1")]
    InvalidTournamentSize,
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },
    #[error("Exploration coefficient must be positive, got {0}")]
    InvalidExplorationCoefficient(f64),
    #[error("Bandit needs at least one arm")]
    NoArms,
    #[error("Duplicate bandit arm: {0}")]
    DuplicateArm(String),
    #[error("Archive size must be at least 1")]
    InvalidArchiveSize,
    #[error("Saturation window must be at least 1")]
    InvalidWindow,
    #[error("Invalid fitness weight: {0}")]
    InvalidWeight(String),
    #[error("Worker count must be at least 1")]
    InvalidWorkers,
    #[error("Oracle command must not be empty: {0}")]
    EmptyCommand(&'static str),
}

fn check_unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { name, value })
    }
}

impl IslandConfig {
    /// Validate island settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_islands < 1 {
            return Err(ConfigError::NoIslands);
        }
        if self.population_size < 1 {
            return Err(ConfigError::PopulationTooSmall);
        }
        if self.migration_interval < 1 {
            return Err(ConfigError::InvalidMigrationInterval);
        }
        if self.tournament_size < 1 {
            return Err(ConfigError::InvalidTournamentSize);
        }
        check_unit("migration_rate", self.migration_rate)?;
        check_unit("elite_ratio", self.elite_ratio)?;
        Ok(())
    }
}

impl BanditConfig {
    /// Validate bandit settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.exploration_coefficient > 0.0) {
            return Err(ConfigError::InvalidExplorationCoefficient(
                self.exploration_coefficient,
            ));
        }
        if self.strategies.is_empty() {
            return Err(ConfigError::NoArms);
        }
        for names in [&self.strategies, &self.models] {
            for (i, name) in names.iter().enumerate() {
                if names[..i].contains(name) {
                    return Err(ConfigError::DuplicateArm(name.clone()));
                }
            }
        }
        Ok(())
    }
}

impl NoveltyConfig {
    /// Validate novelty settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("similarity_threshold", self.similarity_threshold)?;
        if self.archive_size < 1 {
            return Err(ConfigError::InvalidArchiveSize);
        }
        Ok(())
    }
}

impl SaturationConfig {
    /// Validate saturation settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < 1 {
            return Err(ConfigError::InvalidWindow);
        }
        Ok(())
    }
}

impl FitnessWeights {
    /// Validate weights.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("coverage", self.coverage),
            ("bug_detection", self.bug_detection),
            ("efficiency", self.efficiency),
            ("maintainability", self.maintainability),
        ];
        for (name, weight) in weights {
            if !(weight >= 0.0) {
                return Err(ConfigError::InvalidWeight(format!(
                    "{} weight {} must be non-negative",
                    name, weight
                )));
            }
        }
        if weights.iter().all(|(_, w)| *w == 0.0) {
            return Err(ConfigError::InvalidWeight(
                "at least one weight must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Validate the whole engine configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.islands.validate()?;
        self.bandit.validate()?;
        self.novelty.validate()?;
        self.saturation.validate()?;
        self.fitness.validate()?;
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidWorkers);
        }
        Ok(())
    }
}

impl RunConfig {
    /// Validate engine and command settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.commands.mutate.is_empty() {
            return Err(ConfigError::EmptyCommand("mutate"));
        }
        if self.commands.evaluate.is_empty() {
            return Err(ConfigError::EmptyCommand("evaluate"));
        }
        if self.commands.explore.as_ref().is_some_and(|c| c.is_empty()) {
            return Err(ConfigError::EmptyCommand("explore"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn test_elite_count() {
        let config = IslandConfig {
            population_size: 10,
            elite_ratio: 0.3,
            migration_rate: 0.1,
            ..Default::default()
        };
        assert_eq!(config.elite_count(), 3);

        let tiny = IslandConfig {
            population_size: 2,
            elite_ratio: 0.0,
            migration_rate: 0.0,
            ..Default::default()
        };
        assert_eq!(tiny.elite_count(), 1);
    }

    #[test]
    fn test_rejects_zero_islands() {
        let mut config = EngineConfig::default();
        config.islands.num_islands = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NoIslands)));
    }

    #[test]
    fn test_rejects_out_of_range_rates() {
        let mut config = EngineConfig::default();
        config.islands.migration_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfUnitRange {
                name: "migration_rate",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_duplicate_arms() {
        let mut config = EngineConfig::default();
        config.bandit.strategies = vec!["a".into(), "b".into(), "a".into()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateArm(name)) if name == "a"
        ));
    }

    #[test]
    fn test_rejects_bad_weights() {
        let mut weights = FitnessWeights::default();
        weights.efficiency = -0.1;
        assert!(weights.validate().is_err());

        let zero = FitnessWeights {
            coverage: 0.0,
            bug_detection: 0.0,
            efficiency: 0.0,
            maintainability: 0.0,
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "target": {"descriptor": "calc.py", "seed_path": "test_calc.py"},
            "commands": {"mutate": ["mut"], "evaluate": ["eval"]},
            "engine": {"islands": {"num_islands": 2}}
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.engine.islands.num_islands, 2);
        assert_eq!(config.engine.islands.population_size, 20);
        assert_eq!(config.engine.novelty.archive_size, 100);
        assert_eq!(config.commands.timeout_secs, 60);
        assert_eq!(config.generations, 10);
        assert_eq!(config.target.seeded_bugs, 5);
        assert_eq!(config.commands.evaluate_output, EvaluateOutput::Measurement);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_evaluate_output_names() {
        let commands: CommandConfig = serde_json::from_str(
            r#"{"mutate": ["m"], "evaluate": ["e"], "evaluate_output": "evaluation"}"#,
        )
        .unwrap();
        assert_eq!(commands.evaluate_output, EvaluateOutput::Evaluation);
    }

    #[test]
    fn test_serialization() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.islands.population_size, config.islands.population_size);
        assert_eq!(parsed.fitness, config.fitness);
    }
}
