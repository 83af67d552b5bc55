//! Record types produced by the evolutionary search.
//!
//! These are plain values: an [`Individual`] is never mutated after it is
//! scored, and copying one between islands is a clone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named metric values reported by the fitness oracle.
pub type Metrics = BTreeMap<String, f64>;

/// Output of a fitness oracle call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Scalar fitness. Higher is better; no fixed range.
    pub fitness: f64,
    /// Supporting metrics (coverage, bug detection, ...).
    #[serde(default)]
    pub metrics: Metrics,
}

impl Evaluation {
    /// Evaluation without metrics.
    pub fn new(fitness: f64) -> Self {
        Self {
            fitness,
            metrics: Metrics::new(),
        }
    }

    /// Add a metric.
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// A scored candidate test suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    /// Candidate text.
    pub code: String,
    /// Fitness score.
    pub fitness: f64,
    /// Metrics reported alongside the fitness.
    pub metrics: Metrics,
    /// Generation the individual was created in.
    pub generation: usize,
    /// Island currently owning the individual.
    pub island_id: usize,
    /// Mutation strategy that produced it. `None` for the seed.
    #[serde(default)]
    pub strategy: Option<String>,
}

impl Individual {
    /// Build an individual from an evaluation.
    pub fn scored(
        code: String,
        evaluation: Evaluation,
        generation: usize,
        island_id: usize,
        strategy: Option<String>,
    ) -> Self {
        Self {
            code,
            fitness: evaluation.fitness,
            metrics: evaluation.metrics,
            generation,
            island_id,
            strategy,
        }
    }

    /// Look up a metric.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Return the fittest individual, preferring the earliest on ties.
pub fn fittest(individuals: &[Individual]) -> Option<&Individual> {
    individuals
        .iter()
        .reduce(|best, c| if c.fitness > best.fitness { c } else { best })
}

/// Per-arm bandit statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmStats {
    pub name: String,
    pub num_plays: u64,
    pub total_reward: f64,
    pub average_reward: f64,
    /// Share of all plays that went to this arm.
    pub play_rate: f64,
}

/// Statistics of the strategy (and optional model) bandits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BanditStats {
    pub strategies: Vec<ArmStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<ArmStats>>,
}

/// Novelty archive statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub size: usize,
    pub diversity_score: f64,
    pub avg_fitness: f64,
}

/// Coverage saturation statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaturationStats {
    pub total_generations: usize,
    pub current_coverage: f64,
    pub initial_coverage: f64,
    pub total_improvement: f64,
    pub recent_improvement: f64,
    pub is_saturated: bool,
    pub saturation_generation: Option<usize>,
}

/// Statistics of one island.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IslandStats {
    pub island_id: usize,
    pub best_fitness: f64,
    pub avg_fitness: f64,
    pub generation: usize,
}

/// Statistics of the whole island model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub generation: usize,
    pub global_best_fitness: f64,
    pub islands: Vec<IslandStats>,
}

/// Which mutation oracle drives the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MutationMode {
    /// The standard (template) mutation oracle.
    #[default]
    Standard,
    /// The exploratory oracle, enabled once coverage saturates.
    Exploratory,
}

/// Summary of one generation of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    pub best_fitness: f64,
    pub best_metrics: Metrics,
    /// Fitness of each island's best offspring this generation.
    pub island_bests: Vec<f64>,
    pub mode: MutationMode,
    /// Whether the global best was novel enough to enter the archive.
    pub archived: bool,
    pub diversity_score: f64,
    pub saturated: bool,
}

/// Final result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// The scored seed.
    pub initial: Individual,
    /// Best individual found.
    pub best: Individual,
    /// Every new global best, in discovery order.
    pub lineage: Vec<Individual>,
    /// Per-generation summaries.
    pub generations: Vec<GenerationRecord>,
    pub bandit: BanditStats,
    pub archive: ArchiveStats,
    pub saturation: SaturationStats,
    pub model: ModelStats,
    /// Fitness oracle calls, seed evaluation included.
    pub total_evaluations: u64,
    pub elapsed_seconds: f64,
}

impl RunResult {
    /// Fitness gained over the seed.
    pub fn improvement(&self) -> f64 {
        self.best.fitness - self.initial.fitness
    }
}
