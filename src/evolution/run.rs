//! The full evolution loop.
//!
//! [`EvolutionRun`] drives an [`IslandModel`] one generation at a time and
//! after each generation consults the auxiliary structures: the global best
//! is offered to the novelty archive, its tracked metric is fed to the
//! saturation detector, and once coverage saturates the run switches to the
//! exploratory mutation oracle when one is available.

use std::time::Instant;

use crate::schema::{EngineConfig, GenerationRecord, Individual, MutationMode, RunResult};

use super::bandit::AdaptiveBanditSelector;
use super::error::EngineError;
use super::island_model::IslandModel;
use super::novelty::NoveltyArchive;
use super::oracle::{FitnessOracle, MutationOracle, Oracles};
use super::saturation::SaturationDetector;
use super::shared::Shared;

/// Oracles for a whole run.
#[derive(Clone, Copy)]
pub struct RunOracles<'a> {
    /// Mutation oracle used until coverage saturates.
    pub standard: &'a dyn MutationOracle,
    /// Mutation oracle used after saturation, if any.
    pub exploratory: Option<&'a dyn MutationOracle>,
    pub fitness: &'a dyn FitnessOracle,
}

impl<'a> RunOracles<'a> {
    pub fn new(standard: &'a dyn MutationOracle, fitness: &'a dyn FitnessOracle) -> Self {
        Self {
            standard,
            exploratory: None,
            fitness,
        }
    }

    pub fn with_exploratory(mut self, exploratory: &'a dyn MutationOracle) -> Self {
        self.exploratory = Some(exploratory);
        self
    }

    fn mutation(&self, mode: MutationMode) -> &'a dyn MutationOracle {
        match (mode, self.exploratory) {
            (MutationMode::Exploratory, Some(exploratory)) => exploratory,
            _ => self.standard,
        }
    }
}

/// Island model plus bandit, novelty archive and saturation detector.
pub struct EvolutionRun {
    model: IslandModel,
    bandit: Shared<AdaptiveBanditSelector>,
    archive: NoveltyArchive,
    saturation: SaturationDetector,
    metric: String,
    mode: MutationMode,
    target: String,
}

impl EvolutionRun {
    pub fn new(config: &EngineConfig, target: impl Into<String>) -> Result<Self, EngineError> {
        let model = IslandModel::new(config)?;
        let bandit = Shared::new(AdaptiveBanditSelector::from_config(&config.bandit)?);

        Ok(Self {
            model,
            bandit,
            archive: NoveltyArchive::from_config(&config.novelty),
            saturation: SaturationDetector::from_config(&config.saturation)?,
            metric: config.saturation.metric.clone(),
            mode: MutationMode::Standard,
            target: target.into(),
        })
    }

    /// Evolve `seed_code` for `generations` generations.
    ///
    /// `progress` receives a record after every generation. The first oracle
    /// failure aborts the run.
    pub fn run<F>(
        &mut self,
        seed_code: &str,
        generations: usize,
        oracles: RunOracles<'_>,
        mut progress: F,
    ) -> Result<RunResult, EngineError>
    where
        F: FnMut(&GenerationRecord),
    {
        let started = Instant::now();

        let initial = self.model.initialize(seed_code, oracles.fitness)?;
        self.archive.add(&initial.code, initial.fitness);
        let mut lineage = vec![initial.clone()];
        let mut records = Vec::with_capacity(generations);

        for _ in 0..generations {
            let mode = self.mode;
            let engine_oracles = Oracles::new(oracles.mutation(mode), oracles.fitness)
                .with_strategies(&self.bandit);

            let mut generation = 0;
            let mut island_bests = Vec::new();
            let best = self
                .model
                .evolve(1, engine_oracles, &self.target, |g, bests, _| {
                    generation = g;
                    island_bests = bests.iter().map(|b| b.fitness).collect();
                })?;

            if lineage.last().is_none_or(|last| best.fitness > last.fitness) {
                lineage.push(best.clone());
            }

            let archived = self.archive.add_if_novel(&best.code, best.fitness);
            self.saturation
                .add_coverage(generation, self.tracked_value(&best));
            let saturated = self.saturation.is_saturated();

            if saturated && mode == MutationMode::Standard && oracles.exploratory.is_some() {
                self.mode = MutationMode::Exploratory;
                log::info!(
                    "generation {}: {} saturated, switching to exploratory mutation",
                    generation,
                    self.metric
                );
            }

            let record = GenerationRecord {
                generation,
                best_fitness: best.fitness,
                best_metrics: best.metrics.clone(),
                island_bests,
                mode,
                archived,
                diversity_score: self.archive.diversity_score(),
                saturated,
            };
            log::debug!(
                "generation {}: best {:.4}, archive {}, diversity {:.3}",
                record.generation,
                record.best_fitness,
                self.archive.len(),
                record.diversity_score
            );
            progress(&record);
            records.push(record);
        }

        let best = lineage.last().cloned().unwrap_or_else(|| initial.clone());
        Ok(RunResult {
            initial,
            best,
            lineage,
            generations: records,
            bandit: self.bandit.with(|b| b.statistics())?,
            archive: self.archive.statistics(),
            saturation: self.saturation.statistics(),
            model: self.model.statistics(),
            total_evaluations: self.model.evaluations(),
            elapsed_seconds: started.elapsed().as_secs_f64(),
        })
    }

    /// Value fed to the saturation detector: the configured metric, or the
    /// fitness when the oracle does not report it.
    fn tracked_value(&self, best: &Individual) -> f64 {
        best.metric(&self.metric).unwrap_or(best.fitness)
    }

    pub fn mode(&self) -> MutationMode {
        self.mode
    }

    pub fn model(&self) -> &IslandModel {
        &self.model
    }

    pub fn bandit(&self) -> &Shared<AdaptiveBanditSelector> {
        &self.bandit
    }

    pub fn archive(&self) -> &NoveltyArchive {
        &self.archive
    }

    pub fn saturation(&self) -> &SaturationDetector {
        &self.saturation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::error::{OracleError, OracleKind};
    use crate::schema::{Evaluation, IslandConfig, SaturationConfig};

    fn parse_fitness(candidate: &str) -> Result<Evaluation, OracleError> {
        candidate
            .parse::<f64>()
            .map(|f| Evaluation::new(f).with_metric("coverage", f * 100.0))
            .map_err(|e| OracleError::InvalidOutput(e.to_string()))
    }

    fn step_by(delta: f64) -> impl Fn(&str, &str, &str) -> Result<String, OracleError> {
        move |code, _, _| {
            let value: f64 = code
                .parse()
                .map_err(|_| OracleError::InvalidOutput(code.to_string()))?;
            Ok(format!("{:.2}", value + delta))
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            islands: IslandConfig {
                num_islands: 2,
                population_size: 4,
                ..Default::default()
            },
            saturation: SaturationConfig {
                window_size: 2,
                improvement_threshold: 1.5,
                min_generations: 2,
                ..Default::default()
            },
            parallel: false,
            random_seed: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_switches_to_exploratory_after_saturation() {
        let standard = step_by(0.01);
        let exploratory = step_by(0.10);
        let oracles = RunOracles::new(&standard, &parse_fitness).with_exploratory(&exploratory);

        let mut run = EvolutionRun::new(&config(), "calculator.py").unwrap();
        let mut seen = Vec::new();
        let result = run
            .run("0.50", 3, oracles, |record| seen.push(record.generation))
            .unwrap();

        assert_eq!(seen, [1, 2, 3]);
        let modes: Vec<_> = result.generations.iter().map(|r| r.mode).collect();
        assert_eq!(
            modes,
            [MutationMode::Standard, MutationMode::Standard, MutationMode::Exploratory]
        );
        assert!(!result.generations[0].saturated);
        assert!(result.generations[1].saturated);
        assert_eq!(run.mode(), MutationMode::Exploratory);
        assert_eq!(result.saturation.saturation_generation, Some(2));

        assert_eq!(result.best.fitness, 0.62);
        let lineage: Vec<f64> = result.lineage.iter().map(|i| i.fitness).collect();
        assert_eq!(lineage, [0.5, 0.51, 0.52, 0.62]);
        assert!((result.improvement() - 0.12).abs() < 1e-9);
        assert_eq!(result.total_evaluations, 1 + 3 * 2 * 3);
        assert_eq!(result.generations[0].island_bests, [0.51, 0.51]);
        assert_eq!(result.generations[2].best_metrics["coverage"], 62.0);
    }

    #[test]
    fn test_stays_standard_without_exploratory_oracle() {
        let standard = step_by(0.01);
        let mut run = EvolutionRun::new(&config(), "calculator.py").unwrap();
        let result = run
            .run("0.50", 4, RunOracles::new(&standard, &parse_fitness), |_| {})
            .unwrap();

        assert!(result.saturation.is_saturated);
        assert!(
            result
                .generations
                .iter()
                .all(|r| r.mode == MutationMode::Standard)
        );
        assert_eq!(result.best.fitness, 0.54);
    }

    #[test]
    fn test_bandit_and_archive_bookkeeping() {
        let standard = step_by(0.01);
        let mut run = EvolutionRun::new(&config(), "calculator.py").unwrap();
        let result = run
            .run("0.50", 2, RunOracles::new(&standard, &parse_fitness), |_| {})
            .unwrap();

        let plays: u64 = result.bandit.strategies.iter().map(|a| a.num_plays).sum();
        assert_eq!(plays, 2 * 2 * 3);
        assert!(result.bandit.strategies.iter().all(|a| a.num_plays > 0));
        assert!(result.bandit.models.is_none());

        // Numeric candidates look identical to the archive.
        assert_eq!(result.archive.size, 1);
        assert!(result.generations.iter().all(|r| !r.archived));
    }

    #[test]
    fn test_structurally_new_best_is_archived() {
        let double = |code: &str, _: &str, _: &str| -> Result<String, OracleError> {
            Ok(format!("{code}\n{code}"))
        };
        let count_tests = |code: &str| -> Result<Evaluation, OracleError> {
            Ok(Evaluation::new(code.matches("def test_").count() as f64))
        };

        let mut run = EvolutionRun::new(&config(), "calculator.py").unwrap();
        let result = run
            .run(
                "def test_a():\n    assert a\n",
                1,
                RunOracles::new(&double, &count_tests),
                |_| {},
            )
            .unwrap();

        assert_eq!(result.best.fitness, 2.0);
        assert!(result.generations[0].archived);
        assert_eq!(run.archive().len(), 2);
        assert!(result.archive.diversity_score > 0.0);
    }

    #[test]
    fn test_oracle_failure_aborts_run() {
        let standard = step_by(0.01);
        let broken = |candidate: &str| -> Result<Evaluation, OracleError> {
            if candidate == "0.50" {
                Ok(Evaluation::new(0.5))
            } else {
                Err(OracleError::Failed("pytest crashed".to_string()))
            }
        };
        let mut run = EvolutionRun::new(&config(), "calculator.py").unwrap();
        let err = run
            .run("0.50", 3, RunOracles::new(&standard, &broken), |_| {})
            .unwrap_err();
        assert_eq!(err.oracle_kind(), Some(OracleKind::Fitness));
    }
}
