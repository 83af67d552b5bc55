//! Composite fitness for test suites.
//!
//! A [`QualityMeter`] runs a candidate against the target program and
//! reports raw measurements; [`QualityScorer`] turns them into normalized
//! components and a weighted fitness. [`ScoredFitness`] glues the two into a
//! [`FitnessOracle`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::schema::{Evaluation, FitnessWeights};

use super::error::OracleError;
use super::oracle::FitnessOracle;

pub const METRIC_COVERAGE: &str = "coverage";
pub const METRIC_COVERAGE_IMPROVEMENT: &str = "coverage_improvement";
pub const METRIC_BUGS_DETECTED: &str = "bugs_detected";
pub const METRIC_EXECUTION_TIME: &str = "execution_time";
pub const METRIC_EFFICIENCY: &str = "efficiency";
pub const METRIC_MAINTAINABILITY: &str = "maintainability";

/// Execution time recorded for a run that hit its timeout.
const TIMEOUT_EXECUTION_SECS: f64 = 10.0;
/// Runs slower than this have their efficiency halved.
const SLOW_RUN_SECS: f64 = 5.0;
/// Floor applied to execution time before computing efficiency.
const MIN_EXECUTION_SECS: f64 = 0.1;
/// Mean branch count per test below which a suite counts as simple.
const COMPLEXITY_LIMIT: f64 = 5.0;

/// Static quality counts of a test suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeQuality {
    /// Test functions found.
    pub test_functions: usize,
    /// Assertions inside test functions.
    pub total_assertions: usize,
    /// Assertions whose condition is a comparison.
    pub comparison_assertions: usize,
    /// Branching statements (if/for/while) inside test functions.
    pub total_complexity: usize,
    /// Global-state declarations anywhere in the suite.
    pub global_statements: usize,
}

impl CodeQuality {
    /// Maintainability score in `[0, 1]`.
    pub fn score(&self) -> f64 {
        let assertion_quality = if self.total_assertions > 0 {
            self.comparison_assertions as f64 / self.total_assertions as f64
        } else {
            0.5
        };

        let avg_complexity = if self.test_functions > 0 {
            self.total_complexity as f64 / self.test_functions as f64
        } else {
            0.0
        };
        let complexity = if avg_complexity < COMPLEXITY_LIMIT { 1.0 } else { 0.5 };

        let independence = if self.global_statements == 0 { 1.0 } else { 0.5 };

        0.4 * assertion_quality + 0.3 * independence + 0.3 * complexity
    }
}

/// Raw measurements of one candidate.
///
/// In JSON the execution time is given in seconds as `execution_seconds`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityMeasurement {
    /// Line coverage of the target, in percent.
    pub coverage: f64,
    /// Failing tests when run against the seeded-bug build.
    pub seeded_bug_failures: usize,
    /// Wall-clock time of the suite.
    #[serde(rename = "execution_seconds", with = "seconds")]
    pub execution_time: Duration,
    /// The suite hit its time limit.
    pub timed_out: bool,
    /// Static quality counts; `None` when the suite could not be analyzed.
    pub quality: Option<CodeQuality>,
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

/// Reference point for normalizing coverage and execution time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    /// Coverage of the seed suite, in percent.
    pub coverage: f64,
    /// Execution time of the seed suite, in seconds.
    pub execution_time: f64,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            coverage: 0.0,
            execution_time: 1.0,
        }
    }
}

/// Measures a candidate against the target program.
pub trait QualityMeter: Send + Sync {
    fn measure(&self, candidate: &str) -> Result<QualityMeasurement, OracleError>;
}

/// Combines measurements into a weighted fitness.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    weights: FitnessWeights,
    baseline: Baseline,
    total_seeded_bugs: usize,
}

impl QualityScorer {
    pub fn new(weights: FitnessWeights, total_seeded_bugs: usize) -> Self {
        Self {
            weights,
            baseline: Baseline::default(),
            total_seeded_bugs,
        }
    }

    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = baseline;
        self
    }

    /// Record the seed suite's coverage and timing as the baseline.
    pub fn set_baseline(&mut self, seed: &QualityMeasurement) {
        let (execution_time, _) = self.efficiency(seed);
        self.baseline = Baseline {
            coverage: seed.coverage,
            execution_time,
        };
        log::info!(
            "baseline set: coverage={:.1}%, time={:.2}s",
            self.baseline.coverage,
            self.baseline.execution_time
        );
    }

    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    pub fn weights(&self) -> &FitnessWeights {
        &self.weights
    }

    /// Share of the remaining coverage gap closed, clamped to `[0, 1]`.
    pub fn coverage_improvement(&self, coverage: f64) -> f64 {
        if self.baseline.coverage >= 100.0 {
            return 0.0;
        }
        ((coverage - self.baseline.coverage) / (100.0 - self.baseline.coverage)).clamp(0.0, 1.0)
    }

    /// Fraction of seeded bugs caught.
    pub fn bug_detection(&self, failures: usize) -> f64 {
        if self.total_seeded_bugs == 0 {
            return 0.0;
        }
        (failures as f64 / self.total_seeded_bugs as f64).min(1.0)
    }

    /// Execution time in seconds and its efficiency score.
    pub fn efficiency(&self, measurement: &QualityMeasurement) -> (f64, f64) {
        if measurement.timed_out {
            return (TIMEOUT_EXECUTION_SECS, 0.0);
        }

        let seconds = measurement.execution_time.as_secs_f64();
        let mut efficiency = self.baseline.execution_time / seconds.max(MIN_EXECUTION_SECS);
        if seconds > SLOW_RUN_SECS {
            efficiency *= 0.5;
        }
        (seconds, efficiency.min(1.0))
    }

    /// Score a measurement.
    pub fn score(&self, measurement: &QualityMeasurement) -> Evaluation {
        let coverage_improvement = self.coverage_improvement(measurement.coverage);
        let bugs_detected = self.bug_detection(measurement.seeded_bug_failures);
        let (execution_time, efficiency) = self.efficiency(measurement);
        let maintainability = measurement.quality.map_or(0.5, |q| q.score());

        let fitness = self.weights.coverage * coverage_improvement
            + self.weights.bug_detection * bugs_detected
            + self.weights.efficiency * efficiency
            + self.weights.maintainability * maintainability;

        Evaluation::new(fitness)
            .with_metric(METRIC_COVERAGE, measurement.coverage)
            .with_metric(METRIC_COVERAGE_IMPROVEMENT, coverage_improvement)
            .with_metric(METRIC_BUGS_DETECTED, bugs_detected)
            .with_metric(METRIC_EXECUTION_TIME, execution_time)
            .with_metric(METRIC_EFFICIENCY, efficiency)
            .with_metric(METRIC_MAINTAINABILITY, maintainability)
    }
}

/// Fitness oracle built from a meter and a scorer.
pub struct ScoredFitness<P> {
    meter: P,
    scorer: QualityScorer,
}

impl<P: QualityMeter> ScoredFitness<P> {
    pub fn new(meter: P, scorer: QualityScorer) -> Self {
        Self { meter, scorer }
    }

    /// Measure the seed suite, record it as the baseline and return its score.
    pub fn calibrate(&mut self, seed: &str) -> Result<Evaluation, OracleError> {
        let measurement = self.meter.measure(seed)?;
        self.scorer.set_baseline(&measurement);
        Ok(self.scorer.score(&measurement))
    }

    pub fn scorer(&self) -> &QualityScorer {
        &self.scorer
    }
}

impl<P: QualityMeter> FitnessOracle for ScoredFitness<P> {
    fn evaluate(&self, candidate: &str) -> Result<Evaluation, OracleError> {
        let measurement = self.meter.measure(candidate)?;
        Ok(self.scorer.score(&measurement))
    }
}
