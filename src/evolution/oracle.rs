//! Oracle contracts consumed by the engine.
//!
//! The engine never looks inside a candidate. It asks a [`MutationOracle`] for
//! a new candidate and a [`FitnessOracle`] for its score, and consults a
//! [`StrategySelector`] for the strategy name handed to the mutation oracle.
//! Closures with matching signatures implement the oracle traits directly.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::schema::Evaluation;

use super::error::{EngineError, OracleError};

/// Produces a new candidate from a parent.
pub trait MutationOracle: Send + Sync {
    /// Mutate `code` for the program described by `target` using `strategy`.
    fn mutate(&self, code: &str, target: &str, strategy: &str) -> Result<String, OracleError>;
}

/// Scores a candidate.
pub trait FitnessOracle: Send + Sync {
    /// Evaluate a candidate. Must not depend on engine state.
    fn evaluate(&self, candidate: &str) -> Result<Evaluation, OracleError>;
}

impl<F> MutationOracle for F
where
    F: Fn(&str, &str, &str) -> Result<String, OracleError> + Send + Sync,
{
    fn mutate(&self, code: &str, target: &str, strategy: &str) -> Result<String, OracleError> {
        self(code, target, strategy)
    }
}

impl<F> FitnessOracle for F
where
    F: Fn(&str) -> Result<Evaluation, OracleError> + Send + Sync,
{
    fn evaluate(&self, candidate: &str) -> Result<Evaluation, OracleError> {
        self(candidate)
    }
}

/// Chooses the mutation strategy for each offspring and learns from the outcome.
///
/// A generation's strategies are chosen up front with
/// [`StrategySelector::select_many`]; rewards arrive in plan order once the
/// generation's evaluations are complete.
pub trait StrategySelector: Send + Sync {
    /// Strategy for the next offspring.
    fn select(&self) -> Result<String, EngineError>;

    /// Strategies for `count` offspring, in plan order.
    fn select_many(&self, count: usize) -> Result<Vec<String>, EngineError> {
        (0..count).map(|_| self.select()).collect()
    }

    /// Report the fitness change (child minus parent) a strategy produced.
    fn reward(&self, strategy: &str, improvement: f64) -> Result<(), EngineError>;
}

/// Always hands out the same strategy.
#[derive(Debug, Clone)]
pub struct FixedStrategy(Cow<'static, str>);

impl FixedStrategy {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl StrategySelector for FixedStrategy {
    fn select(&self) -> Result<String, EngineError> {
        Ok(self.0.to_string())
    }

    fn reward(&self, _strategy: &str, _improvement: f64) -> Result<(), EngineError> {
        Ok(())
    }
}

static DEFAULT_STRATEGY: FixedStrategy = FixedStrategy(Cow::Borrowed("default"));

/// The oracles driving one `evolve` call.
#[derive(Clone, Copy)]
pub struct Oracles<'a> {
    pub mutation: &'a dyn MutationOracle,
    pub fitness: &'a dyn FitnessOracle,
    pub strategies: &'a dyn StrategySelector,
}

impl<'a> Oracles<'a> {
    /// Oracles using the `"default"` strategy for every mutation.
    pub fn new(mutation: &'a dyn MutationOracle, fitness: &'a dyn FitnessOracle) -> Self {
        Self {
            mutation,
            fitness,
            strategies: &DEFAULT_STRATEGY,
        }
    }

    /// Replace the strategy selector.
    pub fn with_strategies(mut self, strategies: &'a dyn StrategySelector) -> Self {
        self.strategies = strategies;
        self
    }
}

/// Wraps an oracle with a wall-clock limit per call.
///
/// An overrunning call is reported as [`OracleError::Timeout`]; its worker
/// thread is detached and its eventual result discarded.
pub struct TimeLimited<O> {
    inner: Arc<O>,
    timeout: Duration,
}

impl<O> TimeLimited<O> {
    pub fn new(inner: O, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn call_with_deadline<T, F>(timeout: Duration, job: F) -> Result<T, OracleError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, OracleError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("oracle-call".to_string())
        .spawn(move || {
            // Receiver is gone when the deadline passed.
            let _ = tx.send(job());
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            log::warn!("oracle call exceeded {:?}", timeout);
            Err(OracleError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => {
            Err(OracleError::Failed("oracle call panicked".to_string()))
        }
    }
}

impl<O: MutationOracle + 'static> MutationOracle for TimeLimited<O> {
    fn mutate(&self, code: &str, target: &str, strategy: &str) -> Result<String, OracleError> {
        let inner = Arc::clone(&self.inner);
        let (code, target, strategy) = (code.to_string(), target.to_string(), strategy.to_string());
        call_with_deadline(self.timeout, move || inner.mutate(&code, &target, &strategy))
    }
}

impl<O: FitnessOracle + 'static> FitnessOracle for TimeLimited<O> {
    fn evaluate(&self, candidate: &str) -> Result<Evaluation, OracleError> {
        let inner = Arc::clone(&self.inner);
        let candidate = candidate.to_string();
        call_with_deadline(self.timeout, move || inner.evaluate(&candidate))
    }
}
