//! Mutex-guarded handles for state consulted from worker threads.

use std::sync::{Arc, Mutex};

use super::bandit::{AdaptiveBanditSelector, StrategyBandit};
use super::error::EngineError;
use super::oracle::StrategySelector;

/// Cloneable handle to state behind a single mutex.
#[derive(Debug, Default)]
pub struct Shared<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Run `f` with exclusive access.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, EngineError> {
        let mut guard = self.inner.lock().map_err(|_| EngineError::LockPoisoned)?;
        Ok(f(&mut guard))
    }
}

impl<T: Clone> Shared<T> {
    /// Copy of the current value.
    pub fn snapshot(&self) -> Result<T, EngineError> {
        self.with(|value| value.clone())
    }
}

impl StrategySelector for Shared<StrategyBandit> {
    fn select(&self) -> Result<String, EngineError> {
        self.with(|bandit| bandit.select_strategy().to_string())
    }

    fn select_many(&self, count: usize) -> Result<Vec<String>, EngineError> {
        self.with(|bandit| bandit.select_strategies(count))
    }

    fn reward(&self, strategy: &str, improvement: f64) -> Result<(), EngineError> {
        self.with(|bandit| bandit.update_strategy(strategy, improvement))?
    }
}

impl StrategySelector for Shared<AdaptiveBanditSelector> {
    fn select(&self) -> Result<String, EngineError> {
        self.with(|selector| selector.strategies().select_strategy().to_string())
    }

    fn select_many(&self, count: usize) -> Result<Vec<String>, EngineError> {
        self.with(|selector| selector.strategies().select_strategies(count))
    }

    fn reward(&self, strategy: &str, improvement: f64) -> Result<(), EngineError> {
        self.with(|selector| selector.update(strategy, improvement, None))?
    }
}
