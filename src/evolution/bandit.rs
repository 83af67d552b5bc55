//! UCB1 multi-armed bandits for strategy and model selection.
//!
//! [`Ucb1Bandit`] is the core; [`StrategyBandit`], [`ModelBandit`] and
//! [`AdaptiveBanditSelector`] are facades that clamp fitness improvements to
//! `[0, 1]` before using them as rewards.

use serde::{Deserialize, Serialize};

use crate::schema::{ArmStats, BanditConfig, BanditStats, ConfigError};

use super::error::EngineError;

/// One selectable option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arm {
    pub name: String,
    pub total_reward: f64,
    pub num_plays: u64,
    /// `total_reward / num_plays`; meaningless while `num_plays == 0`.
    pub average_reward: f64,
}

impl Arm {
    fn new(name: String) -> Self {
        Self {
            name,
            total_reward: 0.0,
            num_plays: 0,
            average_reward: 0.0,
        }
    }
}

/// UCB1 bandit over a fixed, ordered set of arms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ucb1Bandit {
    /// Arms in registration order.
    arms: Vec<Arm>,
    total_plays: u64,
    exploration_coefficient: f64,
}

impl Ucb1Bandit {
    /// Create a bandit. Arm names must be unique and non-empty as a set.
    pub fn new<I, S>(arms: I, exploration_coefficient: f64) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !(exploration_coefficient > 0.0) {
            return Err(ConfigError::InvalidExplorationCoefficient(
                exploration_coefficient,
            ));
        }

        let mut registered: Vec<Arm> = Vec::new();
        for name in arms {
            let name = name.into();
            if registered.iter().any(|a| a.name == name) {
                return Err(ConfigError::DuplicateArm(name));
            }
            registered.push(Arm::new(name));
        }
        if registered.is_empty() {
            return Err(ConfigError::NoArms);
        }

        Ok(Self {
            arms: registered,
            total_plays: 0,
            exploration_coefficient,
        })
    }

    /// Pick the next arm.
    ///
    /// Unplayed arms go first, in registration order. After that the arm with
    /// the highest `average + c * sqrt(ln(total) / plays)` wins; ties go to
    /// the earliest registered arm.
    pub fn select_arm(&self) -> &str {
        let plays: Vec<u64> = self.arms.iter().map(|a| a.num_plays).collect();
        &self.arms[self.pick(&plays, self.total_plays)].name
    }

    /// Pick `count` arms for a batch whose rewards arrive later.
    ///
    /// Each pick counts as a play at the arm's current average, so a batch
    /// spreads over arms the way sequential selection would. A batch of one
    /// equals [`Self::select_arm`].
    pub fn select_batch(&self, count: usize) -> Vec<&str> {
        let mut plays: Vec<u64> = self.arms.iter().map(|a| a.num_plays).collect();
        let mut total = self.total_plays;
        (0..count)
            .map(|_| {
                let i = self.pick(&plays, total);
                plays[i] += 1;
                total += 1;
                self.arms[i].name.as_str()
            })
            .collect()
    }

    fn pick(&self, plays: &[u64], total: u64) -> usize {
        if let Some(cold) = plays.iter().position(|&p| p == 0) {
            return cold;
        }

        let ln_total = (total as f64).ln();
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, arm) in self.arms.iter().enumerate() {
            let bonus = self.exploration_coefficient * (ln_total / plays[i] as f64).sqrt();
            let score = arm.average_reward + bonus;
            if score > best_score {
                best_score = score;
                best = i;
            }
        }
        best
    }

    /// Record a reward for an arm.
    pub fn update(&mut self, name: &str, reward: f64) -> Result<(), EngineError> {
        let arm = self
            .arms
            .iter_mut()
            .find(|a| a.name == name)
            .ok_or_else(|| EngineError::UnknownArm(name.to_string()))?;

        arm.num_plays += 1;
        arm.total_reward += reward;
        arm.average_reward = arm.total_reward / arm.num_plays as f64;
        self.total_plays += 1;
        Ok(())
    }

    /// Arm with the highest average reward (earliest on ties).
    pub fn best_arm(&self) -> &str {
        let mut best = &self.arms[0];
        for arm in &self.arms[1..] {
            if arm.average_reward > best.average_reward {
                best = arm;
            }
        }
        &best.name
    }

    pub fn arm(&self, name: &str) -> Option<&Arm> {
        self.arms.iter().find(|a| a.name == name)
    }

    pub fn arms(&self) -> &[Arm] {
        &self.arms
    }

    pub fn total_plays(&self) -> u64 {
        self.total_plays
    }

    pub fn exploration_coefficient(&self) -> f64 {
        self.exploration_coefficient
    }

    /// Forget all rewards.
    pub fn reset(&mut self) {
        for arm in &mut self.arms {
            *arm = Arm::new(std::mem::take(&mut arm.name));
        }
        self.total_plays = 0;
    }

    /// Per-arm statistics in registration order.
    pub fn statistics(&self) -> Vec<ArmStats> {
        self.arms
            .iter()
            .map(|arm| ArmStats {
                name: arm.name.clone(),
                num_plays: arm.num_plays,
                total_reward: arm.total_reward,
                average_reward: arm.average_reward,
                play_rate: if self.total_plays > 0 {
                    arm.num_plays as f64 / self.total_plays as f64
                } else {
                    0.0
                },
            })
            .collect()
    }
}

fn clamp_reward(improvement: f64) -> f64 {
    if improvement.is_nan() {
        0.0
    } else {
        improvement.clamp(0.0, 1.0)
    }
}

/// Bandit over mutation strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyBandit {
    bandit: Ucb1Bandit,
}

impl StrategyBandit {
    pub fn new<I, S>(strategies: I, exploration_coefficient: f64) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            bandit: Ucb1Bandit::new(strategies, exploration_coefficient)?,
        })
    }

    pub fn select_strategy(&self) -> &str {
        self.bandit.select_arm()
    }

    /// Strategies for `count` offspring whose rewards arrive together.
    pub fn select_strategies(&self, count: usize) -> Vec<String> {
        self.bandit
            .select_batch(count)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Reward a strategy with its fitness improvement, clamped to `[0, 1]`.
    pub fn update_strategy(&mut self, strategy: &str, improvement: f64) -> Result<(), EngineError> {
        self.bandit.update(strategy, clamp_reward(improvement))
    }

    pub fn bandit(&self) -> &Ucb1Bandit {
        &self.bandit
    }

    pub fn statistics(&self) -> Vec<ArmStats> {
        self.bandit.statistics()
    }
}

/// Bandit over generation backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBandit {
    bandit: Ucb1Bandit,
}

impl ModelBandit {
    pub fn new<I, S>(models: I, exploration_coefficient: f64) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            bandit: Ucb1Bandit::new(models, exploration_coefficient)?,
        })
    }

    pub fn select_model(&self) -> &str {
        self.bandit.select_arm()
    }

    /// Reward a model with its fitness improvement, clamped to `[0, 1]`.
    pub fn update_model(&mut self, model: &str, improvement: f64) -> Result<(), EngineError> {
        self.bandit.update(model, clamp_reward(improvement))
    }

    pub fn bandit(&self) -> &Ucb1Bandit {
        &self.bandit
    }

    pub fn statistics(&self) -> Vec<ArmStats> {
        self.bandit.statistics()
    }
}

/// A strategy choice and, when models are configured, a model choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub strategy: String,
    pub model: Option<String>,
}

/// Pairs a strategy bandit with an optional model bandit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveBanditSelector {
    strategy_bandit: StrategyBandit,
    model_bandit: Option<ModelBandit>,
}

impl AdaptiveBanditSelector {
    /// Build from configuration. An empty model list disables model selection.
    pub fn from_config(config: &BanditConfig) -> Result<Self, ConfigError> {
        let strategy_bandit = StrategyBandit::new(
            config.strategies.iter().cloned(),
            config.exploration_coefficient,
        )?;
        let model_bandit = if config.models.is_empty() {
            None
        } else {
            Some(ModelBandit::new(
                config.models.iter().cloned(),
                config.exploration_coefficient,
            )?)
        };
        Ok(Self {
            strategy_bandit,
            model_bandit,
        })
    }

    pub fn select(&self) -> Selection {
        Selection {
            strategy: self.strategy_bandit.select_strategy().to_string(),
            model: self
                .model_bandit
                .as_ref()
                .map(|m| m.select_model().to_string()),
        }
    }

    /// Reward the strategy, and the model when one was used and models are enabled.
    pub fn update(
        &mut self,
        strategy: &str,
        improvement: f64,
        model: Option<&str>,
    ) -> Result<(), EngineError> {
        self.strategy_bandit.update_strategy(strategy, improvement)?;
        if let (Some(bandit), Some(model)) = (self.model_bandit.as_mut(), model) {
            bandit.update_model(model, improvement)?;
        }
        Ok(())
    }

    pub fn strategies(&self) -> &StrategyBandit {
        &self.strategy_bandit
    }

    pub fn models(&self) -> Option<&ModelBandit> {
        self.model_bandit.as_ref()
    }

    pub fn strategies_mut(&mut self) -> &mut StrategyBandit {
        &mut self.strategy_bandit
    }

    pub fn models_mut(&mut self) -> Option<&mut ModelBandit> {
        self.model_bandit.as_mut()
    }

    pub fn statistics(&self) -> BanditStats {
        BanditStats {
            strategies: self.strategy_bandit.statistics(),
            models: self.model_bandit.as_ref().map(ModelBandit::statistics),
        }
    }
}
