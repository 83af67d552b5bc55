//! A single island: a fixed-size population with elitism and tournament selection.
//!
//! A generation is split into three phases so the island model can run the
//! expensive middle phase for all islands at once:
//!
//! 1. [`Island::plan_generation`] picks elites and parents (sequential, uses
//!    the island's RNG).
//! 2. [`breed`] mutates and scores one planned offspring (pure with respect
//!    to the island, safe to run on any thread).
//! 3. [`Island::commit`] installs the new population.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;

use crate::schema::{ConfigError, IslandConfig, IslandStats, Individual, fittest};

use super::error::{EngineError, OracleKind};
use super::oracle::{FitnessOracle, Oracles};

/// One offspring to produce: which parent, which strategy.
#[derive(Debug, Clone)]
pub struct OffspringPlan {
    pub island_id: usize,
    /// Generation the child belongs to.
    pub generation: usize,
    pub parent: Individual,
    pub strategy: String,
}

/// Elites carried forward plus the offspring still to be bred.
#[derive(Debug, Clone)]
pub struct GenerationPlan {
    pub elites: Vec<Individual>,
    pub offspring: Vec<OffspringPlan>,
}

/// An independently evolving sub-population.
#[derive(Debug, Clone)]
pub struct Island {
    id: usize,
    population_size: usize,
    elite_count: usize,
    tournament_size: usize,
    population: Vec<Individual>,
    generation: usize,
    best: Option<Individual>,
    rng: StdRng,
}

impl Island {
    /// Create an empty island. `seed` drives tournament sampling.
    pub fn new(id: usize, config: &IslandConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let population_size = config.population_size;
        Ok(Self {
            id,
            population_size,
            elite_count: config.elite_count().min(population_size),
            tournament_size: config.tournament_size,
            population: Vec::with_capacity(population_size),
            generation: 0,
            best: None,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Score `seed_code` once and fill the population with copies of it.
    pub fn initialize(
        &mut self,
        seed_code: &str,
        fitness: &dyn FitnessOracle,
    ) -> Result<(), EngineError> {
        let evaluation = fitness
            .evaluate(seed_code)
            .map_err(|source| EngineError::Oracle {
                generation: 0,
                island_id: self.id,
                oracle: OracleKind::Fitness,
                source,
            })?;
        self.seed_with(Individual::scored(
            seed_code.to_string(),
            evaluation,
            0,
            self.id,
            None,
        ));
        Ok(())
    }

    /// Fill the population with copies of an already scored seed.
    pub fn seed_with(&mut self, mut seed: Individual) {
        seed.island_id = self.id;
        seed.generation = 0;
        self.population = vec![seed.clone(); self.population_size];
        self.generation = 0;
        self.best = Some(seed);
    }

    /// Pick elites and tournament parents for the next generation.
    ///
    /// `strategies` supplies one strategy per offspring, in order; it must
    /// hold at least [`Self::offspring_count`] names.
    pub fn plan_generation(
        &mut self,
        strategies: &mut impl Iterator<Item = String>,
    ) -> Result<GenerationPlan, EngineError> {
        if self.population.is_empty() {
            return Err(EngineError::NotInitialized);
        }

        let elites = self.elites();
        let next_generation = self.generation + 1;
        let mut offspring = Vec::with_capacity(self.offspring_count());
        for _ in 0..self.offspring_count() {
            let parent = self.tournament_select().clone();
            let strategy = strategies.next().unwrap_or_default();
            offspring.push(OffspringPlan {
                island_id: self.id,
                generation: next_generation,
                parent,
                strategy,
            });
        }

        Ok(GenerationPlan { elites, offspring })
    }

    /// Install a bred generation and return its fittest member.
    pub fn commit(
        &mut self,
        elites: Vec<Individual>,
        children: Vec<Individual>,
    ) -> Result<Individual, EngineError> {
        let mut next = elites;
        next.extend(children);
        next.truncate(self.population_size);
        debug_assert_eq!(next.len(), self.population_size);

        self.population = next;
        self.generation += 1;

        let generation_best = fittest(&self.population)
            .cloned()
            .ok_or(EngineError::NotInitialized)?;
        if self
            .best
            .as_ref()
            .is_none_or(|best| generation_best.fitness > best.fitness)
        {
            self.best = Some(generation_best.clone());
        }

        log::debug!(
            "island {} generation {}: best {:.4}",
            self.id,
            self.generation,
            generation_best.fitness
        );
        Ok(generation_best)
    }

    /// Run one full generation sequentially and return its fittest member.
    pub fn evolve_generation(
        &mut self,
        oracles: Oracles<'_>,
        target: &str,
    ) -> Result<Individual, EngineError> {
        let mut strategies = oracles
            .strategies
            .select_many(self.offspring_count())?
            .into_iter();
        let plan = self.plan_generation(&mut strategies)?;

        let mut children = Vec::with_capacity(plan.offspring.len());
        for offspring in &plan.offspring {
            children.push(breed(offspring, oracles, target)?);
        }
        for (offspring, child) in plan.offspring.iter().zip(&children) {
            oracles
                .strategies
                .reward(&offspring.strategy, child.fitness - offspring.parent.fitness)?;
        }

        self.commit(plan.elites, children)
    }

    /// Individuals sent per migration: `max(1, floor(population_size * rate))`.
    pub fn migrant_count(&self, migration_rate: f64) -> usize {
        ((self.population_size as f64 * migration_rate).floor() as usize).max(1)
    }

    /// Copies of the top [`Self::migrant_count`] individuals, best first.
    pub fn get_migrants(&self, migration_rate: f64) -> Vec<Individual> {
        let count = self.migrant_count(migration_rate);
        let mut ranked = self.population.clone();
        sort_descending(&mut ranked);
        ranked.truncate(count);
        ranked
    }

    /// Overwrite the weakest individuals with the migrants, in order.
    pub fn accept_migrants(&mut self, migrants: &[Individual]) {
        self.population.sort_by(|a, b| a.fitness.total_cmp(&b.fitness));
        for (slot, migrant) in self.population.iter_mut().zip(migrants) {
            let mut incoming = migrant.clone();
            incoming.island_id = self.id;
            *slot = incoming;
        }

        if let Some(incoming) = fittest(&self.population)
            && self.best.as_ref().is_none_or(|b| incoming.fitness > b.fitness)
        {
            self.best = Some(incoming.clone());
        }
    }

    pub fn statistics(&self) -> IslandStats {
        let avg_fitness = if self.population.is_empty() {
            0.0
        } else {
            self.population.iter().map(|i| i.fitness).sum::<f64>() / self.population.len() as f64
        };
        IslandStats {
            island_id: self.id,
            best_fitness: self.best.as_ref().map_or(0.0, |b| b.fitness),
            avg_fitness,
            generation: self.generation,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// All-time best individual.
    pub fn best_individual(&self) -> Option<&Individual> {
        self.best.as_ref()
    }

    pub fn elite_count(&self) -> usize {
        self.elite_count
    }

    /// Offspring bred per generation.
    pub fn offspring_count(&self) -> usize {
        self.population_size - self.elite_count
    }

    fn elites(&self) -> Vec<Individual> {
        let mut ranked = self.population.clone();
        sort_descending(&mut ranked);
        ranked.truncate(self.elite_count);
        ranked
    }

    /// Best of `tournament_size` distinct individuals sampled uniformly.
    fn tournament_select(&mut self) -> &Individual {
        let size = self.tournament_size.min(self.population.len());
        let sample = index::sample(&mut self.rng, self.population.len(), size);

        let mut winner = sample.index(0);
        for i in sample.iter().skip(1) {
            if self.population[i].fitness > self.population[winner].fitness {
                winner = i;
            }
        }
        &self.population[winner]
    }
}

/// Stable descending sort by fitness; ties keep their original order.
fn sort_descending(individuals: &mut [Individual]) {
    individuals.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
}

/// Mutate the planned parent and score the child.
pub fn breed(
    plan: &OffspringPlan,
    oracles: Oracles<'_>,
    target: &str,
) -> Result<Individual, EngineError> {
    let context = |oracle| {
        move |source| EngineError::Oracle {
            generation: plan.generation,
            island_id: plan.island_id,
            oracle,
            source,
        }
    };

    let code = oracles
        .mutation
        .mutate(&plan.parent.code, target, &plan.strategy)
        .map_err(context(OracleKind::Mutation))?;
    let evaluation = oracles
        .fitness
        .evaluate(&code)
        .map_err(context(OracleKind::Fitness))?;

    Ok(Individual::scored(
        code,
        evaluation,
        plan.generation,
        plan.island_id,
        Some(plan.strategy.clone()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::error::OracleError;
    use crate::schema::Evaluation;
    use proptest::prelude::*;

    /// Candidates are their own fitness, written as a decimal number.
    fn parse_fitness(candidate: &str) -> Result<Evaluation, OracleError> {
        candidate
            .parse::<f64>()
            .map(Evaluation::new)
            .map_err(|e| OracleError::InvalidOutput(e.to_string()))
    }

    fn add_step(code: &str, _target: &str, _strategy: &str) -> Result<String, OracleError> {
        let value: f64 = code
            .parse()
            .map_err(|_| OracleError::InvalidOutput(code.to_string()))?;
        Ok(format!("{:.2}", value + 0.01))
    }

    fn config(population_size: usize, elite_ratio: f64) -> IslandConfig {
        IslandConfig {
            population_size,
            elite_ratio,
            ..Default::default()
        }
    }

    #[test]
    fn test_initialize_fills_population() {
        let mut island = Island::new(2, &config(10, 0.3), 7).unwrap();
        island.initialize("0.50", &parse_fitness).unwrap();

        assert_eq!(island.population().len(), 10);
        assert!(island.population().iter().all(|i| i.fitness == 0.5 && i.island_id == 2));
        assert_eq!(island.best_individual().unwrap().fitness, 0.5);
        assert_eq!(island.generation(), 0);
    }

    #[test]
    fn test_generation_keeps_elites_and_refills() {
        let mut island = Island::new(0, &config(10, 0.3), 7).unwrap();
        island.initialize("0.50", &parse_fitness).unwrap();

        let best = island
            .evolve_generation(Oracles::new(&add_step, &parse_fitness), "calc")
            .unwrap();

        assert_eq!(best.fitness, 0.51);
        assert_eq!(best.generation, 1);
        assert_eq!(best.strategy.as_deref(), Some("default"));
        assert_eq!(island.generation(), 1);
        assert_eq!(island.population().len(), 10);
        let seeds = island
            .population()
            .iter()
            .filter(|i| i.code == "0.50" && i.fitness == 0.5)
            .count();
        assert_eq!(seeds, 3);
    }

    #[test]
    fn test_uninitialized_island_errors() {
        let mut island = Island::new(0, &config(4, 0.5), 1).unwrap();
        let result = island.evolve_generation(Oracles::new(&add_step, &parse_fitness), "calc");
        assert!(matches!(result, Err(EngineError::NotInitialized)));
    }

    #[test]
    fn test_oracle_failure_carries_context() {
        let failing = |_: &str, _: &str, _: &str| -> Result<String, OracleError> {
            Err(OracleError::Failed("no model".to_string()))
        };
        let mut island = Island::new(3, &config(4, 0.5), 1).unwrap();
        island.initialize("0.10", &parse_fitness).unwrap();

        let err = island
            .evolve_generation(Oracles::new(&failing, &parse_fitness), "calc")
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Oracle { generation: 1, island_id: 3, oracle: OracleKind::Mutation, .. }
        ));

        let err = island.initialize("not a number", &parse_fitness).unwrap_err();
        assert_eq!(err.oracle_kind(), Some(OracleKind::Fitness));
    }

    #[test]
    fn test_single_individual_island() {
        let mut island = Island::new(0, &config(1, 0.3), 1).unwrap();
        island.initialize("0.20", &parse_fitness).unwrap();
        assert_eq!(island.elite_count(), 1);
        assert_eq!(island.offspring_count(), 0);

        island
            .evolve_generation(Oracles::new(&add_step, &parse_fitness), "calc")
            .unwrap();
        assert_eq!(island.population().len(), 1);
        assert_eq!(island.population()[0].code, "0.20");
    }

    #[test]
    fn test_migrants_and_acceptance() {
        let mut source = Island::new(0, &config(10, 0.3), 3).unwrap();
        source.initialize("0.50", &parse_fitness).unwrap();
        source
            .evolve_generation(Oracles::new(&add_step, &parse_fitness), "calc")
            .unwrap();

        let migrants = source.get_migrants(0.2);
        assert_eq!(migrants.len(), 2);
        assert!(migrants[0].fitness >= migrants[1].fitness);
        assert_eq!(source.population().len(), 10, "migrants are copies");

        let mut sink = Island::new(1, &config(10, 0.3), 4).unwrap();
        sink.initialize("0.10", &parse_fitness).unwrap();
        sink.accept_migrants(&migrants);

        assert_eq!(sink.population().len(), 10);
        let arrived: Vec<_> = sink.population().iter().filter(|i| i.fitness > 0.1).collect();
        assert_eq!(arrived.len(), 2);
        assert!(arrived.iter().all(|i| i.island_id == 1));
        assert_eq!(sink.best_individual().unwrap().fitness, 0.51);
    }

    #[test]
    fn test_excess_migrants_ignored() {
        let mut island = Island::new(0, &config(2, 0.5), 1).unwrap();
        island.initialize("0.10", &parse_fitness).unwrap();
        let migrants: Vec<_> = (0..5)
            .map(|i| Individual::scored(format!("{i}"), Evaluation::new(i as f64), 0, 9, None))
            .collect();
        island.accept_migrants(&migrants);
        assert_eq!(island.population().len(), 2);
        assert_eq!(island.population()[0].code, "0");
        assert_eq!(island.population()[1].code, "1");
    }

    #[test]
    fn test_tournament_prefers_fitter_parents() {
        // With the whole population in every tournament, the fittest always wins.
        let mut island = Island::new(
            0,
            &IslandConfig {
                population_size: 3,
                elite_ratio: 0.0,
                tournament_size: 3,
                ..Default::default()
            },
            5,
        )
        .unwrap();
        island.initialize("0.10", &parse_fitness).unwrap();
        island.accept_migrants(&[Individual::scored(
            "0.90".to_string(),
            Evaluation::new(0.9),
            0,
            1,
            None,
        )]);

        let plan = island
            .plan_generation(&mut std::iter::repeat("s".to_string()))
            .unwrap();
        assert_eq!(plan.elites.len(), 1);
        assert_eq!(plan.elites[0].code, "0.90");
        assert!(plan.offspring.iter().all(|o| o.parent.code == "0.90"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            Island::new(0, &config(0, 0.3), 1),
            Err(ConfigError::PopulationTooSmall)
        ));
        let no_tournament = IslandConfig {
            tournament_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            Island::new(0, &no_tournament, 1),
            Err(ConfigError::InvalidTournamentSize)
        ));
    }

    #[test]
    fn test_migrant_count() {
        let island = Island::new(0, &config(10, 0.3), 1).unwrap();
        assert_eq!(island.migrant_count(0.1), 1);
        assert_eq!(island.migrant_count(0.25), 2);
        assert_eq!(island.migrant_count(0.0), 1);
        assert_eq!(island.get_migrants(0.25).len(), 0, "empty island has no migrants");
    }

    #[test]
    fn test_statistics() {
        let mut island = Island::new(4, &config(4, 0.25), 1).unwrap();
        island.initialize("0.40", &parse_fitness).unwrap();
        let stats = island.statistics();
        assert_eq!(stats.island_id, 4);
        assert_eq!(stats.best_fitness, 0.4);
        assert!((stats.avg_fitness - 0.4).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_population_size_and_best_are_stable(
            population_size in 1usize..12,
            elite_ratio in 0.0f64..1.0,
            tournament_size in 1usize..6,
            seed in any::<u64>(),
            generations in 1usize..5,
        ) {
            let config = IslandConfig {
                population_size,
                elite_ratio,
                tournament_size,
                ..Default::default()
            };
            // Fitness wobbles so children can be worse than their parents.
            let wobble = |code: &str, _: &str, strategy: &str| -> Result<String, OracleError> {
                Ok(format!("{code}{}", strategy.len() % 3))
            };
            let length = |candidate: &str| -> Result<Evaluation, OracleError> {
                let digits: f64 = candidate.bytes().map(|b| (b % 7) as f64).sum();
                Ok(Evaluation::new(digits / candidate.len() as f64))
            };

            let mut island = Island::new(0, &config, seed).unwrap();
            island.initialize("seed", &length).unwrap();
            let mut previous_best = island.best_individual().unwrap().fitness;

            for _ in 0..generations {
                let before: Vec<Individual> = {
                    let mut ranked = island.population().to_vec();
                    sort_descending(&mut ranked);
                    ranked.truncate(island.elite_count());
                    ranked
                };
                island.evolve_generation(Oracles::new(&wobble, &length), "t").unwrap();

                prop_assert_eq!(island.population().len(), population_size);
                for elite in &before {
                    prop_assert!(island.population().contains(elite));
                }
                let best = island.best_individual().unwrap().fitness;
                prop_assert!(best >= previous_best);
                previous_best = best;
            }
        }
    }
}
