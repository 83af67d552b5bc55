//! Island model: islands evolving in lockstep with periodic ring migration.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::schema::{EngineConfig, Individual, ModelStats, fittest};

use super::error::{EngineError, OracleKind};
use super::island::{GenerationPlan, Island, OffspringPlan, breed};
use super::oracle::{FitnessOracle, Oracles};

/// A fixed set of islands plus the best individual seen on any of them.
pub struct IslandModel {
    islands: Vec<Island>,
    global_best: Option<Individual>,
    generation: usize,
    migration_interval: usize,
    migration_rate: f64,
    parallel: bool,
    pool: Option<ThreadPool>,
    evaluations: u64,
}

impl IslandModel {
    /// Build the islands. Each gets its own RNG derived from the model seed.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let seed = config.random_seed.unwrap_or_else(rand::random);
        let mut seeds = StdRng::seed_from_u64(seed);
        let islands = (0..config.islands.num_islands)
            .map(|id| Island::new(id, &config.islands, seeds.next_u64()))
            .collect::<Result<Vec<_>, _>>()?;

        let pool = match (config.parallel, config.workers) {
            (true, Some(workers)) => Some(
                ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("shinka-worker-{i}"))
                    .build()
                    .map_err(|e| EngineError::WorkerPool(e.to_string()))?,
            ),
            _ => None,
        };

        Ok(Self {
            islands,
            global_best: None,
            generation: 0,
            migration_interval: config.islands.migration_interval,
            migration_rate: config.islands.migration_rate,
            parallel: config.parallel,
            pool,
            evaluations: 0,
        })
    }

    /// Score the seed once and start every island from it.
    pub fn initialize(
        &mut self,
        seed_code: &str,
        fitness: &dyn FitnessOracle,
    ) -> Result<Individual, EngineError> {
        let evaluation = fitness
            .evaluate(seed_code)
            .map_err(|source| EngineError::Oracle {
                generation: 0,
                island_id: 0,
                oracle: OracleKind::Fitness,
                source,
            })?;
        self.evaluations += 1;

        let seed = Individual::scored(seed_code.to_string(), evaluation, 0, 0, None);
        for island in &mut self.islands {
            island.seed_with(seed.clone());
        }
        self.generation = 0;
        self.global_best = Some(seed.clone());

        log::info!(
            "initialized {} islands from seed (fitness {:.4})",
            self.islands.len(),
            seed.fitness
        );
        Ok(seed)
    }

    /// Advance every island `generations` times and return the global best.
    ///
    /// Generation numbers continue across calls, so migration keeps its
    /// cadence when a caller evolves one generation at a time. `observer` runs
    /// after each generation (and its migration) with the generation number,
    /// each island's best offspring and the global best.
    pub fn evolve<F>(
        &mut self,
        generations: usize,
        oracles: Oracles<'_>,
        target: &str,
        mut observer: F,
    ) -> Result<Individual, EngineError>
    where
        F: FnMut(usize, &[Individual], &Individual),
    {
        for _ in 0..generations {
            let island_bests = self.step(oracles, target)?;
            let generation = self.generation;

            if generation % self.migration_interval == 0 {
                self.migrate();
            }

            let global_best = self.global_best.as_ref().ok_or(EngineError::NotInitialized)?;
            observer(generation, &island_bests, global_best);
        }

        self.global_best.clone().ok_or(EngineError::NotInitialized)
    }

    /// One lockstep generation across all islands.
    fn step(&mut self, oracles: Oracles<'_>, target: &str) -> Result<Vec<Individual>, EngineError> {
        if self.global_best.is_none() {
            return Err(EngineError::NotInitialized);
        }

        let total: usize = self.islands.iter().map(Island::offspring_count).sum();
        let mut strategies = oracles.strategies.select_many(total)?.into_iter();
        let plans = self
            .islands
            .iter_mut()
            .map(|island| island.plan_generation(&mut strategies))
            .collect::<Result<Vec<GenerationPlan>, _>>()?;

        let jobs: Vec<&OffspringPlan> = plans.iter().flat_map(|p| &p.offspring).collect();
        let children = self.breed_all(&jobs, oracles, target)?;
        self.evaluations += children.len() as u64;

        for (job, child) in jobs.iter().zip(&children) {
            oracles
                .strategies
                .reward(&job.strategy, child.fitness - job.parent.fitness)?;
        }

        let mut children = children.into_iter();
        let mut island_bests = Vec::with_capacity(self.islands.len());
        for (island, plan) in self.islands.iter_mut().zip(plans) {
            let own: Vec<Individual> = children.by_ref().take(plan.offspring.len()).collect();
            island_bests.push(island.commit(plan.elites, own)?);
        }
        self.generation += 1;

        for best in &island_bests {
            if self
                .global_best
                .as_ref()
                .is_none_or(|global| best.fitness > global.fitness)
            {
                log::info!(
                    "generation {}: new global best {:.4} from island {}",
                    self.generation,
                    best.fitness,
                    best.island_id
                );
                self.global_best = Some(best.clone());
            }
        }

        Ok(island_bests)
    }

    /// Mutate and score every planned offspring. Results come back in plan
    /// order; on failure the earliest failing offspring's error is returned.
    fn breed_all(
        &self,
        jobs: &[&OffspringPlan],
        oracles: Oracles<'_>,
        target: &str,
    ) -> Result<Vec<Individual>, EngineError> {
        if !self.parallel {
            return jobs.iter().map(|job| breed(job, oracles, target)).collect();
        }

        let run = || {
            jobs.par_iter()
                .map(|job| breed(job, oracles, target))
                .collect::<Vec<_>>()
        };
        let results = match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        };
        results.into_iter().collect()
    }

    /// Ring migration: island `i` receives the migrants of island `i + 1`.
    pub fn migrate(&mut self) {
        let outgoing: Vec<Vec<Individual>> = self
            .islands
            .iter()
            .map(|island| island.get_migrants(self.migration_rate))
            .collect();

        let n = self.islands.len();
        for (i, island) in self.islands.iter_mut().enumerate() {
            island.accept_migrants(&outgoing[(i + 1) % n]);
        }

        log::info!(
            "generation {}: migrated {} individuals per island",
            self.generation,
            outgoing.first().map_or(0, Vec::len)
        );
    }

    pub fn global_best(&self) -> Option<&Individual> {
        self.global_best.as_ref()
    }

    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Fitness oracle calls made so far, seed included.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Fittest individual currently alive on any island.
    pub fn current_best(&self) -> Option<&Individual> {
        self.islands
            .iter()
            .filter_map(|island| fittest(island.population()))
            .reduce(|best, c| if c.fitness > best.fitness { c } else { best })
    }

    pub fn statistics(&self) -> ModelStats {
        ModelStats {
            generation: self.generation,
            global_best_fitness: self.global_best.as_ref().map_or(0.0, |b| b.fitness),
            islands: self.islands.iter().map(Island::statistics).collect(),
        }
    }
}
