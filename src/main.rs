//! Shinka QA CLI - Evolve a test suite from a JSON run configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use shinka_qa::{
    evolution::{
        CommandOracle, EvolutionRun, FitnessOracle, QualityScorer, RunOracles, ScoredFitness,
    },
    report::{BEST_CANDIDATE_FILE, METRICS_FILE, SUMMARY_FILE, write_report},
    schema::{EvaluateOutput, FitnessWeights, MutationMode, RunConfig},
};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--example" {
        print_example_config();
        return;
    }

    if args.len() < 2 {
        eprintln!("Usage: {} <run.json> [generations]", args[0]);
        eprintln!();
        eprintln!("Evolve a test suite from a JSON run configuration.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  run.json     Path to run configuration file");
        eprintln!("  generations  Number of generations (default: from config)");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: RunConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let generations: usize = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(config.generations);

    // Paths in the config are relative to the config file
    let base_dir = config_path.parent().map(PathBuf::from).unwrap_or_default();
    let seed_path = base_dir.join(&config.target.seed_path);
    let seed = fs::read_to_string(&seed_path).unwrap_or_else(|e| {
        eprintln!("Error reading seed suite {}: {}", seed_path.display(), e);
        std::process::exit(1);
    });

    let timeout = Duration::from_secs(config.commands.timeout_secs);
    let oracle = |name: &'static str, argv: &[String]| {
        CommandOracle::from_argv(name, argv, timeout).unwrap_or_else(|e| {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        })
    };
    let mutate = oracle("mutate", &config.commands.mutate);
    let evaluate = oracle("evaluate", &config.commands.evaluate);
    let explore = config
        .commands
        .explore
        .as_deref()
        .map(|argv| oracle("explore", argv));

    let scored;
    let fitness: &dyn FitnessOracle = match config.commands.evaluate_output {
        EvaluateOutput::Evaluation => {
            if config.engine.fitness != FitnessWeights::default() {
                log::warn!("fitness weights are ignored: the evaluate command prints evaluations");
            }
            &evaluate
        }
        EvaluateOutput::Measurement => {
            let scorer = QualityScorer::new(config.engine.fitness, config.target.seeded_bugs);
            let mut oracle = ScoredFitness::new(evaluate.clone(), scorer);
            println!("Measuring baseline...");
            if let Err(e) = oracle.calibrate(&seed) {
                eprintln!("Error measuring baseline: {}", e);
                std::process::exit(1);
            }
            let baseline = oracle.scorer().baseline();
            println!(
                "  Baseline: coverage {:.1}%, execution time {:.2}s",
                baseline.coverage, baseline.execution_time
            );
            println!();
            scored = oracle;
            &scored
        }
    };

    let islands = &config.engine.islands;
    println!("Shinka QA Evolution");
    println!("===================");
    println!("Target: {}", config.target.descriptor);
    println!(
        "Islands: {} x {} individuals (elite ratio {})",
        islands.num_islands, islands.population_size, islands.elite_ratio
    );
    println!(
        "Migration: every {} generations, rate {}",
        islands.migration_interval, islands.migration_rate
    );
    println!("Strategies: {}", config.engine.bandit.strategies.join(", "));
    println!("Generations: {}", generations);
    println!();

    let mut run = EvolutionRun::new(&config.engine, config.target.descriptor.clone())
        .unwrap_or_else(|e| {
            eprintln!("Error creating engine: {}", e);
            std::process::exit(1);
        });

    let mut oracles = RunOracles::new(&mutate, fitness);
    if let Some(explore) = &explore {
        oracles = oracles.with_exploratory(explore);
    }

    println!("Running evolution...");
    let result = run
        .run(&seed, generations, oracles, |record| {
            let coverage = record.best_metrics.get("coverage").copied().unwrap_or(0.0);
            let mode = match record.mode {
                MutationMode::Standard => "",
                MutationMode::Exploratory => " [exploratory]",
            };
            println!(
                "  Generation {}/{}: fitness={:.3}, coverage={:.1}%, diversity={:.3}{}{}",
                record.generation,
                generations,
                record.best_fitness,
                coverage,
                record.diversity_score,
                if record.saturated { ", saturated" } else { "" },
                mode
            );
        })
        .unwrap_or_else(|e| {
            eprintln!("Evolution failed: {}", e);
            std::process::exit(1);
        });

    let output_dir = base_dir.join(&config.output_dir);
    if let Err(e) = write_report(&output_dir, &result) {
        eprintln!("Error writing report: {}", e);
        std::process::exit(1);
    }

    println!();
    println!("Final results:");
    println!(
        "  Best fitness: {:.3} (improved by {:+.3})",
        result.best.fitness,
        result.improvement()
    );
    if let (Some(initial), Some(best)) = (
        result.initial.metric("coverage"),
        result.best.metric("coverage"),
    ) {
        println!("  Coverage: {:.1}% ({:+.1}%)", best, best - initial);
    }
    if let Some(bugs) = result.best.metric("bugs_detected") {
        println!("  Bug detection: {:.2}", bugs);
    }
    println!("  Evaluations: {}", result.total_evaluations);
    println!(
        "  Time: {:.2}s ({:.1} evaluations/s)",
        result.elapsed_seconds,
        result.total_evaluations as f64 / result.elapsed_seconds.max(f64::EPSILON)
    );
    println!();
    println!("Results saved to: {}", output_dir.display());
    println!("  - {} (best test suite)", BEST_CANDIDATE_FILE);
    println!("  - {} (detailed metrics)", METRICS_FILE);
    println!("  - {} (summary and lineage)", SUMMARY_FILE);
    println!("  - best_gen*.txt (best after each generation)");
}

fn print_example_config() {
    match serde_json::to_string_pretty(&RunConfig::default()) {
        Ok(json) => {
            println!("Example configuration (run.json):");
            println!("{}", json);
        }
        Err(e) => {
            eprintln!("Error serializing example config: {}", e);
            std::process::exit(1);
        }
    }
}
