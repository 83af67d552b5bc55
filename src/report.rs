//! Writing finished runs to disk.
//!
//! A report directory holds `metrics.json` (the full [`RunResult`]),
//! `evolved_test.txt` (the best candidate), `summary.txt` (a readable
//! summary with the lineage of improvements) and one `best_gen{N}.txt` per
//! generation holding the global best after that generation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::schema::{Individual, RunResult};

pub const METRICS_FILE: &str = "metrics.json";
pub const BEST_CANDIDATE_FILE: &str = "evolved_test.txt";
pub const SUMMARY_FILE: &str = "summary.txt";

/// File name for the global best after `generation`.
pub fn generation_file(generation: usize) -> String {
    format!("best_gen{generation}.txt")
}

/// Write a run report into `dir`, creating it if needed. Returns the written paths.
pub fn write_report<P: AsRef<Path>>(dir: P, result: &RunResult) -> io::Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(result.generations.len() + 3);

    let metrics = dir.join(METRICS_FILE);
    let json = serde_json::to_string_pretty(result)?;
    fs::write(&metrics, json)?;
    written.push(metrics);

    let best = dir.join(BEST_CANDIDATE_FILE);
    fs::write(&best, &result.best.code)?;
    written.push(best);

    let summary = dir.join(SUMMARY_FILE);
    fs::write(&summary, render_summary(result))?;
    written.push(summary);

    for record in &result.generations {
        let path = dir.join(generation_file(record.generation));
        fs::write(&path, &best_as_of(result, record.generation).code)?;
        written.push(path);
    }

    log::info!("wrote report with {} files to {}", written.len(), dir.display());
    Ok(written)
}

/// Global best after `generation`: the last lineage entry created no later.
fn best_as_of(result: &RunResult, generation: usize) -> &Individual {
    result
        .lineage
        .iter()
        .rev()
        .find(|individual| individual.generation <= generation)
        .unwrap_or(&result.initial)
}

/// Human-readable summary of a run, ending with its lineage of improvements.
pub fn render_summary(result: &RunResult) -> String {
    let mut lines = vec![
        "Shinka QA - Evolution Summary".to_string(),
        "=".repeat(50),
        String::new(),
        format!("Initial fitness:  {:.3}", result.initial.fitness),
        format!(
            "Best fitness:     {:.3} ({:+.3})",
            result.best.fitness,
            result.improvement()
        ),
    ];
    if let (Some(initial), Some(best)) = (
        result.initial.metric("coverage"),
        result.best.metric("coverage"),
    ) {
        lines.push(format!(
            "Coverage:         {:.1}% -> {:.1}% ({:+.1}%)",
            initial,
            best,
            best - initial
        ));
    }
    if let Some(bugs) = result.best.metric("bugs_detected") {
        lines.push(format!("Bug detection:    {:.1}%", bugs * 100.0));
    }
    lines.push(format!("Generations:      {}", result.generations.len()));
    lines.push(format!("Evaluations:      {}", result.total_evaluations));
    lines.push(format!("Elapsed:          {:.2}s", result.elapsed_seconds));
    if let Some(generation) = result.saturation.saturation_generation {
        lines.push(format!("Saturated at:     generation {generation}"));
    }

    lines.push(String::new());
    lines.push("Lineage".to_string());
    lines.push("-".repeat(7));
    for individual in &result.lineage {
        let origin = match &individual.strategy {
            Some(strategy) => format!("{strategy} (island {})", individual.island_id),
            None => "seed".to_string(),
        };
        lines.push(format!(
            "gen {:<4} fitness {:.3}  {}",
            individual.generation, individual.fitness, origin
        ));
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Load the `metrics.json` of a report directory.
pub fn load_report<P: AsRef<Path>>(dir: P) -> io::Result<RunResult> {
    let content = fs::read_to_string(dir.as_ref().join(METRICS_FILE))?;
    serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
