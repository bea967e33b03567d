//! Trace Repair CLI - Repair buggy programs described by a JSON problem file.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use trace_repair::{
    ProcessOracle, SolutionArchive,
    schema::{Problem, RepairConfig},
    trials::{mean_repair_rate, run_trials},
};

const TRACER_VAR: &str = "TRACE_REPAIR_TRACER";

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
        eprintln!("Usage: {} <problem.json> [config.json]", args[0]);
        eprintln!();
        eprintln!("Repair the buggy programs of a problem file.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  problem.json  Buggy programs, correct programs and test cases");
        eprintln!("  config.json   Repair configuration (default settings if omitted)");
        eprintln!();
        eprintln!("The tracer command is read from {TRACER_VAR}.");
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    let problem_path = PathBuf::from(&args[1]);
    let problem_str = fs::read_to_string(&problem_path).unwrap_or_else(|e| {
        eprintln!("Error reading problem file: {}", e);
        std::process::exit(1);
    });
    let problem: Problem = serde_json::from_str(&problem_str).unwrap_or_else(|e| {
        eprintln!("Error parsing problem: {}", e);
        std::process::exit(1);
    });

    let config: RepairConfig = match args.get(2) {
        Some(path) => {
            let config_str = fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error reading config file: {}", e);
                std::process::exit(1);
            });
            serde_json::from_str(&config_str).unwrap_or_else(|e| {
                eprintln!("Error parsing config: {}", e);
                std::process::exit(1);
            })
        }
        None => RepairConfig::default(),
    };
    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        std::process::exit(1);
    }

    let tracer_line = std::env::var(TRACER_VAR).unwrap_or_default();
    let tracer = ProcessOracle::from_command_line(
        &tracer_line,
        problem.sorted_tests(),
        config.timeout(),
    )
    .unwrap_or_else(|| {
        eprintln!("Set {TRACER_VAR} to the tracer command line");
        std::process::exit(1);
    });

    println!("Trace Repair");
    println!("============");
    if !problem.title.is_empty() {
        println!("Problem: {}", problem.title);
    }
    println!(
        "Programs: {} buggy, {} correct ({})",
        problem.wrongs.len(),
        problem.corrects.len(),
        if config.include_corrects { "used" } else { "unused" }
    );
    println!("Test cases: {}", problem.testcases.len());
    println!("Generations: {}", config.generations);
    println!("Trials: {}", config.trials);
    println!("Localization: {:?}", config.localization);
    println!();

    let start = Instant::now();
    let outcomes = run_trials(&config, &problem, |_| tracer.clone());

    let output_dir = problem_path.with_extension("results");
    let mut archive = SolutionArchive::with_output_dir(&output_dir).unwrap_or_else(|e| {
        eprintln!("Error creating {}: {}", output_dir.display(), e);
        std::process::exit(1);
    });

    for outcome in &outcomes {
        let stats = &outcome.result.stats;
        println!(
            "Trial {} (seed {}): {}/{} repaired, {} attempts, {:.2}s, {:?}",
            outcome.trial,
            outcome.seed,
            stats.solved_lineages,
            stats.total_lineages,
            stats.attempts,
            stats.elapsed_seconds,
            stats.stop_reason
        );
        for (origin, solutions) in &outcome.result.solutions {
            println!("  {}: {} solution(s)", origin, solutions.len());
        }
        if let Err(e) = archive.save_result(outcome.trial, &outcome.result) {
            eprintln!("Error saving trial {}: {}", outcome.trial, e);
        }
    }

    println!();
    println!("Mean repair rate: {:.3}", mean_repair_rate(&outcomes));
    println!("Results: {}", output_dir.display());
    println!("Time: {:.2}s", start.elapsed().as_secs_f32());
}

fn print_example_config() {
    let config = RepairConfig {
        generations: 10,
        trials: 3,
        include_corrects: true,
        random_seed: Some(42),
        ..Default::default()
    };

    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing example config: {}", e),
    }
}
