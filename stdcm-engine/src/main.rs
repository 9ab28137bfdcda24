use std::process::ExitCode;

use stdcm_engine::scenario::{Scenario, format_clock};
use stdcm_engine::stdcm::StdcmResult;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("Usage: stdcm <scenario.json>");
        return ExitCode::FAILURE;
    };

    let scenario = match Scenario::from_path(&path) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    match scenario.run() {
        Ok(result) => {
            print_result(&result);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Search failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_result(result: &StdcmResult) {
    println!(
        "Departure: {} (shifted by {:.0}s)",
        format_clock(result.departure_time),
        result.departure_shift
    );
    println!("Arrival:   {}", format_clock(result.arrival_time()));
    println!(
        "Running time: {:.0}s over {:.0}m",
        result.running_time(),
        result.path.length
    );

    let blocks: Vec<String> = result.path.blocks.iter().map(|b| b.to_string()).collect();
    println!("Blocks: {}", blocks.join(" -> "));

    println!(
        "Fixed points ({} iterations, {:?}):",
        result.envelope.iterations, result.envelope.distribution
    );
    for point in &result.envelope.fixed_points {
        let kind = match point.stop_duration {
            Some(duration) => format!("stop {duration:.0}s"),
            None => "pass".to_string(),
        };
        println!(
            "  {:>8.1}m  {}  {}",
            point.offset,
            format_clock(result.departure_time + point.time),
            kind
        );
    }
    println!("Explored edges: {}", result.explored_edges);
}
