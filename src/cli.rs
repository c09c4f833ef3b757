use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use quarantine_ward::config::AppConfig;
use quarantine_ward::error::AppError;
use quarantine_ward::simulation::{self, EventResult, SimulationRun};
use quarantine_ward::telemetry;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "quarantine-ward",
    about = "Assign quarantine rooms and propagate member status changes",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the default quarantine policy resolved from the environment
    Policy,
    /// Replay a JSON ward scenario through the engine
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Scenario file with facilities, rooms, members and events
    #[arg(long)]
    scenario: PathBuf,
    /// Clock for events without a timestamp (RFC 3339). Defaults to the scenario clock.
    #[arg(long, value_parser = parse_timestamp)]
    now: Option<DateTime<Utc>>,
    /// Emit the full run as JSON instead of a text summary
    #[arg(long)]
    json: bool,
}

pub(crate) fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    info!(?config.environment, "quarantine ward cli starting");

    match cli.command {
        Command::Policy => {
            match &config.default_policy {
                Some(policy) => println!("{}", serde_json::to_string_pretty(policy)?),
                None => println!("no default policy configured (WARD_DEFAULT_POLICY=none)"),
            }
            Ok(())
        }
        Command::Simulate(args) => {
            let scenario = simulation::load_scenario(&args.scenario)?;
            let run = simulation::run(scenario, config.default_policy, args.now)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                render_run(&run);
            }
            Ok(())
        }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}

fn render_run(run: &SimulationRun) {
    println!("Quarantine ward simulation");
    println!(
        "{} event(s), {} rejected",
        run.events.len(),
        run.rejected()
    );

    println!("\nEvents");
    for event in &run.events {
        println!("- #{} {} @ {}", event.index, event.action, event.at.to_rfc3339());
        match &event.result {
            EventResult::Placed(outcome) => {
                println!("    {}", outcome.placement.summary());
                for change in &outcome.propagation.changes {
                    println!("    * {}", change.summary());
                }
            }
            EventResult::Propagated(outcome) => {
                if outcome.changes.is_empty() {
                    println!("    no changes");
                }
                for change in &outcome.changes {
                    println!("    * {}", change.summary());
                }
            }
            EventResult::Tested(outcome) => {
                println!(
                    "    status {} -> {} ({}/{} qualifying negatives)",
                    outcome.decision.previous.label(),
                    outcome.decision.next.label(),
                    outcome.decision.qualifying_negatives,
                    outcome.decision.required_negatives
                );
                for change in &outcome.changes {
                    println!("    * {}", change.summary());
                }
            }
            EventResult::Rejected { error } => println!("    rejected: {error}"),
        }
    }

    for report in &run.occupancy {
        println!(
            "\nOccupancy for {} (policy {}): {}/{} beds used, {} open",
            report.facility,
            report.policy,
            report.total_occupied(),
            report.total_capacity(),
            report.open_beds()
        );
        for room in &report.rooms {
            let label = room
                .most_severe_label
                .map(|label| label.code().to_string())
                .unwrap_or_else(|| "-".to_string());
            let closed = if room.closed { ", closed" } else { "" };
            println!(
                "- {}: {}/{} occupied, {} positive, most severe {}{}",
                room.room, room.occupied, room.capacity, room.positive, label, closed
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_timestamps() {
        let parsed = parse_timestamp("2021-09-01T08:00:00+07:00").expect("valid timestamp");
        assert_eq!(parsed.to_rfc3339(), "2021-09-01T01:00:00+00:00");
    }

    #[test]
    fn rejects_malformed_timestamps() {
        let err = parse_timestamp("yesterday").expect_err("not a timestamp");
        assert!(err.contains("yesterday"));
    }

    #[test]
    fn simulate_requires_a_scenario() {
        assert!(Cli::try_parse_from(["quarantine-ward", "simulate"]).is_err());
        let cli = Cli::try_parse_from([
            "quarantine-ward",
            "simulate",
            "--scenario",
            "demos/ward_scenario.json",
            "--json",
        ])
        .expect("arguments parse");
        assert!(matches!(cli.command, Command::Simulate(SimulateArgs { json: true, .. })));
    }
}
