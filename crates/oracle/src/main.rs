use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use oracle::ledger::ReputationLedger;
use oracle::models::Direction;
use oracle::scorer::{standings, ScoreOutcome, ScoreReport, Standing};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "oracle",
    about = "Stock Oracle - analysts predict the next session, the scorekeeper grades them"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/oracle.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the latest quote and write the market snapshot
    Collect,

    /// Ask analysts for a prediction and append it to the ledger
    Predict {
        /// Run only this analyst
        #[arg(long)]
        analyst: Option<String>,
    },

    /// Grade new predictions against the market and update reputation
    Score {
        /// Grade against a made-up movement instead of market data
        #[arg(long, value_enum)]
        simulate: Option<SimulatedDirection>,

        /// Replay every prediction, not just those since the last run
        #[arg(long)]
        rescore_all: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print every agent's reputation
    Standings {
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SimulatedDirection {
    Up,
    Down,
}

impl From<SimulatedDirection> for Direction {
    fn from(value: SimulatedDirection) -> Self {
        match value {
            SimulatedDirection::Up => Direction::Up,
            SimulatedDirection::Down => Direction::Down,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = oracle::load_config(&cli.config)?;

    match cli.command {
        Command::Collect => {
            let snapshot = oracle::collect(&config).await?;
            println!(
                "{} at ${} ({}) saved to {}",
                snapshot.symbol, snapshot.price, snapshot.change_percent, config.ledger.snapshot_path
            );
        }

        Command::Predict { analyst } => {
            let snapshot = oracle::read_snapshot(&config.ledger)?;
            let ledgers =
                oracle::build_ledgers(&config.ledger).context("Failed to open ledgers")?;
            let orchestrator = oracle::build_orchestrator(&config, ledgers.predictions)
                .context("Failed to build orchestrator")?;

            let outcomes = orchestrator
                .run(&snapshot, analyst.as_deref())
                .await
                .map_err(|e| anyhow::anyhow!("Prediction round failed: {e}"))?;

            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(record) => println!(
                        "{}: {} ({}) {}",
                        record.agent, record.direction, record.confidence, record.reasoning
                    ),
                    Err(e) => {
                        failed += 1;
                        println!("{}: FAILED {e}", outcome.agent);
                    }
                }
            }
            if failed == outcomes.len() {
                anyhow::bail!("No analyst produced a prediction");
            }
        }

        Command::Score {
            simulate,
            rescore_all,
            json,
        } => {
            let ledgers =
                oracle::build_ledgers(&config.ledger).context("Failed to open ledgers")?;
            let keeper = oracle::build_scorekeeper(&config, &ledgers, simulate.map(Into::into))?;
            let outcome = keeper
                .run(rescore_all)
                .await
                .context("Scoring run failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                match &outcome {
                    ScoreOutcome::NoPendingPredictions { .. } => {
                        println!("No new predictions to score.");
                    }
                    ScoreOutcome::Scored(report) => print_report(report),
                }
            }
        }

        Command::Standings { json } => {
            let ledgers =
                oracle::build_ledgers(&config.ledger).context("Failed to open ledgers")?;
            let book = ledgers
                .reputation
                .load()
                .context("Failed to load reputation")?;
            let rows = standings(&book);
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No agents have been scored yet.");
            } else {
                print_standings(&rows);
            }
        }
    }

    Ok(())
}

fn print_report(report: &ScoreReport) {
    let m = &report.movement;
    if report.simulated {
        println!("*** SIMULATED market movement: scores do not reflect the real market ***");
    }
    println!(
        "Market {}: {} -> {} ({} / {}%)  [{} vs {}]",
        m.direction(),
        m.yesterday_close(),
        m.today_close(),
        m.change().round_dp(2),
        m.change_percent().round_dp(2),
        m.dates().today,
        m.dates().yesterday
    );
    println!();
    for v in &report.verdicts {
        println!(
            "{:<20} predicted {:<4} ({:<6}) {}  running {:.1}% ({}/{})",
            v.agent,
            v.predicted.as_str(),
            v.confidence.as_str(),
            if v.is_correct { "CORRECT" } else { "WRONG  " },
            v.running_accuracy,
            v.running_correct,
            v.running_total
        );
    }
    println!();
    print_standings(&report.standings);
}

fn print_standings(rows: &[Standing]) {
    for row in rows {
        println!(
            "{:<20} {}/{} ({:.1}%)",
            row.agent, row.correct, row.total, row.accuracy
        );
    }
}
