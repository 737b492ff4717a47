use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;

use timetable_solver::server;
use timetable_solver::{Objective, SchedulerError, SchedulingOutput, SolveRequest};

#[derive(Debug, Parser)]
#[command(version, about = "Conflict-free course timetables under a time budget")]
struct Cli {
    /// Default log filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API (the default).
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
        #[arg(long, default_value_t = 2)]
        max_concurrent_solves: usize,
    },
    /// Solve one JSON request file and print the result as JSON.
    Solve {
        file: PathBuf,
        #[arg(long)]
        time_budget: Option<f64>,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long, value_enum)]
        objective: Option<Objective>,
        #[arg(long)]
        allow_partial: bool,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    match cli.command.unwrap_or(Command::Serve {
        bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
        max_concurrent_solves: 2,
    }) {
        Command::Serve {
            bind,
            max_concurrent_solves,
        } => server::run_server(bind, max_concurrent_solves).await?,
        Command::Solve {
            file,
            time_budget,
            workers,
            objective,
            allow_partial,
            seed,
        } => {
            let mut request: SolveRequest =
                serde_json::from_str(&tokio::fs::read_to_string(&file).await?)?;
            let config = &mut request.config;
            config.time_budget_seconds = time_budget.or(config.time_budget_seconds);
            config.worker_count = workers.unwrap_or(config.worker_count);
            config.optimization_objective = objective.or(config.optimization_objective);
            config.allow_partial |= allow_partial;
            config.seed = seed.unwrap_or(config.seed);

            info!("Solving {}", file.display());
            let result = tokio::task::spawn_blocking(move || {
                timetable_solver::solve(&request.input, &request.config)
            })
            .await?;
            let output = match result {
                Ok(output) => output,
                Err(SchedulerError::Model(e)) => SchedulingOutput::from_model_error(&e),
                Err(e) => return Err(e.into()),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
