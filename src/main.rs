use anyhow::Context;
use clap::Parser;
use colored::*;
use ghcnh_curator::StepReport;
use ghcnh_curator::cli::{self, Args};
use std::process;
use tracing::debug;

fn main() {
    let args = Args::parse();
    setup_logging(&args);

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let outcome = runtime.block_on(run(args));
    // Blocks until every spawned worker thread has returned
    drop(runtime);

    match outcome {
        Ok(Some(report)) => {
            print_summary(&report);
            process::exit(if report.tasks_failed > 0 { 2 } else { 0 });
        }
        Ok(None) => process::exit(0),
        Err(error) => {
            eprintln!("{} {:#}", "Error:".bright_red().bold(), error);
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<Option<StepReport>> {
    debug!("Command line arguments: {:?}", args);
    let config = args.to_config().context("invalid configuration")?;
    let memory_ceiling_mb = args.memory_ceiling_mb().context("invalid --memory")?;

    if !args.force && !cli::confirm(args.step, &config.dataset_root())? {
        println!("{}", "Aborted".bright_yellow());
        return Ok(None);
    }

    let report = ghcnh_curator::run(args.step, args.workers, memory_ceiling_mb, config)
        .await
        .with_context(|| format!("step {} failed", args.step))?;
    Ok(Some(report))
}

fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ghcnh_curator={}", args.log_level())));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .init();
}

fn print_summary(report: &StepReport) {
    println!("\n{}", format!("Step {} Summary", report.step).bright_green().bold());
    println!(
        "  {} {:.1}s",
        "Time elapsed:".bright_cyan(),
        report.elapsed.as_secs_f64()
    );
    println!(
        "  {} {}",
        "Tasks run:".bright_cyan(),
        report.tasks_run.to_string().bright_white()
    );
    if report.tasks_failed > 0 {
        println!(
            "  {} {}",
            "Tasks failed:".bright_red(),
            report.tasks_failed.to_string().bright_red().bold()
        );
    }
    println!(
        "  {} {}",
        "Partitions written:".bright_cyan(),
        report.partitions_written.to_string().bright_white().bold()
    );
    println!(
        "  {} {}",
        "Inventory entries:".bright_cyan(),
        report.inventory_entries.to_string().bright_white()
    );
    if !report.conflicts.is_empty() {
        println!(
            "  {} {}",
            "Count conflicts:".bright_yellow(),
            report.conflicts.len().to_string().bright_yellow()
        );
    }
    if let Some(stations) = report.stations_emitted {
        println!(
            "  {} {}",
            "Stations listed:".bright_cyan(),
            stations.to_string().bright_white()
        );
    }
    println!(
        "  {} {}",
        "Output:".bright_cyan(),
        report.output_root.display()
    );
}
