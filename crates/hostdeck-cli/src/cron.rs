use anyhow::Result;
use clap::Subcommand;
use hostdeck_core::{CoreContext, run_scheduler, scheduler_status};
use hostdeck_cron::RunOptions;

#[derive(Subcommand)]
pub enum CronCommand {
    /// Run every due task once, then exit
    Run {
        /// Run tasks even if they are not due
        #[arg(long)]
        force: bool,

        /// Only run the task with this identifier
        #[arg(long)]
        task: Option<String>,
    },
    /// Show last and next run of every task
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Task failures do not change the exit status; they retry on a later run.
pub fn run(command: CronCommand, ctx: CoreContext) -> Result<()> {
    match command {
        CronCommand::Run { force, task } => {
            let summary = run_scheduler(&ctx, &RunOptions { force, only: task });
            println!(
                "ran {}, skipped {}, failed {}, invalid {}",
                summary.ran, summary.skipped, summary.failed, summary.invalid
            );
        }
        CronCommand::Status { json } => {
            let status = scheduler_status(&ctx);
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
            for task in status {
                let last = task
                    .last_run
                    .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
                let next = task.next_run.map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
                let flag = match (&task.error, task.due) {
                    (Some(e), _) => format!("invalid: {e}"),
                    (None, true) => "due".to_string(),
                    (None, false) => String::new(),
                };
                println!(
                    "{:<32} {:<18} {:>5}  last {last}  next {next}  {flag}",
                    task.identifier,
                    task.origin.to_string(),
                    task.interval
                );
            }
        }
    }
    Ok(())
}
