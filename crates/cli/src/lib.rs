pub mod commands;
pub mod mailer;

use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use std::process::ExitCode;

use commands::workflow::WorkflowAction;

#[derive(Debug, Parser)]
#[command(
    name = "tripgate",
    about = "Tripgate travel desk operator CLI",
    long_about = "Operate the travel desk: migrations, demo fixtures, config inspection, and trip approval workflow actions.",
    after_help = "Examples:\n  tripgate doctor --json\n  tripgate status --trip TRIP-1002\n  tripgate decide --as u-otieno --approval APR-1002-1 --approve"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo travel desk and verify every seeded trip")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, template rendering, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show the derived approval stage of a trip")]
    Status {
        #[arg(long)]
        trip: String,
    },
    #[command(about = "List every approval row of a trip, oldest request first")]
    History {
        #[arg(long)]
        trip: String,
    },
    #[command(about = "Request approval of a trip at a security tier as its owner")]
    Request {
        #[arg(long = "as", value_name = "PERSON_ID")]
        principal: String,
        #[arg(long)]
        trip: String,
        #[arg(
            long,
            value_parser = clap::value_parser!(u8).range(1..=3),
            help = "Defaults to workflow.default_security_level"
        )]
        level: Option<u8>,
    },
    #[command(about = "Approve or decline a pending approval request")]
    #[command(group(ArgGroup::new("verdict").required(true).args(["approve", "decline"])))]
    Decide {
        #[arg(long = "as", value_name = "PERSON_ID")]
        principal: String,
        #[arg(long)]
        approval: String,
        #[arg(long)]
        approve: bool,
        #[arg(long)]
        decline: bool,
        #[arg(long)]
        comment: Option<String>,
    },
    #[command(about = "Void every valid approval of a trip after its content changed")]
    Invalidate {
        #[arg(long)]
        trip: String,
    },
    #[command(about = "List pending approval requests the person may decide today")]
    Inbox {
        #[arg(long = "as", value_name = "PERSON_ID")]
        principal: String,
    },
    #[command(about = "Hand approval authority to another approver for a date window")]
    Delegate {
        #[arg(long = "as", value_name = "PERSON_ID")]
        principal: String,
        #[arg(long = "to", value_name = "APPROVER_ID")]
        delegate: String,
        #[arg(long, value_name = "YYYY-MM-DD")]
        from: NaiveDate,
        #[arg(long, value_name = "YYYY-MM-DD")]
        until: NaiveDate,
        #[arg(long)]
        reason: String,
    },
    #[command(about = "Revoke an active delegation held by the caller")]
    RevokeDelegation {
        #[arg(long = "as", value_name = "PERSON_ID")]
        principal: String,
        #[arg(long)]
        delegation: String,
        #[arg(long)]
        reason: String,
    },
}

impl Command {
    fn into_workflow_action(self) -> Option<WorkflowAction> {
        let action = match self {
            Self::Status { trip } => WorkflowAction::Status { trip },
            Self::History { trip } => WorkflowAction::History { trip },
            Self::Request { principal, trip, level } => {
                WorkflowAction::Request { principal, trip, level }
            }
            Self::Decide { principal, approval, approve, decline: _, comment } => {
                WorkflowAction::Decide { principal, approval, approved: approve, comment }
            }
            Self::Invalidate { trip } => WorkflowAction::Invalidate { trip },
            Self::Inbox { principal } => WorkflowAction::Inbox { principal },
            Self::Delegate { principal, delegate, from, until, reason } => {
                WorkflowAction::Delegate { principal, delegate, from, until, reason }
            }
            Self::RevokeDelegation { principal, delegation, reason } => {
                WorkflowAction::RevokeDelegation { principal, delegation, reason }
            }
            Self::Migrate | Self::Seed | Self::Config | Self::Doctor { .. } => return None,
        };
        Some(action)
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        other => match other.into_workflow_action() {
            Some(action) => commands::workflow::run(action),
            None => commands::CommandResult::failure(
                "unknown",
                "invalid_argument",
                "command is not a workflow action",
                2,
            ),
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
