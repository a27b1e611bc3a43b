//! Postline CLI tool.

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "postline")]
#[command(about = "Postline content pipeline CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "POSTLINE_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage content jobs
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Manage schedules
    Schedules {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
    /// Process due schedules now
    Trigger {
        /// Shared trigger secret
        #[arg(long, env = "SCHEDULER_SECRET")]
        secret: String,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// List jobs
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show one job
    Show { id: String },
    /// Show a job's progress log
    Logs { id: String },
    /// Create a job and start the pipeline
    Create {
        topic: String,
        #[arg(long, default_value = "tech")]
        category: String,
        #[arg(long)]
        template: Option<String>,
    },
    /// Submit a review decision (approve|feedback|rewrite|hold)
    Review {
        id: String,
        decision: String,
        #[arg(long)]
        feedback: Option<String>,
    },
    /// Approve the pending deploy (or reject it)
    Deploy {
        id: String,
        #[arg(long)]
        reject: bool,
    },
    /// Resume a held job
    Resume { id: String },
}

#[derive(Subcommand)]
enum ScheduleCommands {
    /// List schedules
    List,
    /// Show one schedule
    Show { id: String },
    /// Enable a schedule (or disable with --off)
    Enable {
        id: String,
        #[arg(long)]
        off: bool,
    },
    /// Delete a schedule
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Jobs { command } => match command {
            JobCommands::List {
                status,
                category,
                limit,
            } => commands::jobs::list(&cli.api_url, status, category, limit).await,
            JobCommands::Show { id } => commands::jobs::show(&cli.api_url, &id).await,
            JobCommands::Logs { id } => commands::jobs::logs(&cli.api_url, &id).await,
            JobCommands::Create {
                topic,
                category,
                template,
            } => commands::jobs::create(&cli.api_url, &topic, &category, template).await,
            JobCommands::Review {
                id,
                decision,
                feedback,
            } => commands::jobs::review(&cli.api_url, &id, &decision, feedback).await,
            JobCommands::Deploy { id, reject } => {
                commands::jobs::deploy(&cli.api_url, &id, !reject).await
            }
            JobCommands::Resume { id } => commands::jobs::resume(&cli.api_url, &id).await,
        },
        Commands::Schedules { command } => match command {
            ScheduleCommands::List => commands::schedules::list(&cli.api_url).await,
            ScheduleCommands::Show { id } => commands::schedules::show(&cli.api_url, &id).await,
            ScheduleCommands::Enable { id, off } => {
                commands::schedules::enable(&cli.api_url, &id, !off).await
            }
            ScheduleCommands::Delete { id } => {
                commands::schedules::delete(&cli.api_url, &id).await
            }
        },
        Commands::Trigger { secret } => commands::trigger(&cli.api_url, &secret).await,
    }
}
