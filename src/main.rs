use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use taskrail::config::Config;

mod cli;

#[derive(Parser)]
#[command(name = "taskrail")]
#[command(about = "Queue coding tasks and run them through agent CLIs")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.taskrail/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Show where an agent executable was found
    Resolve {
        agent: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// List the models of an agent, or resolve an alias
    Models {
        agent: Option<String>,
        /// Print the concrete model id for this alias
        #[arg(long)]
        resolve: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Check availability, authentication and usage limits of an agent
    Check {
        agent: Option<String>,
        /// Open a terminal running the agent's login flow
        #[arg(long)]
        reauth: bool,
    },

    /// Classify a line of agent output (usage-limit, rate-limit, auth, none)
    Classify { text: String },

    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Claim and run the next queued task of a project
    Next { project: String },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Register a project directory
    Add {
        id: String,
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a task in the backlog
    Add {
        project: String,
        prompt: String,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Put the task on the queue right away
        #[arg(long)]
        queue: bool,
    },
    List {
        project: String,
        #[arg(long)]
        json: bool,
    },
    /// Run a task in the foreground (Ctrl-C cancels)
    Run { project: String, task: String },
    Accept { project: String, task: String },
    Reject { project: String, task: String },
    Cancel { project: String, task: String },
    /// Queue another iteration of a reviewed or failed task
    Retry {
        project: String,
        task: String,
        /// Replace the prompt for the new iteration
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Show the transcript of an iteration
    Log {
        project: String,
        task: String,
        #[arg(long)]
        iteration: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { force } = cli.command {
        let path = cli.config.unwrap_or_else(Config::global_config_path);
        if path.exists() && !force {
            anyhow::bail!("Config already exists at {} (use --force)", path.display());
        }
        Config::default().save_to_file(&path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let app = cli::App::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Resolve { agent, json } => {
            cli::agent::resolve_command(&app, agent.as_deref(), json).await?;
        }
        Commands::Models { agent, resolve, json } => {
            cli::agent::models_command(&app, agent.as_deref(), resolve.as_deref(), json)?;
        }
        Commands::Check { agent, reauth } => {
            cli::agent::check_command(&app, agent.as_deref(), reauth).await?;
        }
        Commands::Classify { text } => {
            cli::agent::classify_command(&text)?;
        }
        Commands::Project { command } => match command {
            ProjectCommands::Add { id, path, name } => {
                cli::project::add(&app, &id, &path, name).await?;
            }
            ProjectCommands::List { json } => cli::project::list(&app, json).await?,
        },
        Commands::Task { command } => match command {
            TaskCommands::Add {
                project,
                prompt,
                agent,
                model,
                queue,
            } => cli::task::add(&app, &project, &prompt, agent, model, queue).await?,
            TaskCommands::List { project, json } => cli::task::list(&app, &project, json).await?,
            TaskCommands::Run { project, task } => cli::task::run(&app, &project, &task).await?,
            TaskCommands::Accept { project, task } => {
                cli::task::accept(&app, &project, &task).await?
            }
            TaskCommands::Reject { project, task } => {
                cli::task::reject(&app, &project, &task).await?
            }
            TaskCommands::Cancel { project, task } => {
                cli::task::cancel(&app, &project, &task).await?
            }
            TaskCommands::Retry {
                project,
                task,
                prompt,
            } => cli::task::retry(&app, &project, &task, prompt).await?,
            TaskCommands::Log {
                project,
                task,
                iteration,
            } => cli::task::log(&app, &project, &task, iteration).await?,
        },
        Commands::Next { project } => cli::task::next(&app, &project).await?,
    }

    Ok(())
}
