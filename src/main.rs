use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

mod account;
mod config;
mod error;
mod evaluation;
mod llm;
mod logging;
mod models;
mod output;
mod session;
mod suggestions;
mod validator;

use crate::account::{AccountStore, FileAccountStore, Plan, Provider};
use crate::config::Config;
use crate::llm::OpenAiBackend;
use crate::output::OutputFormat;
use crate::session::Session;

/// AI Response Validator - Generate a response and score it for accuracy, safety and validity
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "response-validator.toml")]
    config: PathBuf,

    /// Output format: plain or json
    #[arg(short, long, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - log progress for each API request
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a response for a prompt and validate it
    Validate {
        prompt: String,
        /// Ideal answer used to score similarity and validity
        #[arg(short, long, default_value = "")]
        reference: String,
        /// Model identifier (defaults to the configured model)
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Create an account and sign in
    Signup { email: String, password: String },
    /// Sign in with email and password
    Login { email: String, password: String },
    /// Sign in with a social account
    LoginWith { provider: SocialProvider },
    /// Sign out
    Logout,
    /// Request a password reset
    ForgotPassword { email: String },
    /// Show the signed-in user and remaining uses
    Status,
    /// List the available plans
    Plans,
    /// Manage the current plan
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },
}

#[derive(Subcommand, Debug)]
enum PlanAction {
    /// Switch to a plan, resetting the remaining uses
    Select { plan: Plan },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SocialProvider {
    Google,
    Github,
}

impl From<SocialProvider> for Provider {
    fn from(provider: SocialProvider) -> Self {
        match provider {
            SocialProvider::Google => Provider::Google,
            SocialProvider::Github => Provider::Github,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if let Err(e) = logging::init_tracing(args.verbose) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let config = Config::from_file(&args.config)?;
    let accounts = Arc::new(FileAccountStore::new(config.account_store_path.clone()));
    tracing::debug!(path = %accounts.path().display(), "using account store");

    match args.command {
        Command::Validate {
            prompt,
            reference,
            model,
        } => {
            let backend = Arc::new(OpenAiBackend::from_config(&config)?);
            let session = Session::new(
                accounts.clone(),
                backend.clone(),
                backend.clone(),
                backend,
                config.suggestion_count,
            )
            .with_storage_path(config.storage_path.as_ref().map(PathBuf::from));
            let model = model.unwrap_or_else(|| config.model.clone());

            match session.validate(&prompt, &reference, &model).await {
                Ok(report) => output::print_report(&report, args.output),
                Err(e) => {
                    eprintln!("Error: {e}");
                    if e.suggests_upgrade() {
                        let current = accounts.current_user()?.map(|user| user.plan);
                        output::print_plans(current, OutputFormat::Plain);
                        eprintln!("Upgrade with: response-validator plan select <pro|business>");
                    }
                    std::process::exit(1);
                }
            }
        }
        Command::Signup { email, password } => {
            let user = accounts.signup(&email, &password)?;
            output::print_user(Some(&user), args.output);
        }
        Command::Login { email, password } => {
            let user = accounts.login(&email, &password)?;
            output::print_user(Some(&user), args.output);
        }
        Command::LoginWith { provider } => {
            let user = accounts.login_with_provider(provider.into())?;
            output::print_user(Some(&user), args.output);
        }
        Command::Logout => {
            accounts.logout()?;
            output::print_user(None, args.output);
        }
        Command::ForgotPassword { email } => {
            tracing::debug!(email = %email, "password reset requested");
            println!("If an account with that email exists, a reset link has been sent.");
        }
        Command::Status => {
            let user = accounts.current_user()?;
            output::print_user(user.as_ref(), args.output);
        }
        Command::Plans => {
            let current = accounts.current_user()?.map(|user| user.plan);
            output::print_plans(current, args.output);
        }
        Command::Plan {
            action: PlanAction::Select { plan },
        } => {
            let user = accounts.select_plan(plan)?;
            output::print_user(Some(&user), args.output);
        }
    }

    Ok(())
}
