mod cli;
mod commands;
mod config;
mod output;
mod session;
mod store;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, ConfigCommands, DevicesCommands, ExtAuthCommands};
use output::print_error;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn init_tracing(level: &str) {
    // Prefer RUST_LOG from env, otherwise use the configured level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let profile_name = cli.profile.as_str();
    let profile = config::load_profile(profile_name)?;
    let level = if cli.verbose {
        "debug"
    } else {
        profile.log_level.as_deref().unwrap_or("warn")
    };
    init_tracing(level);

    match &cli.command {
        Commands::Login(args) => {
            let ctx = session::open(&cli, &profile)?;
            commands::auth::login(&ctx, args).await?;
        }
        Commands::Refresh => {
            let ctx = session::open(&cli, &profile)?;
            commands::auth::refresh(&ctx).await?;
        }
        Commands::Whoami => {
            let store = session::profile_store(profile_name)?;
            commands::auth::whoami(&store, profile_name).await?;
        }
        Commands::Logout => {
            let store = session::profile_store(profile_name)?;
            commands::auth::logout(&store, profile_name).await?;
        }
        Commands::Discovery => {
            let ctx = session::open(&cli, &profile)?;
            commands::discovery::discovery(&ctx).await?;
        }
        Commands::KkApps => {
            let ctx = session::open(&cli, &profile)?;
            commands::discovery::kk_apps(&ctx).await?;
        }
        Commands::ExtAuth(args) => {
            let ctx = session::open(&cli, &profile)?;
            match &args.command {
                ExtAuthCommands::Start { kk_app_id } => {
                    commands::ext_auth::start(&ctx, kk_app_id).await?;
                }
                ExtAuthCommands::Complete { link } => {
                    commands::ext_auth::complete(&ctx, link).await?;
                }
                ExtAuthCommands::Pending => commands::ext_auth::pending(&ctx).await?,
            }
        }
        Commands::Devices(args) => {
            let ctx = session::open(&cli, &profile)?;
            match &args.command {
                DevicesCommands::List => commands::devices::list(&ctx).await?,
                DevicesCommands::Remove { key_identifier } => {
                    commands::devices::remove(&ctx, key_identifier).await?;
                }
            }
        }
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => {
                println!("{}: {}", "Profile".cyan(), profile_name);
                let shown = toml::to_string_pretty(&profile)?;
                if shown.trim().is_empty() {
                    println!("(nothing configured)");
                } else {
                    println!("{}", shown.trim_end());
                }
            }
            ConfigCommands::Set(set_args) => {
                let mut updated = profile.clone();
                updated.set(&set_args.key, &set_args.value)?;
                config::save_profile(profile_name, &updated)?;
                output::print_success(&format!("Set {} = {}", set_args.key, set_args.value));
            }
        },
    }

    Ok(())
}
