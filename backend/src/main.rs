use anyhow::{Context, Result};
use backend::config::Config;
use backend::{frontend, proxy, Environment, EnvironmentConfig, ACTIVE, ACTIVE_ENVIRONMENT};
use clap::{Parser, Subcommand};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(name = "reddit-serve", author, version, about = "Serve the reddit-app frontend and API proxy", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the compiled app under its mount path
    Frontend,
    /// Forward API traffic to the upstream server
    Proxy,
    /// Print the endpoint set this build was compiled with
    Env {
        /// Pretty-print the JSON output
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
}

fn load_config() -> Result<Config> {
    Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        anyhow::Error::new(e)
    })
}

fn print_environment(pretty: bool) -> Result<()> {
    let json = if pretty {
        ACTIVE.to_json_pretty()
    } else {
        ACTIVE.to_json()
    }
    .context("Failed to serialize environment")?;
    println!("{}", json);

    check_environment(&ACTIVE, ACTIVE_ENVIRONMENT)
}

/// Fails (and so exits non-zero) when an endpoint set breaks its invariants.
fn check_environment(config: &EnvironmentConfig, environment: Environment) -> Result<()> {
    config
        .validate()
        .with_context(|| format!("The {} environment is invalid", environment))
}

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args = Args::parse();

    match args.command {
        Command::Env { pretty } => print_environment(pretty),
        Command::Frontend => {
            let config = load_config()?;
            frontend::run(config.frontend)
                .await
                .context("Frontend server failed")
        }
        Command::Proxy => {
            let config = load_config()?;
            proxy::run(config.proxy).await?;
            info!("Proxy stopped");
            Ok(())
        }
    }
}
