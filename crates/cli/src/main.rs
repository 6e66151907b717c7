use clap::{Parser, Subcommand};
use shelfgate_core::config::{AppConfig, CONFIG_PATH_VAR};

mod commands;
use commands::{
    handle_config_command, handle_password_command, password::password_service,
    utils::print_error, ConfigCommands, PasswordCommands,
};

#[derive(Parser)]
#[command(name = "shelfgate-cli")]
#[command(about = "Shelfgate CLI - password hashing and configuration tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file used to build the hashing service
    #[arg(long, global = true, env = CONFIG_PATH_VAR, default_value = "config/config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Password hashing tools
    #[command(subcommand)]
    Password(PasswordCommands),

    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Password(command) => {
            let config = AppConfig::from_file(&cli.config)?;
            let service = password_service(&config)?;
            handle_password_command(command, &service).await
        }

        Commands::Config(command) => handle_config_command(command),
    };

    if let Err(e) = result {
        print_error(&e.to_string());
        std::process::exit(1);
    }

    Ok(())
}
