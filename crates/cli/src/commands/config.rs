use clap::Subcommand;
use shelfgate_core::config::AppConfig;
use std::path::Path;

use super::utils::{print_error, print_info, print_success, print_warning, CliError, CliResult};

const HIDDEN: &str = "[hidden - use --show-sensitive to reveal]";

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file, including environment overrides
    Validate {
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Show the effective configuration
    Show {
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Show the API key signing secret
        #[arg(long)]
        show_sensitive: bool,
    },

    /// Write a configuration file with the compiled defaults
    Generate {
        #[arg(short, long, default_value = "config/config.toml")]
        output: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file),
        ConfigCommands::Show { file, show_sensitive } => show_config(&file, show_sensitive),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
    }
}

fn load(file: &str) -> CliResult<AppConfig> {
    AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))
}

fn validate_config(file: &str) -> CliResult<()> {
    if !Path::new(file).exists() {
        print_error(&format!("Configuration file not found: {file}"));
        return Err(CliError::Config(format!("File not found: {file}")));
    }

    print_info(&format!("Loading configuration from {file}..."));
    let config = load(file)?;

    print_info("Validating configuration...");
    config.validate().map_err(CliError::Config)?;
    print_success("Configuration is valid!");

    if config.security.api_keys.signing_secret.is_empty() {
        print_warning("No signing secret set; the server will use an ephemeral one");
    }

    println!("Configuration Summary:");
    println!("  Environment: {}", config.environment);
    println!("  Server: {}:{}", config.server.bind_address, config.server.bind_port);
    println!("  bcrypt rounds: {}", config.security.hashing.salt_rounds);
    println!(
        "  Key limits: {}/hour, {}/day",
        config.security.api_keys.requests_per_hour, config.security.api_keys.requests_per_day
    );

    Ok(())
}

fn show_config(file: &str, show_sensitive: bool) -> CliResult<()> {
    let config = load(file)?;

    println!("Configuration from {file}:");
    println!("  Environment: {}", config.environment);

    println!("\n[Server]");
    println!("  Bind Address: {}", config.server.bind_address);
    println!("  Bind Port: {}", config.server.bind_port);
    println!("  Max Body: {} bytes", config.server.max_body_bytes);

    let hashing = &config.security.hashing;
    println!("\n[Password Hashing]");
    println!("  Salt Rounds: {} (max {})", hashing.salt_rounds, hashing.max_salt_rounds);
    println!("  Minimum Timing: {}ms", hashing.min_timing_ms);
    println!("  Salt Length: {} bytes", hashing.salt_length);

    let keys = &config.security.api_keys;
    println!("\n[API Keys]");
    println!("  Prefix: {}", keys.key_prefix);
    println!("  Limits: {}/hour, {}/day", keys.requests_per_hour, keys.requests_per_day);
    if keys.signing_secret.is_empty() {
        println!("  Signing Secret: [not set]");
    } else if show_sensitive {
        println!("  Signing Secret: {}", keys.signing_secret);
    } else {
        println!("  Signing Secret: {HIDDEN}");
    }

    println!("\n[Validation]");
    println!("  Sanitize Mode: {}", config.validation.sanitize_mode);
    println!("  Min File Score: {}", config.validation.min_file_security_score);
    println!("  Max File Size: {} bytes", config.validation.max_file_size_bytes);

    println!("\n[Logging]");
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);

    Ok(())
}

fn sample_config() -> CliResult<String> {
    let body = toml::to_string_pretty(&AppConfig::default())?;
    Ok(format!(
        "# Shelfgate configuration\n\
         # Override any value with SHELFGATE__SECTION__FIELD.\n\
         # BCRYPT_ROUNDS overrides security.hashing.salt_rounds.\n\
         # Production requires a signing secret of at least 32 bytes.\n\n{body}"
    ))
}

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    if Path::new(output).exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    if let Some(parent) = Path::new(output).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, sample_config()?)?;

    print_success(&format!("Sample configuration generated: {output}"));
    print_info("Set security.api_keys.signing_secret before deploying to production");

    Ok(())
}
