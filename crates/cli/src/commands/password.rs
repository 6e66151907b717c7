use clap::Subcommand;
use prettytable::{row, Table};
use shelfgate_core::{
    config::AppConfig,
    password::{extract_rounds_from_hash, HashOptions, PasswordService},
};

use super::utils::{print_info, print_success, print_warning, CliError, CliResult};

const BENCHMARK_PASSWORD: &str = "Benchmark!Passw0rd";

#[derive(Subcommand)]
pub enum PasswordCommands {
    /// Hash a password with a fresh salt
    Hash {
        #[arg(long, env = "SHELFGATE_PASSWORD", hide_env_values = true)]
        password: String,

        /// Cost factor (defaults to the configured salt rounds)
        #[arg(short, long)]
        rounds: Option<u32>,
    },

    /// Check a password against a stored hash
    Verify {
        #[arg(long, env = "SHELFGATE_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        hash: String,
    },

    /// Print the cost factor of a stored hash
    Rounds {
        #[arg(long)]
        hash: String,
    },

    /// Report whether a stored hash is weaker than the target cost
    NeedsRehash {
        #[arg(long)]
        hash: String,

        /// Target cost (defaults to the configured salt rounds)
        #[arg(short, long)]
        target: Option<u32>,
    },

    /// Generate a random hex salt
    Salt {
        /// Length in bytes (defaults to the configured salt length)
        #[arg(short, long)]
        length: Option<usize>,
    },

    /// Time real hash operations at one or more cost factors
    Benchmark {
        /// Comma-separated cost factors
        #[arg(short, long, value_delimiter = ',', default_value = "10,12,14")]
        rounds: Vec<u32>,

        #[arg(short, long, default_value = "3")]
        iterations: u32,
    },

    /// Review the configured hashing parameters
    Recommendations,
}

/// Builds the service from the loaded configuration.
pub fn password_service(config: &AppConfig) -> CliResult<PasswordService> {
    Ok(PasswordService::with_environment(config.security.hashing.clone(), config.environment)?)
}

pub async fn handle_password_command(
    command: PasswordCommands,
    service: &PasswordService,
) -> CliResult<()> {
    match command {
        PasswordCommands::Hash { password, rounds } => {
            let result =
                service.hash_password(&password, HashOptions { salt_rounds: rounds }).await?;

            let mut table = Table::new();
            table.add_row(row!["Hash", result.hash]);
            table.add_row(row!["Rounds", result.salt_rounds]);
            table.add_row(row!["Salt", result.salt]);
            table.add_row(row!["Version", result.version]);
            table.add_row(row!["Created", result.timestamp.format("%Y-%m-%d %H:%M:%S")]);
            table.printstd();
        }

        PasswordCommands::Verify { password, hash } => {
            if !service.verify_password(&password, &hash).await {
                return Err(CliError::Mismatch);
            }
            print_success("Password matches hash");
        }

        PasswordCommands::Rounds { hash } => {
            println!("{}", extract_rounds_from_hash(&hash)?);
        }

        PasswordCommands::NeedsRehash { hash, target } => {
            let target = target.unwrap_or_else(|| service.config().salt_rounds);
            if service.needs_rehash(&hash, Some(target)) {
                print_warning(&format!("Hash should be upgraded to {target} rounds"));
            } else {
                print_success(&format!("Hash meets the {target}-round target"));
            }
        }

        PasswordCommands::Salt { length } => {
            let salt = match length {
                Some(length) => service.generate_salt(length)?,
                None => service.generate_default_salt()?,
            };
            println!("{salt}");
        }

        PasswordCommands::Benchmark { rounds, iterations } => {
            print_info(&format!("Benchmarking {iterations} hash(es) per cost factor..."));

            let mut table = Table::new();
            table.add_row(row!["Rounds", "Average (ms)", "Min (ms)", "Max (ms)"]);
            for cost in rounds {
                let result =
                    service.benchmark_hashing(BENCHMARK_PASSWORD, cost, iterations).await?;
                table.add_row(row![
                    result.rounds,
                    format!("{:.1}", result.average_time_ms),
                    format!("{:.1}", result.min_time_ms),
                    format!("{:.1}", result.max_time_ms),
                ]);
            }
            table.printstd();
        }

        PasswordCommands::Recommendations => {
            let recommendations = service.security_recommendations();
            if recommendations.is_empty() {
                print_success("Hashing configuration meets all recommendations");
                return Ok(());
            }

            let mut table = Table::new();
            table.add_row(row!["Priority", "Kind", "Message"]);
            for recommendation in recommendations {
                table.add_row(row![
                    format!("{:?}", recommendation.priority).to_uppercase(),
                    recommendation.kind,
                    recommendation.message,
                ]);
            }
            table.printstd();
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use shelfgate_core::password::HashingConfig;

    fn fast_service() -> PasswordService {
        let config =
            HashingConfig { salt_rounds: 10, min_timing_ms: 0, ..HashingConfig::default() };
        PasswordService::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_verify_mismatch_is_error() {
        let service = fast_service();
        let hash = service.hash_password("Corr3ct!horse", HashOptions::default()).await.unwrap();

        let ok = PasswordCommands::Verify {
            password: "Corr3ct!horse".to_string(),
            hash: hash.hash.clone(),
        };
        assert!(handle_password_command(ok, &service).await.is_ok());

        let wrong = PasswordCommands::Verify { password: "nope".to_string(), hash: hash.hash };
        let result = handle_password_command(wrong, &service).await;
        assert!(matches!(result, Err(CliError::Mismatch)));
    }

    #[tokio::test]
    async fn test_rounds_rejects_garbage() {
        let service = fast_service();
        let command = PasswordCommands::Rounds { hash: "not-a-hash".to_string() };
        let result = handle_password_command(command, &service).await;
        assert!(matches!(result, Err(CliError::Hash(_))));
    }

    #[tokio::test]
    async fn test_salt_length_bounds() {
        let service = fast_service();
        let too_short = PasswordCommands::Salt { length: Some(4) };
        assert!(handle_password_command(too_short, &service).await.is_err());

        let default = PasswordCommands::Salt { length: None };
        assert!(handle_password_command(default, &service).await.is_ok());
    }

    #[test]
    fn test_service_from_config() {
        let mut config = AppConfig::default();
        config.security.hashing.salt_rounds = 40;
        assert!(matches!(password_service(&config), Err(CliError::Hash(_))));
    }
}
