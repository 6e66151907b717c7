pub mod config;
pub mod password;
pub mod utils;

pub use config::{handle_config_command, ConfigCommands};
pub use password::{handle_password_command, PasswordCommands};
