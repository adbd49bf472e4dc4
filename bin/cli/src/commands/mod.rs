//! Command implementations.

pub mod config;
pub mod generate;
pub mod init;
pub mod run;
pub mod tools;

use std::path::PathBuf;

/// CLI failure, split by exit code.
#[derive(Debug)]
pub enum CliError {
    /// Bad arguments, missing files, validation failures. Exit 1.
    User(String),
    /// The workflow ran and failed (or was stopped). Exit 2.
    Execution(String),
}

impl CliError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}

/// The flowstone home directory: `$FLOWSTONE_HOME`, else `~/.flowstone`.
pub fn home_dir() -> PathBuf {
    if let Ok(home) = std::env::var("FLOWSTONE_HOME") {
        return PathBuf::from(home);
    }
    let base = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(base).join(".flowstone")
}

/// Path of the local database inside the flowstone home.
pub fn database_path() -> PathBuf {
    home_dir().join("flowstone.db")
}
