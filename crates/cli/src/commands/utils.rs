use routeslot_core::proxy::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Error: {0}")]
    General(String),
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::General(error.to_string())
    }
}

pub type CliResult<T> = Result<T, CliError>;

pub fn print_success(message: &str) {
    println!("[SUCCESS] {message}");
}

pub fn print_warning(message: &str) {
    eprintln!("[WARN] {message}");
}

pub fn print_info(message: &str) {
    println!("[INFO] {message}");
}

/// Hides all but the first character of a secret.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    match secret.chars().next() {
        Some(first) => format!("{first}****"),
        None => String::new(),
    }
}
