use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Local data directory not found; set KBFORGE_STATE_DIR")]
    StateDirNotFound,

    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
