use thiserror::Error;

use crate::gateway::GatewayError;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A line that does not parse as an IRC message.
    #[error("Parsing error: '{0}'")]
    ParsingError(String),

    #[error("Configuration error: '{0}'")]
    ConfigError(#[from] toml::de::Error),

    #[error("I/O error: '{0}'")]
    IoError(#[from] std::io::Error),

    #[error("Gateway error: '{0}'")]
    GatewayError(#[from] GatewayError),

    #[error("Bridge state error: '{0}'")]
    StateError(&'static str),
}
