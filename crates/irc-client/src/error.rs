//! IRC client errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed before login completed")]
    ConnectionClosed,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Not connected")]
    NotConnected,
}
