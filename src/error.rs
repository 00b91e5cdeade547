use std::{fmt, process::ExitCode};

/// Follower error.
///
/// `Temporary` errors are retried indefinitely by the follower loop and never
/// escalate on their own. `Protocol` errors mean the node violated the
/// ordering/range/identity guarantees the follower depends on; no amount of
/// retrying fixes that, so the run aborts.
#[derive(Debug)]
pub enum FollowerError {
    /// Configuration error. Should not retry.
    Configuration,
    /// Temporary error (node unreachable, request failed). Can retry.
    Temporary,
    /// The node response violated a consistency guarantee. Should not retry.
    Protocol,
    /// The run was asked to stop.
    Cancelled,
    /// A follower run is already active.
    AlreadyRunning,
}

pub type Result<T> = error_stack::Result<T, FollowerError>;

impl error_stack::Context for FollowerError {}

impl fmt::Display for FollowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FollowerError::Configuration => f.write_str("follower error: configuration"),
            FollowerError::Temporary => f.write_str("follower error: temporary"),
            FollowerError::Protocol => f.write_str("follower error: protocol consistency"),
            FollowerError::Cancelled => f.write_str("follower stopped: cancelled"),
            FollowerError::AlreadyRunning => f.write_str("follower error: already running"),
        }
    }
}

pub trait ReportExt {
    fn to_exit_code(&self) -> ExitCode;
}

impl<T> ReportExt for Result<T> {
    fn to_exit_code(&self) -> ExitCode {
        match self {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{:?}", err);
                // Exit codes based on sysexits.h
                match err.current_context() {
                    FollowerError::Configuration => ExitCode::from(78),
                    FollowerError::Temporary => ExitCode::from(75),
                    FollowerError::Cancelled => ExitCode::SUCCESS,
                    _ => ExitCode::FAILURE,
                }
            }
        }
    }
}
