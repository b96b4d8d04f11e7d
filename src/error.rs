//! Error taxonomy for measurement RPCs

use crate::response::ParseError;

/// Reasons a measurement or device RPC failed
///
/// Nothing is retried. Whatever failed, the measurement RPCs have already forced the channels back
/// to 0 V and disabled them before the error reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum MeasureError
{
    /// Reading from or writing to the session failed, or the session closed
    #[error("Failed to communicate with instrument. {0}")]
    Transport(#[from] std::io::Error),
    /// The instrument's error register held a code outside the accepted set
    #[error("Instrument error {code}: {message}")]
    Instrument { code: i32, message: String },
    /// A reply burst could not be decoded or did not hold the programmed number of readings
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A measurement spec was rejected before anything was sent
    #[error("Invalid measurement parameters. {0}")]
    InvalidSpec(&'static str),
    /// A query was answered with something other than what it should produce
    #[error("Unexpected reply to `{query}`: {reply:?}")]
    UnexpectedReply { query: String, reply: String },
}

impl MeasureError
{
    /// The instrument error code, if this is an instrument error
    pub fn instrument_code(&self) -> Option<i32>
    {
        match self {
            Self::Instrument { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MeasureError>;
