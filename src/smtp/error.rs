//! Error types for the SMTP server

use std::io;

use lettre::address::AddressError;
use thiserror::Error;

/// Error returned by a message handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the transaction state while a mail transaction is in progress
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid address {address:?}")]
    AddressParse {
        address: String,
        #[source]
        source: AddressError,
    },

    #[error("Failed to read message body")]
    BodyRead(#[source] io::Error),

    #[error("No message handler configured")]
    MissingHandler,

    #[error("Message rejected by handler: {0}")]
    Handler(#[source] HandlerError),
}

/// A rejection chosen by a message handler.
///
/// Returning this from a handler makes the server answer the DATA command
/// with the given reply code instead of the generic `554`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code} {message}")]
pub struct Rejection {
    pub code: String,
    pub message: String,
}

impl Rejection {
    /// Create a rejection with an SMTP reply code such as `"550"`
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_owned(),
            message: message.to_owned(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid command")]
    InvalidCommand,

    #[error("Invalid state for command")]
    InvalidState(String),

    #[error("Invalid syntax")]
    InvalidSyntax(String),

    #[error("Line too long (max {max} characters)")]
    LineTooLong { max: usize },

    #[error("Path too long (max {max} characters)")]
    PathTooLong { max: usize },

    #[error("Too many recipients (max {max})")]
    TooManyRecipients { max: usize },

    #[error("Too much mail data (max {max} bytes)")]
    TooMuchData { max: usize },

    #[error("Domain name too long (max {max} characters)")]
    DomainTooLong { max: usize },

    #[error("User name too long (max {max} characters)")]
    UserTooLong { max: usize },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// SMTP size limits as defined in RFC 821
pub struct SmtpLimits;

impl SmtpLimits {
    /// Maximum length of a user name
    pub const USER_MAX_LENGTH: usize = 64;

    /// Maximum length of a domain name
    pub const DOMAIN_MAX_LENGTH: usize = 64;

    /// Maximum length of a path (reverse-path or forward-path)
    pub const PATH_MAX_LENGTH: usize = 256;

    /// Maximum length of a command line including CRLF
    pub const COMMAND_LINE_MAX_LENGTH: usize = 512;

    /// Maximum length of a reply line including CRLF
    pub const REPLY_LINE_MAX_LENGTH: usize = 512;

    /// Maximum length of a text line including CRLF
    pub const TEXT_LINE_MAX_LENGTH: usize = 1000;

    /// Maximum number of recipients per message
    pub const MAX_RECIPIENTS: usize = 100;

    /// Maximum total size of email data (reasonable limit for in-memory storage)
    pub const MAX_DATA_SIZE: usize = 10 * 1024 * 1024; // 10MB
}

/// Maps SMTP errors to appropriate response codes
impl SmtpError {
    /// The SMTP reply code reported to the client for this error
    pub fn to_response_code(&self) -> &str {
        match self {
            SmtpError::Io(_) => "421",
            SmtpError::InvalidCommand => "500",
            SmtpError::InvalidState(_) => "503",
            SmtpError::InvalidSyntax(_) => "501",
            SmtpError::LineTooLong { .. } => "500",
            SmtpError::PathTooLong { .. } => "501",
            SmtpError::TooManyRecipients { .. } => "552",
            SmtpError::TooMuchData { .. } => "552",
            SmtpError::DomainTooLong { .. } => "501",
            SmtpError::UserTooLong { .. } => "501",
            SmtpError::Session(err) => match err {
                SessionError::AddressParse { .. } => "501",
                SessionError::BodyRead(io_err) => match limit_error(io_err) {
                    Some(limit) => limit.to_response_code(),
                    None => "451",
                },
                SessionError::MissingHandler => "451",
                SessionError::Handler(handler_err) => match handler_err.downcast_ref::<Rejection>()
                {
                    Some(rejection) => rejection.code.as_str(),
                    None => "554",
                },
            },
        }
    }

    /// The reply text that goes with [`SmtpError::to_response_code`]
    pub fn to_response_message(&self) -> String {
        match self {
            SmtpError::Io(_) => "Service not available".to_string(),
            SmtpError::InvalidCommand => "Syntax error, command unrecognized".to_string(),
            SmtpError::InvalidState(msg) => format!("Bad sequence of commands: {msg}"),
            SmtpError::InvalidSyntax(msg) => format!("Syntax error: {msg}"),
            SmtpError::LineTooLong { max } => format!("Line too long (max {max} characters)"),
            SmtpError::PathTooLong { max } => format!("Path too long (max {max} characters)"),
            SmtpError::TooManyRecipients { max } => format!("Too many recipients (max {max})"),
            SmtpError::TooMuchData { max } => format!("Too much mail data (max {max} bytes)"),
            SmtpError::DomainTooLong { max } => {
                format!("Domain name too long (max {max} characters)")
            }
            SmtpError::UserTooLong { max } => {
                format!("User name too long (max {max} characters)")
            }
            SmtpError::Session(err) => match err {
                SessionError::AddressParse { address, .. } => {
                    format!("Syntax error in address <{address}>")
                }
                SessionError::BodyRead(io_err) => match limit_error(io_err) {
                    Some(limit) => limit.to_response_message(),
                    None => "Requested action aborted: error reading message".to_string(),
                },
                SessionError::MissingHandler => {
                    "Requested action aborted: local error in processing".to_string()
                }
                SessionError::Handler(handler_err) => match handler_err.downcast_ref::<Rejection>()
                {
                    Some(rejection) => rejection.message.clone(),
                    None => format!("Transaction failed: {handler_err}"),
                },
            },
        }
    }
}

/// Returns the limit violation carried by an I/O error raised while reading DATA
fn limit_error(err: &io::Error) -> Option<&SmtpError> {
    err.get_ref()?.downcast_ref::<SmtpError>()
}
