//! SMTP server implementation

pub mod commands;
pub mod connection;
pub mod context;
pub mod data;
pub mod email;
pub mod error;
pub mod response;
pub mod server;
pub mod session;
pub mod transaction;

pub use commands::{SmtpCommand, SmtpCommandHandler};
pub use connection::ConnectionInfo;
pub use context::{Context, Handler};
pub use data::DataReader;
pub use email::{ChannelHandler, Email};
pub use error::{HandlerError, Rejection, SessionError, SmtpError, SmtpLimits};
pub use response::SmtpResponse;
pub use server::SmtpServer;
pub use session::{SmtpSession, SmtpState};
pub use transaction::Transaction;
