//! # smtpsrv
//!
//! An embeddable SMTP server that hands each received message to your code.
//!
//! Every connection owns a [`Transaction`] holding the sender, the recipients
//! and the message body. When the client finishes `DATA`, the server calls the
//! configured [`Handler`] with a read-only [`Context`] over that transaction.
//! Whatever the handler returns decides the reply to `DATA`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smtpsrv::{ChannelHandler, SmtpServer};
//! use std::sync::mpsc;
//! use std::thread;
//! use std::time::Duration;
//!
//! let (tx, rx) = mpsc::channel();
//! let server = SmtpServer::new("test.local");
//!
//! thread::spawn(move || {
//!     server.start("127.0.0.1:2525", ChannelHandler::new(tx)).unwrap();
//! });
//!
//! // Application sends email to localhost:2525
//! // ...
//!
//! if let Ok(email) = rx.recv_timeout(Duration::from_millis(100)) {
//!     println!("Received {} bytes", email.data_size());
//! }
//! ```
//!
//! ## Custom handlers
//!
//! Any `Fn(&Context) -> Result<(), HandlerError>` closure is a handler.
//! Returning a [`Rejection`] chooses the reply code sent to the client.
//!
//! ```rust,no_run
//! use smtpsrv::{Context, HandlerError, Rejection, SmtpServer};
//!
//! let handler = |ctx: &Context<'_>| -> Result<(), HandlerError> {
//!     if ctx.recipients().len() > 10 {
//!         return Err(Rejection::new("550", "Too many recipients for this mailbox").into());
//!     }
//!     println!("{}", String::from_utf8_lossy(&ctx.rendered_message()));
//!     Ok(())
//! };
//!
//! SmtpServer::new("mx.local").start("127.0.0.1:2525", handler).unwrap();
//! ```
//!
//! ## Supported SMTP commands
//!
//! - `HELO` - Identify the sender and open a transaction
//! - `MAIL FROM` - Specify the sender's address
//! - `RCPT TO` - Specify the destination (multiple destinations are supported)
//! - `DATA` - Send the email body
//! - `RSET` - Reset the current transaction
//! - `NOOP` - Do nothing
//! - `QUIT` - Close connection
//!
//! Enabling the `ehlo` feature also allows the `EHLO` command. No extensions
//! are advertised.
//!
//! ## Size Limits
//!
//! The server enforces the RFC 821 limits in [`SmtpLimits`]: 64 characters
//! for user and domain names, 256 for paths, 512 for command lines, 1000 for
//! text lines and 100 recipients per message.

mod smtp;

pub use smtp::{
    ChannelHandler, ConnectionInfo, Context, DataReader, Email, Handler, HandlerError, Rejection,
    SessionError, SmtpCommand, SmtpCommandHandler, SmtpError, SmtpLimits, SmtpResponse,
    SmtpServer, SmtpSession, SmtpState, Transaction,
};
