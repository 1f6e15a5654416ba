//! SMTP server implementation

use crate::smtp::commands::SmtpCommandHandler;
use crate::smtp::context::Handler;
use crate::smtp::data::{DataReader, read_bounded_line};
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

/// SMTP server that passes every received message to a [`Handler`]
#[derive(Debug, Clone)]
pub struct SmtpServer {
    /// Server hostname
    hostname: String,
}

impl SmtpServer {
    /// Create a new SMTP server
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_owned(),
        }
    }

    /// Start the server on the specified address (blocking)
    pub fn start<H>(&self, addr: &str, handler: H) -> Result<(), SmtpError>
    where
        H: Handler + 'static,
    {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener, handler)
    }

    /// Start the server with an existing listener (blocking).
    ///
    /// Each connection is served on its own thread.
    pub fn start_with_listener<H>(&self, listener: TcpListener, handler: H) -> Result<(), SmtpError>
    where
        H: Handler + 'static,
    {
        tracing::info!("SMTP server listening on {}", listener.local_addr()?);
        let handler: Arc<dyn Handler> = Arc::new(handler);

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let hostname = self.hostname.clone();
                    let handler = Arc::clone(&handler);
                    thread::spawn(move || {
                        if let Err(e) = handle_client(&hostname, stream, Some(handler)) {
                            tracing::warn!("Error handling client: {e}");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("Error accepting connection: {e}");
                }
            }
        }

        Ok(())
    }
}

/// Serve one client connection until QUIT or disconnect
pub(crate) fn handle_client(
    hostname: &str,
    stream: TcpStream,
    handler: Option<Arc<dyn Handler>>,
) -> Result<(), SmtpError> {
    let mut session = SmtpSession::new(hostname, handler);
    if let Ok(peer) = stream.peer_addr() {
        tracing::debug!(%peer, "connection accepted");
        session = session.with_remote_addr(peer);
    }

    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let command_handler = SmtpCommandHandler::new(hostname);

    send_response(&mut writer, &SmtpResponse::greeting(hostname))?;
    let result = serve(&mut reader, &mut writer, &command_handler, &mut session);
    session.logout()?;
    result
}

fn serve<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    command_handler: &SmtpCommandHandler<'_>,
    session: &mut SmtpSession,
) -> Result<(), SmtpError> {
    let mut line_buffer = Vec::new();
    loop {
        line_buffer.clear();
        // room for the line ending on top of the command limit
        let limit = SmtpLimits::COMMAND_LINE_MAX_LENGTH + 2;
        let (read, overlong) = read_bounded_line(reader, &mut line_buffer, limit)?;
        if read == 0 {
            // Connection closed
            return Ok(());
        }
        if overlong {
            let err = SmtpError::LineTooLong {
                max: SmtpLimits::COMMAND_LINE_MAX_LENGTH,
            };
            tracing::debug!(bytes = read, "command line too long");
            send_response(writer, &SmtpResponse::from(&err))?;
            continue;
        }

        // Invalid UTF-8 ends up as replacement characters and fails to parse
        let line = String::from_utf8_lossy(&line_buffer);
        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        let response = match command_handler.process_command(command, session) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(%command, error = %e, "command rejected");
                SmtpResponse::from(&e)
            }
        };
        send_response(writer, &response)?;

        if session.in_data_mode() {
            let response = receive_message(reader, session)?;
            send_response(writer, &response)?;
        } else if response.code == "221" {
            return Ok(());
        }
    }
}

/// Read the DATA payload into the session and build the final reply
fn receive_message<R: BufRead>(
    reader: &mut R,
    session: &mut SmtpSession,
) -> Result<SmtpResponse, SmtpError> {
    let mut data = DataReader::new(reader);
    let result = session.receive_data(&mut data);
    if !data.is_done() {
        data.drain()?;
    }

    Ok(match result {
        Ok(()) => SmtpResponse::ok(),
        Err(e) => {
            tracing::warn!(error = %e, "message not accepted");
            SmtpResponse::from(&e)
        }
    })
}

/// Send a response to the client
fn send_response<W: Write>(writer: &mut W, response: &SmtpResponse) -> Result<(), SmtpError> {
    let formatted = response.format();
    if formatted.len() > SmtpLimits::REPLY_LINE_MAX_LENGTH {
        let truncated = SmtpResponse::new(&response.code, "Response too long (truncated)");
        writer.write_all(truncated.format().as_bytes())?;
    } else {
        writer.write_all(formatted.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}
