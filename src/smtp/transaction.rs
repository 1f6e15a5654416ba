//! Mail transaction state for a single connection
//!
//! A [`Transaction`] accumulates the envelope (sender and recipients) and the
//! message body while the client walks through MAIL, RCPT and DATA. Once the
//! body has been received the configured [`Handler`] is called with a
//! read-only [`Context`] over the transaction.
//!
//! The transaction does not check command ordering. Calling
//! [`Transaction::receive_body`] before a sender was set is the caller's
//! mistake, not an error of this type.

use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;

use lettre::Address;
use lettre::address::AddressError;
use lettre::message::Mailbox;

use crate::smtp::connection::ConnectionInfo;
use crate::smtp::context::{Context, Handler};
use crate::smtp::error::SessionError;

/// Envelope and body of the mail transaction in progress on one connection
pub struct Transaction {
    sender: Option<Mailbox>,
    recipients: Vec<Mailbox>,
    body: Vec<u8>,
    connection: Arc<ConnectionInfo>,
    handler: Option<Arc<dyn Handler>>,
}

impl Transaction {
    /// Create an empty transaction, ready to receive MAIL
    pub fn new(connection: Arc<ConnectionInfo>, handler: Option<Arc<dyn Handler>>) -> Self {
        Self {
            sender: None,
            recipients: Vec::new(),
            body: Vec::new(),
            connection,
            handler,
        }
    }

    /// Set the envelope sender.
    ///
    /// On a parse error the previous sender is kept.
    pub fn set_sender(&mut self, address: &str) -> Result<(), SessionError> {
        let mailbox = parse_mailbox(address)?;
        tracing::trace!(sender = %mailbox, "sender set");
        self.sender = Some(mailbox);
        Ok(())
    }

    /// Append a recipient; nothing is appended when the address does not parse
    pub fn add_recipient(&mut self, address: &str) -> Result<(), SessionError> {
        let mailbox = parse_mailbox(address)?;
        tracing::trace!(recipient = %mailbox, "recipient added");
        self.recipients.push(mailbox);
        Ok(())
    }

    /// Drain `body` into the transaction and hand the result to the handler.
    ///
    /// The previous body is discarded first. If reading fails the partially
    /// read body is discarded as well and the handler is not called. The
    /// handler's error, if any, is returned unchanged as
    /// [`SessionError::Handler`].
    pub fn receive_body(&mut self, body: &mut dyn Read) -> Result<(), SessionError> {
        let handler = self.handler.clone().ok_or(SessionError::MissingHandler)?;

        self.body.clear();
        if let Err(err) = body.read_to_end(&mut self.body) {
            self.body.clear();
            return Err(SessionError::BodyRead(err));
        }
        tracing::debug!(
            bytes = self.body.len(),
            recipients = self.recipients.len(),
            "message body received"
        );

        let context = Context::new(self);
        handler.handle(&context).map_err(SessionError::Handler)
    }

    /// Forget sender, recipients and body
    pub fn reset(&mut self) {
        self.sender = None;
        self.recipients.clear();
        self.body.clear();
    }

    /// Called when the connection is torn down
    pub fn logout(&mut self) -> Result<(), SessionError> {
        tracing::debug!(
            remote_addr = ?self.connection.remote_addr(),
            "transaction closed"
        );
        Ok(())
    }

    /// Render the transaction as an RFC 822 message.
    ///
    /// The body is appended byte for byte, so 8-bit content survives. The
    /// `Date` header carries the time of rendering, not of receipt.
    pub fn render_message(&self) -> Vec<u8> {
        let from = self
            .sender
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let headers = format!(
            "Date: {}\r\nFrom: {}\r\nTo: {}\r\n",
            format_date(SystemTime::now()),
            from,
            self.format_recipients(),
        );

        let mut message = Vec::with_capacity(headers.len() + self.body.len());
        message.extend_from_slice(headers.as_bytes());
        message.extend_from_slice(&self.body);
        message
    }

    /// The envelope sender, once MAIL has succeeded
    pub fn sender(&self) -> Option<&Mailbox> {
        self.sender.as_ref()
    }

    /// Recipients in the order they were added
    pub fn recipients(&self) -> &[Mailbox] {
        &self.recipients
    }

    /// The body of the most recent DATA, empty after a reset or a failed read
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Metadata of the connection this transaction belongs to
    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    fn format_recipients(&self) -> String {
        self.recipients
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("sender", &self.sender)
            .field("recipients", &self.recipients)
            .field("body_len", &self.body.len())
            .field("connection", &self.connection)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Parse a single RFC 5322 mailbox.
///
/// Comments are dropped first. Forms lettre's mailbox grammar does not cover,
/// such as quoted local parts (`"john doe"@example.com`) and address
/// literals (`user@[127.0.0.1]`), go through [`Address`] parsing instead.
fn parse_mailbox(address: &str) -> Result<Mailbox, SessionError> {
    let parse_error = |source| SessionError::AddressParse {
        address: address.to_owned(),
        source,
    };

    let cleaned = strip_comments(address).map_err(parse_error)?;
    let cleaned = cleaned.trim();
    if let Ok(mailbox) = cleaned.parse::<Mailbox>() {
        return Ok(mailbox);
    }

    let (name, addr_spec) = split_name_addr(cleaned).map_err(parse_error)?;
    let email = addr_spec.trim().parse::<Address>().map_err(parse_error)?;
    Ok(Mailbox::new(name, email))
}

/// Remove `(comments)` outside quoted strings and domain literals
fn strip_comments(input: &str) -> Result<String, AddressError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut literal = false;

    while let Some(c) = chars.next() {
        if depth > 0 {
            match c {
                '\\' => {
                    chars.next();
                }
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            if depth == 0 {
                out.push(' ');
            }
            continue;
        }

        match c {
            '\\' if quoted => {
                out.push(c);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
                continue;
            }
            '"' if !literal => quoted = !quoted,
            '[' if !quoted => literal = true,
            ']' if !quoted => literal = false,
            '(' if !quoted && !literal => {
                depth = 1;
                continue;
            }
            _ => {}
        }
        out.push(c);
    }

    if depth > 0 || quoted || literal {
        return Err(AddressError::InvalidInput);
    }
    Ok(out)
}

/// Split `Name <addr-spec>` into its display name and address
fn split_name_addr(input: &str) -> Result<(Option<String>, &str), AddressError> {
    let Some(inner) = input.strip_suffix('>') else {
        return Ok((None, input));
    };

    let mut quoted = false;
    let mut escaped = false;
    let mut open = None;
    for (i, c) in inner.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '<' if !quoted => {
                open = Some(i);
                break;
            }
            _ => {}
        }
    }
    let open = open.ok_or(AddressError::Unbalanced)?;

    let name = unquote(inner[..open].trim());
    Ok(((!name.is_empty()).then_some(name), &inner[open + 1..]))
}

fn unquote(phrase: &str) -> String {
    let Some(inner) = phrase
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return phrase.to_owned();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            _ => out.push(c),
        }
    }
    out
}

/// Format `time` as an RFC 2822 date in UTC
fn format_date(time: SystemTime) -> String {
    // httpdate always formats in GMT; spell the zone as a numeric offset
    let mut date = httpdate::fmt_http_date(time);
    if date.ends_with(" GMT") {
        date.truncate(date.len() - "GMT".len());
        date.push_str("+0000");
    }
    date
}
