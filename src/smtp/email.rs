//! Email data structures and the channel handoff for received messages

use std::borrow::Cow;
use std::sync::mpsc;
use std::time::SystemTime;

use lettre::message::Mailbox;

use crate::smtp::context::{Context, Handler};
use crate::smtp::error::{HandlerError, Rejection};

/// An owned copy of a message received by the SMTP server
#[derive(Debug, Clone)]
pub struct Email {
    /// The envelope sender
    pub from: Option<Mailbox>,

    /// Envelope recipients, in the order they were given
    pub to: Vec<Mailbox>,

    /// The message content as sent by the client
    pub data: Vec<u8>,

    /// The message with `Date`, `From` and `To` headers prepended
    pub rendered: Vec<u8>,

    /// When the email was received by the server
    pub timestamp: SystemTime,
}

impl Email {
    /// Copy everything a handler can see out of `context`
    pub fn from_context(context: &Context<'_>) -> Self {
        Self {
            from: context.sender().cloned(),
            to: context.recipients().to_vec(),
            data: context.body().to_vec(),
            rendered: context.rendered_message(),
            timestamp: SystemTime::now(),
        }
    }

    /// Check if this email was sent to a specific recipient address
    pub fn has_recipient(&self, recipient: &str) -> bool {
        self.to.iter().any(|mailbox| has_address(mailbox, recipient))
    }

    /// Check if this email was sent from a specific sender address
    pub fn is_from_sender(&self, sender: &str) -> bool {
        self.from
            .as_ref()
            .is_some_and(|mailbox| has_address(mailbox, sender))
    }

    /// Get the size of the email data in bytes
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Get the subject line from the email headers (if present)
    pub fn get_subject(&self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.data);
        for line in text.lines() {
            if line.is_empty() {
                // End of headers
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("subject") {
                    return Some(value.trim().to_owned());
                }
            }
        }
        None
    }

    /// Get the message body (content after the first empty line)
    pub fn get_body(&self) -> Option<&[u8]> {
        let separator = [&b"\r\n\r\n"[..], &b"\n\n"[..]]
            .iter()
            .filter_map(|sep| {
                self.data
                    .windows(sep.len())
                    .position(|window| window == *sep)
                    .map(|pos| pos + sep.len())
            })
            .min()?;

        if separator < self.data.len() {
            Some(&self.data[separator..])
        } else {
            None
        }
    }

    /// The rendered message as text, with invalid UTF-8 replaced
    pub fn rendered_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.rendered)
    }

    /// Check if the email contains a specific text in headers or body
    pub fn contains_text(&self, text: &str) -> bool {
        String::from_utf8_lossy(&self.data).contains(text)
    }
}

fn has_address(mailbox: &Mailbox, address: &str) -> bool {
    AsRef::<str>::as_ref(&mailbox.email) == address
}

/// Hands every received message to an [`mpsc`] channel as an [`Email`]
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    sender: mpsc::Sender<Email>,
}

impl ChannelHandler {
    /// Create a handler that sends every accepted message to `sender`
    pub fn new(sender: mpsc::Sender<Email>) -> Self {
        Self { sender }
    }
}

impl From<mpsc::Sender<Email>> for ChannelHandler {
    fn from(sender: mpsc::Sender<Email>) -> Self {
        Self::new(sender)
    }
}

impl Handler for ChannelHandler {
    fn handle(&self, context: &Context<'_>) -> Result<(), HandlerError> {
        self.sender
            .send(Email::from_context(context))
            .map_err(|_| Rejection::new("451", "Mail queue unavailable, try again later").into())
    }
}
