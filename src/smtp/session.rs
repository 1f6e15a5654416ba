//! SMTP session state management
//!
//! [`SmtpSession`] enforces the command grammar of one connection and owns
//! the [`Transaction`] that accumulates the mail being received. A new
//! transaction is created on every HELO/EHLO; RSET and each completed DATA
//! reset it for the next mail.

use std::fmt;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::smtp::connection::ConnectionInfo;
use crate::smtp::context::Handler;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::transaction::Transaction;

/// Represents the current state of an SMTP session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Initial state - waiting for HELO
    Initial,
    /// HELO received - ready for MAIL command
    GreetingReceived,
    /// MAIL FROM received - ready for RCPT commands
    MailReceived,
    /// At least one RCPT TO received - ready for DATA or more RCPT commands
    RecipientsReceived,
    /// DATA command received - collecting email data
    DataMode,
}

/// Manages the state and data for a single SMTP connection
pub struct SmtpSession {
    /// Current state of the session
    pub state: SmtpState,
    hostname: String,
    remote_addr: Option<SocketAddr>,
    handler: Option<Arc<dyn Handler>>,
    transaction: Option<Transaction>,
}

impl SmtpSession {
    /// Create a new SMTP session
    pub fn new(hostname: &str, handler: Option<Arc<dyn Handler>>) -> Self {
        Self {
            state: SmtpState::Initial,
            hostname: hostname.to_owned(),
            remote_addr: None,
            handler,
            transaction: None,
        }
    }

    /// Record the peer address for the connection metadata
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Hostname the server announces
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The transaction opened by the last HELO/EHLO
    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    /// Client domain from the last HELO/EHLO command
    pub fn client_domain(&self) -> Option<&str> {
        self.transaction
            .as_ref()
            .and_then(|tx| tx.connection().client_domain())
    }

    /// Whether we're currently collecting message data
    pub fn in_data_mode(&self) -> bool {
        self.state == SmtpState::DataMode
    }

    /// Accept HELO/EHLO and open a fresh transaction for this client
    pub fn greet(&mut self, client_domain: &str) -> Result<(), SmtpError> {
        if client_domain.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
            return Err(SmtpError::DomainTooLong {
                max: SmtpLimits::DOMAIN_MAX_LENGTH,
            });
        }

        if let Some(mut previous) = self.transaction.take() {
            previous.logout()?;
        }

        let mut connection = ConnectionInfo::new(&self.hostname).with_client_domain(client_domain);
        if let Some(addr) = self.remote_addr {
            connection = connection.with_remote_addr(addr);
        }
        self.transaction = Some(Transaction::new(
            Arc::new(connection),
            self.handler.clone(),
        ));
        self.state = SmtpState::GreetingReceived;
        Ok(())
    }

    /// Reset the session to post-HELO state (clears transaction data)
    pub fn reset(&mut self) {
        if let Some(tx) = self.transaction.as_mut() {
            tx.reset();
            self.state = SmtpState::GreetingReceived;
        }
    }

    /// Set the sender address
    pub fn set_sender(&mut self, sender: &str) -> Result<(), SmtpError> {
        if sender.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        self.transaction_mut()?.set_sender(sender)?;
        self.state = SmtpState::MailReceived;
        Ok(())
    }

    /// Add a recipient address
    pub fn add_recipient(&mut self, recipient: &str) -> Result<(), SmtpError> {
        if recipient.len() > SmtpLimits::PATH_MAX_LENGTH {
            return Err(SmtpError::PathTooLong {
                max: SmtpLimits::PATH_MAX_LENGTH,
            });
        }

        if self.recipient_count() >= SmtpLimits::MAX_RECIPIENTS {
            return Err(SmtpError::TooManyRecipients {
                max: SmtpLimits::MAX_RECIPIENTS,
            });
        }

        self.transaction_mut()?.add_recipient(recipient)?;
        self.state = SmtpState::RecipientsReceived;
        Ok(())
    }

    /// Start data collection mode
    pub fn start_data_mode(&mut self) -> Result<(), SmtpError> {
        if self.state != SmtpState::RecipientsReceived {
            return Err(SmtpError::InvalidState(
                "DATA command requires RCPT first".to_string(),
            ));
        }

        self.state = SmtpState::DataMode;
        Ok(())
    }

    /// Hand the message body to the transaction.
    ///
    /// The session is reset afterwards whether or not the handler accepted
    /// the message.
    pub fn receive_data(&mut self, body: &mut dyn Read) -> Result<(), SmtpError> {
        if !self.in_data_mode() {
            return Err(SmtpError::InvalidState(
                "Not in data collection mode".to_string(),
            ));
        }

        let result = self.transaction_mut()?.receive_body(body);
        if result.is_ok() {
            tracing::info!(
                client = self.client_domain().unwrap_or_default(),
                "message accepted"
            );
        }
        self.reset();
        result.map_err(SmtpError::from)
    }

    /// Close the session; called on QUIT and when the client disconnects
    pub fn logout(&mut self) -> Result<(), SmtpError> {
        self.state = SmtpState::Initial;
        if let Some(mut tx) = self.transaction.take() {
            tx.logout()?;
        }
        Ok(())
    }

    /// Check if the session is ready for a specific command
    pub fn can_execute_command(&self, command: &str) -> bool {
        match command.to_uppercase().as_str() {
            #[cfg(feature = "ehlo")]
            "EHLO" => true, // EHLO can be sent at any time
            "HELO" => true, // HELO can be sent at any time
            "MAIL" => self.state == SmtpState::GreetingReceived,
            "RCPT" => {
                self.state == SmtpState::MailReceived || self.state == SmtpState::RecipientsReceived
            }
            "DATA" => self.state == SmtpState::RecipientsReceived,
            "RSET" => self.state != SmtpState::Initial,
            "NOOP" => true, // NOOP can be sent at any time
            "QUIT" => true, // QUIT can be sent at any time
            _ => false,
        }
    }

    /// Get the current recipient count
    pub fn recipient_count(&self) -> usize {
        self.transaction
            .as_ref()
            .map_or(0, |tx| tx.recipients().len())
    }

    fn transaction_mut(&mut self) -> Result<&mut Transaction, SmtpError> {
        self.transaction
            .as_mut()
            .ok_or_else(|| SmtpError::InvalidState("HELO required first".to_string()))
    }
}

impl fmt::Debug for SmtpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSession")
            .field("state", &self.state)
            .field("hostname", &self.hostname)
            .field("remote_addr", &self.remote_addr)
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}
