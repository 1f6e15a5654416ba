//! The view of a transaction given to message handlers

use lettre::message::Mailbox;

use crate::smtp::connection::ConnectionInfo;
use crate::smtp::error::HandlerError;
use crate::smtp::transaction::Transaction;

/// Processes a message once its DATA phase is complete.
///
/// A handler signals rejection through its return value only; the
/// [`Context`] it receives cannot modify the transaction.
pub trait Handler: Send + Sync {
    fn handle(&self, context: &Context<'_>) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&Context<'_>) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, context: &Context<'_>) -> Result<(), HandlerError> {
        self(context)
    }
}

/// Read-only access to a completed transaction, valid for one handler call
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    transaction: &'a Transaction,
}

impl<'a> Context<'a> {
    pub(crate) fn new(transaction: &'a Transaction) -> Self {
        Self { transaction }
    }

    /// The envelope sender
    pub fn sender(&self) -> Option<&'a Mailbox> {
        self.transaction.sender()
    }

    /// Recipients in the order the client gave them
    pub fn recipients(&self) -> &'a [Mailbox] {
        self.transaction.recipients()
    }

    /// A reader over the message body as received.
    ///
    /// The transaction keeps its own copy, so the body can be read here and
    /// still appear in [`Context::rendered_message`].
    pub fn body(&self) -> &'a [u8] {
        self.transaction.body()
    }

    /// The message with `Date`, `From` and `To` headers prepended
    pub fn rendered_message(&self) -> Vec<u8> {
        self.transaction.render_message()
    }

    /// Metadata of the connection the message arrived on
    pub fn connection(&self) -> &'a ConnectionInfo {
        self.transaction.connection()
    }
}
