//! Parsing and dispatch of SMTP commands

use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;

/// A syntactically valid SMTP command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand<'a> {
    Helo(&'a str),
    #[cfg(feature = "ehlo")]
    Ehlo(&'a str),
    /// `MAIL FROM:<path>`, holding the path without angle brackets
    Mail(&'a str),
    /// `RCPT TO:<path>`, holding the path without angle brackets
    Rcpt(&'a str),
    Data,
    Rset,
    Noop,
    Quit,
}

impl<'a> SmtpCommand<'a> {
    /// Parse one command line (without its line ending)
    pub fn parse(line: &'a str) -> Result<Self, SmtpError> {
        if line.len() > SmtpLimits::COMMAND_LINE_MAX_LENGTH {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::COMMAND_LINE_MAX_LENGTH,
            });
        }

        let line = line.trim();
        let (verb, args) = match line.split_once(char::is_whitespace) {
            Some((verb, args)) => (verb, args.trim()),
            None => (line, ""),
        };
        if verb.is_empty() {
            return Err(SmtpError::InvalidCommand);
        }

        match verb.to_uppercase().as_str() {
            "HELO" => domain_argument("HELO", args).map(SmtpCommand::Helo),
            #[cfg(feature = "ehlo")]
            "EHLO" => domain_argument("EHLO", args).map(SmtpCommand::Ehlo),
            "MAIL" => path_argument("FROM:", args).map(SmtpCommand::Mail),
            "RCPT" => path_argument("TO:", args).map(SmtpCommand::Rcpt),
            "DATA" => no_argument("DATA", args).map(|_| SmtpCommand::Data),
            "RSET" => no_argument("RSET", args).map(|_| SmtpCommand::Rset),
            // NOOP may carry a string, which is ignored
            "NOOP" => Ok(SmtpCommand::Noop),
            "QUIT" => no_argument("QUIT", args).map(|_| SmtpCommand::Quit),
            _ => Err(SmtpError::InvalidCommand),
        }
    }

    /// The command verb, as used by [`SmtpSession::can_execute_command`]
    pub fn verb(&self) -> &'static str {
        match self {
            SmtpCommand::Helo(_) => "HELO",
            #[cfg(feature = "ehlo")]
            SmtpCommand::Ehlo(_) => "EHLO",
            SmtpCommand::Mail(_) => "MAIL",
            SmtpCommand::Rcpt(_) => "RCPT",
            SmtpCommand::Data => "DATA",
            SmtpCommand::Rset => "RSET",
            SmtpCommand::Noop => "NOOP",
            SmtpCommand::Quit => "QUIT",
        }
    }
}

fn domain_argument<'a>(verb: &str, args: &'a str) -> Result<&'a str, SmtpError> {
    match args.split_whitespace().next() {
        Some(domain) => Ok(domain),
        None => Err(SmtpError::InvalidSyntax(format!(
            "{verb} requires domain argument"
        ))),
    }
}

/// Extract `<path>` from `FROM:<path>` / `TO:<path>`
fn path_argument<'a>(prefix: &str, args: &'a str) -> Result<&'a str, SmtpError> {
    let keyword = prefix.trim_end_matches(':');
    let rest = args
        .get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| args[prefix.len()..].trim())
        .ok_or_else(|| SmtpError::InvalidSyntax(format!("expected '{prefix}<address>'")))?;

    let path = rest
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
        .ok_or_else(|| {
            SmtpError::InvalidSyntax(format!(
                "{keyword} address must be enclosed in angle brackets"
            ))
        })?;

    if path.is_empty() {
        return Err(SmtpError::InvalidSyntax(format!(
            "{keyword} address cannot be empty"
        )));
    }
    Ok(path)
}

fn no_argument(verb: &str, args: &str) -> Result<(), SmtpError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(SmtpError::InvalidSyntax(format!(
            "{verb} command takes no arguments"
        )))
    }
}

/// Check the RFC 821 limits on the parts of a mailbox
fn validate_email_address(addr: &str) -> Result<(), SmtpError> {
    let (user, domain) = addr.rsplit_once('@').ok_or_else(|| {
        SmtpError::InvalidSyntax("Email address must contain @ symbol".to_string())
    })?;

    if user.len() > SmtpLimits::USER_MAX_LENGTH {
        return Err(SmtpError::UserTooLong {
            max: SmtpLimits::USER_MAX_LENGTH,
        });
    }
    if domain.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
        return Err(SmtpError::DomainTooLong {
            max: SmtpLimits::DOMAIN_MAX_LENGTH,
        });
    }
    if user.is_empty() || domain.is_empty() {
        return Err(SmtpError::InvalidSyntax(
            "Invalid email address format".to_string(),
        ));
    }
    Ok(())
}

/// Applies SMTP commands to a session and produces the replies
#[derive(Debug)]
pub struct SmtpCommandHandler<'a> {
    hostname: &'a str,
}

impl<'a> SmtpCommandHandler<'a> {
    /// Create a command handler answering as `hostname`
    pub fn new(hostname: &'a str) -> Self {
        Self { hostname }
    }

    /// Process a command line and return a response.
    ///
    /// A `354` reply means the session is now in data mode and the caller
    /// must feed the message to [`SmtpSession::receive_data`].
    pub fn process_command(
        &self,
        command_line: &str,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        let command = SmtpCommand::parse(command_line)?;
        if !session.can_execute_command(command.verb()) {
            return Err(SmtpError::InvalidState(sequence_hint(&command).to_string()));
        }

        match command {
            SmtpCommand::Helo(domain) => {
                session.greet(domain)?;
                Ok(SmtpResponse::helo(self.hostname, domain))
            }
            #[cfg(feature = "ehlo")]
            SmtpCommand::Ehlo(domain) => {
                session.greet(domain)?;
                Ok(SmtpResponse::helo(self.hostname, domain))
            }
            SmtpCommand::Mail(path) => {
                validate_email_address(path)?;
                session.set_sender(path)?;
                Ok(SmtpResponse::ok())
            }
            SmtpCommand::Rcpt(path) => {
                validate_email_address(path)?;
                session.add_recipient(path)?;
                Ok(SmtpResponse::ok())
            }
            SmtpCommand::Data => {
                session.start_data_mode()?;
                Ok(SmtpResponse::data_start())
            }
            SmtpCommand::Rset => {
                session.reset();
                Ok(SmtpResponse::ok())
            }
            SmtpCommand::Noop => Ok(SmtpResponse::ok()),
            SmtpCommand::Quit => Ok(SmtpResponse::quit(self.hostname)),
        }
    }
}

fn sequence_hint(command: &SmtpCommand<'_>) -> &'static str {
    match command {
        SmtpCommand::Mail(_) => "MAIL command requires HELO first",
        SmtpCommand::Rcpt(_) => "RCPT command requires MAIL first",
        SmtpCommand::Data => "DATA command requires RCPT first",
        SmtpCommand::Rset => "RSET command requires HELO first",
        _ => "command not allowed now",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::context::{Context, Handler};
    use crate::smtp::error::{HandlerError, SessionError};
    use std::sync::Arc;

    fn create_handler<'a>() -> SmtpCommandHandler<'a> {
        SmtpCommandHandler::new("test.local")
    }

    fn session() -> SmtpSession {
        let handler = |_: &Context<'_>| -> Result<(), HandlerError> { Ok(()) };
        let handler: Arc<dyn Handler> = Arc::new(handler);
        SmtpSession::new("test.local", Some(handler))
    }

    fn run(session: &mut SmtpSession, lines: &[&str]) {
        let handler = create_handler();
        for line in lines {
            handler.process_command(line, session).unwrap();
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            SmtpCommand::parse("helo client.local").unwrap(),
            SmtpCommand::Helo("client.local")
        );
        assert_eq!(
            SmtpCommand::parse("MAIL FROM:<a@example.com>").unwrap(),
            SmtpCommand::Mail("a@example.com")
        );
        assert_eq!(
            SmtpCommand::parse("rcpt to: <b@example.com>").unwrap(),
            SmtpCommand::Rcpt("b@example.com")
        );
        assert_eq!(SmtpCommand::parse("DATA").unwrap(), SmtpCommand::Data);
        assert_eq!(SmtpCommand::parse("RSET").unwrap(), SmtpCommand::Rset);
        assert_eq!(SmtpCommand::parse("NOOP ping").unwrap(), SmtpCommand::Noop);
        assert_eq!(SmtpCommand::parse("QUIT").unwrap(), SmtpCommand::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(SmtpCommand::parse(""), Err(SmtpError::InvalidCommand)));
        assert!(matches!(
            SmtpCommand::parse("INVALID"),
            Err(SmtpError::InvalidCommand)
        ));
        assert!(matches!(
            SmtpCommand::parse("HELO"),
            Err(SmtpError::InvalidSyntax(_))
        ));
        assert!(matches!(
            SmtpCommand::parse("MAIL sender@example.com"),
            Err(SmtpError::InvalidSyntax(_))
        ));
        assert!(matches!(
            SmtpCommand::parse("MAIL FROM:sender@example.com"),
            Err(SmtpError::InvalidSyntax(_))
        ));
        assert!(matches!(
            SmtpCommand::parse("DATA now"),
            Err(SmtpError::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_helo_command() {
        let handler = create_handler();
        let mut session = session();

        let response = handler
            .process_command("HELO client.local", &mut session)
            .unwrap();

        assert_eq!(response.code, "250");
        assert_eq!(response.message, "test.local Hello client.local");
        assert_eq!(session.client_domain(), Some("client.local"));
    }

    #[cfg(feature = "ehlo")]
    #[test]
    fn test_ehlo_command() {
        let handler = create_handler();
        let mut session = session();

        let response = handler
            .process_command("EHLO client.local", &mut session)
            .unwrap();

        assert_eq!(response.code, "250");
        assert_eq!(session.client_domain(), Some("client.local"));
    }

    #[test]
    fn test_mail_command() {
        let handler = create_handler();
        let mut session = session();
        run(&mut session, &["HELO client.local"]);

        let response = handler
            .process_command("MAIL FROM:<sender@example.com>", &mut session)
            .unwrap();

        assert_eq!(response.code, "250");
        let sender = session.transaction().unwrap().sender().unwrap();
        assert_eq!(sender.to_string(), "sender@example.com");
    }

    #[test]
    fn test_mail_without_helo() {
        let handler = create_handler();
        let mut session = session();

        let result = handler.process_command("MAIL FROM:<sender@example.com>", &mut session);
        assert!(matches!(result, Err(SmtpError::InvalidState(_))));
    }

    #[test]
    fn test_mail_unparseable_address() {
        let handler = create_handler();
        let mut session = session();
        run(&mut session, &["HELO client.local"]);

        let err = handler
            .process_command("MAIL FROM:<us er@exa mple.com>", &mut session)
            .unwrap_err();

        assert!(matches!(
            err,
            SmtpError::Session(SessionError::AddressParse { .. })
        ));
        assert_eq!(err.to_response_code(), "501");
        assert!(session.transaction().unwrap().sender().is_none());
    }

    #[test]
    fn test_rcpt_command() {
        let handler = create_handler();
        let mut session = session();
        run(
            &mut session,
            &["HELO client.local", "MAIL FROM:<sender@example.com>"],
        );

        let response = handler
            .process_command("RCPT TO:<recipient@example.com>", &mut session)
            .unwrap();

        assert_eq!(response.code, "250");
        assert_eq!(session.recipient_count(), 1);
    }

    #[test]
    fn test_rcpt_without_mail() {
        let handler = create_handler();
        let mut session = session();
        run(&mut session, &["HELO client.local"]);

        let result = handler.process_command("RCPT TO:<recipient@example.com>", &mut session);
        assert!(result.is_err());
    }

    #[test]
    fn test_data_command() {
        let handler = create_handler();
        let mut session = session();
        run(
            &mut session,
            &[
                "HELO client.local",
                "MAIL FROM:<sender@example.com>",
                "RCPT TO:<recipient@example.com>",
            ],
        );

        let response = handler.process_command("DATA", &mut session).unwrap();

        assert_eq!(response.code, "354");
        assert!(session.in_data_mode());
    }

    #[test]
    fn test_data_without_rcpt() {
        let handler = create_handler();
        let mut session = session();
        run(
            &mut session,
            &["HELO client.local", "MAIL FROM:<sender@example.com>"],
        );

        let result = handler.process_command("DATA", &mut session);
        assert!(matches!(result, Err(SmtpError::InvalidState(_))));
    }

    #[test]
    fn test_rset_command() {
        let handler = create_handler();
        let mut session = session();
        run(
            &mut session,
            &[
                "HELO client.local",
                "MAIL FROM:<sender@example.com>",
                "RCPT TO:<recipient@example.com>",
            ],
        );

        let response = handler.process_command("RSET", &mut session).unwrap();

        assert_eq!(response.code, "250");
        let tx = session.transaction().unwrap();
        assert!(tx.sender().is_none());
        assert!(tx.recipients().is_empty());
    }

    #[test]
    fn test_noop_and_quit() {
        let handler = create_handler();
        let mut session = session();

        let response = handler.process_command("NOOP", &mut session).unwrap();
        assert_eq!(response.code, "250");

        let response = handler.process_command("QUIT", &mut session).unwrap();
        assert_eq!(response.code, "221");
    }

    #[test]
    fn test_command_line_too_long() {
        let handler = create_handler();
        let mut session = session();

        let long_command = "HELO ".to_string() + &"a".repeat(SmtpLimits::COMMAND_LINE_MAX_LENGTH);
        let result = handler.process_command(&long_command, &mut session);
        assert!(matches!(result, Err(SmtpError::LineTooLong { .. })));
    }

    #[test]
    fn test_validate_email_address() {
        assert!(validate_email_address("user@example.com").is_ok());
        assert!(validate_email_address("test@test.local").is_ok());

        assert!(validate_email_address("invalid").is_err());
        assert!(validate_email_address("@example.com").is_err());
        assert!(validate_email_address("user@").is_err());

        let long_user = "a".repeat(SmtpLimits::USER_MAX_LENGTH + 1) + "@example.com";
        assert!(matches!(
            validate_email_address(&long_user),
            Err(SmtpError::UserTooLong { .. })
        ));

        let long_domain = "user@".to_string() + &"a".repeat(SmtpLimits::DOMAIN_MAX_LENGTH + 1);
        assert!(matches!(
            validate_email_address(&long_domain),
            Err(SmtpError::DomainTooLong { .. })
        ));
    }

    #[test]
    fn test_empty_email_addresses() {
        let handler = create_handler();
        let mut session = session();
        run(&mut session, &["HELO client.local"]);

        let result = handler.process_command("MAIL FROM:<>", &mut session);
        assert!(result.is_err());

        run(&mut session, &["MAIL FROM:<sender@example.com>"]);
        let result = handler.process_command("RCPT TO:<>", &mut session);
        assert!(result.is_err());
    }
}
