//! Basic usage of the smtpsrv library
//!
//! Starts a server whose handler accepts mail for `example.com` only, then
//! sends two messages to it over a plain TCP connection.

use smtpsrv::{ChannelHandler, Context, Email, Handler, HandlerError, Rejection, SmtpServer};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const ADDR: &str = "127.0.0.1:2525";

/// Accepts mail for local recipients and queues it on a channel
struct LocalDelivery {
    queue: ChannelHandler,
}

impl Handler for LocalDelivery {
    fn handle(&self, ctx: &Context<'_>) -> Result<(), HandlerError> {
        if let Some(foreign) = ctx
            .recipients()
            .iter()
            .find(|m| m.email.domain() != "example.com")
        {
            let message = format!("Relay to {} denied", foreign.email);
            return Err(Rejection::new("550", &message).into());
        }
        self.queue.handle(ctx)
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let (tx, rx) = mpsc::channel();
    let server = SmtpServer::new("example.local");
    let handler = LocalDelivery {
        queue: ChannelHandler::new(tx),
    };

    thread::spawn(move || {
        if let Err(e) = server.start(ADDR, handler) {
            eprintln!("Server error: {e}");
        }
    });
    thread::sleep(Duration::from_millis(100));

    println!("Sending local email...");
    if let Err(e) = send_email(&["recipient@example.com", "another@example.com"]) {
        eprintln!("Failed to send email: {e}");
        return;
    }

    match rx.recv_timeout(Duration::from_secs(1)) {
        Ok(email) => print_email(&email),
        Err(_) => {
            eprintln!("Timeout: No email received within 1 second");
            return;
        }
    }

    println!("\nSending email to a foreign domain...");
    if let Err(e) = send_email(&["someone@elsewhere.org"]) {
        eprintln!("Failed to send email: {e}");
    }
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

fn print_email(email: &Email) {
    println!("Email received:");
    println!("  Subject: {}", email.get_subject().unwrap_or_default());
    println!("  Size: {} bytes", email.data_size());
    println!("  Rendered:");
    for line in email.rendered_text().lines() {
        println!("    {line}");
    }
}

fn send_email(recipients: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = TcpStream::connect(ADDR)?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut exchange = |line: &str| -> Result<(), Box<dyn std::error::Error>> {
        if !line.is_empty() {
            println!("C: {line}");
            write!(stream, "{line}\r\n")?;
        }
        let mut response = String::new();
        reader.read_line(&mut response)?;
        print!("S: {response}");
        Ok(())
    };

    // Greeting
    exchange("")?;
    exchange("HELO client.example.com")?;
    exchange("MAIL FROM:<sender@example.com>")?;
    for recipient in recipients {
        exchange(&format!("RCPT TO:<{recipient}>"))?;
    }
    exchange("DATA")?;

    stream.write_all(
        b"Subject: Hello from smtpsrv\r\n\
          \r\n\
          This is a test email sent to demonstrate\r\n\
          the smtpsrv handler API.\r\n\
          .\r\n",
    )?;
    let mut response = String::new();
    reader.read_line(&mut response)?;
    print!("S: {response}");

    write!(stream, "QUIT\r\n")?;
    response.clear();
    reader.read_line(&mut response)?;
    print!("S: {response}");

    Ok(())
}
