use smtpsrv::{ChannelHandler, Email, SmtpServer};
use std::env;
use std::sync::mpsc;
use std::thread;

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let addr = args.get(1).map_or("127.0.0.1:2525", String::as_str);
    let hostname = args.get(2).map_or("smtpsrv.local", String::as_str);

    tracing::info!(%addr, %hostname, "starting SMTP server");

    let (tx, rx) = mpsc::channel::<Email>();
    let server = SmtpServer::new(hostname);

    thread::spawn(move || {
        let mut count = 0;
        while let Ok(email) = rx.recv() {
            count += 1;
            let from = email.from.as_ref().map(ToString::to_string);
            let to: Vec<String> = email.to.iter().map(ToString::to_string).collect();
            tracing::info!(
                count,
                from = from.as_deref().unwrap_or_default(),
                to = ?to,
                size = email.data_size(),
                subject = email.get_subject().as_deref().unwrap_or_default(),
                "received email"
            );
        }
    });

    if let Err(e) = server.start(addr, ChannelHandler::new(tx)) {
        tracing::error!("Failed to start server: {e}");
        std::process::exit(1);
    }
}
