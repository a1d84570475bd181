use anyhow::{bail, Context, Result};
use std::io::BufRead;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use zeroize::{Zeroize, Zeroizing};

use idm_password_filter::config::{ConfigLocator, ConfigManager, DEFAULT_CHECK_PERIOD};
use idm_password_filter::filter::PasswordFilter;
use idm_password_filter::idm::{HttpTransport, Secret};
use idm_password_filter::init::setup_logging;

const USAGE: &str = "usage: idm-pwfilter <check|notify> <account>  (password on stdin)
       idm-pwfilter watch";

const INITIAL_PASSWORD_CAPACITY: usize = 256;

enum Command {
    Check(String),
    Notify(String),
    Watch,
}

fn parse_command(args: &[String]) -> Option<Command> {
    match args {
        [cmd, account] if cmd == "check" => Some(Command::Check(account.clone())),
        [cmd, account] if cmd == "notify" => Some(Command::Notify(account.clone())),
        [cmd] if cmd == "watch" => Some(Command::Watch),
        _ => None,
    }
}

/// Reads one line from stdin. Every buffer that held password bytes is
/// zeroed before it is released, including the ones left behind when a long
/// line outgrows its buffer.
fn read_password() -> Result<Secret> {
    read_password_from(std::io::stdin().lock())
}

fn read_password_from(mut reader: impl BufRead) -> Result<Secret> {
    let mut line = Zeroizing::new(Vec::with_capacity(INITIAL_PASSWORD_CAPACITY));
    loop {
        let available = reader
            .fill_buf()
            .context("Failed to read the password from stdin")?;
        if available.is_empty() {
            break;
        }
        let (chunk, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (&available[..end], true),
            None => (available, false),
        };
        push_scrubbed(&mut line, chunk);
        let consumed = chunk.len() + usize::from(complete);
        reader.consume(consumed);
        if complete {
            break;
        }
    }
    while line.last() == Some(&b'\r') {
        line.pop();
    }

    match String::from_utf8(std::mem::take(&mut *line)) {
        Ok(password) => Ok(Secret::new(password)),
        Err(e) => {
            e.into_bytes().zeroize();
            bail!("The password on stdin is not valid UTF-8")
        }
    }
}

/// Appends without letting `Vec` reallocate in place, which would free the
/// old block unscrubbed.
fn push_scrubbed(buf: &mut Zeroizing<Vec<u8>>, bytes: &[u8]) {
    let needed = buf.len() + bytes.len();
    if needed > buf.capacity() {
        let mut grown = Zeroizing::new(Vec::with_capacity(needed.max(buf.capacity() * 2)));
        grown.extend_from_slice(buf.as_slice());
        *buf = grown;
    }
    buf.extend_from_slice(bytes);
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = parse_command(&args) else {
        eprintln!("{}", USAGE);
        return Ok(ExitCode::from(2));
    };

    // 1. Logging, re-leveled by every configuration that gets published
    let log_level = setup_logging("INFO");
    let manager = ConfigManager::new(ConfigLocator::default())
        .with_publish_hook(move |cfg| log_level.apply(&cfg.log_level));

    // 2. Transport
    let transport = Arc::new(HttpTransport::new()?);

    // 3. Load configuration and start monitoring it
    let (filter, watcher) =
        PasswordFilter::start(Arc::new(manager), transport, DEFAULT_CHECK_PERIOD).await;
    filter.initialize();

    let code = match command {
        Command::Check(account) => {
            let password = read_password()?;
            if filter.should_allow_change(&account, password).await {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Command::Notify(account) => {
            let password = read_password()?;
            filter.notify_changed(&account, password).await;
            ExitCode::SUCCESS
        }
        Command::Watch => {
            info!("Watching configuration, press Ctrl-C to stop");
            signal::ctrl_c()
                .await
                .context("Failed to listen for the shutdown signal")?;
            info!("Shutdown signal received.");
            ExitCode::SUCCESS
        }
    };

    watcher.stop().await;
    Ok(code)
}
