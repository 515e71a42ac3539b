//! Line commands of the interactive front end.

use crate::types::{Color, Endpoint, EndpointSettings};
use anyhow::{Context, Result, bail};
use std::{
    io::{self, BufRead},
    str::FromStr,
    thread,
};
use tokio::sync::mpsc;

pub const HELP: &str = "\
commands:
  on                     switch the strip on
  off                    switch the strip off
  color R G B            set the color, components in 0..=255
  host A B C D PORT      talk to another strip and remember it
  pause                  stop background probing
  resume                 re-read the strip and resume probing
  status                 print the current state
  help                   print this text
  quit                   leave";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShellCommand {
    Power(bool),
    Color(Color),
    Host(Endpoint),
    Pause,
    Resume,
    Status,
    Help,
    Quit,
}

impl FromStr for ShellCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            bail!("empty command");
        };
        let args: Vec<&str> = words.collect();

        let parsed = match (command.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("on", []) => ShellCommand::Power(true),
            ("off", []) => ShellCommand::Power(false),
            ("color", [r, g, b]) => ShellCommand::Color(Color::try_from_components(
                number(r)?,
                number(g)?,
                number(b)?,
            )?),
            ("host", [a, b, c, d, port]) => {
                let settings = EndpointSettings {
                    octet1: number(a)?,
                    octet2: number(b)?,
                    octet3: number(c)?,
                    octet4: number(d)?,
                    port: number(port)?,
                };
                ShellCommand::Host(Endpoint::try_from(settings)?)
            }
            ("pause", []) => ShellCommand::Pause,
            ("resume", []) => ShellCommand::Resume,
            ("status", []) => ShellCommand::Status,
            ("help" | "?", []) => ShellCommand::Help,
            ("quit" | "exit", []) => ShellCommand::Quit,
            ("color", _) => bail!("expected: color R G B"),
            ("host", _) => bail!("expected: host A B C D PORT"),
            (other, _) => bail!("unknown command {other:?}, try help"),
        };

        Ok(parsed)
    }
}

/// Forward lines of `reader` from a dedicated thread
///
/// The channel closes at end of input. The thread is detached, so a read that
/// never returns does not keep the process alive once the caller is done.
pub fn spawn_line_reader<R>(reader: R) -> io::Result<mpsc::UnboundedReceiver<io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    thread::Builder::new()
        .name("line-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    Ok(rx)
}

fn number<T>(word: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    word.parse()
        .with_context(|| format!("invalid number {word:?}"))
}
