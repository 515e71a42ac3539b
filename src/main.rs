use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info, warn};
use pixel_remote::{
    config::AppConfig,
    device_client::HttpPixelClient,
    preferences::PreferenceStore,
    session::{self, SessionHandle},
    shell::{self, ShellCommand},
    types::{Notice, Snapshot},
};
use std::{
    io::{BufReader, Write},
    sync::Arc,
};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let config = AppConfig::load().context("failed to load configuration")?;
    let store = PreferenceStore::new(&config.paths.preferences_file);
    let endpoint = store.load_or_default();

    let client =
        HttpPixelClient::new(&config.client).context("failed to create device client")?;
    let session = session::start(Arc::new(client), endpoint, config.monitor.clone());

    let printers = [
        spawn_notice_printer(session.notices()),
        spawn_snapshot_printer(session.snapshot()),
    ];

    session.dispatcher().on_session_resume();
    println!("{}", shell::HELP);

    let result = read_commands(&session, &store).await;

    session.dispatcher().on_session_pause();
    session.shutdown().await;
    for printer in printers {
        printer.abort();
    }

    debug!("good bye");
    result
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));
}

async fn read_commands(session: &SessionHandle, store: &PreferenceStore) -> Result<()> {
    let dispatcher = session.dispatcher();
    let mut lines = shell::spawn_line_reader(BufReader::new(std::io::stdin()))
        .context("failed to spawn stdin reader")?;

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("ctrl-c");
                return Ok(());
            }
            line = lines.recv() => line,
        };

        let Some(line) = line else {
            debug!("stdin closed");
            return Ok(());
        };
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<ShellCommand>() {
            Ok(command) => command,
            Err(e) => {
                println!("{e:#}");
                continue;
            }
        };

        match command {
            ShellCommand::Power(on) => dispatcher.on_power_toggled(on),
            ShellCommand::Color(color) => dispatcher.on_color_changed(color),
            ShellCommand::Host(endpoint) => {
                if let Err(e) = store.save(&endpoint) {
                    warn!("{e:#}");
                }
                dispatcher.on_settings_changed(endpoint);
            }
            ShellCommand::Pause => dispatcher.on_session_pause(),
            ShellCommand::Resume => dispatcher.on_session_resume(),
            ShellCommand::Status => print_snapshot(&session.snapshot().borrow()),
            ShellCommand::Help => println!("{}", shell::HELP),
            ShellCommand::Quit => return Ok(()),
        }
    }
}

fn spawn_notice_printer(mut notices: broadcast::Receiver<Notice>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => println!("{notice}"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("skipped {skipped} notices")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_snapshot_printer(mut snapshot: watch::Receiver<Snapshot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while snapshot.changed().await.is_ok() {
            let current = *snapshot.borrow_and_update();
            print_snapshot(&current);
        }
    })
}

fn print_snapshot(snapshot: &Snapshot) {
    println!(
        "{} {:?} power={} color={}",
        snapshot.endpoint, snapshot.reachability, snapshot.device.power, snapshot.device.color
    );
}
