//! Async runtime around the [`Monitor`].
//!
//! One session task owns the monitor and applies every transition. Requests
//! run on short-lived worker tasks and report back over a channel; the
//! recovery loop is a single interval task.

use crate::{
    config::MonitorConfig,
    device_client::{ClientError, PixelClient},
    dispatcher::{Command, CommandDispatcher},
    monitor::{Effect, Event, Monitor, Reply, Request, RequestClass, RequestKind},
    types::{Endpoint, Notice, Snapshot},
};
use log::{debug, info};
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::{AbortHandle, JoinHandle},
    time::{self, Instant, MissedTickBehavior},
};

const NOTICE_CAPACITY: usize = 16;

/// Handle to a running session
pub struct SessionHandle {
    dispatcher: CommandDispatcher,
    snapshot: watch::Receiver<Snapshot>,
    notices: broadcast::Sender<Notice>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn dispatcher(&self) -> CommandDispatcher {
        self.dispatcher.clone()
    }

    /// Receiver of the state published after every change
    pub fn snapshot(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Receiver of transient notices raised from now on
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Stop the session, cancelling the recovery loop and in-flight requests
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
        debug!("session shut down");
    }
}

/// Spawn a session talking to `endpoint` through `client`
///
/// The session starts paused and offline; call
/// [`CommandDispatcher::on_session_resume`] to start it.
pub fn start<C>(client: Arc<C>, endpoint: Endpoint, config: MonitorConfig) -> SessionHandle
where
    C: PixelClient + Send + Sync + 'static,
{
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (replies_tx, replies_rx) = mpsc::unbounded_channel();
    let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

    let monitor = Monitor::new(endpoint);
    let (snapshot_tx, snapshot) = watch::channel(monitor.snapshot());

    let session = Session {
        monitor,
        client,
        config,
        replies_tx,
        probe: None,
        in_flight: HashMap::new(),
        snapshot_tx,
        notices: notices.clone(),
    };

    let task = tokio::spawn(session.run(commands_rx, replies_rx));

    SessionHandle {
        dispatcher: CommandDispatcher::new(commands_tx),
        snapshot,
        notices,
        task,
    }
}

struct Session<C> {
    monitor: Monitor,
    client: Arc<C>,
    config: MonitorConfig,
    replies_tx: mpsc::UnboundedSender<Event>,
    probe: Option<JoinHandle<()>>,
    in_flight: HashMap<RequestClass, AbortHandle>,
    snapshot_tx: watch::Sender<Snapshot>,
    notices: broadcast::Sender<Notice>,
}

impl<C> Session<C>
where
    C: PixelClient + Send + Sync + 'static,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut replies: mpsc::UnboundedReceiver<Event>,
    ) {
        info!("session started for {}", self.monitor.endpoint());

        loop {
            let event = tokio::select! {
                command = commands.recv() => match command.map(Command::into_event) {
                    Some(Some(event)) => event,
                    Some(None) => continue,
                    None => break,
                },
                Some(reply) = replies.recv() => reply,
            };

            self.process(event);
        }

        info!("session closed, all dispatchers dropped");
    }

    fn process(&mut self, event: Event) {
        for effect in self.monitor.handle(event) {
            match effect {
                Effect::Send(request) => self.send(request),
                Effect::StartProbe => self.start_probe(),
                Effect::StopProbe => self.stop_probe(),
                Effect::Notify(notice) => {
                    // no subscriber is not an error
                    let _ = self.notices.send(notice);
                }
            }
        }

        let snapshot = self.monitor.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    fn send(&mut self, request: Request) {
        let client = Arc::clone(&self.client);
        let replies = self.replies_tx.clone();

        let task = tokio::spawn(async move {
            let result = perform(client.as_ref(), &request).await;
            let _ = replies.send(Event::Response { request, result });
        });

        if let Some(previous) = self
            .in_flight
            .insert(request.kind.class(), task.abort_handle())
        {
            previous.abort();
        }
    }

    fn start_probe(&mut self) {
        if self.probe.as_ref().is_some_and(|probe| !probe.is_finished()) {
            debug!("recovery loop already running");
            return;
        }

        let period = self.config.probe_interval;
        let ticks = self.replies_tx.clone();
        info!("recovery loop started, probing every {period:?}");

        self.probe = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if ticks.send(Event::ProbeTick).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_probe(&mut self) {
        if let Some(probe) = self.probe.take() {
            probe.abort();
            info!("recovery loop stopped");
        }
    }
}

impl<C> Drop for Session<C> {
    fn drop(&mut self) {
        if let Some(probe) = self.probe.take() {
            probe.abort();
        }
        for (_, request) in self.in_flight.drain() {
            request.abort();
        }
    }
}

async fn perform<C: PixelClient>(client: &C, request: &Request) -> Result<Reply, ClientError> {
    let endpoint = &request.endpoint;

    match request.kind {
        RequestKind::ProbeRoot => client.probe_root(endpoint).await.map(Reply::Banner),
        RequestKind::GetStatus => client.get_status(endpoint).await.map(Reply::Power),
        RequestKind::GetColor => client.get_color(endpoint).await.map(Reply::Color),
        RequestKind::SetPower(on) => client.set_power(endpoint, on).await.map(|_| Reply::Ack),
        RequestKind::SetColor(color) => {
            client.set_color(endpoint, color).await.map(|_| Reply::Ack)
        }
    }
}
