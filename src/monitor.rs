//! Reachability state machine.
//!
//! [`Monitor`] owns the online/offline belief, the device state and the
//! bookkeeping of the recovery loop. It performs no I/O: every call to
//! [`Monitor::handle`] consumes one [`Event`] and returns the [`Effect`]s the
//! session has to execute.

use crate::{
    device_client::ClientError,
    types::{Color, DeviceState, Endpoint, Notice, PowerState, Reachability, Snapshot},
};
use log::{debug, info, warn};

/// Requests of one class supersede each other
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestClass {
    Root,
    Status,
    Power,
    Color,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    ProbeRoot,
    GetStatus,
    GetColor,
    SetPower(bool),
    SetColor(Color),
}

impl RequestKind {
    pub fn class(&self) -> RequestClass {
        match self {
            RequestKind::ProbeRoot => RequestClass::Root,
            RequestKind::GetStatus => RequestClass::Status,
            RequestKind::SetPower(_) => RequestClass::Power,
            RequestKind::GetColor | RequestKind::SetColor(_) => RequestClass::Color,
        }
    }
}

/// A request tagged with the generation of its class at the time it was issued
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Request {
    pub kind: RequestKind,
    pub generation: u64,
    pub endpoint: Endpoint,
}

/// Successful outcome of a request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Banner(String),
    Power(PowerState),
    Color(Color),
    Ack,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    // UI commands
    PowerToggled(bool),
    ColorChanged(Color),
    SettingsChanged(Endpoint),
    SessionResumed,
    SessionPaused,

    // Recovery loop
    ProbeTick,

    // Request outcomes
    Response {
        request: Request,
        result: Result<Reply, ClientError>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    Send(Request),
    StartProbe,
    StopProbe,
    Notify(Notice),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProbeState {
    #[default]
    Idle,
    Scheduled,
}

#[derive(Clone, Copy, Debug, Default)]
struct Generations {
    root: u64,
    status: u64,
    power: u64,
    color: u64,
}

impl Generations {
    fn slot(&mut self, class: RequestClass) -> &mut u64 {
        match class {
            RequestClass::Root => &mut self.root,
            RequestClass::Status => &mut self.status,
            RequestClass::Power => &mut self.power,
            RequestClass::Color => &mut self.color,
        }
    }

    fn current(&self, class: RequestClass) -> u64 {
        match class {
            RequestClass::Root => self.root,
            RequestClass::Status => self.status,
            RequestClass::Power => self.power,
            RequestClass::Color => self.color,
        }
    }

    fn next(&mut self, class: RequestClass) -> u64 {
        let slot = self.slot(class);
        *slot += 1;
        *slot
    }

    fn invalidate_all(&mut self) {
        for class in [
            RequestClass::Root,
            RequestClass::Status,
            RequestClass::Power,
            RequestClass::Color,
        ] {
            self.next(class);
        }
    }
}

#[derive(Debug)]
pub struct Monitor {
    endpoint: Endpoint,
    reachability: Reachability,
    device: DeviceState,
    probe: ProbeState,
    /// The UI is visible, background probing is allowed
    active: bool,
    generations: Generations,
    /// Status reads up to this generation were issued before the last power write
    status_before_power_write: u64,
}

impl Monitor {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            reachability: Reachability::Offline,
            device: DeviceState::default(),
            probe: ProbeState::Idle,
            active: false,
            generations: Generations::default(),
            status_before_power_write: 0,
        }
    }

    pub fn reachability(&self) -> Reachability {
        self.reachability
    }

    pub fn device(&self) -> DeviceState {
        self.device
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn probe(&self) -> ProbeState {
        self.probe
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            reachability: self.reachability,
            device: self.device,
            endpoint: self.endpoint,
        }
    }

    /// Apply one event and return the effects to execute, in order
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            Event::PowerToggled(on) => {
                if self.gate_command("power toggle", &mut effects) {
                    self.device.power = PowerState::from(on);
                    self.status_before_power_write =
                        self.generations.current(RequestClass::Status);
                    self.request(RequestKind::SetPower(on), &mut effects);
                }
            }
            Event::ColorChanged(color) => {
                if self.gate_command("color change", &mut effects) {
                    self.device.color = color;
                    self.request(RequestKind::SetColor(color), &mut effects);
                }
            }
            Event::SettingsChanged(endpoint) => {
                info!("endpoint changed to {endpoint}");
                self.endpoint = endpoint;
                self.generations.invalidate_all();
                self.set_offline();
                self.request(RequestKind::ProbeRoot, &mut effects);
            }
            Event::SessionResumed => {
                self.active = true;
                self.set_offline();
                self.request(RequestKind::GetStatus, &mut effects);
            }
            Event::SessionPaused => {
                self.active = false;
                self.stop_probe(&mut effects);
            }
            Event::ProbeTick => {
                if self.probe == ProbeState::Scheduled {
                    self.request(RequestKind::GetStatus, &mut effects);
                } else {
                    debug!("ignoring probe tick, recovery loop is not running");
                }
            }
            Event::Response { request, result } => {
                self.handle_response(request, result, &mut effects)
            }
        }

        effects
    }

    /// Returns whether a mutating command may be sent
    fn gate_command(&mut self, what: &str, effects: &mut Vec<Effect>) -> bool {
        if self.reachability == Reachability::Online {
            return true;
        }

        info!("dropping {what}, device is offline");
        effects.push(Effect::Notify(Notice::Offline));
        self.ensure_probe(effects);
        false
    }

    fn handle_response(
        &mut self,
        request: Request,
        result: Result<Reply, ClientError>,
        effects: &mut Vec<Effect>,
    ) {
        let class = request.kind.class();
        let current = self.generations.current(class);
        if request.generation != current {
            debug!(
                "discarding stale {:?} response (generation {}, current {current})",
                request.kind, request.generation
            );
            return;
        }

        match result {
            Ok(reply) => {
                self.set_online(effects);
                self.apply_reply(request, reply, effects);
            }
            Err(ClientError::Unreachable(reason)) => {
                warn!("{:?} to {} failed: {reason}", request.kind, request.endpoint);
                if request.kind == RequestKind::ProbeRoot {
                    effects.push(Effect::Notify(Notice::HostUnreachable));
                }
                self.set_offline();
                self.ensure_probe(effects);
            }
            Err(ClientError::MalformedPayload(reason)) => {
                // the device answered, only its payload is unusable
                warn!("ignoring {:?} response: {reason}", request.kind);
                self.set_online(effects);
            }
            Err(ClientError::InvalidInput(reason)) => {
                warn!("{:?} rejected locally: {reason}", request.kind);
            }
        }
    }

    fn apply_reply(&mut self, request: Request, reply: Reply, effects: &mut Vec<Effect>) {
        let Request {
            kind, generation, ..
        } = request;

        match (kind, reply) {
            (RequestKind::GetStatus, Reply::Power(_))
                if generation <= self.status_before_power_write =>
            {
                debug!("keeping toggled power, status read predates it");
                self.request(RequestKind::GetColor, effects);
            }
            (RequestKind::ProbeRoot, Reply::Banner(text)) => {
                effects.push(Effect::Notify(Notice::Banner(text)));
                self.request(RequestKind::GetStatus, effects);
            }
            (RequestKind::GetStatus, Reply::Power(power)) => {
                self.device.power = power;
                self.request(RequestKind::GetColor, effects);
            }
            (RequestKind::GetColor, Reply::Color(color)) => {
                self.device.color = color;
            }
            (RequestKind::SetPower(_) | RequestKind::SetColor(_), Reply::Ack) => {}
            (kind, reply) => warn!("unexpected reply {reply:?} to {kind:?}"),
        }
    }

    fn request(&mut self, kind: RequestKind, effects: &mut Vec<Effect>) {
        let generation = self.generations.next(kind.class());
        effects.push(Effect::Send(Request {
            kind,
            generation,
            endpoint: self.endpoint,
        }));
    }

    fn set_online(&mut self, effects: &mut Vec<Effect>) {
        if self.reachability == Reachability::Offline {
            info!("device at {} is online", self.endpoint);
            self.reachability = Reachability::Online;
        }
        self.stop_probe(effects);
    }

    fn set_offline(&mut self) {
        if self.reachability == Reachability::Online {
            info!("device at {} is offline", self.endpoint);
            self.reachability = Reachability::Offline;
        }
    }

    fn ensure_probe(&mut self, effects: &mut Vec<Effect>) {
        if !self.active {
            debug!("session paused, recovery loop not started");
            return;
        }
        if self.reachability == Reachability::Online {
            return;
        }
        if self.probe == ProbeState::Scheduled {
            debug!("recovery loop already running");
            return;
        }

        self.probe = ProbeState::Scheduled;
        effects.push(Effect::StartProbe);
    }

    fn stop_probe(&mut self, effects: &mut Vec<Effect>) {
        if self.probe == ProbeState::Scheduled {
            self.probe = ProbeState::Idle;
            effects.push(Effect::StopProbe);
        }
    }
}
