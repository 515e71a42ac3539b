use crate::{
    device_client::ClientError,
    monitor::Event,
    types::{Color, Endpoint},
};
use log::warn;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Color slot shared between a queued [`Command::Color`] and the dispatcher
///
/// Holds the latest color until the session takes it.
pub(crate) type ColorSlot = Arc<Mutex<Option<Color>>>;

/// What the session receives from the UI, in call order
#[derive(Debug)]
pub(crate) enum Command {
    Event(Event),
    Color(ColorSlot),
}

impl Command {
    /// Resolve to a monitor event, `None` if the color was already taken
    pub(crate) fn into_event(self) -> Option<Event> {
        match self {
            Command::Event(event) => Some(event),
            Command::Color(slot) => lock(&slot).take().map(Event::ColorChanged),
        }
    }
}

/// Entry point for the UI layer
///
/// All methods return immediately and the session sees calls in the order
/// they were made. Consecutive color changes share one queue entry so that
/// a fast color picker never queues more than the latest value.
#[derive(Clone)]
pub struct CommandDispatcher {
    commands: mpsc::UnboundedSender<Command>,
    /// Slot of the last queued color if nothing was queued after it
    tail: Arc<Mutex<Option<ColorSlot>>>,
}

impl CommandDispatcher {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            commands,
            tail: Arc::new(Mutex::new(None)),
        }
    }

    pub fn on_power_toggled(&self, on: bool) {
        self.forward(Event::PowerToggled(on));
    }

    pub fn on_color_changed(&self, color: Color) {
        let mut tail = lock(&self.tail);

        if let Some(slot) = tail.as_ref() {
            let mut pending = lock(slot);
            if pending.is_some() {
                *pending = Some(color);
                return;
            }
        }

        let slot = Arc::new(Mutex::new(Some(color)));
        *tail = Some(Arc::clone(&slot));
        self.send(Command::Color(slot));
    }

    /// Like [`Self::on_color_changed`] for unchecked components
    pub fn on_color_components(&self, r: i64, g: i64, b: i64) -> Result<(), ClientError> {
        let color = Color::try_from_components(r, g, b)?;
        self.on_color_changed(color);
        Ok(())
    }

    pub fn on_settings_changed(&self, endpoint: Endpoint) {
        self.forward(Event::SettingsChanged(endpoint));
    }

    pub fn on_session_resume(&self) {
        self.forward(Event::SessionResumed);
    }

    pub fn on_session_pause(&self) {
        self.forward(Event::SessionPaused);
    }

    fn forward(&self, event: Event) {
        let mut tail = lock(&self.tail);
        *tail = None;
        self.send(Command::Event(event));
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("session closed, dropping command");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> (CommandDispatcher, mpsc::UnboundedReceiver<Command>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        (CommandDispatcher::new(commands_tx), commands_rx)
    }

    fn drain(commands: &mut mpsc::UnboundedReceiver<Command>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(command) = commands.try_recv() {
            events.extend(command.into_event());
        }
        events
    }

    #[test]
    fn forwards_commands_in_order() {
        let (dispatcher, mut commands) = dispatcher();

        dispatcher.on_session_resume();
        dispatcher.on_power_toggled(true);
        dispatcher.on_session_pause();

        assert_eq!(
            drain(&mut commands),
            vec![
                Event::SessionResumed,
                Event::PowerToggled(true),
                Event::SessionPaused
            ]
        );
    }

    #[test]
    fn consecutive_colors_keep_only_the_latest() {
        let (dispatcher, mut commands) = dispatcher();

        for value in 0..=200 {
            dispatcher.on_color_changed(Color::new(value, 0, 0));
        }

        assert_eq!(
            drain(&mut commands),
            vec![Event::ColorChanged(Color::new(200, 0, 0))]
        );
    }

    #[test]
    fn colors_keep_their_place_around_other_commands() {
        let (dispatcher, mut commands) = dispatcher();
        let endpoint = Endpoint::default();

        dispatcher.on_color_changed(Color::new(1, 1, 1));
        dispatcher.on_color_changed(Color::new(2, 2, 2));
        dispatcher.on_settings_changed(endpoint);
        dispatcher.on_color_changed(Color::new(3, 3, 3));

        assert_eq!(
            drain(&mut commands),
            vec![
                Event::ColorChanged(Color::new(2, 2, 2)),
                Event::SettingsChanged(endpoint),
                Event::ColorChanged(Color::new(3, 3, 3)),
            ]
        );
    }

    #[test]
    fn color_after_taken_slot_is_queued_again() {
        let (dispatcher, mut commands) = dispatcher();

        dispatcher.on_color_changed(Color::new(1, 1, 1));
        let first = commands.try_recv().unwrap().into_event();
        dispatcher.on_color_changed(Color::new(2, 2, 2));

        assert_eq!(first, Some(Event::ColorChanged(Color::new(1, 1, 1))));
        assert_eq!(
            drain(&mut commands),
            vec![Event::ColorChanged(Color::new(2, 2, 2))]
        );
    }

    #[test]
    fn out_of_range_components_are_rejected_locally() {
        let (dispatcher, mut commands) = dispatcher();

        let result = dispatcher.on_color_components(10, 300, 10);

        assert!(matches!(result, Err(ClientError::InvalidInput(_))));
        assert!(drain(&mut commands).is_empty());
    }

    #[test]
    fn commands_after_session_end_are_dropped() {
        let (dispatcher, commands) = dispatcher();
        drop(commands);

        dispatcher.on_power_toggled(false);
        dispatcher.on_color_changed(Color::new(1, 2, 3));
    }
}
