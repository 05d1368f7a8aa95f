/// Internal state changes a subscriber can be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Reset,
    Status,
    CaptureSize,
    CaptureFrequency,
    TriggerValues,
    TriggerMask,
    ReadDelayCount,
    Flags,
}

pub type EventHandler = Box<dyn FnMut(Event)>;

/// Synchronous notification with at most one subscriber.
///
/// `raise` runs the handler before returning; nothing is queued.
#[derive(Default)]
pub struct EventBus {
    handler: Option<EventHandler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current subscriber.
    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: FnMut(Event) + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    pub fn unsubscribe(&mut self) {
        self.handler = None;
    }

    pub fn raise(&mut self, event: Event) {
        if let Some(handler) = self.handler.as_mut() {
            handler(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribed", &self.handler.is_some())
            .finish()
    }
}
