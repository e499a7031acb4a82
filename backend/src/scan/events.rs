use shared::ScanEvent;
use std::sync::{Arc, Mutex};

/// Receives every phase change and step outcome of a scan run.
pub trait ScanObserver {
    fn on_event(&self, event: &ScanEvent);
}

/// Writes scan progress to the application log.
pub struct LogObserver {
    label: String,
}

impl LogObserver {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ScanObserver for LogObserver {
    fn on_event(&self, event: &ScanEvent) {
        match event {
            ScanEvent::PhaseChanged { to, .. } if to.is_terminal() => {
                log::info!("[{}] scan {}", self.label, to)
            }
            ScanEvent::PhaseChanged { from, to } => {
                log::debug!("[{}] phase {} -> {}", self.label, from, to)
            }
            ScanEvent::StepStarted { step } => log::info!("[{}] {} started", self.label, step),
            ScanEvent::StepFinished { step } => log::info!("[{}] {} finished", self.label, step),
            ScanEvent::StepFailed { step, message } => {
                log::warn!("[{}] {} failed: {}", self.label, step, message)
            }
        }
    }
}

/// Collects events so they can be returned to the client or inspected later.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ScanEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<ScanEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ScanObserver for EventLog {
    fn on_event(&self, event: &ScanEvent) {
        let mut events = self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push(event.clone());
    }
}
