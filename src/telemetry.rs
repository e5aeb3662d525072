use crate::portal::RunStatus;

/// Events sent from the status monitors to the progress display
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// A status query returned
    StatusObserved {
        cycle: u32,
        status: RunStatus,
        message: Option<String>,
    },
    /// Monitoring ended, either on a terminal status or an exhausted budget
    Finished { cycle: u32, status: RunStatus },
}

/// Statistics aggregated from poll events
#[derive(Debug, Default, Clone)]
pub struct PollStats {
    pub cycles_observed: u32,
    pub last_status: Option<RunStatus>,
    pub last_message: Option<String>,
    /// Cycle at which each new status was first seen
    pub transitions: Vec<(u32, RunStatus)>,
    pub finished: bool,
}

impl PollStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a poll event
    pub fn update(&mut self, event: &PollEvent) {
        match event {
            PollEvent::StatusObserved {
                cycle,
                status,
                message,
            } => {
                self.cycles_observed = *cycle;
                if self.last_status.as_ref() != Some(status) {
                    self.transitions.push((*cycle, status.clone()));
                }
                self.last_status = Some(status.clone());
                self.last_message = message.clone();
            }
            PollEvent::Finished { cycle, status } => {
                self.cycles_observed = *cycle;
                self.last_status = Some(status.clone());
                self.finished = true;
            }
        }
    }

    /// One-line summary for the progress display
    pub fn describe(&self) -> String {
        let status = self
            .last_status
            .as_ref()
            .map(RunStatus::as_str)
            .unwrap_or("waiting");
        match &self.last_message {
            Some(message) if !message.is_empty() => {
                format!("cycle {}: {} ({})", self.cycles_observed, status, message)
            }
            _ => format!("cycle {}: {}", self.cycles_observed, status),
        }
    }
}
