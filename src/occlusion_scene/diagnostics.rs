use crate::occlusion_scene::config::StartupWarnings;
use bevy::prelude::{ResMut, Resource};
use std::collections::VecDeque;
use tracing::{error, info, warn};

const MAX_RETAINED_ENTRIES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub level: DiagnosticLevel,
    pub message: String,
}

/// Operator-facing log. Every entry is emitted as a `tracing` event and the
/// most recent ones are retained for inspection.
#[derive(Resource, Debug, Default)]
pub struct OperatorChannel {
    entries: VecDeque<DiagnosticEntry>,
}

impl OperatorChannel {
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "operator", "{message}");
        self.push(DiagnosticLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "operator", "{message}");
        self.push(DiagnosticLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!(target: "operator", "{message}");
        self.push(DiagnosticLevel::Error, message);
    }

    pub fn entries(&self) -> impl Iterator<Item = &DiagnosticEntry> {
        self.entries.iter()
    }

    pub fn count(&self, level: DiagnosticLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    fn push(&mut self, level: DiagnosticLevel, message: String) {
        if self.entries.len() == MAX_RETAINED_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(DiagnosticEntry { level, message });
    }
}

pub fn report_startup_warnings(
    mut warnings: ResMut<StartupWarnings>,
    mut channel: ResMut<OperatorChannel>,
) {
    for warning in warnings.0.drain(..) {
        channel.warn(warning);
    }
}
