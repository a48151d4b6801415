//! Observability for schedule construction
//!
//! The factory reports what it built through an explicit [`EventSink`]
//! instead of a global logger. [`LogSink`] forwards to the `log` facade;
//! [`RecordingSink`] keeps events in memory so tests can assert on them.

use crate::schedule::warmup::WarmupMode;
use serde_json::Value;
use std::fmt;

/// Something worth reporting while a schedule is being built.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleEvent {
    /// No configuration was given; a constant schedule is used.
    FallbackToConstant,
    /// A base schedule was selected, with the parameters it was built from.
    BaseSchedule { name: String, params: Value },
    /// The base schedule is wrapped in a warmup phase.
    Warmup {
        iters: usize,
        mode: WarmupMode,
        factor: f64,
    },
}

impl fmt::Display for ScheduleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleEvent::FallbackToConstant => {
                write!(f, "using no lr scheduling, fallback to constant lr")
            }
            ScheduleEvent::BaseSchedule { name, params } => {
                write!(f, "using {name} scheduler with {params}")
            }
            ScheduleEvent::Warmup {
                iters,
                mode,
                factor,
            } => write!(
                f,
                "using warmup with {iters} iters, factor {factor}, {mode} mode"
            ),
        }
    }
}

/// Receiver of [`ScheduleEvent`]s.
pub trait EventSink {
    fn record(&mut self, event: ScheduleEvent);
}

/// Forwards events to the `log` crate at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&mut self, event: ScheduleEvent) {
        log::info!(target: "schedule_factory", "{event}");
    }
}

/// Keeps every event, in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Vec<ScheduleEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ScheduleEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ScheduleEvent> {
        self.events
    }
}

impl EventSink for RecordingSink {
    fn record(&mut self, event: ScheduleEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use serde_json::json;
    use std::sync::Mutex;

    // (target, message) of every info record seen by the test logger
    static CAPTURED: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Info
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                CAPTURED
                    .lock()
                    .unwrap()
                    .push((record.target().to_string(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;

    #[test]
    fn test_event_messages() {
        assert_eq!(
            ScheduleEvent::FallbackToConstant.to_string(),
            "using no lr scheduling, fallback to constant lr"
        );
        let base = ScheduleEvent::BaseSchedule {
            name: "exp_lr".to_string(),
            params: json!({"gamma": 0.9}),
        };
        assert_eq!(base.to_string(), r#"using exp_lr scheduler with {"gamma":0.9}"#);
        let warmup = ScheduleEvent::Warmup {
            iters: 500,
            mode: WarmupMode::Linear,
            factor: 0.2,
        };
        assert_eq!(
            warmup.to_string(),
            "using warmup with 500 iters, factor 0.2, linear mode"
        );
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let mut sink = RecordingSink::new();
        sink.record(ScheduleEvent::FallbackToConstant);
        sink.record(ScheduleEvent::Warmup {
            iters: 1,
            mode: WarmupMode::Constant,
            factor: 1.0,
        });
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.into_events()[0], ScheduleEvent::FallbackToConstant);
    }

    #[test]
    fn test_log_sink_forwards_to_log_facade() {
        // only the first set_logger call in the process succeeds
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Info);

        LogSink.record(ScheduleEvent::Warmup {
            iters: 3,
            mode: WarmupMode::Constant,
            factor: 0.5,
        });

        let captured = CAPTURED.lock().unwrap();
        assert!(captured.contains(&(
            "schedule_factory".to_string(),
            "using warmup with 3 iters, factor 0.5, constant mode".to_string()
        )));
    }
}
