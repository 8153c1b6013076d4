//! Header Event Logging
//!
//! Structured records of the rare, interesting things the header layer does:
//! - Model bootstrap and type definitions
//! - Tolerated length races
//! - Copy statistics from relocation helpers
//!
//! Per-object operations (hash installs, forwarding CASes) never record
//! events; they only emit `log::trace!`. Filtered events return after one
//! atomic load, before any lock is touched.
//!
//! Log Levels:
//! - ERROR: unused here; invariant violations go through `fatal!`
//! - WARN: Tolerated races
//! - INFO: Bootstrap
//! - DEBUG: Type definitions, copy statistics
//!
//! Free-form diagnostics use the `log` facade directly.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

/// Log level for header events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Header event types
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderEvent {
    /// Object model installed
    ModelInitialized {
        compressed_type_pointers: bool,
        compressed_references: bool,
        object_alignment: usize,
    },

    /// Type descriptor defined into the type space
    TypeDefined {
        name: String,
        address: usize,
        layout_helper: i32,
    },

    /// Array size mismatch accepted because the length may change under a copy
    LengthRaceTolerated {
        address: usize,
        fast_words: usize,
        slow_words: usize,
    },

    /// Relocation copy statistics
    CopyStats {
        objects_copied: usize,
        bytes_copied: usize,
        races_lost: usize,
    },
}

/// Header logger configuration
#[derive(Debug, Clone, Copy)]
pub struct HeaderLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Enable console output
    pub console: bool,

    /// Enable JSON format
    pub json: bool,

    /// Enable timestamps
    pub timestamps: bool,

    /// Retained events; older ones are dropped first
    pub capacity: usize,
}

impl Default for HeaderLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: false,
            json: false,
            timestamps: true,
            capacity: 4096,
        }
    }
}

/// Header logger - centralized record of header events
pub struct HeaderLogger {
    level: AtomicU8,
    config: RwLock<HeaderLoggerConfig>,
    events: Mutex<VecDeque<(Instant, HeaderEvent)>>,
    enabled: AtomicBool,
}

impl HeaderLogger {
    /// Create new header logger
    pub fn new(config: HeaderLoggerConfig) -> Self {
        Self {
            level: AtomicU8::new(config.level as u8),
            config: RwLock::new(config),
            events: Mutex::new(VecDeque::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Replace the configuration, keeping retained events
    pub fn reconfigure(&self, config: HeaderLoggerConfig) {
        *self.config.write() = config;
        self.level.store(config.level as u8, Ordering::Relaxed);
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Events at `level` would be recorded
    #[inline]
    pub fn accepts(&self, level: LogLevel) -> bool {
        self.is_enabled() && level <= self.level()
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Record a header event
    pub fn log(&self, event: HeaderEvent) {
        if !self.accepts(Self::event_level(&event)) {
            return;
        }

        let config = *self.config.read();
        if config.console {
            Self::output_console(&config, &event);
        }

        let mut events = self.events.lock();
        if config.capacity > 0 {
            while events.len() >= config.capacity {
                events.pop_front();
            }
        }
        events.push_back((Instant::now(), event));
    }

    /// Get log level for event
    fn event_level(event: &HeaderEvent) -> LogLevel {
        match event {
            HeaderEvent::LengthRaceTolerated { .. } => LogLevel::Warn,
            HeaderEvent::ModelInitialized { .. } => LogLevel::Info,
            HeaderEvent::TypeDefined { .. } | HeaderEvent::CopyStats { .. } => LogLevel::Debug,
        }
    }

    fn output_console(config: &HeaderLoggerConfig, event: &HeaderEvent) {
        let prefix = if config.timestamps {
            format!("[{}] ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        } else {
            String::new()
        };

        if config.json {
            println!("{}{}", prefix, Self::to_json(event));
        } else {
            println!("{}{}", prefix, Self::to_human(event));
        }
    }

    /// Human-readable rendering
    pub fn to_human(event: &HeaderEvent) -> String {
        match event {
            HeaderEvent::ModelInitialized {
                compressed_type_pointers,
                compressed_references,
                object_alignment,
            } => format!(
                "[OOP] Model initialized (compressed types: {}, compressed refs: {}, alignment: {})",
                compressed_type_pointers, compressed_references, object_alignment
            ),
            HeaderEvent::TypeDefined {
                name,
                address,
                layout_helper,
            } => format!(
                "[OOP] Type {} defined at {:#x} (layout helper {:#x})",
                name, address, layout_helper
            ),
            HeaderEvent::LengthRaceTolerated {
                address,
                fast_words,
                slow_words,
            } => format!(
                "[OOP] Tolerated size mismatch for {:#x}: {} vs {} words",
                address, fast_words, slow_words
            ),
            HeaderEvent::CopyStats {
                objects_copied,
                bytes_copied,
                races_lost,
            } => format!(
                "[OOP] Copied {} objects ({} bytes, {} races lost)",
                objects_copied, bytes_copied, races_lost
            ),
        }
    }

    /// JSON rendering
    pub fn to_json(event: &HeaderEvent) -> String {
        let json = match event {
            HeaderEvent::ModelInitialized {
                compressed_type_pointers,
                compressed_references,
                object_alignment,
            } => serde_json::json!({
                "type": "model_initialized",
                "compressed_type_pointers": compressed_type_pointers,
                "compressed_references": compressed_references,
                "object_alignment": object_alignment
            }),
            HeaderEvent::TypeDefined {
                name,
                address,
                layout_helper,
            } => serde_json::json!({
                "type": "type_defined",
                "name": name,
                "address": address,
                "layout_helper": layout_helper
            }),
            HeaderEvent::LengthRaceTolerated {
                address,
                fast_words,
                slow_words,
            } => serde_json::json!({
                "type": "length_race_tolerated",
                "address": address,
                "fast_words": fast_words,
                "slow_words": slow_words
            }),
            HeaderEvent::CopyStats {
                objects_copied,
                bytes_copied,
                races_lost,
            } => serde_json::json!({
                "type": "copy_stats",
                "objects_copied": objects_copied,
                "bytes_copied": bytes_copied,
                "races_lost": races_lost
            }),
        };

        json.to_string()
    }

    /// Snapshot of retained events
    pub fn get_events(&self) -> Vec<(Instant, HeaderEvent)> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for HeaderLogger {
    fn default() -> Self {
        Self::new(HeaderLoggerConfig::default())
    }
}

// Global header logger
lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: HeaderLogger = HeaderLogger::default();
}

/// Log a header event to the global logger
pub fn log_event(event: HeaderEvent) {
    GLOBAL_LOGGER.log(event);
}

/// Replace the global logger's configuration
pub fn configure_logger(config: HeaderLoggerConfig) {
    GLOBAL_LOGGER.reconfigure(config);
}

/// Global logger event count
pub fn get_event_count() -> usize {
    GLOBAL_LOGGER.event_count()
}

/// Snapshot of the global logger's events
pub fn get_events() -> Vec<HeaderEvent> {
    GLOBAL_LOGGER
        .get_events()
        .into_iter()
        .map(|(_, event)| event)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    fn stats() -> HeaderEvent {
        HeaderEvent::CopyStats {
            objects_copied: 3,
            bytes_copied: 96,
            races_lost: 1,
        }
    }

    #[test]
    fn test_header_logger_basic() {
        let logger = HeaderLogger::new(HeaderLoggerConfig {
            level: LogLevel::Debug,
            ..Default::default()
        });

        logger.log(stats());
        assert_eq!(logger.event_count(), 1);
    }

    fn type_defined() -> HeaderEvent {
        HeaderEvent::TypeDefined {
            name: "Point".to_string(),
            address: 0x1000,
            layout_helper: 32,
        }
    }

    #[test]
    fn test_level_filtering() {
        let logger = HeaderLogger::default();

        // Info level drops debug events
        logger.log(type_defined());
        assert_eq!(logger.event_count(), 0);

        logger.log(HeaderEvent::LengthRaceTolerated {
            address: 0x1000,
            fast_words: 4,
            slow_words: 6,
        });
        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_header_logger_disable() {
        let logger = HeaderLogger::default();

        logger.disable();
        logger.log(HeaderEvent::ModelInitialized {
            compressed_type_pointers: true,
            compressed_references: false,
            object_alignment: 8,
        });

        assert_eq!(logger.event_count(), 0);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let logger = HeaderLogger::new(HeaderLoggerConfig {
            level: LogLevel::Warn,
            capacity: 2,
            ..Default::default()
        });

        for slow_words in 1..=3 {
            logger.log(HeaderEvent::LengthRaceTolerated {
                address: 0x1000,
                fast_words: 4,
                slow_words,
            });
        }

        let events = logger.get_events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].1,
            HeaderEvent::LengthRaceTolerated {
                address: 0x1000,
                fast_words: 4,
                slow_words: 2
            }
        );
    }

    #[test]
    fn test_reconfigure_changes_level() {
        let logger = HeaderLogger::default();
        assert!(!logger.accepts(LogLevel::Debug));

        logger.reconfigure(HeaderLoggerConfig {
            level: LogLevel::Debug,
            ..Default::default()
        });
        assert_eq!(logger.level(), LogLevel::Debug);
        logger.log(type_defined());
        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_filtered_event_takes_no_lock() {
        let logger = Arc::new(HeaderLogger::default());
        let config = logger.config.write();
        let events = logger.events.lock();

        let (done, finished) = mpsc::channel();
        let worker = {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                logger.log(type_defined());
                done.send(()).expect("test thread waits");
            })
        };

        let returned = finished.recv_timeout(Duration::from_millis(500)).is_ok();
        drop(events);
        drop(config);
        worker.join().expect("logging thread should not panic");
        assert!(returned, "filtered event waited for the logger's locks");
        assert_eq!(logger.event_count(), 0);
    }

    #[test]
    fn test_json_rendering() {
        let json: serde_json::Value =
            serde_json::from_str(&HeaderLogger::to_json(&stats())).expect("valid JSON");
        assert_eq!(json["type"], "copy_stats");
        assert_eq!(json["bytes_copied"], 96);
    }

    #[test]
    fn test_human_rendering() {
        assert_eq!(
            HeaderLogger::to_human(&stats()),
            "[OOP] Copied 3 objects (96 bytes, 1 races lost)"
        );
    }
}
