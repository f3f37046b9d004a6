use log::{Metadata, Record};

use crate::debug;

/// A [log::Log] that records messages into the current debug log, so they
/// show up between the representations of the stage that emitted them.
pub struct MessageLogger;

impl log::Log for MessageLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // all levels, but only from the compiler itself
        metadata.target().starts_with("qmsql") && super::log_is_enabled()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            super::log_entry(|| {
                debug::DebugEntryKind::Message(debug::Message {
                    level: record.level().to_string(),
                    file: record.file().map(|x| x.to_string()),
                    line: record.line(),
                    module_path: record.module_path().map(|x| x.to_string()),
                    text: format!("{}", record.args()),
                })
            });
        }
    }

    fn flush(&self) {}
}
