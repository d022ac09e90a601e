use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Progress reporting and cooperative cancellation, implemented by the caller.
///
/// Only `is_canceled` is required; the subprocess poll loop consults it between
/// waits. The reporting methods default to no-ops.
pub trait WorkProgressMonitor: Send + Sync {
    fn begin_task(&self, _name: &str, _total_work: u32) {}
    fn sub_task(&self, _name: &str) {}
    fn worked(&self, _work: u32) {}
    fn done(&self) {}
    fn is_canceled(&self) -> bool;
    fn set_canceled(&self, canceled: bool);
}

/// Monitor that only tracks a cancellation flag.
#[derive(Debug, Default)]
pub struct NullProgressMonitor {
    canceled: AtomicBool,
}

impl WorkProgressMonitor for NullProgressMonitor {
    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    fn set_canceled(&self, canceled: bool) {
        self.canceled.store(canceled, Ordering::SeqCst)
    }
}

// A token cannot be un-cancelled, so set_canceled(false) is ignored.
impl WorkProgressMonitor for CancellationToken {
    fn is_canceled(&self) -> bool {
        self.is_cancelled()
    }

    fn set_canceled(&self, canceled: bool) {
        if canceled {
            self.cancel();
        }
    }
}

/// Named sink for the lines a command prints, e.g. an IDE console view.
pub trait CommandConsole: Send + Sync {
    fn print_output(&self, line: &str);
    fn print_error(&self, line: &str);
}

pub trait CommandConsoleFactory: Send + Sync {
    fn get(&self, name: &str) -> Arc<dyn CommandConsole>;
}

/// Console that forwards to the `log` facade, used when no IDE console is wired up.
#[derive(Debug, Clone)]
pub struct LogConsole {
    name: String,
}

impl LogConsole {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl CommandConsole for LogConsole {
    fn print_output(&self, line: &str) {
        log::debug!("[{}] {}", self.name, line);
    }

    fn print_error(&self, line: &str) {
        log::debug!("[{}][stderr] {}", self.name, line);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogConsoleFactory;

impl CommandConsoleFactory for LogConsoleFactory {
    fn get(&self, name: &str) -> Arc<dyn CommandConsole> {
        Arc::new(LogConsole::new(name))
    }
}
