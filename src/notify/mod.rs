//! User-facing notices (the toast surface of a UI).

use std::sync::Mutex;

use tracing::{error, info};

pub const SIGN_IN_REQUIRED: &str = "Please sign in to save favorites";
pub const ADDED: &str = "Added to favorites";
pub const REMOVED: &str = "Removed from favorites";
pub const ALREADY_FAVORITE: &str = "Already in your favorites";
pub const UPDATE_FAILED: &str = "Could not update favorites";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

/// Fire-and-forget notification sink.
pub trait Notifier {
    fn notify(&self, kind: NoticeKind, message: &str);
}

/// Routes notices into the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        match kind {
            NoticeKind::Error => error!(notice = message),
            NoticeKind::Success | NoticeKind::Info => info!(notice = message),
        }
    }
}

/// Prints notices for the command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        match kind {
            NoticeKind::Success => println!("+ {}", message),
            NoticeKind::Info => println!("i {}", message),
            NoticeKind::Error => eprintln!("! {}", message),
        }
    }
}

/// Keeps every notice in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<(NoticeKind, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(NoticeKind, String)> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: NoticeKind) -> usize {
        self.notices().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push((kind, message.to_string()));
        }
    }
}
