use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A user-visible, non-blocking notification. The UI renders these however
/// it likes (the original platform shows them as toasts).
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub detail: String,
}

/// Fan-out for notices raised by the stores. All failures are converted to
/// a `Notice` at the operation boundary; nothing propagates into the
/// rendering layer as a panic.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub(crate) fn info(&self, title: &str, detail: &str) {
        self.push(NoticeLevel::Info, title, detail);
    }

    pub(crate) fn error(&self, title: &str, detail: &str) {
        self.push(NoticeLevel::Error, title, detail);
    }

    fn push(&self, level: NoticeLevel, title: &str, detail: &str) {
        debug!("notice [{level:?}] {title}: {detail}");
        let _ = self.tx.send(Notice {
            level,
            title: title.to_string(),
            detail: detail.to_string(),
        });
    }
}
