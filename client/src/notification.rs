use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// How long a notification stays visible unless dismissed first.
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u32,
    pub message: String,
    pub level: NotificationLevel,
    pub created_at: Instant,
    pub dismissed: bool,
}

impl Notification {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.dismissed || now.saturating_duration_since(self.created_at) >= NOTIFICATION_TTL
    }
}

#[derive(Default)]
struct Inner {
    notifications: Vec<Notification>,
    next_id: u32,
}

/// Outcome messages for the user. Shared between the synchronizer and
/// whatever renders them.
#[derive(Default)]
pub struct NotificationQueue {
    inner: Mutex<Inner>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, message: impl Into<String>, level: NotificationLevel) -> u32 {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.notifications.push(Notification {
            id,
            message: message.into(),
            level,
            created_at: Instant::now(),
            dismissed: false,
        });
        id
    }

    pub fn info(&self, message: impl Into<String>) -> u32 {
        self.add(message, NotificationLevel::Info)
    }

    pub fn warn(&self, message: impl Into<String>) -> u32 {
        self.add(message, NotificationLevel::Warning)
    }

    pub fn error(&self, message: impl Into<String>) -> u32 {
        self.add(message, NotificationLevel::Error)
    }

    pub fn dismiss(&self, id: u32) {
        if let Some(n) = self.inner.lock().notifications.iter_mut().find(|n| n.id == id) {
            n.dismissed = true;
        }
    }

    /// Everything not yet expired, oldest first.
    pub fn active(&self) -> Vec<Notification> {
        let now = Instant::now();
        self.inner.lock().notifications.iter().filter(|n| !n.is_expired_at(now)).cloned().collect()
    }

    /// Take and dismiss everything still active.
    pub fn drain(&self) -> Vec<Notification> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let active = inner.notifications.iter().filter(|n| !n.is_expired_at(now)).cloned().collect();
        inner.notifications.clear();
        active
    }

    pub fn cleanup(&self) {
        let now = Instant::now();
        self.inner.lock().notifications.retain(|n| !n.is_expired_at(now));
    }
}
