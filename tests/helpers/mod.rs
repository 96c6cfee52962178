#![allow(dead_code)]

use async_trait::async_trait;
use diarybot::db;
use diarybot::diary::nag::NagPolicy;
use diarybot::diary::store::SqliteEntryStore;
use diarybot::diary::{Bot, BotIdentity};
use diarybot::notify::{DeliveryMode, NotificationChannel, NotifyError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A chat message handed to [`RecordingChannel::send`], successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub bot: String,
    pub user: String,
    pub text: String,
}

/// A fallback handed to [`RecordingChannel::send_fallback`], successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub user: String,
    pub text: String,
    pub mode: DeliveryMode,
}

/// Notification channel that records every delivery attempt.
///
/// Presence comes from an explicit online set; deliveries to users marked
/// failing are recorded and then fail.
#[derive(Default)]
pub struct RecordingChannel {
    online: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    presence_broken: AtomicBool,
    sent: Mutex<Vec<Sent>>,
    fallbacks: Mutex<Vec<Fallback>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_online(users: &[&str]) -> Arc<Self> {
        let channel = Self::default();
        for user in users {
            channel.set_online(user, true);
        }
        Arc::new(channel)
    }

    pub fn set_online(&self, user: &str, online: bool) {
        let mut set = self.online.lock().unwrap();
        if online {
            set.insert(user.to_string());
        } else {
            set.remove(user);
        }
    }

    pub fn fail_for(&self, user: &str) {
        self.failing.lock().unwrap().insert(user.to_string());
    }

    pub fn break_presence(&self) {
        self.presence_broken.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fallbacks(&self) -> Vec<Fallback> {
        self.fallbacks.lock().unwrap().clone()
    }

    /// Chat messages whose text is exactly `text`.
    pub fn sent_with_text(&self, text: &str) -> Vec<Sent> {
        self.sent().into_iter().filter(|s| s.text == text).collect()
    }

    fn fails(&self, user: &str) -> bool {
        self.failing.lock().unwrap().contains(user)
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn is_online(&self, user: &str) -> Result<bool, NotifyError> {
        if self.presence_broken.load(Ordering::SeqCst) {
            return Err(NotifyError::Unreachable {
                user: user.to_string(),
                reason: "presence service down".into(),
            });
        }
        Ok(self.online.lock().unwrap().contains(user))
    }

    async fn send(&self, bot: &str, user: &str, text: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(Sent {
            bot: bot.to_string(),
            user: user.to_string(),
            text: text.to_string(),
        });
        if self.fails(user) {
            return Err(NotifyError::Unreachable {
                user: user.to_string(),
                reason: "chat send failed".into(),
            });
        }
        Ok(())
    }

    async fn send_fallback(
        &self,
        user: &str,
        text: &str,
        mode: DeliveryMode,
    ) -> Result<(), NotifyError> {
        self.fallbacks.lock().unwrap().push(Fallback {
            user: user.to_string(),
            text: text.to_string(),
            mode,
        });
        if self.fails(user) {
            return Err(NotifyError::Unreachable {
                user: user.to_string(),
                reason: "mailer down".into(),
            });
        }
        Ok(())
    }
}

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Arc<Mutex<rusqlite::Connection>> {
    Arc::new(Mutex::new(db::open_memory_database().unwrap()))
}

/// Nag policy with short, test-friendly intervals.
pub fn short_policy() -> NagPolicy {
    NagPolicy {
        interval: Duration::from_secs(60),
        floor: Duration::from_secs(10),
        bootstrap: Duration::from_secs(3),
    }
}

/// Bot `name` owned by `owners`, on its own in-memory database.
pub fn make_bot(
    name: &str,
    owners: &[&str],
    channel: Arc<RecordingChannel>,
    policy: NagPolicy,
) -> (Arc<Bot>, Arc<SqliteEntryStore>) {
    make_bot_with(BotIdentity::new(name, owners.iter().copied()), channel, policy)
}

pub fn make_bot_with(
    identity: BotIdentity,
    channel: Arc<RecordingChannel>,
    policy: NagPolicy,
) -> (Arc<Bot>, Arc<SqliteEntryStore>) {
    let store = Arc::new(SqliteEntryStore::new(test_db(), identity.name.clone()));
    let bot = Bot::new(identity, store.clone(), channel, policy);
    (bot, store)
}
