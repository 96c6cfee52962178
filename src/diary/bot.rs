//! The diary bot: one entry collection, one owner set, one nag timer.
//!
//! [`Bot::save`] writes an entry, tells every other owner about it, and pushes
//! the nag out again. Nags go to whichever owners are online; if nobody is, the
//! nag is rescheduled instead of dropped. Deletes and time corrections are
//! audited mutations (see [`audit`](super::audit)), never hard deletes.

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Local, Utc};
use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::audit;
use super::error::{BotError, StoreError};
use super::history::{standard_queries, HistoryQuery};
use super::nag::{NagPolicy, NagTimer};
use super::store::{EntryFilter, EntryStore, EntryUpdate, SortOrder};
use super::structured::StructuredInput;
use super::types::{Entry, EntryFields, Payload, SavedEntry};
use crate::notify::{DeliveryMode, NotificationChannel, NotifyError};

pub const NAG_MESSAGE: &str = "What's up?";

/// How far back the status command looks for doses.
const DOSE_WINDOW_HOURS: i64 = 20;

/// Who a bot is: everything fixed at construction time.
#[derive(Debug, Clone, Default)]
pub struct BotIdentity {
    pub name: String,
    pub owners: BTreeSet<String>,
    pub birthdate: Option<DateTime<Utc>>,
    pub structured: StructuredInput,
    /// Bot-specific history queries, offered after the standard ones.
    pub extra_queries: Vec<HistoryQuery>,
    /// Shared secret the chat transport presents when delivering messages.
    pub chat_token: Option<String>,
    /// Prefix for entry URIs, e.g. `https://example.com/diary`.
    pub entry_base: String,
}

impl BotIdentity {
    pub fn new<I, S>(name: impl Into<String>, owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            owners: owners.into_iter().map(Into::into).collect(),
            entry_base: "http://localhost/diary".into(),
            ..Self::default()
        }
    }
}

/// Result of one nag round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NagOutcome {
    pub reached: usize,
}

/// One page of history: the selected query's rows plus the other queries.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub query: HistoryQuery,
    pub rows: Vec<Entry>,
    pub other_queries: Vec<HistoryQuery>,
}

pub struct Bot {
    identity: BotIdentity,
    store: Arc<dyn EntryStore>,
    channel: Arc<dyn NotificationChannel>,
    nag_policy: NagPolicy,
    current_nag: Mutex<Option<NagTimer>>,
    nag_generation: AtomicU64,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("name", &self.identity.name)
            .field("owners", &self.identity.owners)
            .finish_non_exhaustive()
    }
}

impl Bot {
    /// Create a bot. No nag is scheduled until [`Bot::reschedule_nag`] is called.
    pub fn new(
        identity: BotIdentity,
        store: Arc<dyn EntryStore>,
        channel: Arc<dyn NotificationChannel>,
        nag_policy: NagPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            store,
            channel,
            nag_policy,
            current_nag: Mutex::new(None),
            nag_generation: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn owners(&self) -> &BTreeSet<String> {
        &self.identity.owners
    }

    pub fn is_owner(&self, user: &str) -> bool {
        self.identity.owners.contains(user)
    }

    pub fn birthdate(&self) -> Option<DateTime<Utc>> {
        self.identity.birthdate
    }

    pub fn structured(&self) -> &StructuredInput {
        &self.identity.structured
    }

    pub fn chat_token(&self) -> Option<&str> {
        self.identity.chat_token.as_deref()
    }

    pub fn entry_uri(&self, id: &str) -> String {
        format!("{}/{}/{}", self.identity.entry_base, self.identity.name, id)
    }

    /// Standard queries followed by this bot's extras.
    pub fn history_queries(&self) -> Vec<HistoryQuery> {
        let mut queries = standard_queries();
        queries.extend(self.identity.extra_queries.iter().cloned());
        queries
    }

    fn authorize(&self, actor: &str) -> Result<(), BotError> {
        if self.is_owner(actor) {
            Ok(())
        } else {
            warn!(bot = %self.identity.name, actor, "rejected non-owner");
            Err(BotError::Forbidden {
                bot: self.identity.name.clone(),
                actor: actor.to_string(),
            })
        }
    }

    // ── Nag scheduling ────────────────────────────────────────────────────────

    fn nag_slot(&self) -> MutexGuard<'_, Option<NagTimer>> {
        self.current_nag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creation time of the newest live entry, if any.
    pub fn last_update_time(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let newest = self
            .store
            .find(&EntryFilter::active(), SortOrder::CreatedDesc, Some(1))?;
        Ok(newest.first().map(|e| e.fields.created))
    }

    /// Cancel any pending nag and schedule a fresh one from the last update time.
    ///
    /// Safe to call any number of times; at most one nag is ever pending.
    /// Must be called from within a tokio runtime.
    pub fn reschedule_nag(self: &Arc<Self>) {
        let last = match self.last_update_time() {
            Ok(last) => last,
            Err(e) => {
                warn!(bot = %self.identity.name, error = %e, "cannot read last update, nagging soon");
                None
            }
        };
        let delay = self.nag_policy.delay(last, Utc::now());

        // Hold the slot while spawning so the timer cannot fire before it is recorded.
        let mut slot = self.nag_slot();
        let generation = self.nag_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let bot = Arc::downgrade(self);
        let timer = NagTimer::spawn(generation, delay, move || async move {
            if let Some(bot) = bot.upgrade() {
                bot.fire_nag(generation).await;
            }
        });
        if let Some(previous) = slot.replace(timer) {
            previous.cancel();
        }
        drop(slot);

        debug!(bot = %self.identity.name, delay_secs = delay.as_secs_f64(), "nag scheduled");
    }

    /// Whether a nag is currently scheduled.
    pub fn nag_pending(&self) -> bool {
        self.nag_slot().as_ref().is_some_and(NagTimer::is_pending)
    }

    /// Time left before the pending nag fires.
    pub fn nag_remaining(&self) -> Option<Duration> {
        self.nag_slot()
            .as_ref()
            .filter(|t| t.is_pending())
            .map(NagTimer::remaining)
    }

    /// Cancel the pending nag (if any) and nag owners right now.
    pub async fn send_nag(self: &Arc<Self>) -> NagOutcome {
        let pending = self.nag_slot().take();
        if let Some(timer) = pending {
            timer.cancel();
        }
        self.nag_owners().await
    }

    async fn fire_nag(self: Arc<Self>, generation: u64) {
        {
            let mut slot = self.nag_slot();
            // superseded by a later reschedule
            if slot.as_ref().map(NagTimer::generation) != Some(generation) {
                return;
            }
            slot.take();
        }
        self.nag_owners().await;
    }

    async fn nag_owners(self: &Arc<Self>) -> NagOutcome {
        let mut reached = 0;
        for owner in &self.identity.owners {
            match self.channel.is_online(owner).await {
                Ok(true) => match self.channel.send(&self.identity.name, owner, NAG_MESSAGE).await {
                    Ok(()) => reached += 1,
                    Err(e) => warn!(bot = %self.identity.name, owner = %owner, error = %e, "nag send failed"),
                },
                Ok(false) => {}
                Err(e) => {
                    warn!(bot = %self.identity.name, owner = %owner, error = %e, "presence check failed")
                }
            }
        }

        if reached == 0 {
            info!(bot = %self.identity.name, "no owner reachable, deferring nag");
            self.reschedule_nag();
        } else {
            info!(bot = %self.identity.name, reached, "nag sent");
        }
        NagOutcome { reached }
    }

    // ── Entry mutations ───────────────────────────────────────────────────────

    /// Write a new entry and notify the other owners.
    ///
    /// Once the insert succeeds this returns the new entry, whatever happens to
    /// the notifications.
    pub async fn save(self: &Arc<Self>, actor: &str, payload: Payload) -> Result<SavedEntry, BotError> {
        self.authorize(actor)?;
        check_payload(&payload)?;

        let fields = EntryFields::created_now(actor, payload);
        let id = self.store.insert(&fields)?;
        let uri = self.entry_uri(&id);
        info!(bot = %self.identity.name, id = %id, creator = actor, "entry saved");

        if let Err(e) = self.tell_everyone(&fields).await {
            warn!(bot = %self.identity.name, id = %id, error = %e, "notification failed, entry is saved anyway");
        }
        self.reschedule_nag();

        Ok(SavedEntry { id, uri })
    }

    /// Soft-delete an entry: content cleared, prior state kept in its history.
    pub fn delete(self: &Arc<Self>, actor: &str, id: &str) -> Result<Entry, BotError> {
        self.authorize(actor)?;
        let updated = self.mutate(id, |_| audit::tombstone(actor, Local::now().fixed_offset()))?;
        info!(bot = %self.identity.name, id, actor, "entry deleted");
        self.reschedule_nag();
        Ok(updated)
    }

    /// Move an entry to a corrected time, keeping the old time in its history.
    pub fn update_time(
        self: &Arc<Self>,
        actor: &str,
        id: &str,
        new_time: DateTime<FixedOffset>,
    ) -> Result<Entry, BotError> {
        self.authorize(actor)?;
        let updated = self.mutate(id, |current| audit::retimed(current, actor, new_time))?;
        info!(bot = %self.identity.name, id, actor, new_time = %new_time, "entry retimed");
        self.reschedule_nag();
        Ok(updated)
    }

    fn mutate(
        &self,
        id: &str,
        next_fields: impl FnOnce(&EntryFields) -> EntryFields,
    ) -> Result<Entry, BotError> {
        let filter = EntryFilter::active_id(id);
        let current = self
            .store
            .find_one(&filter)?
            .ok_or_else(|| BotError::NotFound(id.to_string()))?;

        let next = audit::snapshot_and_apply(&current, next_fields(&current.fields));
        self.store
            .find_one_and_update(&filter, &EntryUpdate::from(next))?
            .ok_or_else(|| BotError::NotFound(id.to_string()))
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// Raw lookup for an owner, deleted entries included.
    pub fn get_entry(&self, actor: &str, id: &str) -> Result<Entry, BotError> {
        self.authorize(actor)?;
        self.store
            .find_one(&EntryFilter::any_id(id))?
            .ok_or_else(|| BotError::NotFound(id.to_string()))
    }

    /// Run the history query selected by route suffix.
    pub fn history(&self, actor: &str, selection: Option<&str>) -> Result<HistoryPage, BotError> {
        self.authorize(actor)?;

        let mut queries = self.history_queries();
        let index = queries
            .iter()
            .position(|q| q.matches(selection))
            .ok_or_else(|| BotError::UnknownQuery(selection.unwrap_or("").to_string()))?;
        let query = queries.remove(index);
        let rows = query.run(self.store.as_ref(), Utc::now())?;

        Ok(HistoryPage {
            query,
            rows,
            other_queries: queries,
        })
    }

    /// Every entry of this bot, deleted ones included, oldest first.
    pub fn export(&self) -> Result<Vec<Entry>, StoreError> {
        let filter = EntryFilter {
            state: super::store::DeletedState::Any,
            ..EntryFilter::default()
        };
        self.store.find(&filter, SortOrder::CreatedAsc, None)
    }

    /// Human-readable text for a payload.
    pub fn describe(&self, payload: &Payload) -> String {
        match payload {
            Payload::Text(text) => text.clone(),
            Payload::Structured(kvs) => self.identity.structured.describe(kvs),
        }
    }

    /// What an owner sees when they ask `?`.
    pub fn status(&self) -> Result<String, StoreError> {
        let now = Utc::now();
        let ago = match self.last_update_time()? {
            None => "never".to_string(),
            Some(last) => {
                let secs = (now - last).num_seconds();
                if 59 < secs && secs < 86_400 {
                    format!("{:.2} hours ago", secs as f64 / 3600.0)
                } else {
                    last.with_timezone(&Local).format("%Y-%m-%d %a %H:%M").to_string()
                }
            }
        };

        let mut msg = format!("last update was {ago}");
        match self.nag_remaining() {
            None => msg.push_str("; no nag"),
            Some(left) => msg.push_str(&format!("; nag in {:.1} secs", left.as_secs_f64())),
        }
        msg.push_str(" \n");
        msg.push_str(&self.dose_statuses(now)?.join("\n"));
        Ok(msg)
    }

    /// One line per distinct dose value logged recently, newest first.
    fn dose_statuses(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let Some(dose_key) = self.identity.structured.dose_key() else {
            return Ok(Vec::new());
        };

        let filter = EntryFilter::active()
            .structured_only()
            .created_after(now - ChronoDuration::hours(DOSE_WINDOW_HOURS));
        let mut seen = HashSet::new();
        let mut reports = Vec::new();
        for entry in self.store.find(&filter, SortOrder::CreatedDesc, None)? {
            let Some(kvs) = entry.payload().and_then(Payload::as_structured) else {
                continue;
            };
            let Some(value) = kvs.get(dose_key) else {
                continue;
            };
            if !seen.insert(value.clone()) {
                continue;
            }
            let words = self.identity.structured.english(kvs);
            if !words.is_empty() {
                let hours = (now - entry.fields.created).num_seconds() as f64 / 3600.0;
                reports.push(format!("{words} {hours:.2} hours ago"));
            }
        }
        Ok(reports)
    }

    /// Answer a chat message sent to this bot. Returns the reply text.
    pub async fn handle_chat(self: &Arc<Self>, from: &str, text: &str) -> String {
        match text.trim() {
            "chattest" => format!("not saving {} test", self.identity.name),
            "?" => match self.authorize(from).map_err(|e| e.to_string()).and_then(|()| {
                self.status().map_err(|e| e.to_string())
            }) {
                Ok(status) => status,
                Err(e) => format!("status failed: {e}"),
            },
            _ => match self.save(from, Payload::text(text)).await {
                Ok(saved) => format!("saved {}", saved.uri),
                Err(e) => format!("failed to save: {e}"),
            },
        }
    }

    // ── Notification fan-out ──────────────────────────────────────────────────

    /// Tell every owner except the writer about a new entry.
    ///
    /// Every recipient gets exactly one attempt, even if others fail; the
    /// first failure is returned after all attempts finish.
    async fn tell_everyone(&self, fields: &EntryFields) -> Result<(), NotifyError> {
        let Some(payload) = &fields.payload else {
            return Ok(());
        };
        let msg = format!("{} wrote: {}", fields.creator, self.describe(payload));

        let recipients: Vec<&String> = self
            .identity
            .owners
            .iter()
            .filter(|owner| **owner != fields.creator)
            .collect();
        let results = join_all(recipients.iter().map(|owner| self.notify_owner(owner, &msg))).await;

        let mut first_error = None;
        for (owner, result) in recipients.iter().zip(results) {
            if let Err(e) = result {
                warn!(bot = %self.identity.name, owner = %owner, error = %e, "could not notify owner");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn notify_owner(&self, owner: &str, msg: &str) -> Result<(), NotifyError> {
        let online = match self.channel.is_online(owner).await {
            Ok(online) => online,
            Err(e) => {
                warn!(bot = %self.identity.name, owner, error = %e, "presence check failed, falling back");
                false
            }
        };
        if online {
            self.channel.send(&self.identity.name, owner, msg).await
        } else {
            self.channel.send_fallback(owner, msg, DeliveryMode::Email).await
        }
    }
}

fn check_payload(payload: &Payload) -> Result<(), BotError> {
    match payload {
        Payload::Text(text) if text.trim().is_empty() => {
            Err(BotError::InvalidPayload("empty message".into()))
        }
        Payload::Structured(kvs) if kvs.is_empty() => {
            Err(BotError::InvalidPayload("empty structured input".into()))
        }
        _ => Ok(()),
    }
}
