mod helpers;

use diarybot::diary::nag::{NagPolicy, MAX_DELAY};
use diarybot::diary::store::{EntryFilter, EntryStore, SortOrder};
use diarybot::diary::{BotError, Kvs, Payload};
use diarybot::notify::DeliveryMode;
use helpers::{make_bot, short_policy, RecordingChannel};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn save_notifies_offline_coowner_by_email_and_pushes_nag_out() {
    let channel = RecordingChannel::with_online(&["A"]);
    let (bot, store) = make_bot("ari", &["A", "B"], channel.clone(), short_policy());

    let saved = bot.save("A", Payload::text("took 5mg")).await.unwrap();
    assert_eq!(saved.uri, format!("http://localhost/diary/ari/{}", saved.id));

    let rows = store.find(&EntryFilter::active(), SortOrder::CreatedAsc, None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, saved.id);
    assert_eq!(rows[0].fields.creator, "A");
    assert_eq!(rows[0].payload(), Some(&Payload::text("took 5mg")));

    // B is offline: exactly one email fallback; A wrote it, so A hears nothing.
    let fallbacks = channel.fallbacks();
    assert_eq!(fallbacks.len(), 1);
    assert_eq!(fallbacks[0].user, "B");
    assert_eq!(fallbacks[0].mode, DeliveryMode::Email);
    assert!(fallbacks[0].text.contains("A wrote: took 5mg"));
    assert!(channel.sent().is_empty());

    // Last update is now, so the nag is a full interval away.
    assert!(bot.nag_pending());
    let remaining = bot.nag_remaining().unwrap();
    assert!(remaining <= Duration::from_secs(60));
    assert!(remaining > Duration::from_secs(55), "remaining {remaining:?}");
}

#[tokio::test]
async fn online_coowner_gets_chat_message() {
    let channel = RecordingChannel::with_online(&["A", "B"]);
    let (bot, _) = make_bot("ari", &["A", "B"], channel.clone(), short_policy());

    bot.save("B", Payload::text("nap 1h")).await.unwrap();

    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].bot, "ari");
    assert_eq!(sent[0].user, "A");
    assert_eq!(sent[0].text, "B wrote: nap 1h");
    assert!(channel.fallbacks().is_empty());
}

#[tokio::test]
async fn save_succeeds_when_every_delivery_fails() {
    let channel = RecordingChannel::with_online(&["B"]);
    channel.fail_for("B");
    channel.fail_for("C");
    let (bot, _) = make_bot("ari", &["A", "B", "C"], channel.clone(), short_policy());

    let saved = bot.save("A", Payload::text("x")).await.unwrap();

    let page = bot.history("A", None).unwrap();
    assert!(page.rows.iter().any(|e| e.id == saved.id));
}

#[tokio::test]
async fn each_coowner_gets_exactly_one_attempt() {
    let channel = RecordingChannel::with_online(&["B"]);
    channel.fail_for("B");
    let (bot, _) = make_bot("ari", &["A", "B", "C", "D"], channel.clone(), short_policy());

    bot.save("A", Payload::text("fever 38.5")).await.unwrap();

    // B's chat failure neither retries B nor stops C and D.
    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user, "B");

    let mut emailed: Vec<String> = channel.fallbacks().into_iter().map(|f| f.user).collect();
    emailed.sort();
    assert_eq!(emailed, vec!["C", "D"]);
}

#[tokio::test]
async fn presence_failure_falls_back_to_email() {
    let channel = RecordingChannel::new();
    channel.break_presence();
    let (bot, _) = make_bot("ari", &["A", "B"], channel.clone(), short_policy());

    bot.save("A", Payload::text("x")).await.unwrap();

    assert!(channel.sent().is_empty());
    let fallbacks = channel.fallbacks();
    assert_eq!(fallbacks.len(), 1);
    assert_eq!(fallbacks[0].user, "B");
}

#[tokio::test]
async fn sole_owner_notifies_nobody() {
    let channel = RecordingChannel::with_online(&["A"]);
    let (bot, _) = make_bot("solo", &["A"], channel.clone(), short_policy());

    bot.save("A", Payload::text("hello")).await.unwrap();

    assert!(channel.sent().is_empty());
    assert!(channel.fallbacks().is_empty());
}

#[tokio::test]
async fn non_owner_save_is_forbidden_and_writes_nothing() {
    let channel = RecordingChannel::with_online(&["A", "B"]);
    let (bot, store) = make_bot("ari", &["A", "B"], channel.clone(), short_policy());

    let err = bot.save("Mallory", Payload::text("hi")).await.unwrap_err();
    assert!(matches!(err, BotError::Forbidden { ref actor, .. } if actor == "Mallory"));

    let filter = EntryFilter {
        state: diarybot::diary::store::DeletedState::Any,
        ..EntryFilter::default()
    };
    assert!(store.find(&filter, SortOrder::CreatedAsc, None).unwrap().is_empty());
    assert!(channel.sent().is_empty());
    assert!(channel.fallbacks().is_empty());
    assert!(!bot.nag_pending());
}

#[tokio::test]
async fn empty_payloads_are_rejected() {
    let (bot, store) = make_bot("ari", &["A"], RecordingChannel::new(), short_policy());

    let err = bot.save("A", Payload::text("   ")).await.unwrap_err();
    assert!(matches!(err, BotError::InvalidPayload(_)));
    let err = bot.save("A", Payload::Structured(Kvs::new())).await.unwrap_err();
    assert!(matches!(err, BotError::InvalidPayload(_)));

    assert!(store.find_one(&EntryFilter::active()).unwrap().is_none());
}

#[tokio::test]
async fn structured_save_is_described_with_raw_pairs_without_rules() {
    let channel = RecordingChannel::with_online(&["B"]);
    let (bot, store) = make_bot("ari", &["A", "B"], channel.clone(), short_policy());

    let mut kvs = Kvs::new();
    kvs.insert("drug".into(), "ibu".into());
    kvs.insert("dose".into(), "200mg".into());
    bot.save("A", Payload::Structured(kvs.clone())).await.unwrap();

    let stored = store.find_one(&EntryFilter::active()).unwrap().unwrap();
    assert_eq!(stored.payload().and_then(Payload::as_structured), Some(&kvs));
    assert_eq!(channel.sent()[0].text, "A wrote: dose=200mg, drug=ibu");
}

#[tokio::test(start_paused = true)]
async fn save_with_huge_nag_interval_still_returns_the_entry() {
    let policy = NagPolicy {
        interval: Duration::from_secs(u64::MAX),
        ..short_policy()
    };
    let (bot, store) = make_bot("ari", &["A"], RecordingChannel::new(), policy);

    let saved = bot.save("A", Payload::text("x")).await.unwrap();
    assert!(store.find_one(&EntryFilter::active_id(&saved.id)).unwrap().is_some());
    assert!(bot.nag_pending());
    assert_eq!(bot.nag_remaining(), Some(MAX_DELAY));
}
