//! End-to-end tests for the router: frames in, rendered list and effects out.
//! Covers thread isolation, edit reconciliation against server echoes,
//! off-thread patch buffering, unread bookkeeping and the reaction cap.

use serde_json::{json, Value};
use threadline::command::Command;
use threadline::{ChatError, ClientConfig, Effect, Router, ThreadKey};

fn router(me: &str) -> Router {
    Router::new(me, "user", &ClientConfig::default())
}

fn feed(r: &mut Router, v: Value, now: u64) -> Vec<Effect> {
    r.handle_frame(&v.to_string(), now)
}

fn ids(r: &Router) -> Vec<String> {
    r.messages().iter().map(|m| m.id.clone()).collect()
}

fn history_requests(fx: &[Effect]) -> Vec<ThreadKey> {
    fx.iter()
        .filter_map(|e| match e {
            Effect::Send(Command::History(k)) => Some(k.clone()),
            _ => None,
        })
        .collect()
}

/// Open `key` and load `items` as its history page.
fn open_with(r: &mut Router, key: ThreadKey, items: Value, now: u64) {
    r.select_thread(key.clone());
    let frame = match &key {
        ThreadKey::Main => json!({"type": "history", "items": items}),
        ThreadKey::Dm(peer) => json!({"type": "dm_history", "peer": peer, "items": items}),
        ThreadKey::Gc(gcid) => json!({"type": "gc_history", "gcid": gcid, "items": items}),
    };
    feed(r, frame, now);
}

// ---------------------------------------------------------------------------
// Thread isolation
// ---------------------------------------------------------------------------

#[test]
fn test_dm_event_never_touches_other_threads() {
    let views = [
        ThreadKey::Main,
        ThreadKey::Gc("g1".into()),
        ThreadKey::Dm("carol".into()),
    ];
    for view in views {
        let mut r = router("alice");
        open_with(&mut r, view.clone(), json!([{"id": "1", "sender": "x", "text": "keep me"}]), 0);
        let before = r.messages().to_vec();

        let dm = |extra: Value| {
            let mut base = json!({"thread": "dm", "peer": "bob"});
            base.as_object_mut().unwrap().extend(extra.as_object().unwrap().clone());
            base
        };
        feed(&mut r, dm(json!({"type": "message", "id": "9", "sender": "bob", "text": "psst"})), 1);
        feed(&mut r, dm(json!({"type": "message_update", "id": "1", "text": "hijacked"})), 2);
        feed(&mut r, dm(json!({"type": "reaction_update", "id": "1", "reactions": {"👍": ["bob"]}})), 3);
        feed(&mut r, dm(json!({"type": "delete", "id": "1"})), 4);
        feed(&mut r, dm(json!({"type": "clear"})), 5);

        assert_eq!(r.messages(), before.as_slice(), "view {view} was mutated");
    }
}

#[test]
fn test_dm_event_lands_in_matching_dm() {
    let mut r = router("alice");
    open_with(&mut r, ThreadKey::Dm("bob".into()), json!([]), 0);
    feed(&mut r, json!({"type": "message", "id": "9", "sender": "bob", "text": "psst", "thread": "dm", "peer": "bob"}), 1);
    assert_eq!(ids(&r), vec!["9"]);
}

#[test]
fn test_stale_history_after_switch_is_dropped() {
    let mut r = router("alice");
    r.select_thread(ThreadKey::Gc("g1".into()));
    // Main's history arrives after the user already moved on.
    feed(&mut r, json!({"type": "history", "items": [{"id": "1", "sender": "x", "text": "old"}]}), 1);
    assert!(r.messages().is_empty());
}

// ---------------------------------------------------------------------------
// Edit reconciliation
// ---------------------------------------------------------------------------

#[test]
fn test_edit_echo_with_new_id_merges_exactly() {
    let mut r = router("alice");
    open_with(&mut r, ThreadKey::Main, json!([{"id": "1", "sender": "alice", "text": "hello"}]), 0);

    let fx = r.commit_edit("1", "hello world", 1_000).unwrap();
    assert!(matches!(&fx[0], Effect::Send(Command::Edit { id, .. }) if id == "1"));
    assert_eq!(r.recent_edits().len(), 1);

    feed(&mut r, json!({"type": "message", "id": "99", "sender": "alice", "text": "hello world"}), 5_000);

    assert_eq!(r.messages().len(), 1);
    let m = &r.messages()[0];
    assert_eq!(m.id, "1");
    assert_eq!(m.text.as_deref(), Some("hello world"));
    assert!(m.edited);
    assert!(r.recent_edits().is_empty(), "matched edit must be consumed");
}

#[test]
fn test_edit_echo_with_trailing_spaces_still_merges() {
    let mut r = router("alice");
    open_with(&mut r, ThreadKey::Main, json!([{"id": "1", "sender": "alice", "text": "hello"}]), 0);
    r.commit_edit("1", "hello world", 1_000).unwrap();

    feed(&mut r, json!({"type": "message", "id": "99", "sender": "alice", "text": "hello world  "}), 2_000);

    assert_eq!(ids(&r), vec!["1"]);
}

#[test]
fn test_dissimilar_text_is_not_merged() {
    let mut r = router("alice");
    open_with(&mut r, ThreadKey::Main, json!([{"id": "1", "sender": "alice", "text": "yo"}]), 0);
    r.commit_edit("1", "hi", 1_000).unwrap();

    feed(&mut r, json!({"type": "message", "id": "99", "sender": "alice", "text": "hi there, general kenobi"}), 2_000);

    assert_eq!(ids(&r), vec!["1", "99"]);
    assert_eq!(r.recent_edits().len(), 1);
}

#[test]
fn test_edit_echo_after_window_renders_as_new_message() {
    let mut r = router("alice");
    open_with(&mut r, ThreadKey::Main, json!([{"id": "1", "sender": "alice", "text": "hello"}]), 0);
    r.commit_edit("1", "hello world", 1_000).unwrap();

    feed(&mut r, json!({"type": "message", "id": "99", "sender": "alice", "text": "hello world"}), 40_000);

    assert_eq!(ids(&r), vec!["1", "99"]);
}

#[test]
fn test_edit_echo_in_history_collapses_and_merges_reactions() {
    let mut r = router("alice");
    open_with(&mut r, ThreadKey::Main, json!([{"id": "1", "sender": "alice", "text": "hello"}]), 0);
    r.commit_edit("1", "hello world", 1_000).unwrap();

    feed(
        &mut r,
        json!({"type": "history", "items": [
            {"id": "1", "sender": "alice", "text": "hello", "reactions": {"👍": ["bob"]}},
            {"id": "99", "sender": "alice", "text": "hello world", "reactions": {"👍": ["carol"], "🎉": ["dave"]}}
        ]}),
        2_000,
    );

    assert_eq!(ids(&r), vec!["1"]);
    let m = &r.messages()[0];
    assert_eq!(m.text.as_deref(), Some("hello world"));
    assert_eq!(m.reactions["👍"].len(), 2);
    assert!(m.reactions.contains_key("🎉"));
}

#[test]
fn test_edit_echo_after_server_delete_is_still_rendered() {
    let mut r = router("alice");
    open_with(&mut r, ThreadKey::Main, json!([{"id": "1", "sender": "alice", "text": "hello"}]), 0);
    r.commit_edit("1", "hello world", 1_000).unwrap();

    feed(&mut r, json!({"type": "delete", "id": "1"}), 2_000);
    assert!(r.messages().is_empty());

    feed(&mut r, json!({"type": "message", "id": "99", "sender": "alice", "text": "hello world"}), 3_000);

    assert_eq!(ids(&r), vec!["1"]);
    assert_eq!(r.messages()[0].text.as_deref(), Some("hello world"));
    assert!(r.messages()[0].edited);
    assert!(r.recent_edits().is_empty());
}

#[test]
fn test_edit_echo_after_list_cleared_takes_original_id() {
    let mut r = router("alice");
    open_with(&mut r, ThreadKey::Main, json!([{"id": "1", "sender": "alice", "text": "hello"}]), 0);
    r.commit_edit("1", "hello world", 1_000).unwrap();

    feed(&mut r, json!({"type": "clear"}), 2_000);
    feed(&mut r, json!({"type": "message", "id": "99", "sender": "alice", "text": "hello world"}), 3_000);

    assert_eq!(ids(&r), vec!["1"]);
    assert!(r.messages()[0].edited);

    // A later patch addressed to the original id still lands.
    feed(&mut r, json!({"type": "message_update", "id": "1", "text": "hello world!"}), 4_000);
    assert_eq!(r.messages()[0].text.as_deref(), Some("hello world!"));
}

#[test]
fn test_edit_of_unknown_message_is_rejected() {
    let mut r = router("alice");
    assert!(matches!(r.commit_edit("404", "x", 0), Err(ChatError::UnknownMessage(_))));
    assert!(r.recent_edits().is_empty());
}

// ---------------------------------------------------------------------------
// Off-thread buffering
// ---------------------------------------------------------------------------

#[test]
fn test_off_thread_reaction_replayed_on_history_load() {
    let mut r = router("alice");
    open_with(&mut r, ThreadKey::Main, json!([{"id": "7", "sender": "x", "text": "main msg"}]), 0);
    let before = r.messages().to_vec();

    feed(
        &mut r,
        json!({"type": "reaction_update", "id": "7", "thread": "gc", "gcid": "g1", "reactions": {"🔥": ["bob"]}}),
        1,
    );
    assert_eq!(r.messages(), before.as_slice());
    assert!(r.pending().has_pending(&ThreadKey::Gc("g1".into())));

    open_with(
        &mut r,
        ThreadKey::Gc("g1".into()),
        json!([{"id": "7", "sender": "x", "text": "gc msg", "reactions": {"🔥": ["carol"]}}]),
        2,
    );

    let m = &r.messages()[0];
    let fire: Vec<&str> = m.reactions["🔥"].iter().map(String::as_str).collect();
    assert_eq!(fire, vec!["bob", "carol"]);
    assert!(!r.pending().has_pending(&ThreadKey::Gc("g1".into())));
}

#[test]
fn test_off_thread_text_update_replayed_and_unmatched_dropped() {
    let mut r = router("alice");
    feed(&mut r, json!({"type": "message_update", "id": "5", "thread": "dm", "peer": "bob", "text": "fixed"}), 1);
    feed(&mut r, json!({"type": "message_update", "id": "404", "thread": "dm", "peer": "bob", "text": "gone"}), 2);

    open_with(&mut r, ThreadKey::Dm("bob".into()), json!([{"id": "5", "sender": "bob", "text": "fxed"}]), 3);

    assert_eq!(r.messages().len(), 1);
    assert_eq!(r.messages()[0].text.as_deref(), Some("fixed"));
    assert!(r.messages()[0].edited);
    assert!(r.pending().is_empty());
}

// ---------------------------------------------------------------------------
// Unread counters
// ---------------------------------------------------------------------------

#[test]
fn test_select_resets_unread_and_requests_one_history() {
    let mut r = router("alice");
    for i in 0..3 {
        feed(
            &mut r,
            json!({"type": "message", "id": format!("m{i}"), "sender": "bob", "text": "hey", "thread": "dm", "peer": "bob"}),
            i,
        );
    }
    let bob = ThreadKey::Dm("bob".into());
    assert_eq!(r.unread().get(&bob), 3);

    let fx = r.select_thread(bob.clone());
    assert_eq!(r.unread().get(&bob), 0);
    assert_eq!(history_requests(&fx), vec![bob.clone()]);

    feed(&mut r, json!({"type": "message", "id": "m9", "sender": "bob", "text": "again", "thread": "dm", "peer": "bob"}), 10);
    assert_eq!(r.unread().get(&bob), 0);
    assert_eq!(ids(&r), vec!["m9"]);
}

#[test]
fn test_reselecting_active_thread_sends_nothing() {
    let mut r = router("alice");
    assert!(r.select_thread(ThreadKey::Main).is_empty());
}

// ---------------------------------------------------------------------------
// Reactions
// ---------------------------------------------------------------------------

#[test]
fn test_sixth_distinct_emoji_rejected_before_send() {
    let mut r = router("alice");
    open_with(
        &mut r,
        ThreadKey::Main,
        json!([{"id": "1", "sender": "bob", "text": "hi", "reactions": {
            "a": ["x"], "b": ["x"], "c": ["x"], "d": ["x"], "e": ["x"]
        }}]),
        0,
    );

    let err = r.react("1", "f").unwrap_err();
    assert!(matches!(err, ChatError::TooManyReactions { limit: 5 }));
    assert_eq!(r.messages()[0].reactions.len(), 5);

    // An existing key is still toggleable.
    let fx = r.react("1", "a").unwrap();
    assert!(matches!(&fx[0], Effect::Send(Command::React { emoji, .. }) if emoji == "a"));
}

// ---------------------------------------------------------------------------
// Robustness
// ---------------------------------------------------------------------------

#[test]
fn test_garbage_between_frames_does_not_interrupt() {
    let mut r = router("alice");
    let frames = [
        "".to_string(),
        "[]".to_string(),
        "{\"type\": 5}".to_string(),
        json!({"type": "no_such_type"}).to_string(),
        json!({"type": "message_update", "id": "missing", "text": "x"}).to_string(),
        json!({"type": "message", "id": "1", "sender": "bob", "text": "still here"}).to_string(),
    ];
    for (i, f) in frames.iter().enumerate() {
        r.handle_frame(f, i as u64);
    }
    assert_eq!(ids(&r), vec!["1"]);
}

#[test]
fn test_duplicate_live_frame_appends_once() {
    let mut r = router("alice");
    let frame = json!({"type": "message", "id": "1", "sender": "bob", "text": "hi"});
    feed(&mut r, frame.clone(), 0);
    feed(&mut r, frame, 1);
    assert_eq!(ids(&r), vec!["1"]);
}

#[test]
fn test_uploaded_media_goes_to_origin_thread() {
    let mut r = router("alice");
    r.select_thread(ThreadKey::Gc("g1".into()));
    let fx = r.send_media("/uploads/a.png", "image/png", ThreadKey::Main);
    assert_eq!(fx.len(), 1, "no scroll for a thread that is not on screen");
    match &fx[0] {
        Effect::Send(cmd) => {
            let v = cmd.to_json();
            assert_eq!(v["type"], "media");
            assert_eq!(v["url"], "/uploads/a.png");
            assert!(v.get("gcid").is_none());
        }
        other => panic!("unexpected {other:?}"),
    }
}
