mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::harness;
use threadline_core::managers::SendOptions;
use threadline_core::models::HistoryStatus;

#[tokio::test]
async fn test_initial_page_is_newest_in_chronological_order() {
    let h = harness();
    h.seed_session("S1", 1).await;
    h.seed_messages("S1", 5).await;

    let count = h
        .engine
        .messages()
        .load_initial_messages_for_session("S1", Some(3))
        .await
        .unwrap();

    assert_eq!(count, 3);
    let stamps: Vec<i64> = h.messages("S1").iter().map(|m| m.created_at).collect();
    assert_eq!(stamps, vec![3000, 4000, 5000]);

    let store = h.engine.store().lock();
    let pagination = &store.chat("S1").unwrap().pagination;
    assert!(pagination.has_more);
    assert_eq!(pagination.total_loaded, 3);
    assert_eq!(pagination.last_loaded_timestamp, Some(3000));
}

#[tokio::test]
async fn test_load_more_is_monotonic_and_terminates() {
    let h = harness();
    h.seed_session("S1", 1).await;
    h.seed_messages("S1", 7).await;
    let manager = h.engine.messages();

    manager
        .load_initial_messages_for_session("S1", Some(3))
        .await
        .unwrap();

    let mut seen: HashSet<i64> = h.messages("S1").iter().map(|m| m.created_at).collect();
    let mut pages = Vec::new();
    loop {
        let added = manager
            .load_more_messages_for_session("S1", Some(3))
            .await
            .unwrap();
        if added == 0 {
            break;
        }
        pages.push(added);
        assert!(pages.len() < 10, "pagination did not terminate");
    }
    assert_eq!(pages, vec![3, 1]);

    let messages = h.messages("S1");
    assert_eq!(messages.len(), 7);
    for message in &messages[..4] {
        assert!(seen.insert(message.created_at), "timestamp fetched twice");
    }
    assert!(messages.windows(2).all(|w| w[0].created_at < w[1].created_at));

    let store = h.engine.store().lock();
    let pagination = &store.chat("S1").unwrap().pagination;
    assert!(!pagination.has_more);
    assert!(!pagination.is_loading_more);
    assert_eq!(pagination.total_loaded, 7);
    assert_eq!(pagination.last_loaded_timestamp, Some(1000));
}

#[tokio::test]
async fn test_load_more_terminates_after_history_snapshot() {
    let h = harness();
    h.seed_session("S1", 1).await;
    let stored = h.seed_messages("S1", 5).await;
    let manager = h.engine.messages();

    manager
        .load_initial_messages_for_session("S1", Some(2))
        .await
        .unwrap();

    let snapshot: Vec<serde_json::Value> = stored
        .iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "role": m.role,
                "content": m.text(),
                "created_at": m.created_at
            })
        })
        .collect();
    h.engine.events().ingest_value(serde_json::json!({
        "type": "final_message_history", "session_id": "S1", "messages": snapshot
    }));
    h.engine.events().flush().await;
    assert_eq!(h.messages("S1").len(), 5);

    let mut rounds = 0;
    loop {
        manager
            .load_more_messages_for_session("S1", Some(2))
            .await
            .unwrap();
        let store = h.engine.store().lock();
        if !store.chat("S1").unwrap().pagination.has_more {
            break;
        }
        rounds += 1;
        assert!(rounds < 5, "pagination did not terminate");
    }

    let messages = h.messages("S1");
    assert_eq!(messages.len(), 5);
    assert!(messages.windows(2).all(|w| w[0].created_at < w[1].created_at));
}

#[tokio::test]
async fn test_load_more_cursor_advances_past_visible_rows() {
    let h = harness();
    h.seed_session("S1", 1).await;
    let stored = h.seed_messages("S1", 5).await;
    let manager = h.engine.messages();

    manager
        .load_initial_messages_for_session("S1", Some(2))
        .await
        .unwrap();
    // Older rows already visible without the cursor having moved
    {
        let mut store = h.engine.store().lock();
        let chat = store.chat_mut("S1").unwrap();
        let visible = std::mem::take(&mut chat.messages);
        chat.messages = stored[1..3].to_vec();
        chat.messages.extend(visible);
    }

    let added = manager
        .load_more_messages_for_session("S1", Some(2))
        .await
        .unwrap();
    assert_eq!(added, 0);
    {
        let store = h.engine.store().lock();
        let pagination = &store.chat("S1").unwrap().pagination;
        assert_eq!(pagination.last_loaded_timestamp, Some(2000));
        assert!(pagination.has_more);
    }

    let added = manager
        .load_more_messages_for_session("S1", Some(2))
        .await
        .unwrap();
    assert_eq!(added, 1);
    let store = h.engine.store().lock();
    let pagination = &store.chat("S1").unwrap().pagination;
    assert_eq!(pagination.last_loaded_timestamp, Some(1000));
    assert!(!pagination.has_more);
}

#[tokio::test]
async fn test_load_more_finishing_after_delete_leaves_no_chat() {
    let h = harness();
    h.seed_session("S1", 1).await;
    h.seed_messages("S1", 4).await;
    let manager = h.engine.messages();
    manager
        .load_initial_messages_for_session("S1", Some(2))
        .await
        .unwrap();
    h.repo.set_read_delay(Some(Duration::from_millis(50)));

    let (added, deleted) = tokio::join!(
        manager.load_more_messages_for_session("S1", Some(2)),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.engine.sessions().delete_session("S1").await
        }
    );

    deleted.unwrap();
    assert_eq!(added.unwrap(), 0);
    assert!(h.engine.store().lock().chat("S1").is_none());
}

#[tokio::test]
async fn test_concurrent_load_more_is_single_flight() {
    let h = harness();
    h.seed_session("S1", 1).await;
    h.seed_messages("S1", 6).await;
    let manager = h.engine.messages();
    manager
        .load_initial_messages_for_session("S1", Some(2))
        .await
        .unwrap();

    h.repo.set_read_delay(Some(Duration::from_millis(50)));
    let (first, second) = tokio::join!(
        manager.load_more_messages_for_session("S1", Some(2)),
        manager.load_more_messages_for_session("S1", Some(2)),
    );

    assert_eq!(first.unwrap(), 2);
    assert_eq!(second.unwrap(), 0);
    assert_eq!(h.messages("S1").len(), 4);
}

#[tokio::test]
async fn test_short_initial_page_has_no_more() {
    let h = harness();
    h.seed_session("S1", 1).await;
    h.seed_messages("S1", 2).await;
    let manager = h.engine.messages();

    manager
        .load_initial_messages_for_session("S1", None)
        .await
        .unwrap();
    assert_eq!(
        manager
            .load_more_messages_for_session("S1", None)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_initial_load_resets_history_buffer() {
    let h = harness();
    h.seed_session("S1", 1).await;
    h.seed_messages("S1", 2).await;
    let manager = h.engine.messages();

    manager
        .send_message("load the buffer", SendOptions::default())
        .await
        .unwrap();
    let status = |h: &common::Harness| {
        h.engine
            .store()
            .lock()
            .chat("S1")
            .map(|c| c.full_history.status())
    };
    assert_eq!(status(&h), Some(HistoryStatus::Loaded));

    manager
        .load_initial_messages_for_session("S1", None)
        .await
        .unwrap();
    assert_eq!(status(&h), Some(HistoryStatus::Idle));
}

#[tokio::test]
async fn test_mark_session_read_counts_assistant_messages() {
    let h = harness();
    h.seed_session("S1", 1).await;
    h.seed_messages("S1", 4).await;
    let manager = h.engine.messages();
    manager
        .load_initial_messages_for_session("S1", None)
        .await
        .unwrap();

    assert_eq!(manager.mark_session_read("S1"), 2);
    assert_eq!(manager.mark_session_read("S1"), 0);
}
