mod common;

use common::{AGENT_ID, harness};
use threadline_core::EngineError;
use threadline_core::models::SessionOverrides;
use threadline_core::repositories::{ConversationRepository, MessageQuery};

#[tokio::test]
async fn test_create_session_registers_and_skips_restore() {
    let h = harness();
    let sessions = h.engine.sessions();

    let id = sessions
        .create_session(
            AGENT_ID,
            "Refactor",
            SessionOverrides {
                avatar: None,
                cwd: Some("/work".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(h.engine.current_session().map(|s| s.id), Some(id.clone()));
    let created = h.backend.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].session_id, id);
    assert_eq!(created[0].cwd.as_deref(), Some("/work"));
    assert!(h.backend.restored().is_empty());
    assert!(h.repo.get_session(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_create_session_backend_failure_leaves_no_trace() {
    let h = harness();
    h.backend.fail_create(true);

    let err = h
        .engine
        .sessions()
        .create_session(AGENT_ID, "Nope", SessionOverrides::default())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Backend(_)));
    assert_eq!(h.engine.store().lock().count(), 0);
    assert!(h.repo.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_load_session_from_store_restores_backend_context() {
    let h = harness();
    h.seed_session("S1", 5).await;
    h.seed_messages("S1", 3).await;
    h.engine.store().lock().remove_session("S1");

    let session = h.engine.sessions().load_session_from_store("S1").await.unwrap();

    assert_eq!(session.id, "S1");
    assert_eq!(h.messages("S1").len(), 3);
    let restored = h.backend.restored();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].agent.id, AGENT_ID);
}

#[tokio::test]
async fn test_restore_failure_is_not_fatal() {
    let h = harness();
    h.seed_session("S1", 5).await;
    h.backend.fail_restore(true);

    assert!(h.engine.sessions().load_session_from_store("S1").await.is_ok());
    assert!(
        !h.engine
            .sessions()
            .restore_backend_session("S1", AGENT_ID, false)
            .await
    );
    assert!(
        !h.engine
            .sessions()
            .restore_backend_session("S1", "unknown-agent", false)
            .await
    );
}

#[tokio::test]
async fn test_load_unknown_session_from_store() {
    let h = harness();
    let err = h
        .engine
        .sessions()
        .load_session_from_store("missing")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownSession(_)));
}

#[tokio::test]
async fn test_delete_current_session_reassigns_and_cascades() {
    let h = harness();
    h.seed_session("S1", 10).await;
    h.seed_session("S2", 30).await;
    h.seed_session("S3", 20).await;
    h.seed_messages("S1", 2).await;
    assert_eq!(h.engine.store().lock().current_id(), Some("S1"));

    h.engine.sessions().delete_session("S1").await.unwrap();

    assert_eq!(h.engine.store().lock().current_id(), Some("S2"));
    assert!(h
        .repo
        .get_messages("S1", MessageQuery::all())
        .await
        .unwrap()
        .is_empty());
    assert!(h.repo.get_session("S1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_set_current_session_rejects_unknown() {
    let h = harness();
    h.seed_session("S1", 1).await;
    h.seed_session("S2", 2).await;

    h.engine.sessions().set_current_session("S2").unwrap();
    assert_eq!(h.engine.current_session().map(|s| s.id), Some("S2".to_string()));
    assert!(matches!(
        h.engine.sessions().set_current_session("nope"),
        Err(EngineError::UnknownSession(_))
    ));
}

#[tokio::test]
async fn test_load_sessions_picks_most_recent_as_current() {
    let h = harness();
    h.seed_session("old", 1).await;
    h.seed_session("new", 9).await;
    // Forget the in-memory registry, keep the store
    {
        let mut store = h.engine.store().lock();
        store.remove_session("old");
        store.remove_session("new");
    }

    let count = h.engine.sessions().load_sessions().await.unwrap();

    assert_eq!(count, 2);
    assert_eq!(h.engine.store().lock().current_id(), Some("new"));
}

#[tokio::test]
async fn test_metadata_updates_are_written_through() {
    let h = harness();
    h.seed_session("S1", 1).await;
    let sessions = h.engine.sessions();

    sessions.rename_session("S1", "Renamed").await.unwrap();
    sessions
        .set_session_cwd("S1", Some("/srv/app".to_string()))
        .await
        .unwrap();
    let archived = sessions.archive_session("S1", true).await.unwrap();

    assert_eq!(archived.display_name, "Renamed");
    assert!(archived.updated_at > 1);
    let stored = h.repo.get_session("S1").await.unwrap().unwrap();
    assert_eq!(stored, archived);
    assert_eq!(stored.cwd.as_deref(), Some("/srv/app"));
    assert!(stored.archived);

    assert!(matches!(
        sessions.rename_session("ghost", "x").await,
        Err(EngineError::UnknownSession(_))
    ));
}
