mod support;

use chrono::Duration;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use support::{CREATOR, Harness, RECIPIENT, TamperingStore, epoch};
use timecapsule_core::{
    CapsuleError, CapsuleRole, CapsuleStatus, CreateCapsuleRequest, ErrorKind, FileCategory,
};

// ── create ──────────────────────────────────────────────────────

#[tokio::test]
async fn create_returns_sealed_capsule_and_key() {
    let h = Harness::new();
    let created = h
        .manager
        .create_capsule(h.message_in("see you next year", Duration::days(365)))
        .await
        .unwrap();

    let capsule = &created.capsule;
    assert_eq!(capsule.status, CapsuleStatus::Sealed);
    assert_eq!(capsule.file_name, "message.txt");
    assert_eq!(capsule.file_type, "text/plain");
    assert_eq!(capsule.message, "see you next year");
    assert_eq!(capsule.created_at, epoch());
    assert_eq!(capsule.unlock_timestamp, epoch() + Duration::days(365));
    assert_eq!(capsule.encryption.algorithm, h.manager.algorithm());
    assert_eq!(capsule.file_analysis.size, 17);
    assert!(capsule.unlocked_at.is_none());
    assert!(!created.private_key.is_empty());
}

#[tokio::test]
async fn create_file_capsule_analyzes_content() {
    let h = Harness::new();
    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
    let request = CreateCapsuleRequest::file(
        png.to_vec(),
        "photo.png",
        Some("image/png"),
        epoch() + Duration::hours(1),
        CREATOR,
        RECIPIENT,
    )
    .with_message("happy birthday");
    let created = h.manager.create_capsule(request).await.unwrap();

    let analysis = &created.capsule.file_analysis;
    assert_eq!(analysis.category, FileCategory::Image);
    assert_eq!(analysis.mime_type, "image/png");
    assert_eq!(analysis.signature, "PNG");
    assert!(analysis.is_multimedia);
    assert_eq!(created.capsule.message, "happy birthday");
}

#[tokio::test]
async fn unnamed_upload_gets_placeholder_name() {
    let h = Harness::new();
    let request = CreateCapsuleRequest::file(
        b"data".to_vec(),
        "",
        None,
        epoch() + Duration::hours(1),
        CREATOR,
        RECIPIENT,
    );
    let created = h.manager.create_capsule(request).await.unwrap();
    assert_eq!(created.capsule.file_name, "unknown_file");
}

#[tokio::test]
async fn create_rejects_invalid_requests() {
    let h = Harness::new();
    let later = epoch() + Duration::hours(1);
    let cases = vec![
        CreateCapsuleRequest::message("x", later, "", RECIPIENT),
        CreateCapsuleRequest::message("x", later, CREATOR, ""),
        CreateCapsuleRequest::message("x", later, CREATOR, CREATOR),
        CreateCapsuleRequest::message("x", epoch(), CREATOR, RECIPIENT),
        CreateCapsuleRequest::message("x", epoch() - Duration::days(1), CREATOR, RECIPIENT),
        CreateCapsuleRequest::message("", later, CREATOR, RECIPIENT),
    ];
    for request in cases {
        let err = h.manager.create_capsule(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
    }
    assert_eq!(h.manager.stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn private_key_is_never_persisted() {
    let h = Harness::new();
    let created = h
        .manager
        .create_capsule(h.message_in("secret", Duration::hours(1)))
        .await
        .unwrap();

    let record = h.store.get(&created.capsule.content_ref).await.unwrap();
    let record = String::from_utf8(record).unwrap();
    assert!(!record.contains(created.private_key.as_str()));

    let status = h.manager.get_status(&created.capsule.id.to_string()).await.unwrap();
    let indexed = serde_json::to_string(&status).unwrap();
    assert!(!indexed.contains(created.private_key.as_str()));
}

#[tokio::test]
async fn created_capsule_debug_redacts_key() {
    let h = Harness::new();
    let created = h
        .manager
        .create_capsule(h.message_in("x", Duration::hours(1)))
        .await
        .unwrap();
    let debug = format!("{created:?}");
    assert!(!debug.contains(created.private_key.as_str()));
}

// ── status ──────────────────────────────────────────────────────

#[tokio::test]
async fn status_tracks_clock() {
    let h = Harness::new();
    let created = h
        .manager
        .create_capsule(h.message_in("x", Duration::minutes(10)))
        .await
        .unwrap();
    let id = created.capsule.id.to_string();

    assert!(!h.manager.get_status(&id).await.unwrap().can_unlock);
    h.clock.advance(Duration::minutes(10));
    assert!(h.manager.get_status(&id).await.unwrap().can_unlock);
}

#[tokio::test]
async fn status_of_unknown_ids() {
    let h = Harness::new();
    let err = h.manager.get_status(&uuid::Uuid::new_v4().to_string()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h.manager.get_status("not-a-uuid").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h.manager.get_status("  ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// ── unlock ──────────────────────────────────────────────────────

#[tokio::test]
async fn recipient_unlocks_after_time() {
    let h = Harness::new();
    let created = h
        .manager
        .create_capsule(h.message_in("hello future", Duration::hours(2)))
        .await
        .unwrap();
    let id = created.capsule.id.to_string();

    h.clock.advance(Duration::hours(2));
    let opened = h.manager.unlock(&id, &created.private_key, RECIPIENT).await.unwrap();

    assert_eq!(opened.content, b"hello future");
    assert_eq!(opened.file_metadata.name, "message.txt");
    assert_eq!(opened.file_metadata.original_type, "text/plain");
    assert_eq!(opened.message, "hello future");
    assert_eq!(opened.capsule.status, CapsuleStatus::Unlocked);
    assert_eq!(opened.capsule.unlocked_at, Some(epoch() + Duration::hours(2)));
    assert_eq!(opened.capsule.unlocked_by.as_deref(), Some(RECIPIENT));

    let status = h.manager.get_status(&id).await.unwrap();
    assert_eq!(status.capsule.status, CapsuleStatus::Unlocked);
}

#[tokio::test]
async fn file_bytes_survive_unlock() {
    let h = Harness::new();
    let bytes: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
    let request = CreateCapsuleRequest::file(
        bytes.clone(),
        "blob.bin",
        Some("application/octet-stream"),
        epoch() + Duration::seconds(1),
        CREATOR,
        RECIPIENT,
    );
    let created = h.manager.create_capsule(request).await.unwrap();
    h.clock.advance(Duration::seconds(1));

    let opened = h
        .manager
        .unlock(&created.capsule.id.to_string(), &created.private_key, RECIPIENT)
        .await
        .unwrap();
    assert_eq!(opened.content, bytes);
    assert_eq!(opened.file_metadata.size, 5000);
    assert_eq!(opened.message, "");
}

#[tokio::test]
async fn unlock_before_time_is_time_locked() {
    let h = Harness::new();
    let created = h
        .manager
        .create_capsule(h.message_in("x", Duration::hours(1)))
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(59));

    let err = h
        .manager
        .unlock(&created.capsule.id.to_string(), &created.private_key, RECIPIENT)
        .await
        .unwrap_err();
    match err {
        CapsuleError::TimeLock { unlock_at } => {
            assert_eq!(unlock_at, epoch() + Duration::hours(1));
        }
        other => panic!("expected TimeLock, got {other}"),
    }
}

#[tokio::test]
async fn non_recipient_is_rejected_before_time_check() {
    let h = Harness::new();
    let created = h
        .manager
        .create_capsule(h.message_in("x", Duration::hours(1)))
        .await
        .unwrap();
    let id = created.capsule.id.to_string();

    for requester in [CREATOR, "0xstranger"] {
        let err = h.manager.unlock(&id, &created.private_key, requester).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization, "{requester}");
    }
    h.clock.advance(Duration::hours(1));
    let err = h.manager.unlock(&id, &created.private_key, CREATOR).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn unlock_requires_all_inputs() {
    let h = Harness::new();
    let created = h
        .manager
        .create_capsule(h.message_in("x", Duration::hours(1)))
        .await
        .unwrap();
    let id = created.capsule.id.to_string();

    for (id, key, who) in [
        ("", created.private_key.as_str(), RECIPIENT),
        (id.as_str(), "", RECIPIENT),
        (id.as_str(), created.private_key.as_str(), ""),
    ] {
        let err = h.manager.unlock(id, key, who).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

#[tokio::test]
async fn malformed_key_is_a_validation_error() {
    let h = Harness::new();
    let created = h
        .manager
        .create_capsule(h.message_in("x", Duration::hours(1)))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(1));

    let err = h
        .manager
        .unlock(&created.capsule.id.to_string(), "definitely not a key", RECIPIENT)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn another_capsules_key_does_not_open() {
    let h = Harness::new();
    let a = h
        .manager
        .create_capsule(h.message_in("a", Duration::hours(1)))
        .await
        .unwrap();
    let b = h
        .manager
        .create_capsule(h.message_in("b", Duration::hours(1)))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(1));

    let err = h
        .manager
        .unlock(&b.capsule.id.to_string(), &a.private_key, RECIPIENT)
        .await
        .unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::Decryption | ErrorKind::Tamper),
        "{err}"
    );

    let status = h.manager.get_status(&b.capsule.id.to_string()).await.unwrap();
    assert_eq!(status.capsule.status, CapsuleStatus::Sealed);
}

#[tokio::test]
async fn modified_record_is_detected_as_tamper() {
    let store = Arc::new(TamperingStore::default());
    let h = Harness::over(store.clone());
    let created = h
        .manager
        .create_capsule(h.message_in("integrity", Duration::hours(1)))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(1));
    store.arm();

    let err = h
        .manager
        .unlock(&created.capsule.id.to_string(), &created.private_key, RECIPIENT)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Tamper);
}

#[tokio::test]
async fn repeated_unlock_keeps_first_transition() {
    let h = Harness::new();
    let created = h
        .manager
        .create_capsule(h.message_in("x", Duration::hours(1)))
        .await
        .unwrap();
    let id = created.capsule.id.to_string();

    h.clock.advance(Duration::hours(1));
    let first = h.manager.unlock(&id, &created.private_key, RECIPIENT).await.unwrap();
    h.clock.advance(Duration::hours(5));
    let second = h.manager.unlock(&id, &created.private_key, RECIPIENT).await.unwrap();

    assert_eq!(second.content, first.content);
    assert_eq!(second.capsule.unlocked_at, first.capsule.unlocked_at);
    assert_eq!(second.capsule.unlocked_at, Some(epoch() + Duration::hours(1)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_unlocks_record_one_transition() {
    let h = Arc::new(Harness::new());
    let created = h
        .manager
        .create_capsule(h.message_in("race", Duration::hours(1)))
        .await
        .unwrap();
    h.clock.advance(Duration::hours(1));

    let id = created.capsule.id.to_string();
    let key = created.private_key.as_str().to_string();
    let mut tasks = Vec::new();
    for _ in 0..4 {
        let h = Arc::clone(&h);
        let id = id.clone();
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            h.manager.unlock(&id, &key, RECIPIENT).await.unwrap()
        }));
    }

    let mut unlocked_at = Vec::new();
    for task in tasks {
        let opened = task.await.unwrap();
        assert_eq!(opened.content, b"race");
        unlocked_at.push(opened.capsule.unlocked_at);
    }
    unlocked_at.dedup();
    assert_eq!(unlocked_at, vec![Some(epoch() + Duration::hours(1))]);
}

// ── listing & stats ─────────────────────────────────────────────

#[tokio::test]
async fn list_by_user_assigns_roles() {
    let h = Harness::new();
    let later = epoch() + Duration::hours(1);
    h.manager
        .create_capsule(CreateCapsuleRequest::message("1", later, "alice", "bob"))
        .await
        .unwrap();
    h.clock.advance(Duration::seconds(1));
    h.manager
        .create_capsule(CreateCapsuleRequest::message("2", later, "bob", "carol"))
        .await
        .unwrap();

    let bob = h.manager.list_by_user("bob").await.unwrap();
    let roles: Vec<_> = bob.iter().map(|c| c.role).collect();
    assert_eq!(roles, vec![CapsuleRole::Recipient, CapsuleRole::Creator]);

    let alice = h.manager.list_by_user("alice").await.unwrap();
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].role, CapsuleRole::Creator);
    assert!(!alice[0].can_unlock);

    assert!(h.manager.list_by_user("dave").await.unwrap().is_empty());
    let err = h.manager.list_by_user("").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn stats_count_statuses() {
    let h = Harness::new();
    let empty = h.manager.stats().await.unwrap();
    assert_eq!((empty.total, empty.sealed, empty.unlocked), (0, 0, 0));

    let a = h
        .manager
        .create_capsule(h.message_in("a", Duration::minutes(1)))
        .await
        .unwrap();
    h.manager
        .create_capsule(h.message_in("b", Duration::days(1)))
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(1));
    h.manager
        .unlock(&a.capsule.id.to_string(), &a.private_key, RECIPIENT)
        .await
        .unwrap();

    let stats = h.manager.stats().await.unwrap();
    assert_eq!((stats.total, stats.sealed, stats.unlocked), (2, 1, 1));
    assert_eq!(stats.algorithm, h.manager.algorithm());
    assert_eq!(stats.generated_at, epoch() + Duration::minutes(1));
}
