//! Full lifecycle against the wall clock.

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use timecapsule_blobstore::DuckDbBlobStore;
use timecapsule_core::{CapsuleError, CapsuleManager, CreateCapsuleRequest, ErrorKind};
use tracing_subscriber::EnvFilter;

#[tokio::test]
async fn hello_capsule_opens_after_two_seconds() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("timecapsule_core=debug,timecapsule_blobstore=debug"))
        .with_test_writer()
        .try_init();

    let store = Arc::new(DuckDbBlobStore::open_in_memory().unwrap());
    let manager = CapsuleManager::new(store);

    let created = manager
        .create_capsule(CreateCapsuleRequest::message(
            "Hello capsule",
            Utc::now() + Duration::seconds(2),
            "S",
            "R",
        ))
        .await
        .unwrap();
    let id = created.capsule.id.to_string();

    let err = manager.unlock(&id, &created.private_key, "R").await.unwrap_err();
    assert!(matches!(err, CapsuleError::TimeLock { .. }), "{err}");

    tokio::time::sleep(std::time::Duration::from_secs(3)).await;

    let err = manager.unlock(&id, &created.private_key, "X").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let opened = manager.unlock(&id, &created.private_key, "R").await.unwrap();
    assert_eq!(String::from_utf8(opened.content).unwrap(), "Hello capsule");
    assert_eq!(opened.capsule.unlocked_by.as_deref(), Some("R"));

    let stats = manager.stats().await.unwrap();
    assert_eq!((stats.total, stats.unlocked), (1, 1));
}
