//! Tests for tokio spawner utilities

use prometheus_task_runtime::core::Spawn;
use prometheus_task_runtime::runtime::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test]
async fn test_default_spawner_uses_ambient_runtime() {
    let spawner = TokioSpawner::default();
    assert!(spawner.handle().is_none());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send("ambient").unwrap();
    });

    assert_eq!(rx.await.unwrap(), "ambient");
}

#[test]
fn test_pinned_spawner_works_from_outside_the_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let spawner = TokioSpawner::new(runtime.handle().clone());

    let (tx, rx) = std::sync::mpsc::channel();
    spawner.spawn(async move {
        tx.send(7).unwrap();
    });

    assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), 7);
}

#[test]
fn test_try_current_outside_runtime_fails() {
    assert!(TokioSpawner::try_current().is_err());
}
