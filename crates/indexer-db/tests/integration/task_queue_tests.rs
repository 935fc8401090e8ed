use indexer_core::error::AppError;
use indexer_core::models::Item;
use indexer_core::task::Task;
use indexer_core::task_queue::{QueueName, TaskQueue};
use indexer_db::{Database, PgTaskQueue};

use crate::integration::common::setup_test_db;

fn sub(uri: &str) -> Task {
    Task::sub(Item::new(uri))
}

#[tokio::test]
async fn poll_returns_none_when_empty() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgTaskQueue::new(pool, "dmhy");

    assert!(queue.poll_task().await.unwrap().is_none());
    assert!(queue.poll_failed_task().await.unwrap().is_none());
    assert!(!queue.has_task().await.unwrap());
    assert!(!queue.has_failed_task().await.unwrap());
}

#[tokio::test]
async fn offer_then_poll_preserves_task_fields() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgTaskQueue::new(pool, "dmhy");

    let item = Item::new("https://tracker.example/view/1").with_title("[Group] Show - 01");
    let task = Task::sub(item.clone());
    queue.offer_task(&task).await.unwrap();

    let polled = queue.poll_task().await.unwrap().expect("task should be queued");
    assert_eq!(polled.id, task.id);
    assert_eq!(polled.item(), Some(&item));
    assert_eq!(polled.retry_count, 0);
    assert_eq!(
        polled.timestamp.timestamp_micros(),
        task.timestamp.timestamp_micros()
    );
    assert!(polled.update_time.is_some());
    assert!(!queue.has_task().await.unwrap());
}

#[tokio::test]
async fn main_task_without_page_round_trips() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgTaskQueue::new(pool, "dmhy");

    queue.offer_task(&Task::main()).await.unwrap();
    queue.offer_task(&Task::main_page(3)).await.unwrap();

    let first = queue.poll_task().await.unwrap().unwrap();
    assert!(first.is_main());
    assert_eq!(first.page_no(), Some(1));

    let second = queue.poll_task().await.unwrap().unwrap();
    assert_eq!(second.page_no(), Some(3));
}

#[tokio::test]
async fn poll_order_follows_update_time() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgTaskQueue::new(pool, "dmhy");

    for uri in ["a", "b", "c"] {
        queue.offer_task(&sub(uri)).await.unwrap();
    }

    let mut order = Vec::new();
    while let Some(task) = queue.poll_task().await.unwrap() {
        order.push(task.item().unwrap().uri.clone());
    }
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn reoffer_replaces_entry_and_moves_it_to_the_back() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgTaskQueue::new(pool, "dmhy");

    queue.offer_task(&Task::main_page(2)).await.unwrap();
    queue.offer_task(&sub("a")).await.unwrap();
    let replacement = Task::main_page(2);
    queue.offer_task(&replacement).await.unwrap();

    assert_eq!(queue.len(QueueName::Task).await.unwrap(), 2);

    let first = queue.poll_task().await.unwrap().unwrap();
    assert_eq!(first.item().unwrap().uri, "a");
    let second = queue.poll_task().await.unwrap().unwrap();
    assert_eq!(second.id, replacement.id);
}

#[tokio::test]
async fn same_identity_in_both_queues_is_kept_apart() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgTaskQueue::new(pool, "dmhy");

    queue.offer_task(&sub("a")).await.unwrap();
    queue.offer_failed_task(&sub("a")).await.unwrap();

    assert_eq!(queue.len(QueueName::Task).await.unwrap(), 1);
    assert_eq!(queue.len(QueueName::Failed).await.unwrap(), 1);
}

#[tokio::test]
async fn failed_poll_increments_retry_count() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgTaskQueue::new(pool, "dmhy");

    queue.offer_failed_task(&sub("flaky")).await.unwrap();
    let task = queue.poll_failed_task().await.unwrap().unwrap();
    assert_eq!(task.retry_count, 1);

    queue.offer_failed_task(&task).await.unwrap();
    let task = queue.poll_failed_task().await.unwrap().unwrap();
    assert_eq!(task.retry_count, 2);
}

#[tokio::test]
async fn modes_do_not_see_each_other() {
    let (pool, _container) = setup_test_db().await;
    let db = Database::from_pool(pool);
    let dmhy = db.task_queue("dmhy");
    let nyaa = db.task_queue("nyaa");

    dmhy.offer_task(&sub("a")).await.unwrap();

    assert!(dmhy.has_task().await.unwrap());
    assert!(!nyaa.has_task().await.unwrap());
    assert!(nyaa.poll_task().await.unwrap().is_none());
    assert_eq!(nyaa.mode(), "nyaa");
}

#[tokio::test]
async fn peek_does_not_remove() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgTaskQueue::new(pool, "dmhy");

    for uri in ["a", "b", "c"] {
        queue.offer_task(&sub(uri)).await.unwrap();
    }

    let head = queue.peek(QueueName::Task, 2).await.unwrap();
    assert_eq!(head.len(), 2);
    assert_eq!(head[0].item().unwrap().uri, "a");
    assert_eq!(queue.len(QueueName::Task).await.unwrap(), 3);
}

#[tokio::test]
async fn concurrent_polls_hand_out_each_task_once() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgTaskQueue::new(pool, "dmhy");

    for n in 0..20 {
        queue.offer_task(&sub(&format!("item-{n}"))).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut taken = Vec::new();
            while let Some(task) = queue.poll_task().await.unwrap() {
                taken.push(task.item().unwrap().uri.clone());
            }
            taken
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 20);
}

#[tokio::test]
async fn page_number_beyond_column_range_is_rejected() {
    let (pool, _container) = setup_test_db().await;
    let queue = PgTaskQueue::new(pool, "dmhy");

    let err = queue.offer_task(&Task::main_page(u32::MAX)).await.unwrap_err();

    assert!(matches!(err, AppError::ParseError(_)));
    assert!(!queue.has_task().await.unwrap());
}
