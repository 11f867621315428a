// 並行実行時の完了伝播とキューの統合テスト
#[path = "../fixtures/mod.rs"]
mod fixtures;

use fixtures::*;
use stage_pipeline::{
    ClosableQueue, DefaultPipelineConfig, MemoryReporter, Next, Pipeline, StageState, Worker,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{timeout, Duration};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_each_stage_closes_exactly_once() {
    let reporter = MemoryReporter::new();
    let total = Pipeline::builder()
        .with_reporter(reporter.clone())
        .from_iter(0..2000i64)
        .unwrap()
        .map(|x| x + 1, 32)
        .unwrap()
        .filter(|x| x % 3 != 0, 17)
        .unwrap()
        .map(|x| x * 2, 9)
        .unwrap()
        .fold(|a, b| a + b, 0, 6)
        .await
        .unwrap();

    let expected: i64 = (1..=2000i64).filter(|x| x % 3 != 0).map(|x| x * 2).sum();
    assert_eq!(total, expected);
    for stage in ["source-0", "map-1", "filter-2", "map-3", "fold-4"] {
        assert_eq!(reporter.closed_count(stage), 1, "stage {stage}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_slot_queues_still_complete() {
    let config = DefaultPipelineConfig::new().with_capacity_per_worker(1);
    let pipeline = Pipeline::builder()
        .with_config(config)
        .from_iter(0..1000)
        .unwrap()
        .chain_workers(Worker::from_fn(|x: i32| x * 2).with_workers(4).with_output_capacity(1))
        .unwrap()
        .map(|x| x + 1, 3)
        .unwrap();

    let results = timeout(Duration::from_secs(10), pipeline.collect())
        .await
        .expect("bounded pipeline must not deadlock");

    assert_eq!(results.len(), 1000);
    assert_eq!(results.iter().map(|x| *x as i64).sum::<i64>(), 1000 * 999 + 1000);
}

#[tokio::test]
async fn test_bounded_tail_applies_backpressure() {
    let mut pipeline = Pipeline::builder()
        .with_config(DefaultPipelineConfig::new().with_capacity_per_worker(2))
        .from_iter(0..100)
        .unwrap()
        .map(|x| x, 2)
        .unwrap();

    let mut received = 0;
    while pipeline.next().await.is_some() {
        received += 1;
        tokio::task::yield_now().await;
        // 出力キューは 2 * 2 を超えて溜まらない
        assert!(pipeline.tail().len() <= 4);
    }
    assert_eq!(received, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_worker_observes_end_of_stream() {
    let observed = Arc::new(AtomicUsize::new(0));
    let q_in = filled_queue(0..10).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let q_in = q_in.clone();
            let observed = Arc::clone(&observed);
            tokio::spawn(async move {
                while let Next::Item(_) = q_in.get().await {}
                observed.fetch_add(1, Ordering::SeqCst);
                // 閉鎖後のgetは何度でも即座に番兵を返す
                assert_eq!(q_in.get().await, Next::EndOfStream);
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(observed.load(Ordering::SeqCst), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocked_getters_wake_on_close() {
    let queue = ClosableQueue::<u8>::new();
    let getters: Vec<_> = (0..6)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(queue.close());
    assert!(!queue.close());

    for getter in getters {
        let next = timeout(Duration::from_secs(5), getter).await.unwrap().unwrap();
        assert_eq!(next, Next::EndOfStream);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sleepy_workers_overlap() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let worker = {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        Worker::from_async(move |x: u64| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(x)
            }
        })
        .with_workers(8)
    };

    let (results, summary) = Pipeline::from_iter(0..64u64)
        .unwrap()
        .chain_workers(worker)
        .unwrap()
        .collect_with_summary()
        .await
        .unwrap();

    assert_eq!(results.iter().sum::<u64>(), (0..64).sum::<u64>());
    assert!(peak.load(Ordering::SeqCst) > 1);
    assert!(peak.load(Ordering::SeqCst) <= 8);
    assert_eq!(summary.stage("stage-1").unwrap().state, StageState::Closed);
}

#[tokio::test]
async fn test_abandoned_input_releases_upstream() {
    let reporter = permissive_reporter();
    let worker = Worker::try_from_fn(|x: i32| -> anyhow::Result<i32> {
        if x >= 3 {
            anyhow::bail!("stop at {x}");
        }
        Ok(x)
    });

    let pipeline = Pipeline::builder()
        .with_reporter(reporter)
        .from_iter(0..100_000)
        .unwrap()
        .map(|x| x, 1)
        .unwrap()
        .chain_workers(worker.with_workers(1))
        .unwrap();

    let (results, summary) = timeout(Duration::from_secs(10), pipeline.collect_with_summary())
        .await
        .expect("upstream stages must be released")
        .unwrap();

    assert_eq!(results.len(), 3);
    assert!(summary.all_closed());
    assert!(summary.stage("map-1").unwrap().forwarded < 100_000);
}
