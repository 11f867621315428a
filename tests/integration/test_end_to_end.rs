// エンドツーエンド統合テスト
#[path = "../fixtures/mod.rs"]
mod fixtures;

use fixtures::*;
use stage_pipeline::{
    ClosableQueue, DefaultPipelineConfig, MemoryReporter, Pipeline, PipelineSummary, StageState,
    Worker,
};
use std::collections::HashSet;

#[tokio::test]
async fn test_filter_map_fold_for_various_worker_counts() {
    for (n_filter, n_map, n_fold) in [(1, 1, 1), (10, 8, 5), (3, 2, 8), (16, 1, 2)] {
        let total = Pipeline::from_iter(0..100i64)
            .unwrap()
            .filter(|x| x & 1 == 1, n_filter)
            .unwrap()
            .map(|x| x * 2, n_map)
            .unwrap()
            .fold(|a, b| a + b, 0, n_fold)
            .await
            .unwrap();

        assert_eq!(total, 5000, "workers = {n_filter}/{n_map}/{n_fold}");
    }
}

#[tokio::test]
async fn test_single_worker_map_preserves_order() {
    let results = Pipeline::from_iter(0..500)
        .unwrap()
        .map(|x| x * 3, 1)
        .unwrap()
        .map(|x| x - 1, 1)
        .unwrap()
        .collect()
        .await;

    let expected: Vec<i32> = (0..500).map(|x| x * 3 - 1).collect();
    assert_eq!(results, expected);
}

#[tokio::test]
async fn test_filter_is_predicate_subsequence_for_any_worker_count() {
    let expected: Vec<i32> = (0..300).filter(|x| x % 7 == 0).collect();

    for n_workers in [1, 2, 4, 16] {
        let mut results = Pipeline::from_iter(0..300)
            .unwrap()
            .filter(|x| x % 7 == 0, n_workers)
            .unwrap()
            .collect()
            .await;

        if n_workers == 1 {
            assert_eq!(results, expected);
        }
        results.sort();
        assert_eq!(results, expected, "n_workers = {n_workers}");
    }
}

#[tokio::test]
async fn test_worker_count_never_changes_output_set() {
    let mut outputs = Vec::new();
    for n_workers in [1, 3, 7, 32] {
        let results: HashSet<String> = Pipeline::from_iter(0..200)
            .unwrap()
            .map(|x: i32| format!("item-{x}"), n_workers)
            .unwrap()
            .collect()
            .await
            .into_iter()
            .collect();
        outputs.push(results);
    }

    assert_eq!(outputs[0].len(), 200);
    assert!(outputs.iter().all(|set| *set == outputs[0]));
}

#[tokio::test]
async fn test_fold_initial_value() {
    let empty = Pipeline::from_iter(Vec::<i64>::new())
        .unwrap()
        .fold(|a, b| a + b, 7, 4)
        .await
        .unwrap();
    assert_eq!(empty, 7);

    let total = Pipeline::from_iter(0..10i64)
        .unwrap()
        .fold(|a, b| a + b, 7, 8)
        .await
        .unwrap();
    assert_eq!(total, 52);
}

#[tokio::test]
async fn test_map_async_with_sleeps() {
    let total = Pipeline::from_iter(0..60u64)
        .unwrap()
        .map_async(
            |x| async move {
                tokio::time::sleep(std::time::Duration::from_millis(x % 5)).await;
                x + 1
            },
            12,
        )
        .unwrap()
        .fold(|a, b| a + b, 0, 3)
        .await
        .unwrap();

    assert_eq!(total, (1..=60).sum::<u64>());
}

#[tokio::test]
async fn test_sort_stage_after_parallel_map() {
    let results = Pipeline::from_iter(vec![5i64, -12, 3, 0, -7, 9, 1])
        .unwrap()
        .map(|x| x * 10, 4)
        .unwrap()
        .sort_by(|a, b| b.cmp(a))
        .unwrap()
        .collect()
        .await;

    assert_eq!(results, vec![90, 50, 30, 10, 0, -70, -120]);
}

#[tokio::test]
async fn test_from_queue_with_external_producer() {
    let head = ClosableQueue::bounded(2).unwrap();
    let producer = {
        let head = head.clone();
        tokio::spawn(async move {
            for word in ["alpha", "beta", "gamma", "delta"] {
                head.put(word.to_string()).await.unwrap();
            }
            head.close();
        })
    };

    let mut lengths = Pipeline::from_queue(head)
        .chain_workers(Worker::from_fn(|word: String| word.len()).with_workers(2))
        .unwrap()
        .collect()
        .await;
    producer.await.unwrap();

    lengths.sort();
    assert_eq!(lengths, vec![4, 5, 5, 5]);
}

#[tokio::test]
async fn test_lazy_iteration_over_pipeline() {
    let mut pipeline = Pipeline::from_iter(0..5).unwrap().map(|x| x * x, 1).unwrap();

    let mut seen = Vec::new();
    while let Some(value) = pipeline.next().await {
        seen.push(value);
    }

    assert_eq!(seen, vec![0, 1, 4, 9, 16]);
    // 番兵の観測後も何度でも終端を返す
    assert_eq!(pipeline.next().await, None);
    assert_eq!(pipeline.next().await, None);
}

#[tokio::test]
async fn test_default_workers_come_from_config() {
    let (items, summary) = Pipeline::builder()
        .with_config(config_mock(1, false, 3))
        .from_iter(0..10)
        .unwrap()
        .chain_workers(Worker::from_fn(|x: i32| x + 1))
        .unwrap()
        .collect_with_summary()
        .await
        .unwrap();

    assert_eq!(items.iter().sum::<i32>(), 55);
    assert_eq!(summary.stage("stage-1").unwrap().n_workers, 3);
}

#[tokio::test]
async fn test_summary_serializes_to_json() {
    let reporter = MemoryReporter::new();
    let (_, summary) = Pipeline::builder()
        .with_reporter(reporter.clone())
        .with_config(DefaultPipelineConfig::for_cpus())
        .from_iter(0..50)
        .unwrap()
        .filter(|x| x % 5 == 0, 4)
        .unwrap()
        .collect_with_summary()
        .await
        .unwrap();

    assert!(summary.elapsed_ms() >= 0);
    assert!(summary.stages.iter().all(|s| s.state == StageState::Closed));

    let json = serde_json::to_string(&summary).unwrap();
    let restored: PipelineSummary = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, summary);
    assert_eq!(restored.stage("filter-1").unwrap().forwarded, 10);
    assert_eq!(reporter.closed_count("filter-1"), 1);
}
