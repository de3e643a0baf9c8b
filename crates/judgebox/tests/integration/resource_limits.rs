use std::time::{Duration, Instant};

use judgebox::{ExecutionRequest, ExecutionStatus, ResourceLimits};

use super::{fixture_source, test_judge};

#[tokio::test]
#[ignore = "requires docker"]
async fn test_time_limit_exceeded() {
    let (judge, _runtime) = test_judge();
    let request = ExecutionRequest::new("python", fixture_source("infinite_loop.py"))
        .with_limits(ResourceLimits::new().with_time_limit(1.0));

    let started = Instant::now();
    let result = judge.execute(&request).await.unwrap();

    assert!(!result.is_success());
    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert_eq!(result.exit_code, Some(-1));
    // Deadline plus container start and removal
    assert!(started.elapsed() < Duration::from_secs(15));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_memory_limit_exceeded() {
    let (judge, _runtime) = test_judge();
    let request = ExecutionRequest::new("c", fixture_source("memory_hog.c"))
        .with_limits(ResourceLimits::new().with_memory_limit(128 * ResourceLimits::MB));

    let result = judge.execute(&request).await.unwrap();

    assert!(!result.is_success());
    assert_ne!(result.exit_code, Some(0));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_process_limit() {
    let (judge, _runtime) = test_judge();
    let request = ExecutionRequest::new("python", fixture_source("fork_bomb.py"))
        .with_limits(
            ResourceLimits::new()
                .with_max_processes(16)
                .with_time_limit(10.0),
        );

    let result = judge.execute(&request).await.unwrap();

    assert!(result.output.contains("fork refused"), "{result:?}");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_output_limit() {
    let (judge, _runtime) = test_judge();
    let request = ExecutionRequest::new("python", "print('x' * 1_000_000)")
        .with_limits(ResourceLimits::new().with_max_output(64));

    let result = judge.execute(&request).await.unwrap();

    assert_eq!(result.output.len(), 64 * 1024);
}
