// The default pool is process-wide state, so its whole lifecycle is exercised
// in a single test to keep it independent of test ordering.

use gap_pool::{default_pool, init_default_pool, running, shutdown_default_pool, PoolConfig, PoolError, TaskGroup};
use std::time::Duration;

#[tokio::test]
async fn test_default_pool_lifecycle() {
  assert_eq!(default_pool().err(), Some(PoolError::DefaultPoolUninitialized));
  assert_eq!(running(), Err(PoolError::DefaultPoolUninitialized));
  assert!(matches!(
    TaskGroup::<u8>::in_default_pool(),
    Err(PoolError::DefaultPoolUninitialized)
  ));
  assert_eq!(shutdown_default_pool(), Err(PoolError::DefaultPoolUninitialized));

  let config = PoolConfig::new(2, 4, Duration::from_millis(100));
  let pool = init_default_pool(config).await.unwrap();
  assert_eq!(pool.name(), "default");
  assert_eq!(running(), Ok(2));

  assert_eq!(
    init_default_pool(config).await.err(),
    Some(PoolError::DefaultPoolAlreadyInitialized)
  );

  let group = TaskGroup::in_default_pool().unwrap();
  for i in 0..6u32 {
    group.submit(move || async move { Ok::<_, anyhow::Error>(i * 2) }).await.unwrap();
  }
  let mut values: Vec<u32> = group
    .get_results()
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.into_result().unwrap())
    .collect();
  values.sort_unstable();
  assert_eq!(values, vec![0, 2, 4, 6, 8, 10]);

  shutdown_default_pool().unwrap();
  assert!(pool.is_stopped());
  assert_eq!(default_pool().err(), Some(PoolError::DefaultPoolUninitialized));
  assert_eq!(shutdown_default_pool(), Err(PoolError::DefaultPoolUninitialized));

  // A fresh default pool can be installed after teardown.
  let bad = init_default_pool(PoolConfig::new(0, 1, Duration::from_secs(1))).await;
  assert!(matches!(bad, Err(PoolError::InvalidConfig(_))));
  let again = init_default_pool(PoolConfig::new(1, 1, Duration::from_secs(1))).await.unwrap();
  assert_eq!(running(), Ok(1));
  shutdown_default_pool().unwrap();
  assert!(again.is_stopped());
}
