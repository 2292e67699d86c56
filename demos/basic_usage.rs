use gap_pool::{PoolConfig, TaskGroup, TaskPool};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn my_task_fn(id: usize, delay_ms: u64) -> anyhow::Result<String> {
  info!("Task {} starting, will sleep for {}ms", id, delay_ms);
  tokio::time::sleep(Duration::from_millis(delay_ms)).await;
  if id == 3 {
    anyhow::bail!("Task {} gave up after {}ms", id, delay_ms);
  }
  Ok(format!("Task {} finished successfully after {}ms", id, delay_ms))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Basic Usage Example ---");

  // Falls back to the defaults for anything not set in the environment.
  let config = PoolConfig::from_env()?;
  let pool = TaskPool::new(config, Handle::current(), "basic_pool").await?;

  let single = pool.submit(|| my_task_fn(100, 100)).await?;
  info!("Single task result: {:?}", single.await_result().await?.into_result());

  let group = TaskGroup::new(pool.clone());
  for i in 0..5 {
    // Alternate sleep times for variety
    let sleep_duration: u64 = 500 + (i as u64 % 3 * 250);
    group.submit(move || my_task_fn(i, sleep_duration)).await?;
  }

  info!("All tasks submitted. Awaiting results...");
  for result in group.get_results().await? {
    match result.into_result() {
      Ok(value) => info!("Result: {}", value),
      Err(e) => info!("Error: {}", e),
    }
  }

  info!("All task results processed. Stopping pool.");
  pool.stop()?;
  info!("--- Basic Usage Example End ---");
  Ok(())
}
