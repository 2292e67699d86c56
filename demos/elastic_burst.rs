use gap_pool::{PoolConfig, TaskGroup, TaskPool};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();

  info!("--- Elastic Burst Example (base 2, max 6, timeout 300ms) ---");

  let config = PoolConfig::new(2, 6, Duration::from_millis(300));
  let pool = TaskPool::new(config, Handle::current(), "burst_pool").await?;
  info!("Running before burst: {}", pool.running());

  let group = TaskGroup::new(pool.clone());
  for i in 0..12u64 {
    group
      .submit(move || async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, anyhow::Error>(i)
      })
      .await?;
    info!("Submitted task {}, running workers: {}", i, pool.running());
  }

  let results = group.get_results().await?;
  info!("Collected {} results, running right after burst: {}", results.len(), pool.running());

  tokio::time::sleep(Duration::from_millis(600)).await;
  info!("Running after idle timeout: {}", pool.running());

  pool.stop()?;
  info!("--- Elastic Burst Example End ---");
  Ok(())
}
