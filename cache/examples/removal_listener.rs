use steep_cache::{CacheBuilder, ManualTicker, RemovalCause};
use std::sync::Arc;
use std::time::Duration;

fn main() {
  // A manual ticker lets the example move time forward without sleeping.
  let ticker = Arc::new(ManualTicker::new());

  let cache = CacheBuilder::new()
    .maximum_weight(10)
    .weigher(|_key: &u32, value: &String| value.len() as u32)
    .expire_after_access(Duration::from_secs(60))
    .ticker(ticker.clone())
    .removal_listener(|key: u32, value: Arc<String>, cause: RemovalCause| {
      let evicted = if cause.was_evicted() { " (evicted)" } else { "" };
      println!("[Listener] {key} => {value:?} removed: {cause}{evicted}");
    })
    .build()
    .expect("Failed to build cache");

  println!("--- Replacing a value ---");
  cache.put(1, "one".to_string());
  cache.put(1, "uno".to_string());

  println!("\n--- Explicit invalidation ---");
  cache.put(2, "two".to_string());
  cache.invalidate(&2);

  println!("\n--- Exceeding the weight bound ---");
  cache.put(3, "three".to_string());
  cache.put(4, "four".to_string());
  cache.clean_up();
  println!("Weighted size is now {}", cache.weighted_size());

  println!("\n--- Letting entries idle out ---");
  ticker.advance(Duration::from_secs(61));
  cache.clean_up();
  println!("Entries left: {}", cache.estimated_size());
}
