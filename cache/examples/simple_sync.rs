use steep_cache::CacheBuilder;
use std::thread;
use std::time::Duration;

fn main() {
  // Create a cache holding at most 100 entries, each living 5 seconds after
  // it was written, with a janitor sweeping every second.
  let cache = CacheBuilder::new()
    .maximum_size(100)
    .expire_after_write(Duration::from_secs(5))
    .janitor_tick_interval(Duration::from_secs(1))
    .record_stats()
    .build()
    .expect("Failed to build cache");

  println!("Putting ('key1', 100) into the cache.");
  cache.put("key1".to_string(), 100);

  match cache.get_if_present(&"key1".to_string()) {
    Some(value) => println!("Found value for key1: {}", value),
    None => println!("Value for key1 not found."),
  }

  println!("\nCache stats: {:#?}", cache.stats());

  println!("\nWaiting for 6 seconds for the entry to expire...");
  thread::sleep(Duration::from_secs(6));

  // The janitor runs every second and will have removed the expired entry.
  println!("Entries left: {}", cache.estimated_size());
  match cache.get_if_present(&"key1".to_string()) {
    Some(value) => println!("Found value for key1: {}", value),
    None => println!("Value for key1 not found (as expected after expiry)."),
  }

  println!("\nCache stats after expiration: {:#?}", cache.stats());
}
