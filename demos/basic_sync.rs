use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use memo_map::{Aborted, CacheMap};
use tracing_subscriber::EnvFilter;

static COMPUTATIONS: AtomicUsize = AtomicUsize::new(0);

fn expensive_square(n: u64) -> Result<u64, Aborted> {
   COMPUTATIONS.fetch_add(1, Ordering::Relaxed);
   println!("Computing square of {n}...");
   thread::sleep(Duration::from_millis(50));
   Ok(n * n)
}

fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env())
      .init();

   let cache: Arc<CacheMap<u64, u64, Aborted>> = Arc::new(CacheMap::with_capacity(4));

   let threads: Vec<_> = (0..8)
      .map(|i| {
         let cache = Arc::clone(&cache);
         thread::spawn(move || {
            let n = i % 2;
            let square = cache.get_or_compute(n, || expensive_square(n));
            println!("Thread {i} got {square:?}");
         })
      })
      .collect();

   for t in threads {
      t.join().unwrap();
   }

   assert_eq!(cache.len(), 2);
   assert_eq!(COMPUTATIONS.load(Ordering::Relaxed), 2); // One computation per key
   println!("Final cache: {cache:?}");
}
