use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use memo_map::{Aborted, CacheMap};
use tokio::time::{sleep, Duration};

static COUNTER: AtomicUsize = AtomicUsize::new(0);
static PAGES: LazyLock<CacheMap<String, Arc<str>, Aborted>> = LazyLock::new(CacheMap::new);

async fn fetch_page(url: &str) -> Result<Arc<str>, Aborted> {
   PAGES
      .get_or_compute_async(url.to_string(), || async move {
         // This async block runs only once per url
         COUNTER.fetch_add(1, Ordering::Relaxed);
         println!("Fetching {url}...");
         sleep(Duration::from_millis(50)).await;
         Ok(Arc::from(format!("<html>{url}</html>")))
      })
      .await
}

#[tokio::main]
async fn main() {
   let tasks: Vec<_> = (0..5)
      .map(|_| {
         tokio::spawn(async {
            println!("Task got: {:?}", fetch_page("example.org").await);
         })
      })
      .collect();

   for t in tasks {
      t.await.unwrap();
   }

   assert_eq!(COUNTER.load(Ordering::Relaxed), 1); // Fetched only once
   println!("Final page: {:?}", PAGES.get("example.org"));
}
