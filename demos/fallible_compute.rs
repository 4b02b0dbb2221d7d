use memo_map::{Aborted, CacheMap, LookupError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
enum ConfigError {
   #[error("config file {0} is missing")]
   Missing(String),
   #[error(transparent)]
   Aborted(#[from] Aborted),
}

fn load(path: &str, fail: bool) -> Result<String, ConfigError> {
   println!("Loading {path} (fail={fail})...");
   if fail {
      Err(ConfigError::Missing(path.to_string()))
   } else {
      Ok(format!("contents of {path}"))
   }
}

fn main() {
   let configs: CacheMap<&str, String, ConfigError> = CacheMap::new();

   // First attempt fails, and the failure is cached
   match configs.get_or_compute("app.toml", || load("app.toml", true)) {
      Ok(_) => panic!("Should have failed"),
      Err(e) => println!("Caught error: {e}"),
   }

   // A second, succeeding loader is never called
   let again = configs.get_or_compute("app.toml", || load("app.toml", false));
   assert!(matches!(again, Err(ConfigError::Missing(_))));

   // Removing the entry allows a retry
   configs.remove("app.toml");
   assert_eq!(configs.get("app.toml").unwrap_err(), LookupError::NotPresent);
   match configs.get_or_compute("app.toml", || load("app.toml", false)) {
      Ok(data) => println!("Got data: {data}"),
      Err(_) => panic!("Should have succeeded"),
   }

   // Panics are cached as errors too
   let panicked = configs.get_or_compute("broken.toml", || panic!("parser bug"));
   println!("Panicked load: {}", panicked.unwrap_err());
}
