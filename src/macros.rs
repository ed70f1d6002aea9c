#[macro_export]
/// Macro to create the cache, optionally with your own config tree.
///
/// Here is an example of the two ways you can use this.
///
/// ```no_run
/// use apt_core::config::Config;
/// use apt_core::new_cache;
///
/// let cache = new_cache!().unwrap();
/// println!("{}", cache.get("apt").unwrap().name());
///
/// let mut config = Config::new();
/// config.set("APT::Architecture", "arm64");
/// let cache = new_cache!(config).unwrap();
/// ```
///
/// Returns `Result<apt_core::cache::Cache, AptErrors>`
macro_rules! new_cache {
	() => {{ $crate::cache::Cache::new($crate::config::Config::new()) }};
	($config:expr) => {{ $crate::cache::Cache::new($config) }};
}
