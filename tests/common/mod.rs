use std::fs;
use std::path::PathBuf;

use apt_core::cache::{Cache, IndexSource, ReleaseInfo};
use apt_core::config::Config;
use tempfile::TempDir;

/// A cache built from inline index text, with its backing files kept
/// alive for record lookups.
pub struct TestCache {
	pub dir: TempDir,
	pub cache: Cache,
}

pub fn test_config() -> Config {
	let mut config = Config::new();
	// The fixtures are written for one architecture.
	config.set("APT::Architecture", "amd64");
	config
}

/// Build a cache out of a status file and one Packages index.
pub fn build_cache(status: &str, packages: &str) -> TestCache {
	let dir = TempDir::new().unwrap();
	let status_path = dir.path().join("status");
	let packages_path = dir.path().join("Packages");
	fs::write(&status_path, status).unwrap();
	fs::write(&packages_path, packages).unwrap();

	let sources = vec![
		IndexSource::status_file(&status_path),
		IndexSource::index(&packages_path, ReleaseInfo {
			archive: "unstable".to_string(),
			origin: "Debian".to_string(),
			site: "deb.debian.org".to_string(),
			component: "main".to_string(),
			arch: "amd64".to_string(),
			..Default::default()
		}),
	];

	let cache = Cache::open(&sources, None, test_config()).unwrap();
	TestCache { dir, cache }
}

#[allow(dead_code)]
pub fn cache_paths(t: &TestCache) -> (PathBuf, PathBuf) {
	(t.dir.path().join("status"), t.dir.path().join("Packages"))
}

/// A status stanza for an installed package.
#[allow(dead_code)]
pub fn installed_stanza(name: &str, version: &str, extra: &str) -> String {
	format!(
		"Package: {name}\n\
		 Status: install ok installed\n\
		 Priority: optional\n\
		 Section: admin\n\
		 Installed-Size: 100\n\
		 Architecture: amd64\n\
		 Version: {version}\n\
		 {extra}Description: test package\n\n"
	)
}

/// A Packages stanza for an available package.
#[allow(dead_code)]
pub fn index_stanza(name: &str, version: &str, extra: &str) -> String {
	format!(
		"Package: {name}\n\
		 Priority: optional\n\
		 Section: admin\n\
		 Installed-Size: 100\n\
		 Architecture: amd64\n\
		 Version: {version}\n\
		 Size: 1000\n\
		 {extra}Description: test package\n\n"
	)
}
