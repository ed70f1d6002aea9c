//! Contains config related structs and functions.

use std::collections::BTreeMap;
use std::env;

/// The configuration tree.
///
/// Keys are `::` separated paths such as `APT::Architecture` or
/// `Dir::State::status` and are case insensitive. Values are plain
/// strings; lists are stored as children of their key.
///
/// There is no configuration file parser here. Options are seeded from
/// built in defaults and the environment, and callers adjust them with
/// [`Config::set`].
#[derive(Debug)]
pub struct Config {
	values: BTreeMap<String, String>,
	lists: BTreeMap<String, Vec<String>>,
}

fn normal(key: &str) -> String { key.to_ascii_lowercase() }

/// Map the compile time architecture onto a dpkg architecture string.
fn native_arch() -> &'static str {
	match env::consts::ARCH {
		"x86_64" => "amd64",
		"x86" => "i386",
		"aarch64" => "arm64",
		"arm" => "armhf",
		"powerpc64" => "ppc64el",
		"riscv64" => "riscv64",
		"s390x" => "s390x",
		other => other,
	}
}

impl Default for Config {
	fn default() -> Self { Self::new() }
}

impl Config {
	/// Create a new config tree seeded with the built in defaults.
	pub fn new() -> Self {
		let mut config = Config {
			values: BTreeMap::new(),
			lists: BTreeMap::new(),
		};

		config.set("APT::Architecture", native_arch());
		config.set("APT::Install-Recommends", "true");
		config.set("APT::Immediate-Configure", "true");
		config.set("APT::Solver", "classic");
		config.set("APT::Solver::Strict-Pinning", "true");
		config.set("Dir", "/");
		config.set("Dir::State", "var/lib/apt/");
		config.set("Dir::State::lists", "lists/");
		config.set("Dir::State::status", "/var/lib/dpkg/status");
		config.set("Dir::State::diversions", "/var/lib/dpkg/diversions");
		config.set("Dir::State::info", "/var/lib/dpkg/info/");
		config.set("Dir::Cache", "var/cache/apt/");
		config.set("Dir::Cache::pkgcache", "pkgcache.bin");
		config.set("Dir::Cache::flcache", "flcache.bin");
		config.set("Dir::Etc", "etc/apt/");
		config.set("Dir::Etc::preferences", "preferences");
		config.set("Dir::Lock", "/var/lib/dpkg/lock-frontend");

		config
	}

	/// Create a new empty config tree with no defaults at all.
	pub fn new_clear() -> Self {
		Config {
			values: BTreeMap::new(),
			lists: BTreeMap::new(),
		}
	}

	/// Find a key and return its value as a string.
	///
	/// `default` is what will be returned if nothing is found.
	pub fn find(&self, key: &str, default: &str) -> String {
		self.values.get(&normal(key)).cloned().unwrap_or_else(|| default.to_string())
	}

	/// Exactly like find but takes no default and returns an option instead.
	pub fn get(&self, key: &str) -> Option<String> { self.values.get(&normal(key)).cloned() }

	/// Find a key and return it as a bool.
	pub fn bool(&self, key: &str, default: bool) -> bool {
		match self.values.get(&normal(key)).map(|s| s.as_str()) {
			Some("true") | Some("yes") | Some("1") | Some("on") => true,
			Some("false") | Some("no") | Some("0") | Some("off") => false,
			_ => default,
		}
	}

	/// Find a key and return it as an integer.
	pub fn int(&self, key: &str, default: i64) -> i64 {
		self.values
			.get(&normal(key))
			.and_then(|s| s.parse().ok())
			.unwrap_or(default)
	}

	/// Find a filename, resolving relative values against the parent
	/// directory keys, the way `Dir::State::status` resolves under
	/// `Dir::State` and finally `Dir`.
	pub fn file(&self, key: &str, default: &str) -> String {
		let mut value = self.find(key, default);
		let mut parent = key.to_string();

		while !value.starts_with('/') {
			let Some(pos) = parent.rfind("::") else { break };
			parent.truncate(pos);

			if let Some(prefix) = self.get(&parent) {
				value = format!("{}{}", prefix, value);
			}
		}
		value
	}

	/// Find a directory. Identical to [`Config::file`] for now, named for
	/// parity with the keys it is used on.
	pub fn dir(&self, key: &str, default: &str) -> String { self.file(key, default) }

	/// Set a key to a value.
	pub fn set(&mut self, key: &str, value: &str) {
		self.values.insert(normal(key), value.to_string());
	}

	/// Set a key to a list of values.
	pub fn set_list<T: AsRef<str>>(&mut self, key: &str, values: &[T]) {
		self.lists
			.insert(normal(key), values.iter().map(|v| v.as_ref().to_string()).collect());
	}

	/// Return the list stored at a key.
	///
	/// A plain value at the same key counts as a single element list.
	pub fn find_vector(&self, key: &str) -> Vec<String> {
		if let Some(list) = self.lists.get(&normal(key)) {
			return list.clone();
		}
		self.get(key).map(|v| vec![v]).unwrap_or_default()
	}

	/// Clears all values from a key.
	pub fn clear(&mut self, key: &str) {
		self.values.remove(&normal(key));
		self.lists.remove(&normal(key));
	}

	/// Clear a single value from a list.
	pub fn clear_value(&mut self, key: &str, value: &str) {
		if let Some(list) = self.lists.get_mut(&normal(key)) {
			list.retain(|v| v != value);
		}
	}

	/// Clears the entire tree.
	pub fn clear_all(&mut self) {
		self.values.clear();
		self.lists.clear();
	}

	/// Returns a string dump of configuration options separated by `\n`
	pub fn dump(&self) -> String {
		let mut out = String::new();
		for (key, value) in &self.values {
			out.push_str(&format!("{key} \"{value}\";\n"));
		}
		for (key, list) in &self.lists {
			for value in list {
				out.push_str(&format!("{key}:: \"{value}\";\n"));
			}
		}
		out
	}

	/// The native architecture of this system.
	pub fn architecture(&self) -> String { self.find("APT::Architecture", native_arch()) }

	/// All architectures the system accepts packages for.
	///
	/// The native architecture is always first.
	pub fn architectures(&self) -> Vec<String> {
		let native = self.architecture();
		let mut archs = vec![native.clone()];
		for arch in self.find_vector("APT::Architectures") {
			if arch != native && !archs.contains(&arch) {
				archs.push(arch);
			}
		}
		archs
	}

	/// The set of active build profiles.
	///
	/// `APT::Build-Profiles` wins; otherwise `DEB_BUILD_PROFILES` from the
	/// environment is taken with spaces standing in for commas.
	pub fn build_profiles(&self) -> Vec<String> {
		let raw = match self.get("APT::Build-Profiles") {
			Some(list) => list,
			None => match env::var("DEB_BUILD_PROFILES") {
				Ok(env_list) => env_list.replace(' ', ","),
				Err(_) => return Vec::new(),
			},
		};

		raw.split(',')
			.map(|p| p.trim().to_string())
			.filter(|p| !p.is_empty())
			.collect()
	}

	/// Languages to acquire index translations for.
	///
	/// The placeholder `environment` expands to the codes derived from
	/// `LC_MESSAGES` and `LANGUAGE`.
	pub fn languages(&self) -> Vec<String> {
		let configured = self.find_vector("Acquire::Languages");
		let mut langs: Vec<String> = Vec::new();

		let mut environment = Vec::new();
		if let Ok(language) = env::var("LANGUAGE") {
			for part in language.split(':') {
				if !part.is_empty() {
					environment.push(part.to_string());
				}
			}
		}
		if let Ok(messages) = env::var("LC_MESSAGES") {
			// de_DE.UTF-8 contributes both de_DE and de.
			let code = messages.split('.').next().unwrap_or("");
			if !code.is_empty() && code != "C" && code != "POSIX" {
				environment.push(code.to_string());
				if let Some(short) = code.split('_').next() {
					environment.push(short.to_string());
				}
			}
		}

		let source = if configured.is_empty() {
			vec!["environment".to_string()]
		} else {
			configured
		};

		for lang in source {
			if lang == "environment" {
				for code in &environment {
					if !langs.contains(code) {
						langs.push(code.clone());
					}
				}
			} else if lang == "none" {
				break;
			} else if !langs.contains(&lang) {
				langs.push(lang);
			}
		}
		langs
	}
}
