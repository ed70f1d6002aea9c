mod config {
	use apt_core::config::Config;

	#[test]
	fn find_and_set() {
		let mut config = Config::new();

		assert_eq!(config.find("Does::Not::Exist", "fallback"), "fallback");
		assert_eq!(config.get("Does::Not::Exist"), None);

		config.set("APT::Test", "value");
		assert_eq!(config.find("APT::Test", ""), "value");
		// Keys are case insensitive.
		assert_eq!(config.find("apt::test", ""), "value");

		config.clear("APT::Test");
		assert_eq!(config.get("APT::Test"), None);
	}

	#[test]
	fn booleans_and_integers() {
		let mut config = Config::new();
		config.set("A", "true");
		config.set("B", "no");
		config.set("C", "42");

		assert!(config.bool("A", false));
		assert!(!config.bool("B", true));
		assert!(config.bool("Missing", true));
		assert_eq!(config.int("C", 0), 42);
		assert_eq!(config.int("Missing", 7), 7);
	}

	#[test]
	fn file_resolution_walks_parents() {
		let mut config = Config::new_clear();
		config.set("Dir", "/");
		config.set("Dir::State", "var/lib/apt/");
		config.set("Dir::State::lists", "lists/");

		assert_eq!(config.file("Dir::State::lists", ""), "/var/lib/apt/lists/");

		// Absolute values are taken verbatim.
		config.set("Dir::State::status", "/var/lib/dpkg/status");
		assert_eq!(config.file("Dir::State::status", ""), "/var/lib/dpkg/status");
	}

	#[test]
	fn lists() {
		let mut config = Config::new();
		config.set_list("APT::Architectures", &["amd64", "i386"]);

		let vector = config.find_vector("APT::Architectures");
		assert_eq!(vector, ["amd64", "i386"]);

		config.clear_value("APT::Architectures", "i386");
		assert_eq!(config.find_vector("APT::Architectures"), ["amd64"]);

		// A plain value acts as a single element list.
		config.set("Single", "one");
		assert_eq!(config.find_vector("Single"), ["one"]);
	}

	#[test]
	fn architectures() {
		let mut config = Config::new();
		config.set("APT::Architecture", "amd64");
		config.set_list("APT::Architectures", &["i386", "amd64", "armel"]);

		// Native first, no duplicates.
		assert_eq!(config.architectures(), ["amd64", "i386", "armel"]);
	}

	#[test]
	fn build_profiles() {
		let mut config = Config::new();
		assert!(config.build_profiles().is_empty() || std::env::var("DEB_BUILD_PROFILES").is_ok());

		config.set("APT::Build-Profiles", "stage1,nodoc");
		assert_eq!(config.build_profiles(), ["stage1", "nodoc"]);
	}

	#[test]
	fn dump_contains_everything() {
		let mut config = Config::new_clear();
		config.set("A::B", "c");
		config.set_list("D", &["e"]);

		let dump = config.dump();
		assert!(dump.contains("a::b \"c\";"));
		assert!(dump.contains("d:: \"e\";"));
	}
}
