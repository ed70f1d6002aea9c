mod common;

mod policy {
	use std::fs;

	use apt_core::cache::{Cache, IndexSource, ReleaseInfo};
	use apt_core::policy::{PinType, Policy};
	use tempfile::TempDir;

	use crate::common::{build_cache, index_stanza, installed_stanza, test_config};

	/// Two indexes with different release names plus a status file.
	fn two_archive_cache(stable_ver: &str, unstable_ver: &str) -> (TempDir, Cache) {
		let dir = TempDir::new().unwrap();
		let status = dir.path().join("status");
		let stable = dir.path().join("stable_Packages");
		let unstable = dir.path().join("unstable_Packages");

		fs::write(&status, "").unwrap();
		fs::write(&stable, index_stanza("tool", stable_ver, "")).unwrap();
		fs::write(&unstable, index_stanza("tool", unstable_ver, "")).unwrap();

		let sources = vec![
			IndexSource::status_file(&status),
			IndexSource::index(&stable, ReleaseInfo {
				archive: "stable".to_string(),
				..Default::default()
			}),
			IndexSource::index(&unstable, ReleaseInfo {
				archive: "unstable".to_string(),
				..Default::default()
			}),
		];

		let cache = Cache::open(&sources, None, test_config()).unwrap();
		(dir, cache)
	}

	#[test]
	fn highest_version_wins_by_default() {
		let (_dir, cache) = two_archive_cache("1.0", "2.0");
		let tool = cache.get("tool").unwrap();
		assert_eq!(tool.candidate().unwrap().version(), "2.0");
	}

	#[test]
	fn release_pin_drags_the_candidate_down() {
		let (_dir, cache) = two_archive_cache("1.0", "2.0");

		let mut policy = Policy::new(&cache);
		policy.create_pin(&cache, PinType::Release, "tool", "a=stable", 700);
		policy.init_defaults(&cache);
		assert!(cache.set_policy(policy));

		// 700 beats the default 500 of the other origin.
		let tool = cache.get("tool").unwrap();
		assert_eq!(tool.candidate().unwrap().version(), "1.0");
	}

	#[test]
	fn installed_version_beats_lower_priority() {
		let t = build_cache(
			&installed_stanza("tool", "2.0", ""),
			&index_stanza("tool", "1.5", ""),
		);

		// The index offers only a downgrade; the installed version holds
		// the pseudo priority 1000.
		let tool = t.cache.get("tool").unwrap();
		assert_eq!(tool.candidate().unwrap().version(), "2.0");
	}

	#[test]
	fn pin_above_1000_permits_downgrade() {
		let t = build_cache(
			&installed_stanza("tool", "2.0", ""),
			&index_stanza("tool", "1.5", ""),
		);

		let mut policy = Policy::new(&t.cache);
		policy.create_pin(&t.cache, PinType::Version, "tool", "1.5", 1001);
		policy.init_defaults(&t.cache);
		assert!(t.cache.set_policy(policy));

		let tool = t.cache.get("tool").unwrap();
		assert_eq!(tool.candidate().unwrap().version(), "1.5");
	}

	#[test]
	fn version_pin_with_glob() {
		let t = build_cache(
			"",
			&[
				index_stanza("tool", "1.4", ""),
				index_stanza("tool", "2.0", ""),
			]
			.concat(),
		);

		let mut policy = Policy::new(&t.cache);
		policy.create_pin(&t.cache, PinType::Version, "tool", "1.*", 990);
		policy.init_defaults(&t.cache);
		assert!(t.cache.set_policy(policy));

		let tool = t.cache.get("tool").unwrap();
		assert_eq!(tool.candidate().unwrap().version(), "1.4");
	}

	#[test]
	fn status_leftovers_are_never_candidates() {
		// A config-files residue in the status file must not become a
		// candidate.
		let status = "Package: gone\n\
			Status: deinstall ok config-files\n\
			Priority: optional\n\
			Architecture: amd64\n\
			Version: 3.0\n\n";
		let t = build_cache(status, &index_stanza("gone", "2.0", ""));

		let gone = t.cache.get("gone").unwrap();
		assert!(!gone.is_installed());
		assert_eq!(gone.candidate().unwrap().version(), "2.0");
	}
}
