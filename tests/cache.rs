mod common;

mod cache {
	use std::fs;

	use apt_core::cache::{Cache, IndexSource, PackageSort, ReleaseInfo};
	use apt_core::DepType;

	use crate::common::{build_cache, cache_paths, index_stanza, installed_stanza, test_config};

	#[test]
	fn find_and_iterate() {
		let t = build_cache(
			&installed_stanza("dpkg", "1.21.1", ""),
			&[
				index_stanza("apt", "2.4.7", "Depends: libc6 (>= 2.34), dpkg\n"),
				index_stanza("dpkg", "1.21.4", ""),
				index_stanza("libc6", "2.35-1", ""),
			]
			.concat(),
		);
		let cache = &t.cache;

		let apt = cache.get("apt").unwrap();
		assert_eq!(apt.name(), "apt");
		assert_eq!(apt.arch(), "amd64");
		assert_eq!(apt.fullname(false), "apt:amd64");
		assert_eq!(apt.fullname(true), "apt");
		assert!(!apt.is_installed());

		let dpkg = cache.get("dpkg").unwrap();
		assert!(dpkg.is_installed());
		assert_eq!(dpkg.installed().unwrap().version(), "1.21.1");

		assert!(cache.get("nonexistent").is_none());
		assert!(cache.get("dpkg:amd64").is_some());
		assert!(cache.get("dpkg:ia64").is_none());

		let names: Vec<String> = cache
			.packages(&PackageSort::default().names())
			.map(|p| p.name().to_string())
			.collect();
		assert_eq!(names, ["apt", "dpkg", "libc6"]);
	}

	#[test]
	fn versions_descend() {
		let t = build_cache(
			"",
			&[
				index_stanza("b", "1.0", ""),
				index_stanza("b", "2.0", ""),
				index_stanza("b", "1.5", ""),
			]
			.concat(),
		);

		let versions: Vec<String> = t
			.cache
			.get("b")
			.unwrap()
			.versions()
			.map(|v| v.version().to_string())
			.collect();
		assert_eq!(versions, ["2.0", "1.5", "1.0"]);
	}

	#[test]
	fn dependencies_round_trip() {
		let t = build_cache(
			"",
			&[
				index_stanza(
					"apt",
					"2.4.7",
					"Depends: libc6 (>= 2.34), gpgv | gpgv2 (>= 1.0)\nBreaks: apt-utils (<< 2.4)\n",
				),
				index_stanza("libc6", "2.35-1", ""),
			]
			.concat(),
		);

		let apt = t.cache.get("apt").unwrap();
		let cand = apt.candidate().unwrap();
		let depends = cand.get_depends(&DepType::Depends).unwrap();

		assert_eq!(depends.len(), 2);
		let libc = depends[0].first();
		assert_eq!(libc.name(), "libc6");
		assert_eq!(libc.version(), Some("2.34"));
		assert_eq!(libc.comp_type(), Some(">="));
		assert!(!depends[0].is_or());

		assert!(depends[1].is_or());
		assert_eq!(depends[1].len(), 2);
		assert_eq!(depends[1][0].name(), "gpgv");
		assert_eq!(depends[1][1].name(), "gpgv2");
		assert_eq!(depends[1][1].version(), Some("1.0"));

		let breaks = cand.get_depends(&DepType::DpkgBreaks).unwrap();
		assert_eq!(breaks[0].first().name(), "apt-utils");
		assert_eq!(breaks[0].first().comp_type(), Some("<"));

		// Reverse view from the target side.
		let libc6 = t.cache.get("libc6").unwrap();
		let rdeps = libc6.rdepends();
		let rdep = &rdeps.get(&DepType::Depends).unwrap()[0];
		assert_eq!(rdep.first().target_package().name(), "apt");
	}

	#[test]
	fn provides_resolution() {
		let t = build_cache(
			"",
			&[
				index_stanza("exim4", "4.95-1", "Provides: mail-transport-agent\n"),
				index_stanza("mutt", "2.2.1", "Depends: mail-transport-agent\n"),
			]
			.concat(),
		);

		let virt = t.cache.get("mail-transport-agent").unwrap();
		assert!(!virt.has_versions());

		let providers: Vec<String> = virt
			.provides()
			.map(|p| p.version().parent().name().to_string())
			.collect();
		assert_eq!(providers, ["exim4"]);

		// The dependency on the virtual package reaches the provider.
		let mutt = t.cache.get("mutt").unwrap();
		let cand = mutt.candidate().unwrap();
		let dep = &cand.get_depends(&DepType::Depends).unwrap()[0];
		let targets = dep.first().all_targets();
		assert_eq!(targets.len(), 1);
		assert_eq!(targets[0].parent().name(), "exim4");
	}

	#[test]
	fn stanza_records_read_back() {
		let t = build_cache(
			"",
			&index_stanza("apt", "2.4.7", "Maintainer: APT Development Team\n"),
		);

		let apt = t.cache.get("apt").unwrap();
		let cand = apt.candidate().unwrap();
		assert_eq!(
			cand.get_record("Maintainer").as_deref(),
			Some("APT Development Team")
		);
		assert_eq!(cand.get_record("Package").as_deref(), Some("apt"));
	}

	#[test]
	fn persists_and_rebuilds() {
		let t = build_cache(
			&installed_stanza("dpkg", "1.21.1", ""),
			&index_stanza("apt", "2.4.7", ""),
		);
		let (status_path, packages_path) = cache_paths(&t);
		let cache_file = t.dir.path().join("pkgcache.bin");

		let sources = vec![
			IndexSource::status_file(&status_path),
			IndexSource::index(&packages_path, ReleaseInfo::default()),
		];

		// First open builds and persists.
		let built = Cache::open(&sources, Some(&cache_file), test_config()).unwrap();
		assert!(cache_file.exists());
		assert!(built.get("apt").is_some());
		drop(built);

		// Second open maps the existing file.
		let mapped = Cache::open(&sources, Some(&cache_file), test_config()).unwrap();
		assert!(mapped.get("apt").is_some());
		assert_eq!(mapped.get("dpkg").unwrap().installed().unwrap().version(), "1.21.1");
		drop(mapped);

		// Changing an input forces a rebuild that sees the new content.
		fs::write(
			&packages_path,
			[index_stanza("apt", "2.4.8", ""), index_stanza("new-pkg", "1.0", "")].concat(),
		)
		.unwrap();
		let rebuilt = Cache::open(&sources, Some(&cache_file), test_config()).unwrap();
		assert!(rebuilt.get("new-pkg").is_some());
		assert_eq!(
			rebuilt.get("apt").unwrap().candidate().unwrap().version(),
			"2.4.8"
		);
	}

	#[test]
	fn corrupt_cache_is_rebuilt() {
		let t = build_cache("", &index_stanza("apt", "2.4.7", ""));
		let (status_path, packages_path) = cache_paths(&t);
		let cache_file = t.dir.path().join("pkgcache.bin");

		let sources = vec![
			IndexSource::status_file(&status_path),
			IndexSource::index(&packages_path, ReleaseInfo::default()),
		];

		Cache::open(&sources, Some(&cache_file), test_config()).unwrap();

		// Stomp on the header; the next open must rebuild silently.
		fs::write(&cache_file, b"not a cache at all").unwrap();
		let reopened = Cache::open(&sources, Some(&cache_file), test_config()).unwrap();
		assert!(reopened.get("apt").is_some());
	}
}
