mod common;

mod depcache {
	use apt_core::util::DiskSpace;

	use crate::common::{build_cache, index_stanza, installed_stanza};

	#[test]
	fn install_pulls_dependencies() {
		let t = build_cache(
			"",
			&[
				index_stanza("a", "1.0", "Depends: b (>= 2)\n"),
				index_stanza("b", "1", ""),
				index_stanza("b", "2", ""),
			]
			.concat(),
		);
		let cache = &t.cache;

		let a = cache.get("a").unwrap();
		assert!(a.mark_install(true, true));

		assert!(a.marked_install());
		assert!(a.marked_new_install());

		let b = cache.get("b").unwrap();
		assert!(b.marked_install());
		assert_eq!(b.install_version().unwrap().version(), "2");
		assert!(b.is_auto_installed());
		assert!(!a.is_auto_installed());

		let depcache = cache.depcache();
		assert_eq!(depcache.broken_count(), 0);
		assert_eq!(depcache.install_count(), 2);
		assert_eq!(depcache.delete_count(), 0);
	}

	#[test]
	fn install_without_auto_leaves_broken() {
		let t = build_cache(
			"",
			&[
				index_stanza("a", "1.0", "Depends: b (>= 2)\n"),
				index_stanza("b", "2", ""),
			]
			.concat(),
		);

		let a = t.cache.get("a").unwrap();
		assert!(a.mark_install(false, true));
		assert!(a.is_inst_broken());
		assert_eq!(t.cache.depcache().broken_count(), 1);

		// Resolution repairs it.
		t.cache.resolve(false).unwrap();
		assert_eq!(t.cache.depcache().broken_count(), 0);
		assert!(t.cache.get("b").unwrap().marked_install());
	}

	#[test]
	fn upgrade_and_keep() {
		let t = build_cache(
			&installed_stanza("tool", "1.0", ""),
			&index_stanza("tool", "2.0", ""),
		);

		let tool = t.cache.get("tool").unwrap();
		assert!(tool.is_installed());
		assert!(tool.is_upgradable());
		assert_eq!(tool.candidate().unwrap().version(), "2.0");

		tool.mark_install(true, true);
		assert!(tool.marked_upgrade());
		assert!(!tool.marked_new_install());

		tool.mark_keep();
		assert!(tool.marked_keep());
		assert!(!tool.marked_upgrade());
		assert_eq!(t.cache.depcache().install_count(), 0);
	}

	#[test]
	fn delete_and_purge() {
		let t = build_cache(&installed_stanza("tool", "1.0", ""), "");

		let tool = t.cache.get("tool").unwrap();
		assert!(tool.mark_delete(false));
		assert!(tool.marked_delete());
		assert!(!tool.marked_purge());
		assert_eq!(t.cache.depcache().delete_count(), 1);

		assert!(tool.mark_delete(true));
		assert!(tool.marked_purge());
	}

	#[test]
	fn essential_is_shielded() {
		let t = build_cache(&installed_stanza("base-files", "12", "Essential: yes\n"), "");

		let base = t.cache.get("base-files").unwrap();
		assert!(base.is_essential());
		assert!(!base.mark_delete(false));
		assert!(base.marked_keep());
	}

	#[test]
	fn removing_dependency_breaks_dependent() {
		let t = build_cache(
			&[
				installed_stanza("app", "1.0", "Depends: lib\n"),
				installed_stanza("lib", "1.0", ""),
			]
			.concat(),
			"",
		);

		let lib = t.cache.get("lib").unwrap();
		assert!(lib.mark_delete(false));

		let app = t.cache.get("app").unwrap();
		assert!(app.is_inst_broken());
		assert_eq!(t.cache.depcache().broken_count(), 1);
	}

	#[test]
	fn action_group_defers_recomputation() {
		let t = build_cache(
			&[
				installed_stanza("app", "1.0", "Depends: lib\n"),
				installed_stanza("lib", "1.0", ""),
			]
			.concat(),
			"",
		);
		let depcache = t.cache.depcache();

		{
			let _group = depcache.action_group(&t.cache);
			t.cache.get("lib").unwrap().mark_delete(false);
			// Inside the group the old statistics are still visible.
			assert_eq!(depcache.broken_count(), 0);
		}
		// The outermost close recomputed them.
		assert_eq!(depcache.broken_count(), 1);
	}

	#[test]
	fn virtual_package_with_single_provider() {
		let t = build_cache(
			"",
			&index_stanza("exim4", "4.95-1", "Provides: mail-transport-agent\n"),
		);

		let virt = t.cache.get("mail-transport-agent").unwrap();
		assert!(virt.mark_install(true, true));
		assert!(t.cache.get("exim4").unwrap().marked_install());
	}

	#[test]
	fn conflicts_remove_the_installed_side() {
		let t = build_cache(
			&installed_stanza("old-mta", "1.0", ""),
			&index_stanza("new-mta", "2.0", "Conflicts: old-mta\n"),
		);

		let new_mta = t.cache.get("new-mta").unwrap();
		assert!(new_mta.mark_install(true, true));
		assert!(t.cache.get("old-mta").unwrap().marked_delete());
		assert_eq!(t.cache.depcache().broken_count(), 0);
	}

	#[test]
	fn garbage_collection() {
		let t = build_cache(
			"",
			&[
				index_stanza("app", "1.0", "Depends: lib\n"),
				index_stanza("lib", "1.0", ""),
			]
			.concat(),
		);

		let app = t.cache.get("app").unwrap();
		app.mark_install(true, true);
		let lib = t.cache.get("lib").unwrap();
		assert!(lib.is_auto_installed());
		assert!(!lib.is_auto_removable());

		// Dropping the manual package leaves the dependency orphaned.
		app.mark_keep();
		assert!(t.cache.get("lib").unwrap().is_auto_removable());
	}

	#[test]
	fn sizes() {
		let t = build_cache(
			"",
			&index_stanza("a", "1.0", ""),
		);

		let a = t.cache.get("a").unwrap();
		a.mark_install(true, true);

		let depcache = t.cache.depcache();
		assert_eq!(depcache.download_size(&t.cache), 1000);
		match depcache.disk_size(&t.cache) {
			DiskSpace::Require(size) => assert_eq!(size, 100 * 1024),
			DiskSpace::Free(_) => panic!("install should require space"),
		}
	}
}
