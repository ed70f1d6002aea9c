mod filelist {
	use apt_core::filelist::{nflag, FileListCache};
	use tempfile::TempDir;

	#[test]
	fn nodes_and_owners() {
		let mut fl = FileListCache::new();
		let pkg = fl.load_list_file("coreutils", "/bin/ls\n/bin/cat\n\n").unwrap();

		let ls = fl.lookup("/bin/ls").unwrap();
		assert_eq!(fl.owner_of(ls), Some(pkg));
		assert_eq!(fl.node_path(ls), "/bin/ls");
		assert_eq!(fl.node_dir(ls), "/bin");
		assert_eq!(fl.node_file(ls), "ls");

		assert!(fl.lookup("/bin/rm").is_none());

		// The package file chain covers both entries.
		let mut count = 0;
		let mut node = fl.pkg_files(pkg);
		while node != 0 {
			count += 1;
			node = fl.next_in_package(node);
		}
		assert_eq!(count, 2);
	}

	#[test]
	fn shared_names_across_packages() {
		let mut fl = FileListCache::new();
		let p1 = fl.load_list_file("p1", "/usr/share/doc/README\n").unwrap();
		let p2 = fl.load_list_file("p2", "/usr/lib/README\n").unwrap();

		let n1 = fl.lookup("/usr/share/doc/README").unwrap();
		let n2 = fl.lookup("/usr/lib/README").unwrap();
		assert_ne!(n1, n2);
		assert_eq!(fl.owner_of(n1), Some(p1));
		assert_eq!(fl.owner_of(n2), Some(p2));
		assert_eq!(fl.node_file(n1), fl.node_file(n2));
	}

	#[test]
	fn diversions() {
		let mut fl = FileListCache::new();
		let dash = fl.get_pkg("dash", true).unwrap();

		fl.begin_diver_load();
		fl.add_diversion(dash, "/bin/sh", "/bin/sh.distrib").unwrap();
		fl.finish_diver_load();

		let node = fl.lookup("/bin/sh").unwrap();
		let diver = fl.diversion_of(node).unwrap();
		assert_eq!(fl.diversion_owner(diver), dash);

		// Both ends of the diversion resolve to the same record.
		let to_node = fl.lookup("/bin/sh.distrib").unwrap();
		assert_eq!(fl.diversion_of(to_node), Some(diver));
		assert_eq!(fl.node_path(fl.diversion_to(diver)), "/bin/sh.distrib");
		assert_eq!(fl.node_path(fl.diversion_from(diver)), "/bin/sh");
	}

	#[test]
	fn untouched_diversions_are_dropped_on_reload() {
		let mut fl = FileListCache::new();
		let dash = fl.get_pkg("dash", true).unwrap();

		fl.begin_diver_load();
		fl.add_diversion(dash, "/bin/sh", "/bin/sh.distrib").unwrap();
		fl.finish_diver_load();
		assert!(fl.lookup("/bin/sh").is_some());

		// A reload without the diversion drops it entirely.
		fl.begin_diver_load();
		fl.finish_diver_load();
		assert!(fl.lookup("/bin/sh").is_none());
		assert!(fl.lookup("/bin/sh.distrib").is_none());
	}

	#[test]
	fn diversion_file_loader() {
		let mut fl = FileListCache::new();
		fl.load_diversions("/bin/sh\n/bin/sh.distrib\ndash\n/usr/bin/vi\n/usr/bin/vi.real\n:\n")
			.unwrap();

		assert!(fl.lookup("/bin/sh").is_some());
		let vi = fl.lookup("/usr/bin/vi").unwrap();
		let diver = fl.diversion_of(vi).unwrap();
		// ":" means dpkg itself owns the diversion.
		assert_eq!(fl.diversion_owner(diver), 0);

		assert!(fl
			.load_diversions("/bin/sh\n/bin/sh.distrib\n")
			.is_err());
	}

	#[test]
	fn conffiles() {
		let mut fl = FileListCache::new();
		fl.load_list_file("pkg", "/etc/pkg.conf\n").unwrap();

		let status = concat!(
			"Package: pkg\n",
			"Status: install ok installed\n",
			"Version: 1.0\n",
			"Conffiles:\n",
			" /etc/pkg.conf 0123456789abcdef0123456789abcdef\n",
			"\n",
		);
		fl.load_status_conffiles(status).unwrap();

		let node = fl.lookup("/etc/pkg.conf").unwrap();
		assert!(fl.node_flags(node) & nflag::CONFFILE != 0);
		let md5 = fl.conffile_md5(node).unwrap();
		assert_eq!(md5[0], 0x01);
		assert_eq!(md5[15], 0xef);

		// Ownership still resolves through the conffile record.
		let pkg = fl.get_pkg("pkg", false).unwrap();
		assert_eq!(fl.owner_of(node), Some(pkg));
	}

	#[test]
	fn save_and_reopen() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("flcache.bin");

		let mut fl = FileListCache::new();
		fl.load_list_file("coreutils", "/bin/ls\n").unwrap();
		fl.save(&path).unwrap();

		let mut reopened = FileListCache::open(&path).unwrap();
		let node = reopened.lookup("/bin/ls").unwrap();
		let pkg = reopened.get_pkg("coreutils", false).unwrap();
		assert_ne!(pkg, 0);
		assert_eq!(reopened.owner_of(node), Some(pkg));

		// A truncated file is rejected as corrupt.
		std::fs::write(&path, b"garbage").unwrap();
		assert!(FileListCache::open(&path).is_err());
	}
}
