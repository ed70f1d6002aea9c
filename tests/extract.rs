mod extract {
	use std::collections::HashMap;
	use std::fs;

	use apt_core::error::Error;
	use apt_core::extract::{ExtractStream, Item, ItemKind, Replace};
	use apt_core::filelist::{nflag, FileListCache};
	use apt_core::raw::dep;
	use tempfile::TempDir;

	fn file_item(path: &str, size: u64) -> Item {
		Item {
			path: path.to_string(),
			kind: ItemKind::File,
			size,
			mode: 0o644,
			link_target: String::new(),
			major: 0,
			minor: 0,
		}
	}

	#[test]
	fn unpack_new_files() {
		let root = TempDir::new().unwrap();
		let mut fl = FileListCache::new();

		let mut stream =
			ExtractStream::new(&mut fl, root.path(), "hello", vec![], HashMap::new()).unwrap();

		let mut data: &[u8] = b"hello world\n";
		stream
			.do_item(&file_item("./usr/bin/hello", 12), &mut data)
			.unwrap();
		stream.finish().unwrap();

		let content = fs::read_to_string(root.path().join("usr/bin/hello")).unwrap();
		assert_eq!(content, "hello world\n");

		let node = fl.lookup("/usr/bin/hello").unwrap();
		assert_eq!(fl.pkg_name(fl.owner_of(node).unwrap()), "hello");
		// The transient flags are gone after commit.
		assert_eq!(fl.node_flags(node) & (nflag::NEW_FILE | nflag::UNPACKED), 0);
	}

	#[test]
	fn overwrite_without_replaces_is_refused() {
		let root = TempDir::new().unwrap();
		fs::create_dir_all(root.path().join("usr/bin")).unwrap();
		fs::write(root.path().join("usr/bin/foo"), "original").unwrap();

		let mut fl = FileListCache::new();
		fl.load_list_file("p1", "/usr/bin/foo\n").unwrap();

		let mut stream =
			ExtractStream::new(&mut fl, root.path(), "p2", vec![], HashMap::new()).unwrap();

		let mut data: &[u8] = b"new bytes";
		let err = stream
			.do_item(&file_item("./usr/bin/foo", 9), &mut data)
			.unwrap_err();

		match err {
			Error::OverwriteConflict { other_pkg, path } => {
				assert_eq!(other_pkg, "p1");
				assert_eq!(path, "/usr/bin/foo");
			},
			other => panic!("expected an overwrite conflict, got {other}"),
		}

		// Nothing on disk changed.
		let content = fs::read_to_string(root.path().join("usr/bin/foo")).unwrap();
		assert_eq!(content, "original");
	}

	#[test]
	fn replaces_authorises_the_overwrite() {
		let root = TempDir::new().unwrap();
		fs::create_dir_all(root.path().join("usr/bin")).unwrap();
		fs::write(root.path().join("usr/bin/foo"), "original").unwrap();

		let mut fl = FileListCache::new();
		fl.load_list_file("p1", "/usr/bin/foo\n").unwrap();

		let replaces = vec![Replace {
			name: "p1".to_string(),
			op: dep::LESS,
			version: "2.0".to_string(),
		}];
		let installed = HashMap::from([("p1".to_string(), "1.0".to_string())]);

		let mut stream =
			ExtractStream::new(&mut fl, root.path(), "p2", replaces, installed).unwrap();
		let mut data: &[u8] = b"new bytes";
		stream
			.do_item(&file_item("./usr/bin/foo", 9), &mut data)
			.unwrap();
		stream.finish().unwrap();

		let content = fs::read_to_string(root.path().join("usr/bin/foo")).unwrap();
		assert_eq!(content, "new bytes");
	}

	#[test]
	fn abort_restores_everything() {
		let root = TempDir::new().unwrap();
		fs::create_dir_all(root.path().join("etc")).unwrap();
		fs::write(root.path().join("etc/keep.conf"), "old contents").unwrap();

		let mut fl = FileListCache::new();
		fl.load_list_file("me", "/etc/keep.conf\n").unwrap();

		let mut stream =
			ExtractStream::new(&mut fl, root.path(), "me", vec![], HashMap::new()).unwrap();

		// Overwrite one owned file and create one new file, then abort.
		let mut data: &[u8] = b"new contents";
		stream
			.do_item(&file_item("./etc/keep.conf", 12), &mut data)
			.unwrap();
		let mut data: &[u8] = b"fresh";
		stream.do_item(&file_item("./etc/fresh.conf", 5), &mut data).unwrap();
		stream.abort();

		assert_eq!(
			fs::read_to_string(root.path().join("etc/keep.conf")).unwrap(),
			"old contents"
		);
		assert!(!root.path().join("etc/fresh.conf").exists());

		// The cache holds no trace of the aborted archive.
		assert!(fl.lookup("/etc/fresh.conf").is_none());
		let node = fl.lookup("/etc/keep.conf").unwrap();
		assert_eq!(fl.node_flags(node) & nflag::UNPACKED, 0);
	}

	#[test]
	fn diversions_redirect_other_packages() {
		let root = TempDir::new().unwrap();
		let mut fl = FileListCache::new();
		let dash = fl.get_pkg("dash", true).unwrap();
		fl.add_diversion(dash, "/bin/sh", "/bin/sh.distrib").unwrap();

		// Another package writing /bin/sh lands on the diverted name.
		let mut stream =
			ExtractStream::new(&mut fl, root.path(), "bash", vec![], HashMap::new()).unwrap();
		let mut data: &[u8] = b"#!shell";
		stream.do_item(&file_item("./bin/sh", 7), &mut data).unwrap();
		stream.finish().unwrap();

		assert!(root.path().join("bin/sh.distrib").exists());
		assert!(!root.path().join("bin/sh").exists());

		// The owner itself is not redirected.
		let mut stream =
			ExtractStream::new(&mut fl, root.path(), "dash", vec![], HashMap::new()).unwrap();
		let mut data: &[u8] = b"#!dash";
		stream.do_item(&file_item("./bin/sh", 6), &mut data).unwrap();
		stream.finish().unwrap();
		assert!(root.path().join("bin/sh").exists());
	}

	#[test]
	fn path_hygiene() {
		let root = TempDir::new().unwrap();
		let mut fl = FileListCache::new();
		let mut stream =
			ExtractStream::new(&mut fl, root.path(), "evil", vec![], HashMap::new()).unwrap();

		let mut data: &[u8] = b"x";
		assert!(stream.do_item(&file_item("../outside", 1), &mut data).is_err());
		let mut data: &[u8] = b"x";
		assert!(stream
			.do_item(&file_item("a/../../outside", 1), &mut data)
			.is_err());
		let mut data: &[u8] = b"x";
		assert!(stream.do_item(&file_item("", 1), &mut data).is_err());

		let huge = Item {
			size: u64::MAX,
			..file_item("big", 0)
		};
		let mut data: &[u8] = b"";
		assert!(stream.do_item(&huge, &mut data).is_err());
	}

	#[test]
	fn symlinks_and_directories() {
		let root = TempDir::new().unwrap();
		let mut fl = FileListCache::new();
		let mut stream =
			ExtractStream::new(&mut fl, root.path(), "links", vec![], HashMap::new()).unwrap();

		let dir = Item {
			kind: ItemKind::Directory,
			..file_item("./usr/share/links", 0)
		};
		let mut data: &[u8] = b"";
		stream.do_item(&dir, &mut data).unwrap();
		assert!(root.path().join("usr/share/links").is_dir());

		let link = Item {
			kind: ItemKind::SymbolicLink,
			link_target: "/usr/bin/true".to_string(),
			..file_item("./usr/share/links/t", 0)
		};
		let mut data: &[u8] = b"";
		stream.do_item(&link, &mut data).unwrap();
		let target = fs::read_link(root.path().join("usr/share/links/t")).unwrap();
		assert_eq!(target.to_string_lossy(), "/usr/bin/true");

		stream.finish().unwrap();
	}
}
