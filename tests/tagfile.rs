mod tagfile {
	use apt_core::tagfile::{parse_tagfile, TagSection};

	const SECTION: &str = "\
Package: apt
Version: 2.4.7
Description: commandline package manager
 This package provides commandline tools for searching and
 managing as well as querying information about packages.";

	#[test]
	fn section_fields() {
		let section = TagSection::new(SECTION).unwrap();

		assert_eq!(section.get("Package"), Some("apt"));
		assert_eq!(section.get("Version"), Some("2.4.7"));
		assert_eq!(section.get("Missing"), None);
		assert_eq!(section.get_default("Missing", "fallback"), "fallback");

		// Multiline values keep their continuation lines.
		let desc = section.get("Description").unwrap();
		assert!(desc.starts_with("commandline package manager\n"));
		assert!(desc.contains("managing as well as querying"));
	}

	#[test]
	fn section_rejects_garbage() {
		assert!(TagSection::new("").is_err());
		assert!(TagSection::new("no separator here").is_err());
		assert!(TagSection::new(" indented: without a key").is_err());
	}

	#[test]
	fn keys_are_case_insensitive() {
		let section = TagSection::new("Package: apt\n").unwrap();
		assert_eq!(section.get("package"), Some("apt"));
		assert_eq!(section.get("PACKAGE"), Some("apt"));
	}

	#[test]
	fn file_offsets_cover_each_section() {
		let content = format!("{SECTION}\n\nPackage: dpkg\nVersion: 1.21.1\n\n# comment\n");
		let sections = parse_tagfile(&content).unwrap();
		assert_eq!(sections.len(), 3);

		// The recorded ranges slice the original text back out.
		for section in &sections[..2] {
			let slice = &content[section.offset()..section.offset() + section.size()];
			let reparsed = TagSection::new(slice).unwrap();
			assert_eq!(reparsed.get("Package"), section.get("Package"));
		}
	}

	#[test]
	fn blank_line_runs_are_skipped() {
		let content = "Package: a\n\n\n\nPackage: b\n";
		let sections = parse_tagfile(content).unwrap();
		assert_eq!(sections.len(), 2);
		assert_eq!(sections[0].get("Package"), Some("a"));
		assert_eq!(sections[1].get("Package"), Some("b"));
	}

	#[test]
	fn field_order_is_preserved() {
		let section = TagSection::new("B: 1\nA: 2\nC: 3\n").unwrap();
		let keys: Vec<&str> = section.fields().map(|(k, _)| k).collect();
		assert_eq!(keys, ["B", "A", "C"]);
	}
}
