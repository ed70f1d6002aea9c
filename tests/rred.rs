mod rred {
	use std::fs;

	use apt_core::error::Error;
	use apt_core::rred::{patch_bytes, patch_file};
	use tempfile::TempDir;

	#[test]
	fn change_and_delete() {
		let (out, result) = patch_bytes(b"A\nB\nC\nD\n", b"3c\nX\n.\n1d\n").unwrap();
		assert_eq!(out, b"B\nX\nD\n");
		assert_eq!(result.size, 6);
	}

	#[test]
	fn append() {
		let (out, _) = patch_bytes(b"A\nB\n", b"2a\nC\nD\n.\n").unwrap();
		assert_eq!(out, b"A\nB\nC\nD\n");

		// 0a prepends before the first line.
		let (out, _) = patch_bytes(b"B\n", b"0a\nA\n.\n").unwrap();
		assert_eq!(out, b"A\nB\n");
	}

	#[test]
	fn ranged_delete_and_change() {
		let (out, _) = patch_bytes(b"1\n2\n3\n4\n5\n", b"2,4d\n").unwrap();
		assert_eq!(out, b"1\n5\n");

		let (out, _) = patch_bytes(b"1\n2\n3\n4\n5\n", b"2,4c\nx\ny\n.\n").unwrap();
		assert_eq!(out, b"1\nx\ny\n5\n");
	}

	#[test]
	fn multiple_commands_apply_in_reverse() {
		let base = b"l1\nl2\nl3\nl4\nl5\nl6\n";
		let script = b"5d\n3a\nextra\n.\n1c\nfirst\n.\n";
		let (out, _) = patch_bytes(base, script).unwrap();
		assert_eq!(out, b"first\nl2\nl3\nextra\nl4\nl6\n");
	}

	#[test]
	fn ascending_scripts_are_rejected() {
		let err = patch_bytes(b"A\nB\nC\nD\n", b"1d\n3c\nX\n.\n").unwrap_err();
		assert!(matches!(err, Error::CorruptPatch { .. }));

		// Overlapping ranges are no better.
		let err = patch_bytes(b"1\n2\n3\n4\n5\n", b"3c\nX\n.\n1,4d\n").unwrap_err();
		assert!(matches!(err, Error::CorruptPatch { .. }));
	}

	#[test]
	fn bad_grammar_is_rejected() {
		assert!(patch_bytes(b"A\n", b"xd\n").is_err());
		assert!(patch_bytes(b"A\n", b"1z\n").is_err());
		assert!(patch_bytes(b"A\n", b"1a\nunterminated\n").is_err());
		assert!(patch_bytes(b"A\n", b"1d trailing\n").is_err());
		assert!(patch_bytes(b"A\nB\n", b"2,1d\n").is_err());
	}

	#[test]
	fn deterministic_output_and_hash() {
		let base = b"Package: apt\nVersion: 2.4.7\n\n";
		let script = b"2c\nVersion: 2.4.8\n.\n";

		let (out1, res1) = patch_bytes(base, script).unwrap();
		let (out2, res2) = patch_bytes(base, script).unwrap();
		assert_eq!(out1, out2);
		assert_eq!(res1.sha256, res2.sha256);
		assert_eq!(res1.sha256.len(), 64);
	}

	#[test]
	fn file_based_patching_matches() {
		let dir = TempDir::new().unwrap();
		let base = dir.path().join("Packages");
		let patch = dir.path().join("Packages.ed");
		let out = dir.path().join("Packages.result");

		fs::write(&base, "A\nB\nC\nD\n").unwrap();
		fs::write(&patch, "3c\nX\n.\n1d\n").unwrap();

		let result = patch_file(&base, &patch, &out).unwrap();
		assert_eq!(fs::read(&out).unwrap(), b"B\nX\nD\n");

		let (_, mem_result) = patch_bytes(b"A\nB\nC\nD\n", b"3c\nX\n.\n1d\n").unwrap();
		assert_eq!(result.sha256, mem_result.sha256);

		// The output carries the patch's modification time.
		let patch_mtime = fs::metadata(&patch).unwrap().modified().unwrap();
		let out_mtime = fs::metadata(&out).unwrap().modified().unwrap();
		assert_eq!(patch_mtime, out_mtime);
	}
}
