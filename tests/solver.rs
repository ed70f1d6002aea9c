mod common;

mod solver {
	use apt_core::solver::Solver;

	use crate::common::{build_cache, index_stanza, installed_stanza};

	#[test]
	fn simple_install() {
		let t = build_cache(
			"",
			&[
				index_stanza("a", "1.0", "Depends: b (>= 2)\n"),
				index_stanza("b", "1", ""),
				index_stanza("b", "2", ""),
			]
			.concat(),
		);

		let a = t.cache.get("a").unwrap();
		a.mark_install(false, true);

		Solver::new(&t.cache).solve().unwrap();

		assert!(t.cache.get("a").unwrap().marked_install());
		let b = t.cache.get("b").unwrap();
		assert!(b.marked_install());
		assert_eq!(b.install_version().unwrap().version(), "2");
		assert_eq!(t.cache.depcache().broken_count(), 0);
	}

	#[test]
	fn keeps_unrelated_installed_packages() {
		let t = build_cache(
			&installed_stanza("steady", "1.0", ""),
			&[index_stanza("a", "1.0", ""), index_stanza("steady", "1.0", "")].concat(),
		);

		let a = t.cache.get("a").unwrap();
		a.mark_install(false, true);

		Solver::new(&t.cache).solve().unwrap();

		assert!(t.cache.get("a").unwrap().marked_install());
		assert!(t.cache.get("steady").unwrap().marked_keep());
	}

	#[test]
	fn backtracks_over_conflicting_alternative() {
		// a depends on x or y; x conflicts with the installed c, so the
		// solver must settle on y.
		let t = build_cache(
			&installed_stanza("c", "1.0", ""),
			&[
				index_stanza("a", "1.0", "Depends: x | y\n"),
				index_stanza("x", "1.0", "Conflicts: c\n"),
				index_stanza("y", "1.0", ""),
				index_stanza("c", "1.0", ""),
			]
			.concat(),
		);
		let a = t.cache.get("a").unwrap();
		a.mark_install(false, true);

		Solver::new(&t.cache).solve().unwrap();

		// c stays, so the conflicting x was learned away and y wins.
		assert!(t.cache.get("a").unwrap().marked_install());
		assert!(t.cache.get("y").unwrap().marked_install());
		assert!(!t.cache.get("x").unwrap().marked_install());
		assert!(!t.cache.get("c").unwrap().marked_delete());
		assert_eq!(t.cache.depcache().broken_count(), 0);
	}

	#[test]
	fn unsatisfiable_reports_witness() {
		let t = build_cache(
			"",
			&index_stanza("a", "1.0", "Depends: ghost (>= 5)\n"),
		);

		let a = t.cache.get("a").unwrap();
		a.mark_install(false, true);

		let err = Solver::new(&t.cache).solve().unwrap_err();
		let msg = err.to_string();
		assert!(msg.contains("no installable candidate"), "got: {msg}");
	}

	#[test]
	fn hold_binds_to_current_version() {
		let status = "Package: held\n\
			Status: hold ok installed\n\
			Priority: optional\n\
			Architecture: amd64\n\
			Version: 1.0\n\n";
		let t = build_cache(status, &index_stanza("held", "2.0", ""));

		Solver::new(&t.cache).solve().unwrap();

		let held = t.cache.get("held").unwrap();
		assert!(held.marked_keep());
		assert_eq!(held.install_version().unwrap().version(), "1.0");
	}
}
