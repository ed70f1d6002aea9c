mod util {
	use std::cmp::Ordering;

	use apt_core::util;

	#[test]
	fn cmp_versions() {
		let ver1 = "5.0";
		let ver2 = "6.0";

		assert_eq!(Ordering::Less, util::cmp_versions(ver1, ver2));
		assert_eq!(Ordering::Equal, util::cmp_versions(ver1, ver1));
		assert_eq!(Ordering::Greater, util::cmp_versions(ver2, ver1));
	}

	#[test]
	fn cmp_versions_epochs() {
		assert_eq!(Ordering::Greater, util::cmp_versions("1:0.4", "10.3"));
		assert_eq!(Ordering::Less, util::cmp_versions("1:1.25-4", "1:1.25-8"));
		assert_eq!(Ordering::Equal, util::cmp_versions("0:1.18.36", "1.18.36"));
		assert_eq!(Ordering::Greater, util::cmp_versions("1.18.36", "1.18.35"));
		assert_eq!(Ordering::Greater, util::cmp_versions("0:1.18.36", "1.18.35"));
	}

	#[test]
	fn cmp_versions_revisions() {
		assert_eq!(Ordering::Equal, util::cmp_versions("1.0", "1.0-0"));
		assert_eq!(Ordering::Greater, util::cmp_versions("7.6p2-4", "7.6-0"));
		assert_eq!(Ordering::Greater, util::cmp_versions("1.0.3-3", "1.0-1"));
		assert_eq!(Ordering::Greater, util::cmp_versions("1.3", "1.2.2-2"));
		assert_eq!(Ordering::Greater, util::cmp_versions("1.3", "1.2.2"));
		assert_eq!(
			Ordering::Greater,
			util::cmp_versions("1.18.36-0.17.35-18", "1.18.36-19")
		);
	}

	#[test]
	fn cmp_versions_tilde() {
		assert_eq!(Ordering::Less, util::cmp_versions("3.0~rc1-1", "3.0-1"));
		assert_eq!(
			Ordering::Less,
			util::cmp_versions("1.4+OOo3.0.0~", "1.4+OOo3.0.0-4")
		);
		assert_eq!(Ordering::Less, util::cmp_versions("1.0~beta1", "1.0"));
		assert_eq!(Ordering::Less, util::cmp_versions("1.0~~", "1.0~"));
	}

	#[test]
	fn cmp_versions_text() {
		assert_eq!(Ordering::Equal, util::cmp_versions("0-pre", "0-pre"));
		assert_eq!(Ordering::Less, util::cmp_versions("0-pre", "0-pree"));
		assert_eq!(Ordering::Greater, util::cmp_versions("1.1.6r2-2", "1.1.6r-1"));
		assert_eq!(Ordering::Greater, util::cmp_versions("2.6b2-1", "2.6b-2"));
		assert_eq!(Ordering::Less, util::cmp_versions("98.1p5-1", "98.1-pre2-b6-2"));
		assert_eq!(Ordering::Greater, util::cmp_versions("0.4a6-2", "0.4-1"));
		assert_eq!(Ordering::Less, util::cmp_versions("1:3.0.5-2", "1:3.0.5.1"));
	}

	#[test]
	fn cmp_versions_strangeness() {
		// Funky, but allowed, characters in the upstream version.
		assert_eq!(
			Ordering::Less,
			util::cmp_versions("9:1.18.36:5.4-20", "10:0.5.1-22")
		);
		assert_eq!(
			Ordering::Less,
			util::cmp_versions("9:1.18.36:5.4-20", "9:1.18.36:5.5-1")
		);
		assert_eq!(
			Ordering::Less,
			util::cmp_versions("9:1.18.36:5.4-20", " 9:1.18.37:4.3-22")
		);
	}

	#[test]
	fn cmp_is_antisymmetric_and_transitive() {
		let versions = ["1.0~rc1", "1.0", "1.0-1", "1.0-2", "1:0.5", "2.0"];
		for a in versions {
			assert_eq!(Ordering::Equal, util::cmp_versions(a, a));
			for b in versions {
				assert_eq!(
					util::cmp_versions(a, b),
					util::cmp_versions(b, a).reverse()
				);
				for c in versions {
					if util::cmp_versions(a, b) == Ordering::Less
						&& util::cmp_versions(b, c) == Ordering::Less
					{
						assert_eq!(Ordering::Less, util::cmp_versions(a, c));
					}
				}
			}
		}
	}

	#[test]
	fn check_dep() {
		use apt_core::raw::dep;

		assert!(util::check_dep("2.0", dep::GREATER_EQ, "2.0"));
		assert!(util::check_dep("2.1", dep::GREATER_EQ, "2.0"));
		assert!(!util::check_dep("1.9", dep::GREATER_EQ, "2.0"));
		assert!(util::check_dep("1.9", dep::LESS, "2.0"));
		assert!(!util::check_dep("2.0", dep::LESS, "2.0"));
		assert!(util::check_dep("2.0", dep::EQUALS, "2.0"));
		assert!(util::check_dep("anything", dep::NO_OP, ""));
	}

	#[test]
	fn progress_string() {
		assert_eq!("[####....]", util::get_apt_progress_string(0.5, 10));
		assert_eq!("[........]", util::get_apt_progress_string(0.0, 10));
		assert_eq!("[########]", util::get_apt_progress_string(1.0, 10));
	}

	#[test]
	fn units() {
		assert_eq!("100 B", util::unit_str(100, util::NumSys::Decimal));
		assert_eq!("4.00 KiB", util::unit_str(4096, util::NumSys::Binary));
		assert_eq!("1.50 KB", util::unit_str(1500, util::NumSys::Decimal));
	}
}
