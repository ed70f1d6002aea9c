mod depends {
	use apt_core::listparser::{parse_dep_element, parse_depends, DependsOpts};
	use apt_core::raw::dep;

	fn opts(arch: &str) -> DependsOpts {
		DependsOpts {
			host_arch: arch.to_string(),
			parse_arch_flags: true,
			strip_multi_arch: true,
			parse_restrictions: true,
			profiles: vec!["stage1".to_string()],
		}
	}

	#[test]
	fn multi_arch_strip() {
		let (_, parsed, _) = parse_dep_element("debhelper:any (>= 5.0)", &opts("amd64")).unwrap();
		let parsed = parsed.unwrap();
		assert_eq!(parsed.name, "debhelper");
		assert_eq!(parsed.version, "5.0");
		assert_eq!(parsed.op, dep::GREATER_EQ);

		let mut keep = opts("amd64");
		keep.strip_multi_arch = false;
		let (_, parsed, _) = parse_dep_element("debhelper:any (>= 5.0)", &keep).unwrap();
		assert_eq!(parsed.unwrap().name, "debhelper:any");
	}

	#[test]
	fn operators() {
		let cases = [
			("pkg (<= 0.12)", dep::LESS_EQ, "0.12"),
			("pkg (< 0.12)", dep::LESS_EQ, "0.12"),
			("pkg (<< 0.12)", dep::LESS, "0.12"),
			("pkg (>= 0.12)", dep::GREATER_EQ, "0.12"),
			("pkg (> 0.12)", dep::GREATER_EQ, "0.12"),
			("pkg (>> 0.12)", dep::GREATER, "0.12"),
			("pkg (= 0.12)", dep::EQUALS, "0.12"),
		];
		for (input, op, version) in cases {
			let (_, parsed, _) = parse_dep_element(input, &opts("amd64")).unwrap();
			let parsed = parsed.unwrap();
			assert_eq!(parsed.op, op, "input {input}");
			assert_eq!(parsed.version, version);
		}

		let (_, parsed, _) = parse_dep_element("docbook-xml", &opts("amd64")).unwrap();
		let parsed = parsed.unwrap();
		assert_eq!(parsed.op, dep::NO_OP);
		assert_eq!(parsed.version, "");
	}

	#[test]
	fn or_groups() {
		let groups = parse_depends(
			"libcurl4-gnutls-dev:native | libcurl3-gnutls-dev (>> 7.15.5), docbook-xml",
			&opts("amd64"),
		)
		.unwrap();

		assert_eq!(groups.len(), 2);
		assert_eq!(groups[0].len(), 2);
		assert_eq!(groups[0][0].name, "libcurl4-gnutls-dev");
		assert_eq!(groups[0][1].name, "libcurl3-gnutls-dev");
		assert_eq!(groups[0][1].op, dep::GREATER);
		assert_eq!(groups[1].len(), 1);
		assert_eq!(groups[1][0].name, "docbook-xml");
	}

	#[test]
	fn arch_filters() {
		let host = opts("amd64");

		let (_, parsed, _) = parse_dep_element("not-for-me [ !amd64 ]", &host).unwrap();
		assert!(parsed.is_none());

		let (_, parsed, _) = parse_dep_element("only-for-me [ amd64 ]", &host).unwrap();
		assert_eq!(parsed.unwrap().name, "only-for-me");

		let (_, parsed, _) = parse_dep_element("any-for-me [ any ]", &host).unwrap();
		assert!(parsed.is_some());

		let (_, parsed, _) = parse_dep_element("not-for-darwin [ !darwin-any ]", &host).unwrap();
		assert!(parsed.is_some());

		let (_, parsed, _) = parse_dep_element("cpu-for-me [ any-amd64 ]", &host).unwrap();
		assert!(parsed.is_some());

		let (_, parsed, _) = parse_dep_element("os-for-me [ linux-any ]", &host).unwrap();
		assert!(parsed.is_some());

		let (_, parsed, _) = parse_dep_element("libc-for-me [ gnu-linux-any ]", &host).unwrap();
		assert!(parsed.is_some());

		let (_, parsed, _) =
			parse_dep_element("libc-not-for-me [ musl-linux-any ]", &host).unwrap();
		assert!(parsed.is_none());

		let (_, parsed, _) = parse_dep_element("cpu-not-for-me [ any-armel ]", &host).unwrap();
		assert!(parsed.is_none());

		let (_, parsed, _) = parse_dep_element("os-not-for-me [ kfreebsd-any ]", &host).unwrap();
		assert!(parsed.is_none());
	}

	#[test]
	fn arch_filtered_or_group() {
		// On an amd64 host only the first alternative survives.
		let groups =
			parse_depends("libc6 [amd64] | libc6.1 [ia64]", &opts("amd64")).unwrap();
		assert_eq!(groups.len(), 1);
		assert_eq!(groups[0].len(), 1);
		assert_eq!(groups[0][0].name, "libc6");

		// On armel neither applies and the group vanishes.
		let groups =
			parse_depends("libc6 [amd64] | libc6.1 [ia64]", &opts("armel")).unwrap();
		assert!(groups.is_empty());
	}

	#[test]
	fn build_profiles() {
		let host = opts("amd64");

		let (_, parsed, _) = parse_dep_element("not-in-stage1 <!stage1>", &host).unwrap();
		assert!(parsed.is_none());

		let (_, parsed, _) =
			parse_dep_element("not-stage1-and-not-nodoc <!nodoc !stage1>", &host).unwrap();
		assert!(parsed.is_none());

		// Two groups are alternatives: !nodoc holds, so the dep stays.
		let (_, parsed, _) =
			parse_dep_element("not-stage1-or-not-nodoc <!nodoc> <!stage1>", &host).unwrap();
		assert!(parsed.is_some());

		let (_, parsed, _) =
			parse_dep_element("unknown-profile <unknown stage1>", &host).unwrap();
		assert!(parsed.is_none());
	}

	#[test]
	fn rejects_malformed() {
		let host = opts("amd64");
		assert!(parse_dep_element("", &host).is_err());
		assert!(parse_dep_element("pkg (>= 1.0", &host).is_err());
		assert!(parse_dep_element("pkg ()", &host).is_err());
		assert!(parse_dep_element("pkg [amd64", &host).is_err());

		let mut no_arch = host.clone();
		no_arch.parse_arch_flags = false;
		assert!(parse_dep_element("pkg [amd64]", &no_arch).is_err());
	}
}
