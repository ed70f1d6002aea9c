mod worker {
	use std::time::Duration;

	use apt_core::worker::{code, Stanza, Worker};

	#[test]
	fn stanza_round_trip() {
		let stanza = Stanza::new(600, "URI Acquire")
			.field("URI", "http://deb.debian.org/debian/dists/sid/InRelease")
			.field("Filename", "/var/lib/apt/lists/partial/InRelease");

		let wire = stanza.serialize();
		assert!(wire.starts_with("600 URI Acquire\n"));
		assert!(wire.ends_with("\n\n"));

		let lines: Vec<String> = wire
			.lines()
			.filter(|l| !l.is_empty())
			.map(|l| l.to_string())
			.collect();
		let parsed = Stanza::parse(&lines).unwrap();
		assert_eq!(parsed, stanza);
		assert_eq!(
			parsed.get("uri"),
			Some("http://deb.debian.org/debian/dists/sid/InRelease")
		);
	}

	#[test]
	fn stanza_rejects_garbage() {
		assert!(Stanza::parse(&[]).is_err());
		assert!(Stanza::parse(&["not a code".to_string()]).is_err());
		assert!(
			Stanza::parse(&["100 Capabilities".to_string(), "no separator".to_string()])
				.is_err()
		);
	}

	#[test]
	fn receives_from_subprocess() {
		let mut worker = Worker::spawn("fake-method", "sh", &[
			"-c",
			"printf '100 Capabilities\\nVersion: 1.2\\nSingle-Instance: true\\n\\n'",
		])
		.unwrap();
		worker.set_timeout(Duration::from_secs(10));

		let stanza = worker.recv_stanza().unwrap().unwrap();
		assert_eq!(stanza.status_code, code::CAPABILITIES);
		assert_eq!(stanza.message, "Capabilities");
		assert_eq!(stanza.get("Version"), Some("1.2"));

		// Clean end of stream, clean exit.
		assert!(worker.recv_stanza().unwrap().is_none());
		worker.wait().unwrap();
	}

	#[test]
	fn unknown_codes_are_skipped() {
		let mut worker = Worker::spawn("chatty", "sh", &[
			"-c",
			"printf '999 Whatever\\n\\n201 URI Done\\nURI: http://x/y\\n\\n'",
		])
		.unwrap();
		worker.set_timeout(Duration::from_secs(10));

		let stanza = worker.recv_known().unwrap().unwrap();
		assert_eq!(stanza.status_code, code::URI_DONE);
		worker.wait().unwrap();
	}

	#[test]
	fn failing_worker_reports_status() {
		let worker = Worker::spawn("doomed", "sh", &["-c", "exit 7"]).unwrap();
		let err = worker.wait().unwrap_err();
		assert!(err.to_string().contains('7'), "got: {err}");
	}

	#[test]
	fn round_trip_through_cat() {
		let mut worker = Worker::spawn("echo", "cat", &[]).unwrap();
		worker.set_timeout(Duration::from_secs(10));

		let sent = Stanza::new(601, "Configuration").field("Config-Item", "APT::Architecture=amd64");
		worker.send_stanza(&sent).unwrap();

		let got = worker.recv_stanza().unwrap().unwrap();
		assert_eq!(got, sent);

		worker.wait().unwrap();
	}
}
