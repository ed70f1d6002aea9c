mod common;

mod order {
	use apt_core::pkgmanager::{Action, PackageManager};

	use crate::common::{build_cache, index_stanza, installed_stanza};

	#[test]
	fn empty_plan() {
		let t = build_cache(&installed_stanza("tool", "1.0", ""), "");
		assert!(PackageManager::plan_install(&t.cache).unwrap().is_empty());
	}

	#[test]
	fn predepends_configure_before_dependent_unpack() {
		let t = build_cache(
			"",
			&[
				index_stanza("a", "1.0", "Pre-Depends: b\n"),
				index_stanza("b", "1.0", ""),
			]
			.concat(),
		);

		t.cache.get("a").unwrap().mark_install(true, true);
		assert_eq!(t.cache.depcache().broken_count(), 0);

		let actions = PackageManager::plan_install(&t.cache).unwrap();
		assert_eq!(actions, vec![
			Action::Unpack("b".to_string()),
			Action::Configure("b".to_string()),
			Action::Unpack("a".to_string()),
			Action::Configure("a".to_string()),
		]);
	}

	#[test]
	fn depends_order_in_configure_phase() {
		let t = build_cache(
			"",
			&[
				index_stanza("app", "1.0", "Depends: lib\n"),
				index_stanza("lib", "1.0", ""),
			]
			.concat(),
		);

		t.cache.get("app").unwrap().mark_install(true, true);
		let actions = PackageManager::plan_install(&t.cache).unwrap();

		// Both unpacks may happen before any configure, but lib must be
		// configured before app.
		let pos = |action: &Action| actions.iter().position(|a| a == action).unwrap();
		assert!(
			pos(&Action::Unpack("lib".to_string()))
				< pos(&Action::Configure("lib".to_string()))
		);
		assert!(
			pos(&Action::Configure("lib".to_string()))
				< pos(&Action::Configure("app".to_string()))
		);
		assert!(
			pos(&Action::Unpack("app".to_string()))
				< pos(&Action::Configure("app".to_string()))
		);
	}

	#[test]
	fn removals_come_first() {
		let t = build_cache(
			&installed_stanza("oldtool", "1.0", ""),
			&index_stanza("newtool", "1.0", ""),
		);

		t.cache.get("oldtool").unwrap().mark_delete(false);
		t.cache.get("newtool").unwrap().mark_install(true, true);

		let actions = PackageManager::plan_install(&t.cache).unwrap();
		assert_eq!(actions[0], Action::Remove("oldtool".to_string(), false));
		assert!(actions.contains(&Action::Unpack("newtool".to_string())));
	}

	#[test]
	fn essential_configures_immediately() {
		let t = build_cache(
			"",
			&[
				index_stanza("base", "1.0", "Essential: yes\n"),
				index_stanza("extra", "1.0", ""),
			]
			.concat(),
		);

		t.cache.get("base").unwrap().mark_install(true, true);
		t.cache.get("extra").unwrap().mark_install(true, true);

		let actions = PackageManager::plan_install(&t.cache).unwrap();
		let unpack = actions
			.iter()
			.position(|a| *a == Action::Unpack("base".to_string()))
			.unwrap();
		// Configure follows the unpack directly.
		assert_eq!(actions[unpack + 1], Action::Configure("base".to_string()));
	}

	#[test]
	fn dependent_blocks_removal_order() {
		// app depends on lib; removing both must deconfigure app before
		// lib goes away.
		let t = build_cache(
			&[
				installed_stanza("app", "1.0", "Depends: lib\n"),
				installed_stanza("lib", "1.0", ""),
			]
			.concat(),
			"",
		);

		t.cache.get("app").unwrap().mark_delete(false);
		t.cache.get("lib").unwrap().mark_delete(false);

		let actions = PackageManager::plan_install(&t.cache).unwrap();
		let app_pos = actions
			.iter()
			.position(|a| *a == Action::Remove("app".to_string(), false))
			.unwrap();
		let lib_pos = actions
			.iter()
			.position(|a| *a == Action::Remove("lib".to_string(), false))
			.unwrap();
		assert!(app_pos < lib_pos);
	}
}
