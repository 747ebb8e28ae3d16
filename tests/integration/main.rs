//! Integration tests for depcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    const BASE_CONFIG: &str = r#"
[general]
audit_log = false

[storage]
local = "cache"

[[dependencies]]
name = "left-pad"
kind = "registry"
version = "1.3.0"
"#;

    fn depcache() -> Command {
        let mut cmd = cargo_bin_cmd!("depcache");
        cmd.env_remove("DEPCACHE_CONFIG");
        cmd
    }

    fn project(extra: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("depcache.toml"), format!("{BASE_CONFIG}{extra}")).unwrap();
        dir
    }

    fn fingerprint_of(dir: &Path, dev: bool) -> String {
        let mut cmd = depcache();
        cmd.current_dir(dir).arg("fingerprint");
        if dev {
            cmd.arg("--dev");
        }
        let output = cmd.output().unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout)
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .to_string()
    }

    #[test]
    fn help_displays() {
        depcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("tiered dependency cache"))
            .stdout(predicate::str::contains("invalidate-all-except-current"));
    }

    #[test]
    fn version_displays() {
        depcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("depcache"));
    }

    #[test]
    fn missing_config_reports_hint() {
        let dir = TempDir::new().unwrap();
        depcache()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"))
            .stderr(predicate::str::contains("depcache init"));
    }

    #[test]
    fn init_then_fingerprint() {
        let dir = TempDir::new().unwrap();
        depcache().current_dir(dir.path()).arg("init").assert().success();
        assert!(dir.path().join("depcache.toml").exists());

        depcache()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));

        let fp = fingerprint_of(dir.path(), false);
        assert_eq!(fp.len(), 32);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_is_stable_and_variant_sensitive() {
        let dev_deps = r#"
[[dev_dependencies]]
name = "mocha"
kind = "registry"
version = "10.2.0"
"#;
        let dir = project(dev_deps);

        let prod = fingerprint_of(dir.path(), false);
        assert_eq!(prod, fingerprint_of(dir.path(), false));
        assert_ne!(prod, fingerprint_of(dir.path(), true));
    }

    #[test]
    fn fingerprint_json_lists_blobs() {
        let dir = project("");
        depcache()
            .current_dir(dir.path())
            .args(["fingerprint", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"blobs\""))
            .stdout(predicate::str::contains("node_modules_prod_"))
            .stdout(predicate::str::contains("libs_prod_"));
    }

    #[test]
    fn duplicate_dependency_rejected() {
        let duplicate = r#"
[[dependencies]]
name = "left-pad"
kind = "registry"
version = "1.2.0"
"#;
        let dir = project(duplicate);
        depcache()
            .current_dir(dir.path())
            .arg("fingerprint")
            .assert()
            .failure()
            .stderr(predicate::str::contains("left-pad"));
    }

    #[test]
    fn invalidate_all_clears_local_store() {
        let dir = project("");
        let store = dir.path().join("cache");
        std::fs::create_dir_all(&store).unwrap();
        std::fs::write(store.join("node_modules_prod_old.tar.gz"), "x").unwrap();
        std::fs::write(store.join("libs_prod_old.tar.gz"), "x").unwrap();

        depcache()
            .current_dir(dir.path())
            .args(["invalidate-all", "--target", "local"])
            .assert()
            .success()
            .stdout(predicate::str::contains("removed 2 file(s)"));

        assert_eq!(std::fs::read_dir(&store).unwrap().count(), 0);
    }

    #[test]
    fn invalidate_shared_without_shared_storage_fails() {
        let dir = project("");
        depcache()
            .current_dir(dir.path())
            .args(["invalidate-exact", "--target", "shared"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("storage.shared"));
    }

    #[cfg(unix)]
    #[test]
    fn second_install_is_served_from_local_cache() {
        let installer = r#"
[installer]
commands = [
    ["sh", "-c", "mkdir -p node_modules/left-pad && echo ok > node_modules/left-pad/index.js"],
    ["sh", "-c", "echo run >> install.log"],
]
timeout_secs = 60
"#;
        let dir = project(installer);
        let installed = dir.path().join("node_modules/left-pad/index.js");

        depcache()
            .current_dir(dir.path())
            .args(["install", "--no-shared"])
            .assert()
            .success();
        assert!(installed.exists());
        // Generated installer manifests are removed after the run
        assert!(!dir.path().join("package.json").exists());

        std::fs::remove_dir_all(dir.path().join("node_modules")).unwrap();

        depcache()
            .current_dir(dir.path())
            .args(["install", "--no-shared"])
            .assert()
            .success()
            .stdout(predicate::str::contains("local"));
        assert!(installed.exists());

        let runs = std::fs::read_to_string(dir.path().join("install.log")).unwrap();
        assert_eq!(runs.lines().count(), 1);

        depcache()
            .current_dir(dir.path())
            .args(["status", "--no-shared"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cached"))
            .stdout(predicate::str::contains("disabled"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_installer_reports_error() {
        let installer = r#"
[installer]
commands = [["sh", "-c", "exit 3"]]
"#;
        let dir = project(installer);
        depcache()
            .current_dir(dir.path())
            .args(["install", "--no-shared"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
        assert!(!dir.path().join("package.json").exists());
    }
}
