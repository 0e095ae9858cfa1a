//! Integration tests for the provisioning orchestrator
//!
//! The two host-facing collaborators are replaced by call-recording doubles
//! so the full create sequence runs against a scratch filesystem, without
//! root and without touching systemd or nginx.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bizcalc_onboard::config::{Config, PathsConfig, PortRangeConfig, ServerConfig};
use bizcalc_onboard::error::ProvisionError;
use bizcalc_onboard::orchestrator::Provisioner;
use bizcalc_onboard::proxy::ProxyManager;
use bizcalc_onboard::supervisor::ServiceManager;
use tempfile::TempDir;

/// Journal of every host-facing call, in invocation order
#[derive(Default)]
struct HostJournal {
    calls: Mutex<Vec<String>>,
    units: Mutex<HashMap<String, String>>,
    rules: Mutex<HashMap<String, String>>,
}

impl HostJournal {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn unit(&self, name: &str) -> Option<String> {
        self.units.lock().unwrap().get(name).cloned()
    }

    fn unit_count(&self) -> usize {
        self.units.lock().unwrap().len()
    }

    fn rule(&self, name: &str) -> Option<String> {
        self.rules.lock().unwrap().get(name).cloned()
    }

    fn rule_count(&self) -> usize {
        self.rules.lock().unwrap().len()
    }
}

/// Supervisor double that records calls instead of driving systemctl
struct RecordingServices {
    journal: Arc<HostJournal>,
}

impl ServiceManager for RecordingServices {
    fn upsert_unit(&self, name: &str, unit: &str) -> Result<(), ProvisionError> {
        self.journal.record(format!("unit-upsert:{}", name));
        self.journal
            .units
            .lock()
            .unwrap()
            .insert(name.to_string(), unit.to_string());
        Ok(())
    }

    fn reload_catalog(&self) -> Result<(), ProvisionError> {
        self.journal.record("daemon-reload".to_string());
        Ok(())
    }

    fn enable_and_start(&self, name: &str) -> Result<(), ProvisionError> {
        self.journal.record(format!("enable-and-start:{}", name));
        Ok(())
    }
}

/// Proxy double that writes rules into a scratch directory
struct RecordingProxy {
    journal: Arc<HostJournal>,
    rules_dir: PathBuf,
    fail_validation: bool,
}

impl ProxyManager for RecordingProxy {
    fn upsert_rule(&self, name: &str, rule: &str) -> Result<PathBuf, ProvisionError> {
        self.journal.record(format!("rule-upsert:{}", name));
        self.journal
            .rules
            .lock()
            .unwrap()
            .insert(name.to_string(), rule.to_string());
        let path = self.rules_dir.join(name);
        fs::write(&path, rule).unwrap();
        Ok(path)
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        self.journal.record("validate".to_string());
        if self.fail_validation {
            return Err(ProvisionError::Proxy("nginx -t failed".to_string()));
        }
        Ok(())
    }

    fn reload(&self) -> Result<(), ProvisionError> {
        self.journal.record("reload".to_string());
        Ok(())
    }
}

/// Scratch host: seeded artifacts, recording doubles, wired provisioner
struct TestHost {
    _tmp: TempDir,
    journal: Arc<HostJournal>,
    paths: PathsConfig,
    rules_dir: PathBuf,
    provisioner: Provisioner,
}

fn test_host() -> TestHost {
    test_host_with(false)
}

fn test_host_with(fail_validation: bool) -> TestHost {
    let tmp = TempDir::new().unwrap();

    let paths = PathsConfig {
        base_dir: tmp.path().join("bizcalc"),
        systemd_dir: tmp.path().join("systemd"),
        sites_available: tmp.path().join("sites-available"),
        sites_enabled: tmp.path().join("sites-enabled"),
        run_as: "www-data".to_string(),
    };

    // Shared artifacts every deployment needs
    fs::create_dir_all(paths.base_dir.join("bin")).unwrap();
    fs::write(paths.backend_binary(), b"#!/bin/sh\n").unwrap();
    fs::create_dir_all(paths.frontend_dist().join("assets")).unwrap();
    fs::write(paths.frontend_dist().join("index.html"), b"<html></html>").unwrap();
    fs::write(paths.frontend_dist().join("assets/app.js"), b"// app").unwrap();

    let rules_dir = tmp.path().join("rules");
    fs::create_dir_all(&rules_dir).unwrap();

    let config = Config {
        server: ServerConfig::default(),
        paths: paths.clone(),
        ports: PortRangeConfig {
            start: 3001,
            end: 3999,
        },
    };

    let journal = Arc::new(HostJournal::default());
    let services = Box::new(RecordingServices {
        journal: Arc::clone(&journal),
    });
    let proxy = Box::new(RecordingProxy {
        journal: Arc::clone(&journal),
        rules_dir: rules_dir.clone(),
        fail_validation,
    });

    TestHost {
        provisioner: Provisioner::new(config, services, proxy),
        journal,
        paths,
        rules_dir,
        _tmp: tmp,
    }
}

#[test]
fn test_create_client_end_to_end() {
    let host = test_host();

    let record = host
        .provisioner
        .create_client("acme", "acme.example.com", None)
        .unwrap();

    assert_eq!(record.id, "acme");
    assert_eq!(record.hostname, "acme.example.com");
    assert!(
        (3001..=3999).contains(&record.port),
        "allocated port {} outside configured range",
        record.port
    );

    // Directory subtree
    let client_dir = host.paths.clients_dir().join("acme");
    assert!(client_dir.join("frontend/index.html").is_file());
    assert!(client_dir.join("frontend/assets/app.js").is_file());
    assert!(client_dir.join("data").is_dir());
    assert!(client_dir.join("uploads").is_dir());

    // Host-facing calls, in the fixed orchestration order
    assert_eq!(
        host.journal.calls(),
        vec![
            "unit-upsert:bizcalc-client-acme".to_string(),
            "daemon-reload".to_string(),
            "enable-and-start:bizcalc-client-acme".to_string(),
            "rule-upsert:bizcalc-acme.conf".to_string(),
            "validate".to_string(),
            "reload".to_string(),
        ]
    );

    // Generated descriptors embed the allocated port
    let unit = host.journal.unit("bizcalc-client-acme").unwrap();
    assert!(unit.contains(&format!("Environment=PORT={}", record.port)));
    assert!(unit.contains(&format!("WorkingDirectory={}", client_dir.display())));
    assert!(unit.contains("Restart=always"));

    let rule = host.journal.rule("bizcalc-acme.conf").unwrap();
    assert!(rule.contains("server_name acme.example.com;"));
    assert!(rule.contains(&format!("proxy_pass http://127.0.0.1:{}/;", record.port)));
    assert!(rule.contains(&format!("root {};", client_dir.join("frontend").display())));
}

#[test]
fn test_port_hint_is_used_verbatim() {
    let host = test_host();

    let record = host
        .provisioner
        .create_client("acme", "acme.example.com", Some(4555))
        .unwrap();

    assert_eq!(record.port, 4555);
    let unit = host.journal.unit("bizcalc-client-acme").unwrap();
    assert!(unit.contains("Environment=PORT=4555"));
}

#[test]
fn test_zero_port_hint_means_auto_allocate() {
    let host = test_host();

    let record = host
        .provisioner
        .create_client("acme", "acme.example.com", Some(0))
        .unwrap();

    assert!((3001..=3999).contains(&record.port));
}

#[test]
fn test_rerun_converges_to_single_artifact_set() {
    let host = test_host();

    host.provisioner
        .create_client("acme", "acme.example.com", Some(3100))
        .unwrap();

    // Client-owned state written between runs, plus a stale frontend file
    let client_dir = host.paths.clients_dir().join("acme");
    fs::write(client_dir.join("data/db.sqlite"), b"state").unwrap();
    fs::write(client_dir.join("uploads/logo.png"), b"png").unwrap();
    fs::write(client_dir.join("frontend/stale.js"), b"old").unwrap();

    host.provisioner
        .create_client("acme", "acme.example.com", Some(3100))
        .unwrap();

    // Exactly one unit and one rule for the client, no duplicates
    assert_eq!(host.journal.unit_count(), 1);
    assert_eq!(host.journal.rule_count(), 1);

    // Client-owned state survives; the frontend copy is replaced wholesale
    assert!(client_dir.join("data/db.sqlite").is_file());
    assert!(client_dir.join("uploads/logo.png").is_file());
    assert!(!client_dir.join("frontend/stale.js").exists());
    assert!(client_dir.join("frontend/index.html").is_file());

    // Same id and port: the second run regenerates identical descriptors
    assert_eq!(host.journal.calls().len(), 12);
}

#[test]
fn test_missing_backend_binary_fails_before_side_effects() {
    let host = test_host();
    fs::remove_file(host.paths.backend_binary()).unwrap();

    let err = host
        .provisioner
        .create_client("acme", "acme.example.com", None)
        .unwrap_err();

    match err {
        ProvisionError::MissingArtifact { path } => {
            assert_eq!(path, host.paths.backend_binary());
        }
        other => panic!("expected MissingArtifact, got {other}"),
    }

    // No directory, unit, or rule was created
    assert!(!host.paths.clients_dir().exists());
    assert!(host.journal.calls().is_empty());
    assert_eq!(fs::read_dir(&host.rules_dir).unwrap().count(), 0);
}

#[test]
fn test_invalid_id_is_rejected_up_front() {
    let host = test_host();

    for id in ["", "acme corp", "acme_co", "acme!"] {
        let err = host
            .provisioner
            .create_client(id, "acme.example.com", None)
            .unwrap_err();
        assert!(
            matches!(err, ProvisionError::InvalidClientId(_)),
            "{id:?} should be rejected"
        );
    }

    assert!(host.journal.calls().is_empty());
    assert!(!host.paths.clients_dir().exists());
}

#[test]
fn test_hyphen_only_id_is_accepted() {
    // Known boundary case: stripping hyphens for the alphanumeric check
    // leaves nothing to test, so an all-hyphen id passes validation and
    // provisions a deployment keyed "---".
    let host = test_host();

    let record = host
        .provisioner
        .create_client("---", "dashes.example.com", Some(3200))
        .unwrap();

    assert_eq!(record.id, "---");
    assert!(host.journal.unit("bizcalc-client----").is_some());
    assert!(host.journal.rule("bizcalc----.conf").is_some());
}

#[test]
fn test_validation_failure_skips_reload_and_keeps_rule() {
    let host = test_host_with(true);

    let err = host
        .provisioner
        .create_client("acme", "acme.example.com", Some(3300))
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Proxy(_)));

    // The reload was never attempted
    let calls = host.journal.calls();
    assert!(calls.contains(&"validate".to_string()));
    assert!(!calls.contains(&"reload".to_string()));

    // The already-written rule is not rolled back; the next successful run
    // overwrites it
    assert!(host.rules_dir.join("bizcalc-acme.conf").is_file());

    // The supervisor side completed before the proxy failed
    assert!(calls.contains(&"enable-and-start:bizcalc-client-acme".to_string()));
}

#[test]
fn test_other_clients_are_never_touched() {
    let host = test_host();

    host.provisioner
        .create_client("acme", "acme.example.com", Some(3400))
        .unwrap();
    let acme_dir = host.paths.clients_dir().join("acme");
    fs::write(acme_dir.join("data/db.sqlite"), b"state").unwrap();

    host.provisioner
        .create_client("globex", "globex.example.com", Some(3401))
        .unwrap();

    // Two disjoint artifact sets
    assert_eq!(host.journal.unit_count(), 2);
    assert_eq!(host.journal.rule_count(), 2);
    assert!(host.journal.unit("bizcalc-client-acme").is_some());
    assert!(host.journal.unit("bizcalc-client-globex").is_some());

    // The first client's state is untouched by the second create
    assert!(acme_dir.join("data/db.sqlite").is_file());
    assert!(acme_dir.join("frontend/index.html").is_file());
}
