use super::*;
use crate::sections::Level;
use crate::test_support::packet_for_level;
use serde_json::json;

fn options() -> ExportOptions {
    ExportOptions {
        versioning: true,
        skip_validation: false,
        warn_on_invalid: false,
        force: false,
        source_hashes: BTreeMap::from([(
            "confirm/confirmed.jsonl".to_string(),
            "abc123".to_string(),
        )]),
        packaged_at: DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp"),
    }
}

fn invalid_packet() -> Value {
    let mut packet = packet_for_level(Level::One);
    if let Some(obj) = packet.as_object_mut() {
        obj.remove("flow");
    }
    packet
}

#[test]
fn written_packet_carries_packaging_provenance() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("job-status.json");
    let artifact = export(&packet_for_level(Level::One), ExportFormat::Json, &dest, &options())
        .expect("export");
    assert_eq!(artifact.path, dest);
    assert!(!artifact.versioned);

    let bytes = fs::read(&dest).expect("read export");
    assert_eq!(artifact.sha256, sha256_hex(&bytes));
    let written: Value = serde_json::from_slice(&bytes).expect("parse export");
    let packaging = &written["packaging"];
    assert_eq!(packaging["toolName"], json!(TOOL_NAME));
    assert_eq!(packaging["toolVersion"], json!(env!("CARGO_PKG_VERSION")));
    assert_eq!(packaging["packagedAt"], json!("2023-11-14T22:13:20Z"));
    assert_eq!(
        packaging["sourceHashes"]["confirm/confirmed.jsonl"],
        json!("abc123")
    );
    assert_eq!(packaging["validation"]["status"], json!("valid"));
    assert_eq!(packaging["validation"]["errorCount"], json!(0));
    assert_eq!(written["purpose"], packet_for_level(Level::One)["purpose"]);
}

#[test]
fn repeated_exports_derive_versioned_names_without_touching_prior_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("job-status.json");
    let packet = packet_for_level(Level::One);
    export(&packet, ExportFormat::Json, &dest, &options()).expect("first");
    let first = fs::read(&dest).expect("read first");

    let mut later = options();
    later.packaged_at = DateTime::from_timestamp(1_700_000_500, 0).expect("timestamp");
    let second = export(&packet, ExportFormat::Json, &dest, &later).expect("second");
    let third = export(&packet, ExportFormat::Json, &dest, &later).expect("third");

    assert_eq!(second.path, dir.path().join("job-status.v2.json"));
    assert_eq!(third.path, dir.path().join("job-status.v3.json"));
    assert!(second.versioned && third.versioned);
    assert_eq!(fs::read(&dest).expect("reread first"), first);
}

#[test]
fn exporting_over_a_versioned_copy_bumps_the_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = dir.path().join("job-status.json");
    let packet = packet_for_level(Level::One);
    export(&packet, ExportFormat::Json, &base, &options()).expect("base");
    let second = export(&packet, ExportFormat::Json, &base, &options()).expect("second");
    assert_eq!(second.path, dir.path().join("job-status.v2.json"));

    let third = export(&packet, ExportFormat::Json, &second.path, &options()).expect("third");
    assert_eq!(third.path, dir.path().join("job-status.v3.json"));
    assert!(!dir.path().join("job-status.v2.v2.json").exists());

    // a name that only looks versioned keeps its stem
    assert_eq!(
        next_versioned_path(&dir.path().join("release.vnext.json")),
        dir.path().join("release.vnext.v2.json")
    );
}

#[test]
fn collision_without_versioning_or_force_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("job-status.json");
    fs::write(&dest, "keep me").expect("seed");
    let mut opts = options();
    opts.versioning = false;
    let err = export(&packet_for_level(Level::One), ExportFormat::Json, &dest, &opts)
        .expect_err("collision");
    assert!(matches!(err, PipelineError::Collision { .. }));
    assert_eq!(fs::read_to_string(&dest).expect("read"), "keep me");

    opts.force = true;
    let artifact = export(&packet_for_level(Level::One), ExportFormat::Json, &dest, &opts)
        .expect("forced overwrite");
    assert_eq!(artifact.path, dest);
    assert_ne!(fs::read_to_string(&dest).expect("read"), "keep me");
}

#[test]
fn invalid_packets_fail_closed_by_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("job-status.json");
    let err = export(&invalid_packet(), ExportFormat::Json, &dest, &options())
        .expect_err("invalid");
    assert!(matches!(err, PipelineError::Invalid { stage: Stage::Export, .. }));
    assert!(!dest.exists());
    assert_eq!(fs::read_dir(dir.path()).expect("list").count(), 0);
}

#[test]
fn warn_on_invalid_writes_and_stamps_the_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("job-status.json");
    let mut opts = options();
    opts.warn_on_invalid = true;
    let artifact = export(&invalid_packet(), ExportFormat::Json, &dest, &opts).expect("warn");
    assert_eq!(artifact.packaging.validation.status, ValidationStatus::Invalid);
    assert_eq!(artifact.packaging.validation.error_count, 1);
    assert!(dest.exists());
}

#[test]
fn strictest_validation_policy_wins() {
    assert_eq!(ValidationPolicy::from_flags(false, false), ValidationPolicy::FailClosed);
    assert_eq!(ValidationPolicy::from_flags(true, false), ValidationPolicy::Skip);
    assert_eq!(ValidationPolicy::from_flags(false, true), ValidationPolicy::WarnAndWrite);
    assert_eq!(ValidationPolicy::from_flags(true, true), ValidationPolicy::WarnAndWrite);

    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("job-status.json");
    let mut opts = options();
    opts.skip_validation = true;
    let artifact = export(&invalid_packet(), ExportFormat::Json, &dest, &opts).expect("skip");
    assert_eq!(artifact.packaging.validation.status, ValidationStatus::Skipped);
}

#[test]
fn yaml_export_parses_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("job-status.yaml");
    let artifact = export(&packet_for_level(Level::Two), ExportFormat::Yaml, &dest, &options())
        .expect("yaml export");
    assert_eq!(artifact.format, ExportFormat::Yaml);
    let text = fs::read_to_string(&dest).expect("read yaml");
    let parsed: Value = serde_yaml::from_str(&text).expect("parse yaml");
    assert_eq!(parsed["packetId"], json!("job-status"));
    assert_eq!(parsed["packaging"]["validation"]["status"], json!("valid"));
    assert_eq!(ExportFormat::from_path(&dest), Some(ExportFormat::Yaml));
    assert_eq!(ExportFormat::from_path(Path::new("x.yml")), Some(ExportFormat::Yaml));
    assert_eq!(ExportFormat::from_path(Path::new("x.txt")), None);
}
