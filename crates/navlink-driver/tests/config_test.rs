//! Configuration files and the default last-connection location.

use std::fs;

use navlink_driver::{AppContext, DriverConfig, LastConnection};
use serial_test::serial;

/// Run `f` with the working directory set to a fresh scratch directory.
fn in_scratch_dir(f: impl FnOnce(&std::path::Path)) {
    let dir = tempfile::tempdir().unwrap();
    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();
    f(dir.path());
    std::env::set_current_dir(previous).unwrap();
}

#[test]
#[serial]
fn test_default_path_is_under_working_directory() {
    in_scratch_dir(|dir| {
        let ctx = AppContext::default();
        assert!(ctx.last_connection.load().is_none());
        let record = LastConnection {
            port: "COM7".into(),
            baud: 460_800,
            device_type: "openrtk".into(),
        };
        ctx.last_connection.save(&record).unwrap();
        assert!(dir.join(".navlink").join("connection.json").exists());

        let reopened = AppContext::default();
        assert_eq!(reopened.last_connection.load(), Some(record));
    });
}

#[test]
#[serial]
fn test_corrupt_record_means_no_history() {
    in_scratch_dir(|dir| {
        fs::create_dir_all(dir.join(".navlink")).unwrap();
        fs::write(dir.join(".navlink").join("connection.json"), b"\0\0garbage").unwrap();
        assert!(AppContext::default().last_connection.load().is_none());
    });
}

#[test]
fn test_yaml_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("navlink.yaml");
    fs::write(
        &path,
        "discovery:\n  baud_rates: [460800]\n  max_threads: 1\nupgrade:\n  block_size: 192\n  bootloader_baud: 57600\n",
    )
    .unwrap();
    let config = DriverConfig::load(&path).unwrap();
    assert_eq!(config.discovery.baud_rates, vec![460_800]);
    assert_eq!(config.discovery.max_threads, 1);
    assert_eq!(config.upgrade.block_size, 192);
    assert_eq!(config.upgrade.bootloader_baud, Some(57_600));
    assert_eq!(config.transaction, DriverConfig::default().transaction);

    assert!(DriverConfig::load(&dir.path().join("missing.yaml")).is_err());
}
