use portability::config::ConfigLoader;
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        env::remove_var("PORTABILITY_PROFILE");
        env::remove_var("PORTABILITY_API_BIND_ADDR");
        env::remove_var("PORTABILITY_LOG_LEVEL");
        env::remove_var("PORTABILITY_PLUGINS");
        env::remove_var("PORTABILITY_MAX_UPLOAD_MB");
        env::remove_var("PORTABILITY_WORK_DIR");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.max_upload_mb, 256);
    assert!(cfg.seed_reference_data);
    assert!(cfg.plugins.is_empty());
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "PORTABILITY_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "PORTABILITY_API_BIND_ADDR=192.168.0.10:5000\nPORTABILITY_PLUGINS=changelog\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "PORTABILITY_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "PORTABILITY_PROFILE=test\nPORTABILITY_API_BIND_ADDR=127.0.0.1:4000\nPORTABILITY_OPERATOR_TOKEN=test-token\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.plugins, vec!["changelog".to_string()]);
    assert_eq!(cfg.operator_tokens, vec!["test-token".to_string()]);
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "PORTABILITY_API_BIND_ADDR=127.0.0.1:3000\nPORTABILITY_WORK_DIR=/from/file\n",
    );

    unsafe {
        env::set_var("PORTABILITY_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("PORTABILITY_WORK_DIR", "/from/env");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.work_dir, PathBuf::from("/from/env"));

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("PORTABILITY_API_BIND_ADDR", "not-an-addr");
    }
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn invalid_upload_limit_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("PORTABILITY_MAX_UPLOAD_MB", "lots");
    }
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let err = loader.load().expect_err("non-numeric upload limit should fail");
    assert!(format!("{}", err).contains("PORTABILITY_MAX_UPLOAD_MB"));

    clear_env();
}
