mod common;

use common::{config_value, locator_for};
use idm_password_filter::config::{ConfigManager, ConfigWatcher, RefreshOutcome};
use serde_json::Value;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// A configuration whose fields all encode the same generation number.
fn generation(n: u32) -> Value {
    let url = format!("http://gen{}.example.com", n);
    let mut cfg = config_value(&[url], n, n % 2 == 0);
    cfg["systemId"] = Value::from(format!("gen{}", n));
    cfg["token"] = Value::from(format!("token-{}", n));
    cfg["connectionTimeoutMs"] = Value::from(n * 10);
    cfg
}

fn write_generation(path: &Path, n: u32) {
    std::fs::write(path, generation(n).to_string()).unwrap();
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000 + u64::from(n)))
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_a_torn_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("PasswordFilterConfig.cfg");
    write_generation(&path, 1);
    let manager = Arc::new(ConfigManager::new(locator_for(&path)));
    assert_eq!(manager.refresh_once().await, RefreshOutcome::Published);

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let manager = manager.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut reads = 0u64;
            while !done.load(Ordering::Relaxed) {
                let cfg = manager.current_snapshot();
                let n = cfg.connection_attempts;
                assert!(cfg.valid);
                assert_eq!(cfg.system_id, format!("gen{}", n));
                assert_eq!(cfg.token, format!("token-{}", n));
                assert_eq!(cfg.base_urls, vec![format!("http://gen{}.example.com", n)]);
                assert_eq!(cfg.connection_timeout_ms, n * 10);
                assert_eq!(cfg.allow_change_by_default, n % 2 == 0);
                reads += 1;
                tokio::task::yield_now().await;
            }
            reads
        }));
    }

    for n in 2..60 {
        write_generation(&path, n);
        assert_eq!(manager.refresh_once().await, RefreshOutcome::Published);
    }
    done.store(true, Ordering::Relaxed);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    assert_eq!(manager.current_snapshot().system_id, "gen59");
}

#[tokio::test]
async fn test_broken_edits_never_replace_a_good_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("PasswordFilterConfig.cfg");
    write_generation(&path, 1);
    let manager = ConfigManager::new(locator_for(&path));
    manager.refresh_once().await;

    let required = generation(1).as_object().unwrap().keys().cloned().collect::<Vec<_>>();
    for (i, key) in required.iter().enumerate() {
        let mut broken = generation(2);
        broken.as_object_mut().unwrap().remove(key);
        std::fs::write(&path, broken.to_string()).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(5_000 + i as u64))
            .unwrap();

        assert_eq!(manager.refresh_once().await, RefreshOutcome::Rejected, "{}", key);
        let cfg = manager.current_snapshot();
        assert_eq!(cfg.system_id, "gen1");
        assert_eq!(cfg.token, "token-1");
        assert!(cfg.valid);
    }
}

#[tokio::test]
async fn test_watcher_applies_edits_and_stops_on_request() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("PasswordFilterConfig.cfg");
    write_generation(&path, 1);
    let manager = Arc::new(ConfigManager::new(locator_for(&path)));

    let watcher = ConfigWatcher::spawn(manager.clone(), Duration::from_millis(10));
    wait_for(|| manager.current_snapshot().system_id == "gen1").await;

    write_generation(&path, 2);
    wait_for(|| manager.current_snapshot().system_id == "gen2").await;

    watcher.stop().await;

    // Nothing picks up edits once stopped.
    write_generation(&path, 3);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.current_snapshot().system_id, "gen2");
}

async fn wait_for(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
