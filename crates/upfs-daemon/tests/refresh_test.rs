use std::time::Duration;

use upfs_config::testing::StoreFixture;
use upfs_config::ChangeDetection;
use upfs_daemon::{spawn_refresh_task, RefreshOutcome, Service};
use upfs_vfs::{FileSystem, VfsError};

async fn wait_for<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_interval_task_picks_up_uploads() {
    let store = StoreFixture::new().unwrap();
    store.upload("1", "x.txt", b"first", 100).unwrap();

    let mut config = store.config();
    config.refresh.staleness_secs = 0;
    let service = Service::from_config(&config);

    let task = spawn_refresh_task(service.scheduler.clone(), Duration::from_millis(10));
    assert!(wait_for(|| service.vfs.exists("/webdav/x.txt")).await);

    store.upload("2", "x.txt", b"second", 200).unwrap();
    assert!(wait_for(|| service.vfs.exists("/webdav/x (1).txt")).await);

    let stat = service.vfs.stat("/webdav/x (1).txt").unwrap();
    assert_eq!(stat.item.as_ref().unwrap().id, "2");
    // Served under the configured prefix only
    assert!(!service.vfs.exists("/x (1).txt"));
    // The page lists raw names, one row per upload
    assert!(wait_for(|| service.listing.page().matches("class=\"file\"").count() == 2).await);

    task.abort();
}

#[tokio::test]
async fn test_deletion_propagates() {
    let store = StoreFixture::new().unwrap();
    store.upload("1", "a.txt", b"a", 100).unwrap();
    store.upload("2", "b.txt", b"b", 200).unwrap();

    let mut config = store.config();
    config.refresh.staleness_secs = 0;
    let service = Service::from_config(&config);
    assert!(service.scheduler.force_refresh().is_published());
    assert_eq!(service.vfs.list("/webdav", None).unwrap().len(), 2);

    let task = spawn_refresh_task(service.scheduler.clone(), Duration::from_millis(10));
    store.remove("2").unwrap();
    assert!(wait_for(|| !service.vfs.exists("/webdav/b.txt")).await);
    assert!(matches!(
        service.vfs.open("/webdav/b.txt"),
        Err(VfsError::NotFound(_))
    ));
    task.abort();
}

#[tokio::test]
async fn test_listing_page_written_on_publish() {
    let store = StoreFixture::new().unwrap();
    store.upload("1", "report.pdf", b"%PDF", 100).unwrap();
    let page_path = store.store_dir.parent().unwrap().join("index.html");

    let mut config = store.config();
    config.mount.listing_page = Some(page_path.clone());
    config.refresh.change_detection = ChangeDetection::Content;
    let service = Service::from_config(&config);

    let outcome = tokio::task::spawn_blocking({
        let sched = service.scheduler.clone();
        move || sched.force_refresh()
    })
    .await
    .unwrap();
    assert!(matches!(outcome, RefreshOutcome::Published { entries: 1, .. }));

    let page = std::fs::read_to_string(&page_path).unwrap();
    assert!(page.contains("report.pdf"));
    assert!(page.contains("https://files.test/1/report.pdf"));
}
