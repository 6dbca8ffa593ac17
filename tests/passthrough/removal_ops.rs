use super::common::Fixture;
use sievefs::error::FsError;

#[tokio::test]
async fn unlink_removes_the_resolved_copy() {
    let fixture = Fixture::with_patterns(&["**/*.txt"]);
    fixture.write_through("/gone.txt", b"bye").await;

    fixture.fs.unlink("/gone.txt").await.unwrap();

    assert!(!fixture.cache_path("gone.txt").exists());
    assert!(!fixture.root_path("gone.txt").exists());
}

#[tokio::test]
async fn unlink_missing_is_enoent() {
    let fixture = Fixture::new();
    assert_eq!(fixture.fs.unlink("/phantom").await.unwrap_err(), FsError::NotFound);
}

#[tokio::test]
async fn unlink_closes_matching_open_handles() {
    let fixture = Fixture::new();
    let fh = fixture.fs.create("/held", 0o644).await.unwrap();
    fixture.fs.write("/held", b"data", 0, fh).await.unwrap();

    fixture.fs.unlink("/held").await.unwrap();

    // The handle was closed and dropped along with the file.
    assert_eq!(
        fixture.fs.write("/held", b"more", 0, fh).await.unwrap_err(),
        FsError::BadHandle
    );
}

#[tokio::test]
async fn unlink_leaves_unrelated_handles_alone() {
    let fixture = Fixture::new();
    let victim = fixture.fs.create("/victim", 0o644).await.unwrap();
    let survivor = fixture.fs.create("/survivor", 0o644).await.unwrap();

    fixture.fs.unlink("/victim").await.unwrap();

    fixture.fs.write("/survivor", b"still here", 0, survivor).await.unwrap();
    fixture.fs.release(survivor).await.unwrap();
    assert_ne!(victim, survivor);
    assert_eq!(fixture.read_through("/survivor").await, b"still here");
}

#[tokio::test]
async fn release_is_idempotent() {
    let fixture = Fixture::new();
    let fh = fixture.fs.create("/twice", 0o644).await.unwrap();

    fixture.fs.release(fh).await.unwrap();
    // Second release of the same id is swallowed.
    fixture.fs.release(fh).await.unwrap();
}
