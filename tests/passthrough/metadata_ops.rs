use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::common::Fixture;
use sievefs::error::FsError;
use sievefs::fs::{R_OK, W_OK};

#[tokio::test]
async fn getattr_reports_size_and_type() {
    let fixture = Fixture::new();
    fixture.seed_root("f", b"12345");

    let stat = fixture.fs.getattr("/f").await.unwrap();
    assert_eq!(stat.size, 5);
    assert!(!stat.is_dir());

    let dir_stat = fixture.fs.getattr("/").await.unwrap();
    assert!(dir_stat.is_dir());
}

#[tokio::test]
async fn getattr_missing_is_enoent() {
    let fixture = Fixture::new();
    assert_eq!(fixture.fs.getattr("/nope").await.unwrap_err(), FsError::NotFound);
}

#[tokio::test]
async fn getattr_follows_classification_to_the_cache() {
    let fixture = Fixture::with_patterns(&["**/*.txt"]);
    fixture.write_through("/t.txt", b"abc").await;

    let stat = fixture.fs.getattr("/t.txt").await.unwrap();
    assert_eq!(stat.size, 3);
}

#[cfg(unix)]
#[tokio::test]
async fn chmod_reaches_the_resolved_copy() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::with_patterns(&["**/*.txt"]);
    fixture.write_through("/t.txt", b"x").await;

    fixture.fs.chmod("/t.txt", 0o600).await.unwrap();

    let meta = std::fs::metadata(fixture.cache_path("t.txt")).unwrap();
    assert_eq!(meta.permissions().mode() & 0o7777, 0o600);
}

#[tokio::test]
async fn chmod_missing_is_enoent() {
    let fixture = Fixture::new();
    assert_eq!(fixture.fs.chmod("/nope", 0o644).await.unwrap_err(), FsError::NotFound);
}

#[cfg(unix)]
#[tokio::test]
async fn chown_to_the_current_owner_succeeds() {
    let fixture = Fixture::new();
    fixture.write_through("/owned", b"x").await;

    // SAFETY: getuid/getgid cannot fail.
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    fixture.fs.chown("/owned", uid, gid).await.unwrap();
}

#[tokio::test]
async fn utimens_applies_the_given_times() {
    let fixture = Fixture::new();
    fixture.write_through("/timed", b"x").await;

    let atime = UNIX_EPOCH + Duration::from_secs(1_000_000);
    let mtime = UNIX_EPOCH + Duration::from_secs(2_000_000);
    fixture.fs.utimens("/timed", Some((atime, mtime))).await.unwrap();

    let stat = fixture.fs.getattr("/timed").await.unwrap();
    assert_eq!(stat.mtime, mtime);
    assert_eq!(stat.atime, atime);
}

#[tokio::test]
async fn utimens_without_times_means_now() {
    let fixture = Fixture::new();
    fixture.write_through("/touched", b"x").await;
    let before = SystemTime::now() - Duration::from_secs(5);

    fixture.fs.utimens("/touched", None).await.unwrap();

    let stat = fixture.fs.getattr("/touched").await.unwrap();
    assert!(stat.mtime >= before);
}

#[tokio::test]
async fn truncate_shrinks_and_extends() {
    let fixture = Fixture::new();
    fixture.write_through("/sized", b"123456").await;

    fixture.fs.truncate("/sized", 3).await.unwrap();
    assert_eq!(fixture.fs.getattr("/sized").await.unwrap().size, 3);

    fixture.fs.truncate("/sized", 10).await.unwrap();
    assert_eq!(fixture.fs.getattr("/sized").await.unwrap().size, 10);
}

#[tokio::test]
async fn truncate_missing_is_enoent() {
    let fixture = Fixture::new();
    assert_eq!(fixture.fs.truncate("/nope", 0).await.unwrap_err(), FsError::NotFound);
}

#[cfg(unix)]
#[tokio::test]
async fn statfs_uses_the_fixed_reporting_shape() {
    let fixture = Fixture::new();
    fixture.seed_root("probe", b"x");

    let usage = fixture.fs.statfs("/probe").await.unwrap();
    assert_eq!(usage.bsize, 4096);
    assert_eq!(usage.frsize, 4096);
    assert_eq!(usage.namemax, 255);
    assert_eq!(usage.fsid, 123_456_789);
    assert!(usage.blocks > 0);
    assert_eq!(usage.files, usage.ffree);
}

#[tokio::test]
async fn access_existence_and_permission_bits() {
    let fixture = Fixture::new();
    fixture.write_through("/checked", b"x").await;

    fixture.fs.access("/checked", R_OK).await.unwrap();
    assert_eq!(
        fixture.fs.access("/missing", R_OK).await.unwrap_err(),
        FsError::NotFound
    );
}

#[cfg(unix)]
#[tokio::test]
async fn access_denies_writes_to_read_only_files() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new();
    fixture.write_through("/ro", b"x").await;
    std::fs::set_permissions(fixture.root_path("ro"), std::fs::Permissions::from_mode(0o444))
        .unwrap();

    fixture.fs.access("/ro", R_OK).await.unwrap();
    assert_eq!(
        fixture.fs.access("/ro", W_OK).await.unwrap_err(),
        FsError::PermissionDenied
    );
}

#[tokio::test]
async fn locking_is_not_supported() {
    let fixture = Fixture::new();
    assert_eq!(fixture.fs.lock().unwrap_err(), FsError::Unsupported);
}

#[tokio::test]
async fn fsync_and_flush_are_quiet() {
    let fixture = Fixture::new();
    let fh = fixture.fs.create("/quiet", 0o644).await.unwrap();
    fixture.fs.fsync("/quiet", true, fh).await.unwrap();
    fixture.fs.flush("/quiet", fh).await.unwrap();
    fixture.fs.release(fh).await.unwrap();
}
