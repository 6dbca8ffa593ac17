use super::common::Fixture;
use sievefs::error::FsError;

#[tokio::test]
async fn excluded_create_lands_in_cache() {
    let fixture = Fixture::with_patterns(&["**/*.txt"]);

    fixture.write_through("/a.txt", b"hi").await;

    assert_eq!(std::fs::read(fixture.cache_path("a.txt")).unwrap(), b"hi");
    assert!(!fixture.root_path("a.txt").exists());
}

#[tokio::test]
async fn kept_create_lands_in_root() {
    let fixture = Fixture::with_patterns(&["**/*.txt"]);

    fixture.write_through("/data.bin", b"payload").await;

    assert_eq!(std::fs::read(fixture.root_path("data.bin")).unwrap(), b"payload");
    assert!(!fixture.cache_path("data.bin").exists());
}

#[tokio::test]
async fn content_round_trips_regardless_of_classification() {
    let fixture = Fixture::with_patterns(&["**/*.txt"]);
    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

    for path in ["/kept.bin", "/routed.txt"] {
        fixture.write_through(path, &payload).await;
        assert_eq!(fixture.read_through(path).await, payload, "round trip of {path}");
    }
}

#[tokio::test]
async fn writes_at_offsets_compose() {
    let fixture = Fixture::new();
    let fh = fixture.fs.create("/f", 0o644).await.unwrap();

    fixture.fs.write("/f", b"AB", 0, fh).await.unwrap();
    fixture.fs.write("/f", b"CD", 2, fh).await.unwrap();
    fixture.fs.release(fh).await.unwrap();

    assert_eq!(fixture.read_through("/f").await, b"ABCD");
}

#[tokio::test]
async fn write_with_unknown_handle_is_ebadf() {
    let fixture = Fixture::new();
    fixture.write_through("/f", b"x").await;

    let err = fixture.fs.write("/f", b"y", 0, 999).await.unwrap_err();
    assert_eq!(err, FsError::BadHandle);
}

#[tokio::test]
async fn deep_create_mirrors_the_ancestor_chain() {
    let fixture = Fixture::with_patterns(&["**/*.txt"]);

    fixture.write_through("/a/b/c/notes.txt", b"n").await;

    // The file sits in the cache; the three directory levels exist on both
    // backends.
    assert!(fixture.cache_path("a/b/c/notes.txt").is_file());
    assert!(!fixture.root_path("a/b/c/notes.txt").exists());
    for level in ["a", "a/b", "a/b/c"] {
        assert!(fixture.root_path(level).is_dir(), "root side missing {level}");
        assert!(fixture.cache_path(level).is_dir(), "cache side missing {level}");
    }
}

#[cfg(unix)]
#[tokio::test]
async fn mirrored_ancestors_inherit_peer_metadata() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::with_patterns(&["**/*.txt"]);
    std::fs::create_dir(fixture.root_path("proj")).unwrap();
    std::fs::set_permissions(
        fixture.root_path("proj"),
        std::fs::Permissions::from_mode(0o750),
    )
    .unwrap();

    fixture.write_through("/proj/todo.txt", b"t").await;

    let mirrored = std::fs::metadata(fixture.cache_path("proj")).unwrap();
    assert_eq!(mirrored.permissions().mode() & 0o7777, 0o750);
}

#[tokio::test]
async fn repeated_deep_creates_are_idempotent() {
    let fixture = Fixture::with_patterns(&["**/*.txt"]);

    fixture.write_through("/x/y/one.txt", b"1").await;
    fixture.write_through("/x/y/two.txt", b"2").await;

    let listing = fixture.fs.readdir("/x/y").await.unwrap();
    assert!(listing.contains("one.txt"));
    assert!(listing.contains("two.txt"));
}

#[cfg(unix)]
#[tokio::test]
async fn open_with_o_creat_delegates_to_create() {
    let fixture = Fixture::with_patterns(&["**/*.txt"]);

    let fh = fixture
        .fs
        .open("/fresh.txt", libc::O_RDWR | libc::O_CREAT)
        .await
        .unwrap();
    fixture.fs.write("/fresh.txt", b"made", 0, fh).await.unwrap();
    fixture.fs.release(fh).await.unwrap();

    assert!(fixture.cache_path("fresh.txt").is_file());
}

#[tokio::test]
async fn open_missing_without_o_creat_is_enoent() {
    let fixture = Fixture::new();
    let err = fixture.fs.open("/ghost", libc::O_RDONLY).await.unwrap_err();
    assert_eq!(err, FsError::NotFound);
}

#[tokio::test]
async fn short_read_at_eof() {
    let fixture = Fixture::new();
    fixture.write_through("/short", b"abc").await;

    let fh = fixture.fs.open("/short", libc::O_RDONLY).await.unwrap();
    let data = fixture.fs.read("/short", 64, 1, fh).await.unwrap();
    fixture.fs.release(fh).await.unwrap();

    assert_eq!(data, b"bc");
}
