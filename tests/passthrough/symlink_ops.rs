use std::path::PathBuf;

use super::common::Fixture;
use sievefs::error::FsError;
use sievefs::fs::symlink::SymlinkPolicy;

fn with_policy(policy: SymlinkPolicy) -> Fixture {
    Fixture::build(&[], |mut config| {
        config.symlink_policy = policy;
        config
    })
}

#[tokio::test]
async fn real_symlink_policy_creates_a_native_link() {
    let fixture = with_policy(SymlinkPolicy::RealSymlink);
    fixture.seed_root("target", b"pointed at");

    fixture.fs.symlink("/ln", "target").await.unwrap();

    let link = fixture.root_path("ln");
    assert!(std::fs::symlink_metadata(&link).unwrap().is_symlink());
    assert_eq!(std::fs::read_link(&link).unwrap(), PathBuf::from("target"));
    assert_eq!(fixture.fs.readlink("/ln").await.unwrap(), "target");
}

#[tokio::test]
async fn readlink_on_a_regular_file_fails() {
    let fixture = with_policy(SymlinkPolicy::RealSymlink);
    fixture.seed_root("plain", b"x");

    assert!(fixture.fs.readlink("/plain").await.is_err());
}

#[tokio::test]
async fn error_policy_refuses() {
    let fixture = with_policy(SymlinkPolicy::Error);
    assert_eq!(
        fixture.fs.symlink("/ln", "target").await.unwrap_err(),
        FsError::Unsupported
    );
}

#[tokio::test]
async fn skip_policy_creates_nothing_and_neutralises_the_rename() {
    let fixture = with_policy(SymlinkPolicy::Skip);
    fixture.seed_root("leftover", b"doomed");

    fixture.fs.symlink("/ln", "target").await.unwrap();
    assert!(!fixture.root_path("ln").exists());
    assert!(!fixture.cache_path("ln").exists());

    // The follow-up rename consumes the side entry, drops the destination
    // and reports success without moving anything.
    fixture.fs.rename("/ln", "/leftover").await.unwrap();
    assert!(!fixture.root_path("leftover").exists());

    // The entry is consumed: a second rename behaves normally again.
    assert_eq!(
        fixture.fs.rename("/ln", "/other").await.unwrap_err(),
        FsError::NotFound
    );
}

#[tokio::test]
async fn copy_policy_materialises_the_target_bytes() {
    let fixture = with_policy(SymlinkPolicy::Copy);
    fixture.seed_root("source", b"copied bytes");

    fixture.fs.symlink("/twin", "source").await.unwrap();

    assert_eq!(std::fs::read(fixture.root_path("twin")).unwrap(), b"copied bytes");
    // A real copy, not a link.
    assert!(!std::fs::symlink_metadata(fixture.root_path("twin")).unwrap().is_symlink());
}

#[tokio::test]
async fn copy_policy_with_a_missing_target_fails() {
    let fixture = with_policy(SymlinkPolicy::Copy);
    assert_eq!(
        fixture.fs.symlink("/twin", "nowhere").await.unwrap_err(),
        FsError::NotFound
    );
}

#[tokio::test]
async fn lnkfile_policy_fabricates_a_shortcut() {
    let fixture = with_policy(SymlinkPolicy::CreateLnkfile);

    fixture.fs.symlink("/doc", "/mnt/elsewhere/report").await.unwrap();

    // The artifact carries the suffix; the logical namespace hides it.
    assert!(fixture.root_path("doc.lnk").is_file());
    let stat = fixture.fs.getattr("/doc").await.unwrap();
    assert!(stat.is_symlink());

    let listing = fixture.fs.readdir("/").await.unwrap();
    assert!(listing.contains("doc"));
    assert!(!listing.contains("doc.lnk"));

    assert_eq!(fixture.fs.readlink("/doc").await.unwrap(), "/mnt/elsewhere/report");
}

#[tokio::test]
async fn lnkfile_readlink_rewrites_targets_inside_the_mount() {
    let fixture = Fixture::build(&[], |mut config| {
        config.symlink_policy = SymlinkPolicy::CreateLnkfile;
        config.rellinks = true;
        config
    });

    fixture.fs.symlink("/doc", "/mnt/sievefs/sub/file").await.unwrap();

    assert_eq!(fixture.fs.readlink("/doc").await.unwrap(), "sub/file");
}

#[tokio::test]
async fn lnkfile_rename_keeps_the_suffix_on_the_artifact() {
    let fixture = with_policy(SymlinkPolicy::CreateLnkfile);

    fixture.fs.symlink("/tmp_link", "/somewhere").await.unwrap();
    fixture.fs.rename("/tmp_link", "/final").await.unwrap();

    assert!(!fixture.root_path("tmp_link.lnk").exists());
    assert!(fixture.root_path("final.lnk").is_file());
    assert_eq!(fixture.fs.readlink("/final").await.unwrap(), "/somewhere");
}
