use std::sync::Arc;

use super::common::Fixture;
use sievefs::dispatch::{Dispatch, Gated, Logged, Operation, Reply};
use sievefs::error::FsError;

fn take_fs(fixture: Fixture) -> (tempfile::TempDir, tempfile::TempDir, sievefs::SieveFs) {
    let Fixture { root, cache, fs } = fixture;
    (root, cache, fs)
}

#[tokio::test]
async fn operations_round_trip_through_the_dispatcher() {
    let fixture = Fixture::with_patterns(&["**/*.txt"]);
    let (_root, cache, fs) = take_fs(fixture);

    let Reply::Handle(fh) = fs
        .call(Operation::Create { path: "/note.txt".to_string(), mode: 0o644 })
        .await
        .unwrap()
    else {
        panic!("create must reply with a handle");
    };

    let reply = fs
        .call(Operation::Write {
            path: "/note.txt".to_string(),
            data: b"dispatched".to_vec(),
            offset: 0,
            fh,
        })
        .await
        .unwrap();
    assert_eq!(reply, Reply::Written(10));

    let reply = fs
        .call(Operation::Read { path: "/note.txt".to_string(), length: 64, offset: 0, fh })
        .await
        .unwrap();
    assert_eq!(reply, Reply::Data(b"dispatched".to_vec()));

    fs.call(Operation::Release { path: "/note.txt".to_string(), fh }).await.unwrap();
    assert!(cache.path().join("note.txt").is_file());

    let Reply::Attr(stat) =
        fs.call(Operation::GetAttr { path: "/note.txt".to_string() }).await.unwrap()
    else {
        panic!("getattr must reply with attributes");
    };
    assert_eq!(stat.size, 10);
}

#[tokio::test]
async fn errors_pass_through_the_decorators() {
    let fixture = Fixture::new();
    let (_root, _cache, fs) = take_fs(fixture);
    let dispatcher = Logged::new(fs);

    let err = dispatcher
        .call(Operation::GetAttr { path: "/absent".to_string() })
        .await
        .unwrap_err();
    assert_eq!(err, FsError::NotFound);

    let err = dispatcher
        .call(Operation::Lock { path: "/absent".to_string() })
        .await
        .unwrap_err();
    assert_eq!(err, FsError::Unsupported);
}

#[tokio::test]
async fn the_gated_stack_serves_concurrent_callers() {
    let fixture = Fixture::new();
    let (_root, _cache, fs) = take_fs(fixture);
    let dispatcher: Arc<dyn Dispatch> = Arc::new(Gated::new(Logged::new(fs)));

    let mut workers = Vec::new();
    for index in 0..8 {
        let dispatcher = Arc::clone(&dispatcher);
        workers.push(tokio::spawn(async move {
            let path = format!("/w{index}");
            let Reply::Handle(fh) = dispatcher
                .call(Operation::Create { path: path.clone(), mode: 0o644 })
                .await
                .unwrap()
            else {
                panic!("create must reply with a handle");
            };
            dispatcher
                .call(Operation::Write {
                    path: path.clone(),
                    data: path.clone().into_bytes(),
                    offset: 0,
                    fh,
                })
                .await
                .unwrap();
            dispatcher.call(Operation::Release { path, fh }).await.unwrap();
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    for index in 0..8 {
        let path = format!("/w{index}");
        let reply = dispatcher.call(Operation::ReadDir { path: "/".to_string() }).await.unwrap();
        let Reply::Entries(entries) = reply else {
            panic!("readdir must reply with entries");
        };
        assert!(entries.contains(path.trim_start_matches('/')));
    }
}

#[cfg(unix)]
#[tokio::test]
async fn statfs_reports_through_the_dispatcher() {
    let fixture = Fixture::new();
    fixture.seed_root("probe", b"x");
    let (_root, _cache, fs) = take_fs(fixture);

    let reply = fs.call(Operation::StatFs { path: "/probe".to_string() }).await.unwrap();
    let Reply::Usage(usage) = reply else {
        panic!("statfs must reply with usage");
    };
    assert_eq!(usage.bsize, 4096);
}
