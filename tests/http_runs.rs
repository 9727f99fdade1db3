//! End-to-end runs against a mock HTTP flag site
//!
//! Every strategy must produce the same counts and the same files for the
//! same input.

mod common;

use common::{FLAG_BYTES, config_for, flag_server};
use flag_fetch::{
    BroadcastProgress, Config, Event, Orchestrator, OutcomeKind, Strategy, WorkItem, codes,
    initial_report,
};
use std::sync::Arc;

fn items(ids: &[&str]) -> Vec<WorkItem> {
    ids.iter().map(|id| WorkItem::new(*id)).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_strategy_yields_identical_counts_and_files() {
    let server = flag_server().await;

    for strategy in [Strategy::Serial, Strategy::ThreadPool, Strategy::Cooperative] {
        let dest = tempfile::tempdir().unwrap();
        let config = config_for(&server, dest.path(), strategy, 3);
        let orchestrator = Orchestrator::from_config(&config).unwrap();

        let report = orchestrator
            .run(items(&["EE", "DD", "CC", "BB", "AA"]))
            .await
            .unwrap();

        assert_eq!(report.total, 5, "{strategy}");
        assert_eq!(report.success(), 3, "{strategy}");
        assert_eq!(report.not_found(), 1, "{strategy}");
        assert_eq!(report.errors(), 1, "{strategy}");
        assert!(!report.aborted);

        for cc in ["aa", "dd", "ee"] {
            let saved = std::fs::read(dest.path().join(format!("{cc}.gif"))).unwrap();
            assert_eq!(saved, FLAG_BYTES, "{strategy}: {cc}");
        }
        assert!(!dest.path().join("bb.gif").exists());
        assert!(!dest.path().join("cc.gif").exists());
    }
}

#[tokio::test]
async fn http_failures_carry_flat_causes() {
    let server = flag_server().await;
    let dest = tempfile::tempdir().unwrap();
    let config = config_for(&server, dest.path(), Strategy::Cooperative, 5);

    let progress = Arc::new(BroadcastProgress::new(64));
    let mut events = progress.subscribe();
    let orchestrator = Orchestrator::from_config(&config)
        .unwrap()
        .with_progress(progress.clone());

    orchestrator.run(items(&["AA", "BB", "CC"])).await.unwrap();

    let mut causes = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::ItemCompleted {
            item, kind, cause, ..
        } = event
        {
            causes.push((item.to_string(), kind, cause));
        }
    }
    causes.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(
        causes,
        vec![
            ("AA".to_string(), OutcomeKind::Success, None),
            ("BB".to_string(), OutcomeKind::NotFound, None),
            (
                "CC".to_string(),
                OutcomeKind::Error,
                Some("HTTP 503 - Service Unavailable".to_string())
            ),
        ]
    );
}

#[tokio::test]
async fn unreachable_server_is_an_item_error_not_a_fatal_one() {
    let dest = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    // Port 9 (discard) is closed on test hosts
    config.source.base_url = Some("http://127.0.0.1:9/flags".into());
    config.output.dest_dir = dest.path().to_path_buf();

    let report = Orchestrator::from_config(&config)
        .unwrap()
        .run(items(&["AA", "BB"]))
        .await
        .unwrap();

    assert_eq!(report.errors(), 2);
    assert!(!report.aborted);
}

#[tokio::test]
async fn config_file_drives_a_full_run() {
    let server = flag_server().await;
    let dest = tempfile::tempdir().unwrap();
    let config_path = dest.path().join("flags.json");
    let json = serde_json::json!({
        "base_url": format!("{}/flags", server.uri()),
        "strategy": "thread_pool",
        "max_concurrency": 4,
        "dest_dir": dest.path().join("out"),
        "codes": ["aa", "bb", "dd"],
    });
    std::fs::write(&config_path, json.to_string()).unwrap();

    let config = Config::from_json_file(&config_path).unwrap();
    let selected = codes::select(&config.selection).unwrap();
    let orchestrator = Orchestrator::from_config(&config).unwrap();

    let header = initial_report(
        config.server_label(),
        config.base_url().unwrap().as_str(),
        &selected,
        orchestrator.concurrency_for(selected.len()),
    );
    assert!(header.starts_with("CUSTOM site: "));
    assert!(header.contains("Searching for 3 flags: from AA to DD"));
    assert!(header.ends_with("3 concurrent connections will be used."));

    let report = orchestrator.run(selected).await.unwrap();
    assert_eq!(report.strategy, Strategy::ThreadPool);
    assert_eq!(report.concurrency, 3);
    assert_eq!((report.success(), report.not_found()), (2, 1));
    assert!(dest.path().join("out").join("dd.gif").exists());

    let text = report.to_string();
    assert!(text.contains("2 flags downloaded."));
    assert!(text.contains("1 not found."));
    assert!(!text.contains("error"));
}
