//! Run summary reporting

use tarflow::post_summary;

use crate::common::*;

#[test]
fn test_backup_summary_report() {
    let server = Server::new();
    let catalog = server.catalog();
    accept_tarball(&catalog, &server.tarball("ctrl", "run-1", "data"), "alice").unwrap();
    let results = server.replicator(&catalog, server.targets()).run().unwrap();

    let inbox = Inbox::default();
    let tmp = server.path("tmp");
    std::fs::create_dir_all(&tmp).unwrap();
    let id = post_summary(&inbox, &tmp, "tarflow-backup", "test", &results.to_string()).unwrap();
    assert_eq!(id, "report-1");

    let reports = inbox.reports.lock();
    let body = reports[0].1.as_deref().unwrap();
    let mut lines = body.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("tarflow-backup."));
    assert!(header.ends_with("(test)"));
    assert_eq!(
        lines.next().unwrap(),
        "Total processed: 1, Local backup successes: 1, Local backup failures: 0, \
         S3 upload successes: 1, S3 upload failures: 0, Unable to process: 0"
    );
}
