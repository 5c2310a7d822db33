//! End-to-end deletion of named content against the in-memory catalog.

mod support;

use std::sync::Arc;

use pulp_courier::delete::{DeleteEngine, DeleteRequest};
use pulp_courier::publisher::Publisher;
use pulp_courier::unit::{FileUnit, ModulemdUnit, RpmUnit, Unit};

use support::{repo, EventLog, FakeCatalog, FakeCdn, FakeUd, RecordingCollector};

fn bash_rpm(memberships: &[&str]) -> Unit {
    Unit::Rpm(RpmUnit {
        name: "bash".into(),
        version: "1.23".into(),
        release: "1.test8".into(),
        arch: "x86_64".into(),
        // Stored filename uses an underscore before the arch; the outcome
        // record must still carry the canonical dotted form.
        filename: "bash-1.23-1.test8_x86_64.rpm".into(),
        sha256sum: Some("a".repeat(64)),
        md5sum: None,
        signing_key: Some("aabbcc".into()),
        cdn_path: None,
        cdn_published: None,
        repository_memberships: memberships.iter().map(|m| m.to_string()).collect(),
    })
}

struct Fixture {
    events: EventLog,
    catalog: Arc<FakeCatalog>,
    collector: Arc<RecordingCollector>,
    engine: DeleteEngine,
}

fn fixture() -> Fixture {
    let events = EventLog::new();
    let catalog = Arc::new(FakeCatalog::new(events.clone()));
    let collector = Arc::new(RecordingCollector::new());
    let publisher = Arc::new(Publisher::new(
        catalog.clone(),
        Some(Arc::new(FakeCdn::new(events.clone()))),
        Some(Arc::new(FakeUd::new(events.clone()))),
        Some("https://cdn.example.com".to_string()),
    ));
    let engine = DeleteEngine::new(catalog.clone(), publisher, collector.clone());
    Fixture {
        events,
        catalog,
        collector,
        engine,
    }
}

#[tokio::test]
async fn deletes_rpm_and_records_canonical_filename() {
    let fx = fixture();
    fx.catalog
        .insert_repo(repo("some-yumrepo", Some("content/some"), Some(101)));
    fx.catalog.insert_unit(bash_rpm(&["some-yumrepo"]));

    fx.engine
        .delete(DeleteRequest {
            repo_ids: vec!["some-yumrepo".to_string()],
            names: vec!["bash-1.23-1.test8_x86_64.rpm".to_string()],
            signing_keys: vec!["aabbcc".to_string()],
            ..DeleteRequest::default()
        })
        .await
        .unwrap();

    // The unit lost its membership.
    let units = fx.catalog.units();
    assert!(units[0].repository_memberships().is_empty());

    // Outcome record: canonical filename, checksum kept, key dropped.
    let record = fx
        .collector
        .record_for("bash-1.23-1.test8.x86_64.rpm")
        .expect("deleted rpm recorded");
    assert_eq!(record.state, "DELETED");
    assert_eq!(
        record.checksums.as_ref().and_then(|c| c.get("sha256")),
        Some(&"a".repeat(64))
    );
    assert_eq!(record.signing_key, None);
    assert_eq!(record.dest, None);
    assert_eq!(record.src, None);

    // Cleared repo was republished, then its caches flushed.
    let publish = fx.events.index_of("publish:some-yumrepo");
    let cdn = fx.events.index_of("cdn:");
    let ud = fx.events.index_of("ud-repo:some-yumrepo");
    assert!(publish < cdn && cdn < ud);
    assert!(fx.events.index_of("ud-product:101") > ud);
}

#[tokio::test]
async fn signing_key_mismatch_removes_nothing() {
    let fx = fixture();
    fx.catalog.insert_repo(repo("some-yumrepo", None, None));
    fx.catalog.insert_unit(bash_rpm(&["some-yumrepo"]));

    fx.engine
        .delete(DeleteRequest {
            repo_ids: vec!["some-yumrepo".to_string()],
            names: vec!["bash-1.23-1.test8_x86_64.rpm".to_string()],
            signing_keys: vec!["otherkey".to_string()],
            ..DeleteRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(
        fx.catalog.units()[0].repository_memberships(),
        &["some-yumrepo".to_string()]
    );
    assert!(fx.collector.all().is_empty());
    // Nothing was cleared, so nothing is republished.
    assert_eq!(fx.events.count_of("publish:"), 0);
}

#[tokio::test]
async fn rpm_deletion_without_keys_requires_override() {
    let fx = fixture();
    fx.catalog.insert_repo(repo("some-yumrepo", None, None));
    fx.catalog.insert_unit(bash_rpm(&["some-yumrepo"]));

    let err = fx
        .engine
        .delete(DeleteRequest {
            repo_ids: vec!["some-yumrepo".to_string()],
            names: vec!["bash-1.23-1.test8_x86_64.rpm".to_string()],
            ..DeleteRequest::default()
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("--signing-key or --allow-unsigned"));

    // With the override the same request goes through.
    fx.engine
        .delete(DeleteRequest {
            repo_ids: vec!["some-yumrepo".to_string()],
            names: vec!["bash-1.23-1.test8_x86_64.rpm".to_string()],
            allow_unsigned: true,
            ..DeleteRequest::default()
        })
        .await
        .unwrap();
    assert!(fx.catalog.units()[0].repository_memberships().is_empty());
}

#[tokio::test]
async fn module_artifacts_are_removed_before_the_module() {
    let fx = fixture();
    fx.catalog.insert_repo(repo("module-repo", None, None));
    fx.catalog.insert_unit(Unit::Modulemd(ModulemdUnit {
        name: "mymod".into(),
        stream: "s1".into(),
        version: 123,
        context: "a1c2".into(),
        arch: "s390x".into(),
        artifacts_filenames: vec!["mymod-lib-1-1.s390x.rpm".into()],
        repository_memberships: vec!["module-repo".into()],
    }));
    fx.catalog.insert_unit(Unit::Rpm(RpmUnit {
        name: "mymod-lib".into(),
        version: "1".into(),
        release: "1".into(),
        arch: "s390x".into(),
        filename: "mymod-lib-1-1.s390x.rpm".into(),
        sha256sum: Some("b".repeat(64)),
        md5sum: None,
        signing_key: None,
        cdn_path: None,
        cdn_published: None,
        repository_memberships: vec!["module-repo".into()],
    }));

    fx.engine
        .delete(DeleteRequest {
            repo_ids: vec!["module-repo".to_string()],
            names: vec!["mymod:s1:123:a1c2:s390x".to_string()],
            ..DeleteRequest::default()
        })
        .await
        .unwrap();

    // Artifact RPM removal settles before the module's own removal.
    let events = fx.events.snapshot();
    let rpm_removal = fx.events.index_of("remove:module-repo:mymod-lib-1-1.s390x.rpm");
    let module_removal = fx.events.index_of("remove:module-repo:mymod:s1:123:a1c2:s390x");
    assert!(rpm_removal < module_removal, "events: {events:?}");

    let record = fx
        .collector
        .record_for("mymod:s1:123:a1c2:s390x")
        .expect("deleted module recorded");
    assert_eq!(record.state, "DELETED");
    assert_eq!(record.checksums, None);
}

#[tokio::test]
async fn module_missing_from_one_repo_is_skipped_everywhere() {
    let fx = fixture();
    fx.catalog.insert_repo(repo("repo-a", None, None));
    fx.catalog.insert_repo(repo("repo-b", None, None));
    fx.catalog.insert_unit(Unit::Modulemd(ModulemdUnit {
        name: "mymod".into(),
        stream: "s1".into(),
        version: 123,
        context: "a1c2".into(),
        arch: "s390x".into(),
        artifacts_filenames: vec![],
        repository_memberships: vec!["repo-a".into()],
    }));

    fx.engine
        .delete(DeleteRequest {
            repo_ids: vec!["repo-a".to_string(), "repo-b".to_string()],
            names: vec!["mymod:s1:123:a1c2:s390x".to_string()],
            ..DeleteRequest::default()
        })
        .await
        .unwrap();

    // Not a member of every requested repo: left alone entirely.
    assert_eq!(
        fx.catalog.units()[0].repository_memberships(),
        &["repo-a".to_string()]
    );
    assert_eq!(fx.events.count_of("remove:"), 0);
}

#[tokio::test]
async fn file_deletion_and_absent_names_coexist() {
    let fx = fixture();
    fx.catalog.insert_repo(repo("iso-repo", None, None));
    fx.catalog.insert_unit(Unit::File(FileUnit {
        path: "some-iso".into(),
        size: Some(5),
        sha256sum: Some("c".repeat(64)),
        description: None,
        version: None,
        display_order: None,
        cdn_path: None,
        cdn_published: None,
        repository_memberships: vec!["iso-repo".into()],
    }));

    fx.engine
        .delete(DeleteRequest {
            repo_ids: vec!["iso-repo".to_string()],
            names: vec!["some-iso".to_string(), "not-there-iso".to_string()],
            ..DeleteRequest::default()
        })
        .await
        .unwrap();

    assert!(fx.catalog.units()[0].repository_memberships().is_empty());
    let record = fx.collector.record_for("some-iso").expect("file recorded");
    assert_eq!(record.state, "DELETED");
    // The absent name produced no removal of its own.
    assert_eq!(fx.events.count_of("remove:"), 1);
}

#[tokio::test]
async fn repo_with_zero_matches_does_not_stop_the_run() {
    let fx = fixture();
    fx.catalog.insert_repo(repo("has-it", None, None));
    fx.catalog.insert_repo(repo("empty-repo", None, None));
    fx.catalog.insert_unit(bash_rpm(&["has-it"]));

    fx.engine
        .delete(DeleteRequest {
            repo_ids: vec!["has-it".to_string(), "empty-repo".to_string()],
            names: vec!["bash-1.23-1.test8_x86_64.rpm".to_string()],
            signing_keys: vec!["aabbcc".to_string()],
            ..DeleteRequest::default()
        })
        .await
        .unwrap();

    // Only the repo that held the unit saw a removal and a publish.
    assert_eq!(fx.events.count_of("remove:has-it"), 1);
    assert_eq!(fx.events.count_of("remove:empty-repo"), 0);
    assert_eq!(fx.events.count_of("publish:has-it"), 1);
    assert_eq!(fx.events.count_of("publish:empty-repo"), 0);
}

#[tokio::test]
async fn unknown_repo_is_fatal() {
    let fx = fixture();
    let err = fx
        .engine
        .delete(DeleteRequest {
            repo_ids: vec!["no-such-repo".to_string()],
            names: vec!["some-iso".to_string()],
            ..DeleteRequest::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "repository not found: no-such-repo");
}
