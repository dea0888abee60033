mod common;

use cloudsweep_core::predicate::TagRequirement;
use cloudsweep_core::report::Item;
use cloudsweep_core::resource::ResourceKind;
use cloudsweep_core::services::s3::{self, S3Policy};
use cloudsweep_core::{CleanupError, RunContext, RunOptions};
use common::{FakeS3, now, tags};
use std::sync::Arc;

fn sandbox_policy() -> S3Policy {
    S3Policy {
        bucket_prefixes: vec!["sandbox-".to_string()],
        delete_empty_buckets: true,
        ..S3Policy::default()
    }
}

#[tokio::test]
async fn test_expired_bucket_is_drained_and_removed() {
    let fake = Arc::new(
        FakeS3::default()
            .bucket("sandbox-clean-me", 60, Some(tags(&[])))
            .objects("sandbox-clean-me", 1, 40)
            .bucket("prod-dont-touch", 400, Some(tags(&[])))
            .objects("prod-dont-touch", 3, 400),
    );
    let ctx = RunContext::quiet(now(), &RunOptions::apply());

    let summary = s3::run_cleanup(fake.clone(), &sandbox_policy(), &ctx)
        .await
        .expect("cleanup failed");

    assert_eq!(summary.scanned(ResourceKind::Bucket), 2);
    assert_eq!(summary.targeted(ResourceKind::Bucket), 1);
    assert_eq!(summary.deleted(Item::Objects), 1);
    assert_eq!(summary.deleted(Item::Buckets), 1);
    assert!(summary.reports[0].notes.is_empty());

    assert!(!fake.has_bucket("sandbox-clean-me"));
    assert!(fake.has_bucket("prod-dont-touch"));
    assert_eq!(fake.object_count("prod-dont-touch"), 3);
    assert_eq!(
        fake.journal.entries(),
        vec![
            "DeleteObjects sandbox-clean-me 1".to_string(),
            "DeleteBucket sandbox-clean-me".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_recent_objects_keep_bucket_alive() {
    let fake = Arc::new(
        FakeS3::default()
            .bucket("sandbox-busy", 60, Some(tags(&[])))
            .objects("sandbox-busy", 2, 45)
            .objects("sandbox-busy", 1, 2),
    );
    let ctx = RunContext::quiet(now(), &RunOptions::apply());

    let summary = s3::run_cleanup(fake.clone(), &sandbox_policy(), &ctx)
        .await
        .expect("cleanup failed");

    assert_eq!(summary.deleted(Item::Objects), 2);
    assert_eq!(summary.planned(Item::Buckets), 0);
    assert_eq!(summary.deleted(Item::Buckets), 0);
    assert!(fake.has_bucket("sandbox-busy"));
    assert_eq!(fake.object_count("sandbox-busy"), 1);
}

#[tokio::test]
async fn test_required_tag_filters_buckets() {
    let fake = Arc::new(
        FakeS3::default()
            .bucket("sandbox-tagged", 60, Some(tags(&[("cleanup", "true")])))
            .bucket("sandbox-wrong-value", 60, Some(tags(&[("cleanup", "no")])))
            .bucket("sandbox-untagged", 60, Some(tags(&[])))
            .bucket("sandbox-unreadable", 60, None),
    );
    let policy = S3Policy {
        require_tag: Some(TagRequirement {
            key: "cleanup".to_string(),
            value: Some("true".to_string()),
        }),
        ..sandbox_policy()
    };
    let ctx = RunContext::quiet(now(), &RunOptions::apply());

    let summary = s3::run_cleanup(fake.clone(), &policy, &ctx)
        .await
        .expect("cleanup failed");

    assert_eq!(summary.targeted(ResourceKind::Bucket), 1);
    assert_eq!(summary.reports[0].resource, "sandbox-tagged");
    assert!(!fake.has_bucket("sandbox-tagged"));
    assert!(fake.has_bucket("sandbox-wrong-value"));
    assert!(fake.has_bucket("sandbox-untagged"));
    assert!(fake.has_bucket("sandbox-unreadable"));
}

#[tokio::test]
async fn test_ignore_list_beats_target_list() {
    let fake = Arc::new(
        FakeS3::default()
            .bucket("sandbox-a", 60, Some(tags(&[])))
            .bucket("sandbox-b", 60, Some(tags(&[]))),
    );
    let policy = S3Policy {
        target_buckets: vec!["sandbox-a".to_string(), "sandbox-b".to_string()],
        ignore_buckets: vec!["sandbox-b".to_string()],
        ..sandbox_policy()
    };
    let ctx = RunContext::quiet(now(), &RunOptions::apply());

    let summary = s3::run_cleanup(fake.clone(), &policy, &ctx)
        .await
        .expect("cleanup failed");

    assert_eq!(summary.targeted(ResourceKind::Bucket), 1);
    assert!(!fake.has_bucket("sandbox-a"));
    assert!(fake.has_bucket("sandbox-b"));
}

#[tokio::test]
async fn test_override_list_narrows_targets() {
    let fake = Arc::new(
        FakeS3::default()
            .bucket("sandbox-a", 60, Some(tags(&[])))
            .bucket("sandbox-b", 60, Some(tags(&[]))),
    );
    let options = RunOptions {
        apply: true,
        only: vec!["sandbox-b".to_string()],
    };
    let ctx = RunContext::quiet(now(), &options);

    let summary = s3::run_cleanup(fake.clone(), &sandbox_policy(), &ctx)
        .await
        .expect("cleanup failed");

    assert_eq!(summary.targeted(ResourceKind::Bucket), 1);
    assert!(fake.has_bucket("sandbox-a"));
    assert!(!fake.has_bucket("sandbox-b"));
}

#[tokio::test]
async fn test_dry_run_is_repeatable_and_touches_nothing() {
    let fake = Arc::new(
        FakeS3::default()
            .bucket("sandbox-clean-me", 60, Some(tags(&[])))
            .versioned("sandbox-clean-me")
            .objects("sandbox-clean-me", 5, 40)
            .versions("sandbox-clean-me", "doc", 2, 40),
    );
    let ctx = RunContext::quiet(now(), &RunOptions::dry_run());

    let first = s3::run_cleanup(fake.clone(), &sandbox_policy(), &ctx)
        .await
        .expect("cleanup failed");
    let second = s3::run_cleanup(fake.clone(), &sandbox_policy(), &ctx)
        .await
        .expect("cleanup failed");

    assert_eq!(first, second);
    assert!(first.dry_run);
    assert!(first.deleted.is_empty());
    assert_eq!(first.planned(Item::Objects), 6);
    assert_eq!(first.planned(Item::Versions), 1);
    assert_eq!(first.planned(Item::Buckets), 1);
    assert!(fake.journal.is_empty());
    assert_eq!(fake.object_count("sandbox-clean-me"), 6);
    assert_eq!(fake.version_count("sandbox-clean-me"), 7);
}

#[tokio::test]
async fn test_bulk_deletes_are_batched() {
    let fake = Arc::new(
        FakeS3::default()
            .bucket("sandbox-big", 60, Some(tags(&[])))
            .objects("sandbox-big", 2501, 40),
    );
    let policy = S3Policy {
        max_delete_batch: 1000,
        ..sandbox_policy()
    };
    let ctx = RunContext::quiet(now(), &RunOptions::apply());

    let summary = s3::run_cleanup(fake.clone(), &policy, &ctx)
        .await
        .expect("cleanup failed");

    assert_eq!(*fake.batches.lock().unwrap(), vec![1000, 1000, 501]);
    assert_eq!(summary.deleted(Item::Objects), 2501);
    assert_eq!(summary.deleted(Item::Buckets), 1);
}

#[tokio::test]
async fn test_versioned_bucket_drains_versions_too() {
    let fake = Arc::new(
        FakeS3::default()
            .bucket("sandbox-versioned", 60, Some(tags(&[])))
            .versioned("sandbox-versioned")
            .objects("sandbox-versioned", 1, 40)
            .versions("sandbox-versioned", "doc", 3, 40)
            .versions("sandbox-versioned", "old-doc", 2, 40)
            .delete_marker("sandbox-versioned", "old-doc", 40),
    );
    let ctx = RunContext::quiet(now(), &RunOptions::apply());

    let summary = s3::run_cleanup(fake.clone(), &sandbox_policy(), &ctx)
        .await
        .expect("cleanup failed");

    // obj-00000 and the live doc are current; the rest are history and a marker.
    assert_eq!(summary.deleted(Item::Objects), 2);
    assert_eq!(summary.deleted(Item::Versions), 5);
    assert_eq!(summary.deleted(Item::Buckets), 1);
    assert!(summary.reports[0].notes.is_empty());
    assert!(!fake.has_bucket("sandbox-versioned"));
    assert_eq!(
        fake.journal.entries(),
        vec![
            "DeleteObjects sandbox-versioned 2".to_string(),
            "DeleteObjects sandbox-versioned 5".to_string(),
            "DeleteBucket sandbox-versioned".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_versioned_object_is_removed_without_leaving_a_delete_marker() {
    let fake = Arc::new(
        FakeS3::default()
            .bucket("sandbox-v", 60, Some(tags(&[])))
            .versioned("sandbox-v")
            .objects("sandbox-v", 1, 40),
    );
    let ctx = RunContext::quiet(now(), &RunOptions::apply());

    let summary = s3::run_cleanup(fake.clone(), &sandbox_policy(), &ctx)
        .await
        .expect("cleanup failed");

    assert_eq!(summary.deleted(Item::Objects), 1);
    assert_eq!(summary.deleted(Item::Versions), 0);
    assert_eq!(summary.deleted(Item::Buckets), 1);
    assert!(summary.reports[0].notes.is_empty());
    assert!(!fake.has_bucket("sandbox-v"));
}

#[tokio::test]
async fn test_unversioned_objects_are_counted_once() {
    let fake = Arc::new(
        FakeS3::default()
            .bucket("sandbox-plain", 60, Some(tags(&[])))
            .objects("sandbox-plain", 3, 40),
    );
    let ctx = RunContext::quiet(now(), &RunOptions::apply());

    let summary = s3::run_cleanup(fake.clone(), &sandbox_policy(), &ctx)
        .await
        .expect("cleanup failed");

    assert_eq!(summary.deleted(Item::Objects), 3);
    assert_eq!(summary.deleted(Item::Versions), 0);
    assert_eq!(*fake.batches.lock().unwrap(), vec![3]);
    assert!(!fake.has_bucket("sandbox-plain"));
}

#[tokio::test]
async fn test_versions_out_of_scope_keep_a_versioned_bucket() {
    let fake = Arc::new(
        FakeS3::default()
            .bucket("sandbox-history", 60, Some(tags(&[])))
            .versioned("sandbox-history")
            .objects("sandbox-history", 1, 40)
            .bucket("sandbox-plain", 60, Some(tags(&[])))
            .objects("sandbox-plain", 1, 40),
    );
    let policy = S3Policy {
        include_versioned_objects: false,
        ..sandbox_policy()
    };
    let ctx = RunContext::quiet(now(), &RunOptions::apply());

    let summary = s3::run_cleanup(fake.clone(), &policy, &ctx)
        .await
        .expect("cleanup failed");

    assert_eq!(summary.deleted(Item::Objects), 2);
    assert_eq!(summary.planned(Item::Buckets), 1);
    assert_eq!(summary.deleted(Item::Buckets), 1);

    // The key-only delete hid the object behind a marker; its history stays.
    assert!(fake.has_bucket("sandbox-history"));
    assert_eq!(fake.object_count("sandbox-history"), 0);
    assert_eq!(fake.version_count("sandbox-history"), 2);
    let history = summary
        .reports
        .iter()
        .find(|r| r.resource == "sandbox-history")
        .expect("report for sandbox-history");
    assert_eq!(
        history.notes,
        vec!["skipped delete bucket sandbox-history: versions remain".to_string()]
    );
    assert!(!fake.has_bucket("sandbox-plain"));
}

#[tokio::test]
async fn test_delete_all_drains_a_bucket_created_just_now() {
    let fake = Arc::new(
        FakeS3::default()
            .bucket("sandbox-clean-me", 0, Some(tags(&[])))
            .objects("sandbox-clean-me", 1, 0),
    );
    let policy = S3Policy {
        bucket_retention_days: Some(0),
        object_retention_days: Some(0),
        delete_all_objects: true,
        ..sandbox_policy()
    };
    let ctx = RunContext::quiet(now(), &RunOptions::apply());

    let summary = s3::run_cleanup(fake.clone(), &policy, &ctx)
        .await
        .expect("cleanup failed");

    assert_eq!(summary.targeted(ResourceKind::Bucket), 1);
    assert_eq!(summary.deleted(Item::Objects), 1);
    assert_eq!(summary.deleted(Item::Buckets), 1);
    assert!(!fake.has_bucket("sandbox-clean-me"));
}

#[tokio::test]
async fn test_listing_failure_aborts_the_run() {
    let fake = Arc::new(FakeS3 {
        fail_listing: true,
        ..FakeS3::default()
    });
    let ctx = RunContext::quiet(now(), &RunOptions::apply());

    let err = s3::run_cleanup(fake, &sandbox_policy(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CleanupError::Listing {
            kind: ResourceKind::Bucket,
            ..
        }
    ));
}

#[tokio::test]
async fn test_invalid_policy_is_rejected_before_listing() {
    let fake = Arc::new(FakeS3::default().bucket("sandbox-a", 60, Some(tags(&[]))));
    let policy = S3Policy {
        max_delete_batch: 0,
        ..sandbox_policy()
    };
    let ctx = RunContext::quiet(now(), &RunOptions::apply());

    let err = s3::run_cleanup(fake.clone(), &policy, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, CleanupError::Policy(_)));
    assert!(fake.journal.is_empty());
}
