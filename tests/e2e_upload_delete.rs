//! E2E tests for uploads, object references and deletion.

#![cfg(e2e_test)]

mod common;

use std::sync::{Arc, Mutex};

use common::TestHelper;
use s3browse_rs::{
    Depth, ObjectDeleter, ObjectLister, S3BrowseError, UploadCoordinator, UploadSource,
    create_upload_cancellation_token, normalize_to_key,
};

const MIB: usize = 1024 * 1024;

#[tokio::test(flavor = "multi_thread")]
async fn e2e_single_put_round_trips_through_url() {
    e2e_timeout!(async {
        let helper = TestHelper::new().await;
        let bucket = helper.generate_bucket_name();
        helper.create_bucket(&bucket).await;
        let _guard = helper.bucket_guard(&bucket);

        let config = helper.build_config(&bucket, vec![]);
        let storage = TestHelper::storage(&config).await;
        let coordinator =
            UploadCoordinator::new(storage, &config, create_upload_cancellation_token());

        let percents = Arc::new(Mutex::new(Vec::new()));
        let recorder = percents.clone();
        let url = coordinator
            .upload(
                UploadSource::from_bytes("clip one.mp4", vec![b'v'; 1024]),
                "videos",
                move |progress| recorder.lock().unwrap().push(progress.percent),
            )
            .await
            .unwrap();

        assert!(url.starts_with(&format!("https://{bucket}.s3.{}.amazonaws.com/videos/", helper.region())));
        assert_eq!(percents.lock().unwrap().last().copied(), Some(100));

        let key = normalize_to_key(&url, &bucket).unwrap().unwrap();
        assert!(key.starts_with("videos/") && key.ends_with("_clip one.mp4"));

        let (body, content_type) = helper.get_object(&bucket, &key).await;
        assert_eq!(body.len(), 1024);
        assert_eq!(content_type.as_deref(), Some("video/mp4"));
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_multipart_upload_reassembles_parts() {
    e2e_timeout!(async {
        let helper = TestHelper::new().await;
        let bucket = helper.generate_bucket_name();
        helper.create_bucket(&bucket).await;
        let _guard = helper.bucket_guard(&bucket);

        let config = helper.build_config(
            &bucket,
            vec!["--multipart-chunksize", "5MiB", "--max-concurrent-parts", "2"],
        );
        let storage = TestHelper::storage(&config).await;
        let coordinator =
            UploadCoordinator::new(storage, &config, create_upload_cancellation_token());

        let body: Vec<u8> = (0..11 * MIB).map(|i| (i % 251) as u8).collect();
        let url = coordinator
            .upload(UploadSource::from_bytes("big.bin", body.clone()), "", |_| {})
            .await
            .unwrap();

        let key = normalize_to_key(&url, &bucket).unwrap().unwrap();
        let (stored, _) = helper.get_object(&bucket, &key).await;
        assert_eq!(stored.len(), body.len());
        assert!(stored == body);
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_cancelled_upload_leaves_no_object() {
    e2e_timeout!(async {
        let helper = TestHelper::new().await;
        let bucket = helper.generate_bucket_name();
        helper.create_bucket(&bucket).await;
        let _guard = helper.bucket_guard(&bucket);

        let config = helper.build_config(&bucket, vec!["--multipart-chunksize", "5MiB"]);
        let storage = TestHelper::storage(&config).await;
        let token = create_upload_cancellation_token();
        let coordinator = UploadCoordinator::new(storage, &config, token.clone());

        let handle = coordinator.start(
            UploadSource::from_bytes("cancel.bin", vec![0u8; 30 * MIB]),
            "tmp",
            None,
        );
        handle.abort();

        let err = handle.wait().await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(helper.count_objects(&bucket, "tmp/").await, 0);
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_delete_object_and_folder() {
    e2e_timeout!(async {
        let helper = TestHelper::new().await;
        let bucket = helper.generate_bucket_name();
        helper.create_bucket(&bucket).await;
        let _guard = helper.bucket_guard(&bucket);

        for i in 0..1200 {
            helper
                .put_object(&bucket, &format!("bulk/{i:05}.dat"), vec![b'b'; 4])
                .await;
        }
        helper.put_object(&bucket, "bulk-old/keep.dat", vec![b'k'; 4]).await;
        helper.put_object(&bucket, "single.txt", vec![b's'; 4]).await;

        let config = helper.build_config(&bucket, vec![]);
        let storage = TestHelper::storage(&config).await;
        let deleter = ObjectDeleter::new(storage, &config);

        let url = format!("s3://{bucket}/single.txt");
        assert_eq!(
            deleter.delete_object(&url).await.unwrap().as_deref(),
            Some("single.txt")
        );
        assert_eq!(deleter.delete_object("").await.unwrap(), None);

        let report = deleter.delete_folder("bulk").await.unwrap();
        assert_eq!(report.deleted.len(), 1200);
        assert_eq!(helper.count_objects(&bucket, "bulk/").await, 0);
        assert_eq!(
            helper.list_objects(&bucket, "").await,
            vec!["bulk-old/keep.dat"]
        );

        let storage = TestHelper::storage(&config).await;
        let listing = ObjectLister::new(storage, &config)
            .resolve("", Depth::OneLevel)
            .await
            .unwrap();
        assert_eq!(listing.folders, vec!["bulk-old/"]);
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_reference_for_other_bucket_is_rejected() {
    e2e_timeout!(async {
        let helper = TestHelper::new().await;
        let bucket = helper.generate_bucket_name();
        helper.create_bucket(&bucket).await;
        let _guard = helper.bucket_guard(&bucket);

        let config = helper.build_config(&bucket, vec![]);
        let deleter = ObjectDeleter::new(TestHelper::storage(&config).await, &config);

        let err = deleter
            .delete_object("s3://someone-elses-bucket/key.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, S3BrowseError::InvalidReference(_)));
    });
}
