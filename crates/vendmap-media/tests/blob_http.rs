//! Integration tests for `HttpBlobStore` using wiremock HTTP mocks.

use vendmap_media::{BlobError, BlobRef, BlobStore, HttpBlobStore};
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_store(base_url: &str, token: Option<&str>) -> HttpBlobStore {
    HttpBlobStore::with_base_url(base_url, "test-bucket", token.map(str::to_string), 30)
        .expect("store construction should not fail")
}

#[tokio::test]
async fn put_uploads_bytes_and_returns_download_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v0/b/test-bucket/o"))
        .and(query_param("uploadType", "media"))
        .and(query_param("name", "machines/m1/1700000000000_photo.jpg"))
        .and(header("authorization", "Bearer secret"))
        .and(header("content-type", "image/jpeg"))
        .and(body_bytes(vec![0xFF, 0xD8, 0xFF]))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "machines/m1/1700000000000_photo.jpg",
            "bucket": "test-bucket",
            "downloadTokens": "tok-1,tok-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = test_store(&server.uri(), Some("secret"));
    let blob = store
        .put(
            "machines/m1/1700000000000_photo.jpg",
            vec![0xFF, 0xD8, 0xFF],
            "image/jpeg",
        )
        .await
        .expect("upload should succeed");

    assert_eq!(blob.path, "machines/m1/1700000000000_photo.jpg");
    assert_eq!(blob.download_token.as_deref(), Some("tok-1"));

    let url = store.public_url(&blob).await.unwrap();
    assert_eq!(
        url,
        format!(
            "{}/v0/b/test-bucket/o/machines%2Fm1%2F1700000000000_photo.jpg?alt=media&token=tok-1",
            server.uri()
        )
    );
}

#[tokio::test]
async fn put_without_token_field_yields_plain_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v0/b/test-bucket/o"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "name": "a b.png" })),
        )
        .mount(&server)
        .await;

    let store = test_store(&server.uri(), None);
    let blob = store.put("a b.png", vec![1], "image/png").await.unwrap();
    assert!(blob.download_token.is_none());
    assert!(store
        .public_url(&blob)
        .await
        .unwrap()
        .ends_with("/o/a%20b.png?alt=media"));
}

#[tokio::test]
async fn put_maps_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let store = test_store(&server.uri(), Some("secret"));
    let err = store.put("x.jpg", vec![1], "image/jpeg").await.unwrap_err();
    assert!(
        matches!(err, BlobError::Status { status: 403, ref path } if path == "x.jpg"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn put_rejects_unexpected_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let store = test_store(&server.uri(), None);
    let err = store.put("x.jpg", vec![1], "image/jpeg").await.unwrap_err();
    assert!(matches!(err, BlobError::InvalidResponse { .. }), "got {err:?}");
}

#[tokio::test]
async fn delete_targets_encoded_object() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v0/b/test-bucket/o/machines%2Fm1%2Fthumb_1_photo.jpg"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = test_store(&server.uri(), Some("secret"));
    store
        .delete(&BlobRef::new("machines/m1/thumb_1_photo.jpg"))
        .await
        .expect("delete should succeed");
}

#[tokio::test]
async fn delete_missing_object_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = test_store(&server.uri(), None);
    let err = store.delete(&BlobRef::new("gone.jpg")).await.unwrap_err();
    assert!(matches!(err, BlobError::NotFound(ref p) if p == "gone.jpg"));
}

#[tokio::test]
async fn delete_server_error_is_status() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = test_store(&server.uri(), None);
    let err = store.delete(&BlobRef::new("x.jpg")).await.unwrap_err();
    assert!(matches!(err, BlobError::Status { status: 500, .. }));
}

#[test]
fn invalid_base_url_is_rejected() {
    let err = HttpBlobStore::with_base_url("not a url", "b", None, 5).unwrap_err();
    assert!(matches!(err, BlobError::InvalidBaseUrl { .. }));
}

#[test]
fn debug_output_redacts_token() {
    let store = test_store("http://localhost:1", Some("super-secret"));
    let debug = format!("{store:?}");
    assert!(!debug.contains("super-secret"));
    assert!(debug.contains("[redacted]"));
}
