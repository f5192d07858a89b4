//! Remote source fetching against a mock HTTP server

use bytes::Bytes;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use thumbnail_core::source::USER_AGENT;
use thumbnail_core::{
    HttpFetcher, MemoryMetaStore, MemoryStorage, SourceError, SourceFetcher, SourceRef,
    StorageSettings, ThumbnailEngine, ThumbnailError, ThumbnailSettings,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn png() -> Vec<u8> {
    let img = RgbImage::from_pixel(640, 480, image::Rgb([0, 128, 255]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    buf
}

fn source(server: &MockServer, p: &str) -> SourceRef {
    SourceRef::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

#[tokio::test]
async fn test_fetch_sends_client_identifier() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/pic.png"))
        .and(header("user-agent", USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(Some(Duration::from_secs(5))).unwrap();
    let body = fetcher.fetch(&source(&server, "/img/pic.png")).await.unwrap();
    assert_eq!(body, Bytes::from_static(b"payload"));
}

#[tokio::test]
async fn test_fetch_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(Some(Duration::from_secs(5))).unwrap();
    assert!(matches!(
        fetcher.fetch(&source(&server, "/missing.png")).await,
        Err(SourceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_fetch_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(Some(Duration::from_secs(5))).unwrap();
    assert!(matches!(
        fetcher.fetch(&source(&server, "/pic.png")).await,
        Err(SourceError::Network(_))
    ));
}

#[tokio::test]
async fn test_fetch_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(Some(Duration::from_millis(200))).unwrap();
    assert!(matches!(
        fetcher.fetch(&source(&server, "/slow.png")).await,
        Err(SourceError::Timeout(_))
    ));
}

#[tokio::test]
async fn test_engine_renders_remote_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos/pic.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png()))
        .expect(1)
        .mount(&server)
        .await;

    let engine = ThumbnailEngine::builder(ThumbnailSettings::default())
        .storage(Arc::new(MemoryStorage::new("/media")))
        .meta_store(Arc::new(MemoryMetaStore::new()))
        .build()
        .await
        .unwrap();

    let url = format!("{}/photos/pic.png", server.uri());
    let first = engine.render(&url, "320x", &["sharpen"]).await.unwrap().unwrap();
    assert_eq!((first.width, first.height), (320, 240));
    assert!(first.meta.storage_path.ends_with("/photos/pic_png_320x_sharpen_q85.jpg"));

    // Cached; the mock expects exactly one fetch
    let second = engine.render(&url, "320x", &["sharpen"]).await.unwrap().unwrap();
    assert_eq!(first.url, second.url);
}

#[tokio::test]
async fn test_engine_remote_failure_modes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let url = format!("{}/gone.png", server.uri());

    let lenient = ThumbnailEngine::builder(ThumbnailSettings::default())
        .storage(Arc::new(MemoryStorage::new("/media")))
        .meta_store(Arc::new(MemoryMetaStore::new()))
        .build()
        .await
        .unwrap();
    assert!(lenient.render(&url, "100x100", &["crop"]).await.unwrap().is_none());

    let strict = ThumbnailEngine::builder(ThumbnailSettings {
        debug: true,
        ..Default::default()
    })
    .storage(Arc::new(MemoryStorage::new("/media")))
    .meta_store(Arc::new(MemoryMetaStore::new()))
    .build()
    .await
    .unwrap();
    assert!(matches!(
        strict.render(&url, "100x100", &["crop"]).await,
        Err(ThumbnailError::Source(SourceError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_repeated_slashes_render_over_local_storage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let engine = ThumbnailEngine::builder(ThumbnailSettings {
        storage: StorageSettings {
            root: dir.path().to_string_lossy().into_owned(),
            ..Default::default()
        },
        ..Default::default()
    })
    .meta_store(Arc::new(MemoryMetaStore::new()))
    .build()
    .await
    .unwrap();

    let url = format!("{}//photos/pic.png", server.uri());
    let thumb = engine
        .render(&url, "240x240", &["sharpen"])
        .await
        .unwrap()
        .expect("lenient render of a valid remote source");
    assert_eq!((thumb.width, thumb.height), (240, 180));
    assert!(thumb
        .meta
        .storage_path
        .ends_with("%2F%2Fphotos/pic_png_240x240_sharpen_q85.jpg"));
    assert!(dir.path().join(&thumb.meta.storage_path).is_file());
}
