//! End-to-end scenarios driving a [`hls_fetchd::TaskManager`] against a
//! mock HTTP server, mirroring the integration-test style of the pack's
//! `m3u-proxy` repo (`tests/*.rs`, wiremock-less `axum::Router` calls there;
//! here `wiremock::MockServer` stands in for the upstream CDN).
//!
//! `wiremock`'s server binds to loopback, which the production
//! `DnsSafetyFilter` would correctly reject — every scenario below except
//! the safety-filter one therefore runs the manager with
//! [`hls_fetchd::safety::AllowAllSafety`], a trusted-context test double.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hls_fetchd::safety::{AllowAllSafety, UrlSafety};
use hls_fetchd::task::{TaskOptionsInput, TaskStatus};
use hls_fetchd::{Config, TaskManager};

fn manager_with_safety(download_dir: &std::path::Path, safety: Arc<dyn UrlSafety>) -> TaskManager {
    let config = Config {
        download_dir: download_dir.to_string_lossy().to_string(),
        ..Config::default()
    };
    TaskManager::with_safety(&config, safety)
}

fn manager(download_dir: &std::path::Path) -> TaskManager {
    manager_with_safety(download_dir, Arc::new(AllowAllSafety))
}

fn input(url: impl Into<String>) -> TaskOptionsInput {
    TaskOptionsInput {
        url: url.into(),
        title: "scenario".to_string(),
        max_retries: Some(1),
        ..Default::default()
    }
}

async fn wait_terminal(mgr: &TaskManager, id: &str) -> hls_fetchd::TaskSnapshot {
    for _ in 0..200 {
        let snap = mgr.snapshot(id).unwrap();
        if snap.status.is_terminal() {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {id} never reached a terminal state");
}

async fn wait_until_progress(mgr: &TaskManager, id: &str, downloaded: usize) -> hls_fetchd::TaskSnapshot {
    for _ in 0..200 {
        let snap = mgr.snapshot(id).unwrap();
        if snap.downloaded_segments >= downloaded || snap.status.is_terminal() {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {id} never reached {downloaded} completed segments");
}

fn plain_playlist(base: &str, count: usize) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:0\n");
    for i in 0..count {
        out.push_str(&format!("#EXTINF:2.0,\n{base}/seg{i}.ts\n"));
    }
    out.push_str("#EXT-X-ENDLIST\n");
    out
}

#[tokio::test]
async fn scenario_1_plain_segments_concatenate_in_order() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/index.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(plain_playlist(&base, 3)))
        .mount(&server)
        .await;
    for i in 0..3 {
        Mock::given(method("GET"))
            .and(path(format!("/seg{i}.ts")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![i as u8; 16]))
            .mount(&server)
            .await;
    }

    let tmp = tempfile::tempdir().unwrap();
    let mgr = manager(tmp.path());
    let id = mgr.create(input(format!("{base}/index.m3u8"))).unwrap();
    mgr.start(&id).unwrap();

    let snap = wait_terminal(&mgr, &id).await;
    assert_eq!(snap.status, TaskStatus::Completed);
    let bytes = std::fs::read(snap.output_path.unwrap()).unwrap();
    assert_eq!(bytes, vec![0u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
                           1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
                           2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2]);
}

#[tokio::test]
async fn scenario_2_aes128_with_explicit_iv_decrypts() {
    use aes::Aes128;
    use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::NoPadding};

    let server = MockServer::start().await;
    let base = server.uri();

    let key = [7u8; 16];
    let iv = [9u8; 16];
    let plaintext = *b"0123456789abcdef"; // exactly one AES block
    let mut buf = plaintext.to_vec();
    let ciphertext = cbc::Encryptor::<Aes128>::new((&key).into(), (&iv).into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, plaintext.len())
        .unwrap()
        .to_vec();

    let playlist = format!(
        "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:0\n#EXT-X-KEY:METHOD=AES-128,URI=\"{base}/key\",IV=0x{}\n#EXTINF:2.0,\n{base}/seg0.ts\n#EXT-X-ENDLIST\n",
        hex::encode(iv)
    );

    Mock::given(method("GET"))
        .and(path("/index.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(playlist))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/key"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(key.to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/seg0.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(ciphertext))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let mgr = manager(tmp.path());
    let id = mgr.create(input(format!("{base}/index.m3u8"))).unwrap();
    mgr.start(&id).unwrap();

    let snap = wait_terminal(&mgr, &id).await;
    assert_eq!(snap.status, TaskStatus::Completed);
    let bytes = std::fs::read(snap.output_path.unwrap()).unwrap();
    assert_eq!(bytes, plaintext);
}

#[tokio::test]
async fn scenario_3_aes128_with_implicit_iv_from_media_sequence() {
    use aes::Aes128;
    use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::NoPadding};

    let server = MockServer::start().await;
    let base = server.uri();

    let key = [3u8; 16];
    let iv = hls_fetchd::crypto::implicit_iv(42, 0);
    let plaintext = *b"fedcba9876543210";
    let mut buf = plaintext.to_vec();
    let ciphertext = cbc::Encryptor::<Aes128>::new((&key).into(), (&iv).into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, plaintext.len())
        .unwrap()
        .to_vec();

    let playlist = format!(
        "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:42\n#EXT-X-KEY:METHOD=AES-128,URI=\"{base}/key\"\n#EXTINF:2.0,\n{base}/seg0.ts\n#EXT-X-ENDLIST\n"
    );

    Mock::given(method("GET"))
        .and(path("/index.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(playlist))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/key"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(key.to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/seg0.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(ciphertext))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let mgr = manager(tmp.path());
    let id = mgr.create(input(format!("{base}/index.m3u8"))).unwrap();
    mgr.start(&id).unwrap();

    let snap = wait_terminal(&mgr, &id).await;
    assert_eq!(snap.status, TaskStatus::Completed);
    let bytes = std::fs::read(snap.output_path.unwrap()).unwrap();
    assert_eq!(bytes, plaintext);
}

/// Rejects any URL containing `forbidden`, standing in for the real
/// `DnsSafetyFilter`'s loopback/private-range rejection (already exercised
/// directly in `safety::tests`) without requiring the mock server itself to
/// sit on a non-loopback address.
#[derive(Debug, Default, Clone, Copy)]
struct BlocklistSafety;

#[async_trait]
impl UrlSafety for BlocklistSafety {
    async fn is_safe(&self, url: &str) -> bool {
        !url.contains("forbidden")
    }
}

#[tokio::test]
async fn scenario_4_unsafe_segment_url_fails_without_retrying() {
    let server = MockServer::start().await;
    let base = server.uri();

    let playlist = format!(
        "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:0\n#EXTINF:2.0,\n{base}/forbidden/seg0.ts\n#EXT-X-ENDLIST\n"
    );
    Mock::given(method("GET"))
        .and(path("/index.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(playlist))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let mgr = manager_with_safety(tmp.path(), Arc::new(BlocklistSafety));
    let id = mgr.create(input(format!("{base}/index.m3u8"))).unwrap();
    mgr.start(&id).unwrap();

    let snap = wait_terminal(&mgr, &id).await;
    assert_eq!(snap.status, TaskStatus::Error);
    assert!(snap.message.contains("内部网络"));
    assert_eq!(snap.segments[0].retries, 0);
}

#[tokio::test]
async fn scenario_5_force_save_mid_download_produces_partial_file() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/index.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(plain_playlist(&base, 5)))
        .mount(&server)
        .await;
    for i in 0..5 {
        Mock::given(method("GET"))
            .and(path(format!("/seg{i}.ts")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![i as u8; 16])
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;
    }

    let tmp = tempfile::tempdir().unwrap();
    let mgr = manager(tmp.path());
    let id = mgr.create(input(format!("{base}/index.m3u8"))).unwrap();
    mgr.start(&id).unwrap();

    wait_until_progress(&mgr, &id, 2).await;
    mgr.force_save(&id).unwrap();

    let snap = wait_terminal(&mgr, &id).await;
    assert_eq!(snap.status, TaskStatus::Forced);
    let output_path = snap.output_path.unwrap();
    assert!(output_path.ends_with(".partial.ts"));
    assert!(snap.downloaded_segments < 5);
    assert!(snap.downloaded_segments >= 2);
}

#[tokio::test]
async fn scenario_6_retry_segment_rewinds_and_redownloads() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/index.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(plain_playlist(&base, 3)))
        .mount(&server)
        .await;
    for i in 0..3 {
        Mock::given(method("GET"))
            .and(path(format!("/seg{i}.ts")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![i as u8; 16]))
            .mount(&server)
            .await;
    }

    let tmp = tempfile::tempdir().unwrap();
    let mgr = manager(tmp.path());
    let id = mgr.create(input(format!("{base}/index.m3u8"))).unwrap();
    mgr.start(&id).unwrap();

    wait_until_progress(&mgr, &id, 2).await;
    mgr.retry_segment(&id, 1).unwrap();

    let snap = wait_terminal(&mgr, &id).await;
    assert_eq!(snap.status, TaskStatus::Completed);
    let bytes = std::fs::read(snap.output_path.unwrap()).unwrap();
    assert_eq!(bytes.len(), 48);
    assert_eq!(&bytes[16..32], &[1u8; 16][..]);
}
