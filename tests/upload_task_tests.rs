use ftps_uploader::*;
use std::path::Path;
use std::time::{Duration, SystemTime};
use uploader_ftp::testing::TestServer;
use uploader_ftp::{FtpClient, FtpErrorKind, FtpSecurityMode};

fn write(dir: &Path, name: &str, body: &[u8], age_secs: u64) {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let f = std::fs::File::options().write(true).open(&path).unwrap();
    f.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
}

fn config_for(server: &TestServer, local: &Path, password: &str) -> UploaderConfig {
    let mut cfg = UploaderConfig::default();
    cfg.server.host = "127.0.0.1".into();
    cfg.server.port = server.port;
    cfg.server.username = "device".into();
    cfg.server.password = Some(password.into());
    cfg.server.security = Security::None;
    cfg.server.connect_timeout_sec = 5;
    cfg.server.data_timeout_sec = 5;
    cfg.upload.local_dir = local.to_path_buf();
    cfg.upload.remote_dir = "/upload".into();
    cfg
}

#[tokio::test]
async fn test_full_run_against_server() {
    let server = TestServer::start("secret").await;
    server.put("/upload/old.db", b"old");
    server.put("/upload/notes.txt", b"v1");

    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "old.db", b"old", 600);
    write(tmp.path(), "new.db", b"new-backup", 60);
    write(tmp.path(), "meta.json", b"{\"n\":1}", 30);
    write(tmp.path(), "notes.txt", b"v2", 120);

    let task = UploadTask::new(config_for(&server, tmp.path(), "secret")).unwrap();
    let report = task.spawn().await.unwrap().unwrap();

    // Sent: new.db, meta.json, notes.txt (re-upload).
    assert_eq!(report.uploaded(), 3);
    assert_eq!(server.file("/upload/new.db").unwrap(), b"new-backup");
    assert_eq!(server.file("/upload/meta.json").unwrap(), b"{\"n\":1}");
    assert_eq!(server.file("/upload/notes.txt").unwrap(), b"v2");

    // old.db is on the server and is not the newest file: pruned locally.
    assert!(!tmp.path().join("old.db").exists());
    assert!(!tmp.path().join("meta.json").exists());
    assert!(tmp.path().join("new.db").exists());
    assert!(tmp.path().join("notes.txt").exists());

    assert_eq!(
        report.file("old.db").unwrap().action,
        FileAction::DeleteLocal
    );
    assert!(server.saw("QUIT"));
}

#[tokio::test]
async fn test_second_run_keeps_newest_backup() {
    let server = TestServer::start("secret").await;
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "backup.db", b"db", 60);

    let cfg = config_for(&server, tmp.path(), "secret");
    let first = UploadTask::new(cfg.clone()).unwrap().run().await.unwrap();
    assert_eq!(first.uploaded(), 1);

    let second = UploadTask::new(cfg).unwrap().run().await.unwrap();
    assert_eq!(second.uploaded(), 0);
    assert_eq!(second.file("backup.db").unwrap().action, FileAction::Keep);
    assert!(tmp.path().join("backup.db").exists());
}

#[tokio::test]
async fn test_explicit_ftps_run() {
    let server = TestServer::start_secure(FtpSecurityMode::Explicit, "secret").await;
    server.put("/upload/old.db", b"old");

    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "old.db", b"old", 600);
    write(tmp.path(), "new.db", b"new-backup", 60);
    write(tmp.path(), "meta.json", b"{}", 30);

    let mut cfg = config_for(&server, tmp.path(), "secret");
    cfg.server.security = Security::Explicit;
    cfg.server.accept_invalid_certs = true;
    let report = UploadTask::new(cfg).unwrap().run().await.unwrap();

    assert_eq!(report.uploaded(), 2);
    assert_eq!(server.file("/upload/new.db").unwrap(), b"new-backup");
    assert!(server.file("/upload/meta.json").is_some());
    assert!(!tmp.path().join("old.db").exists());
    assert!(!tmp.path().join("meta.json").exists());

    assert!(server.saw("AUTH TLS"));
    assert!(server.saw("PROT P"));
    // Every LIST and STOR went over TLS: three existence checks, two uploads.
    assert_eq!(server.with_state(|s| s.tls_data_connections), 5);
    assert!(server.saw("QUIT"));
}

#[tokio::test]
async fn test_implicit_ftps_run() {
    let server = TestServer::start_secure(FtpSecurityMode::Implicit, "secret").await;
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "a.txt", b"a", 30);

    let mut cfg = config_for(&server, tmp.path(), "secret");
    cfg.server.security = Security::Implicit;
    cfg.server.accept_invalid_certs = true;
    let report = UploadTask::new(cfg).unwrap().run().await.unwrap();

    assert_eq!(report.uploaded(), 1);
    assert_eq!(server.file("/upload/a.txt").unwrap(), b"a");
    assert!(!server.saw("AUTH"));
}

#[tokio::test]
async fn test_rejected_store_is_not_fatal() {
    let server = TestServer::start("secret").await;
    server.reject("/upload/a.json");

    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "a.json", b"{}", 30);
    write(tmp.path(), "b.json", b"{}", 30);

    let report = UploadTask::new(config_for(&server, tmp.path(), "secret"))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.rejected(), 1);
    assert!(report.file("a.json").unwrap().upload_error.is_some());
    assert!(tmp.path().join("a.json").exists());
    assert!(!tmp.path().join("b.json").exists());
    assert!(server.file("/upload/b.json").is_some());
}

#[tokio::test]
async fn test_wrong_password_aborts_run() {
    let server = TestServer::start("secret").await;
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "a.json", b"{}", 30);

    let err = UploadTask::new(config_for(&server, tmp.path(), "wrong"))
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind, UploadErrorKind::Remote);
    assert!(tmp.path().join("a.json").exists());
    assert!(!server.saw("STOR"));
}

#[tokio::test]
async fn test_creates_missing_remote_directory() {
    let server = TestServer::start("secret").await;
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "x.txt", b"x", 30);

    let mut cfg = config_for(&server, tmp.path(), "secret");
    cfg.upload.remote_dir = "/upload/device-7".into();
    cfg.upload.create_remote_dir = true;
    UploadTask::new(cfg).unwrap().run().await.unwrap();

    assert!(server.has_dir("/upload"));
    assert!(server.has_dir("/upload/device-7"));
    assert!(server.file("/upload/device-7/x.txt").is_some());
}

#[tokio::test]
async fn test_missing_local_dir_disconnects() {
    let server = TestServer::start("secret").await;
    let tmp = tempfile::tempdir().unwrap();

    let err = UploadTask::new(config_for(&server, &tmp.path().join("gone"), "secret"))
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.kind, UploadErrorKind::LocalDir);
    assert!(err.message.starts_with("No files found for upload in"));
    assert!(server.saw("QUIT"));
}

#[tokio::test]
async fn test_client_session_info() {
    let server = TestServer::start("secret").await;
    let cfg = config_for(&server, Path::new("/tmp"), "secret");

    let mut client = FtpClient::connect(cfg.connection()).await.unwrap();
    assert!(client.is_connected());
    assert_eq!(client.info.current_directory, "/");
    assert_eq!(client.info.server_banner.as_deref(), Some("220 test server ready"));
    assert!(client.features.size);
    assert!(!client.exists("/upload/none.bin").await.unwrap());

    server.put("/upload/there.bin", b"1234");
    assert!(client.exists("/upload/there.bin").await.unwrap());
    assert_eq!(client.size("/upload/there.bin").await.unwrap(), 4);
    assert!(client.size("/upload/none.bin").await.unwrap_err().is_missing_path());

    client.mkdir_all("/upload/sub").await.unwrap();
    assert_eq!(client.cwd("/upload/sub").await.unwrap(), "/upload/sub");
    assert_eq!(client.info.current_directory, "/upload/sub");
    client.noop().await.unwrap();
    client.quit().await.unwrap();
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_client_login_error_kind() {
    let server = TestServer::start("secret").await;
    let cfg = config_for(&server, Path::new("/tmp"), "nope");
    let err = FtpClient::connect(cfg.connection()).await.err().unwrap();
    assert_eq!(err.kind, FtpErrorKind::AuthFailed);
    assert_eq!(err.code, Some(530));
}
