//! Common test utilities.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

use lobstore_rs::{Config, Database, FreePolicyKind, LobServerBuilder};

/// Lock timeout used by tests that expect `40XL1`.
pub const TEST_LOCK_TIMEOUT: Duration = Duration::from_millis(300);

/// Database in a private spill directory, removed on drop.
pub struct TestDb {
    pub dir: TempDir,
    pub db: Arc<Database>,
}

impl TestDb {
    pub fn open() -> Self {
        Self::open_with(FreePolicyKind::Embedded)
    }

    pub fn open_with(policy: FreePolicyKind) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir, policy);
        let db = Database::open(config).unwrap();
        Self { dir, db }
    }

    /// Number of spill files currently on disk.
    pub fn spill_files(&self) -> usize {
        std::fs::read_dir(self.dir.path()).unwrap().count()
    }
}

pub fn test_config(dir: &TempDir, policy: FreePolicyKind) -> Config {
    Config {
        spill_dir: dir.path().to_path_buf(),
        lock_timeout: TEST_LOCK_TIMEOUT,
        free_policy: policy,
        ..Config::default()
    }
}

/// Bytes `a..z` repeated, the way the loader of the LOB tables fills them.
pub fn looping_alphabet(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'a' + (i % 26) as u8).collect()
}

/// Row id source owned by one test.
#[derive(Default)]
pub struct RowIds {
    next: AtomicI64,
}

impl RowIds {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    pub fn next(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Test server wrapper.
pub struct TestServer {
    pub base_url: String,
    pub dir: TempDir,
}

impl TestServer {
    /// Creates and starts a test server on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dir = tempfile::tempdir().unwrap();

        let server = LobServerBuilder::new()
            .port(port)
            .spill_dir(dir.path())
            .lock_timeout(TEST_LOCK_TIMEOUT)
            .build()
            .unwrap();

        // Start server in background
        tokio::spawn(async move {
            server.serve(listener).await.unwrap();
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            dir,
        }
    }

    pub fn sessions_url(&self) -> String {
        format!("{}/sessions", self.base_url)
    }

    pub fn session_url(&self, session: &str) -> String {
        format!("{}/sessions/{}", self.base_url, session)
    }

    pub fn lob_url(&self, session: &str, lob: &str) -> String {
        format!("{}/sessions/{}/lobs/{}", self.base_url, session, lob)
    }

    pub fn row_url(&self, session: &str, table: &str, id: i64) -> String {
        format!("{}/sessions/{}/rows/{}/{}", self.base_url, session, table, id)
    }

    /// Opens a session and returns its id.
    pub async fn open_session(&self, client: &reqwest::Client, isolation: Option<&str>) -> String {
        let mut request = client.post(self.sessions_url());
        if let Some(level) = isolation {
            request = request.query(&[("isolation", level)]);
        }
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), 201);
        let xml = response.text().await.unwrap();
        xml_attr(&xml, "Id").unwrap()
    }
}

/// Returns the text of the first `<tag>` element.
pub fn xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].to_string())
}

/// Returns the value of the first `name="..."` attribute.
pub fn xml_attr(xml: &str, name: &str) -> Option<String> {
    let marker = format!(r#" {}=""#, name);
    let start = xml.find(&marker)? + marker.len();
    let end = xml[start..].find('"')? + start;
    Some(xml[start..end].to_string())
}
