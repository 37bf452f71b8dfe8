//! End-to-end router tests
//!
//! Drive a real InputManager over loopback TCP with the producer-side
//! session and verify records land in the configured sinks.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use parchment_config::Config;
use parchment_net::{Address, NetError, Session};
use parchment_protocol::{Chain, Record};
use parchment_router::{InputManager, OutputChain};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const DEADLINE: Duration = Duration::from_secs(5);

fn rec(category: &str, message: &str) -> Record {
    Record::new(category.as_bytes().to_vec(), message.as_bytes().to_vec())
}

fn chain_of(pairs: &[(&str, &str)]) -> Chain {
    pairs.iter().map(|(c, m)| rec(c, m)).collect()
}

/// Reserve a loopback port
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Today's expanded daily-sink path
fn dated(base: &Path, stem: &str, ext: &str) -> std::path::PathBuf {
    let now = Local::now();
    base.join(now.format("%Y/%m").to_string())
        .join(format!("{}_{}{}", stem, now.format("%Y-%m-%d"), ext))
}

/// Start a manager from config text with `PORT` substituted
async fn start_router(config_text: &str, port: u16) -> Arc<InputManager> {
    let config: Config = config_text.replace("PORT", &port.to_string()).parse().unwrap();
    let chain = OutputChain::compile(&config.outputs).unwrap();
    let manager = Arc::new(InputManager::new());
    manager.reconfigure(&config.inputs, chain).await;
    manager
}

#[tokio::test(flavor = "multi_thread")]
async fn test_happy_path_file_sink() {
    let dir = TempDir::new().unwrap();
    let port = free_port().await;
    let config = format!(
        r#"
        [[inputs]]
        address = "tcp://127.0.0.1:PORT"
        timeout_ms = 5000

        [[outputs]]
        pattern = ".*"
        type = "file"
        path = "{}/${{category}}/out.log"
        "#,
        dir.path().display()
    );
    let manager = start_router(&config, port).await;

    let address = Address::Tcp(format!("127.0.0.1:{port}"));
    let mut session = Session::connect(&address, DEADLINE).await.unwrap();
    session
        .write_chain(&chain_of(&[("app", "hello"), ("app", "world")]), DEADLINE)
        .await
        .expect("chain acknowledged with matching count");

    manager.shutdown().await;

    let path = dated(&dir.path().join("app"), "out", ".log");
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "[app] hello\n[app] world\n"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_category_split_across_two_files() {
    let dir = TempDir::new().unwrap();
    let port = free_port().await;
    let config = format!(
        r#"
        [[inputs]]
        address = "tcp://127.0.0.1:PORT"
        timeout_ms = 5000

        [[outputs]]
        pattern = "^a$"
        type = "file"
        format = "%message%"
        path = "{base}/file1.log"

        [[outputs]]
        pattern = "^b$"
        type = "file"
        format = "%message%"
        path = "{base}/file2.log"
        "#,
        base = dir.path().display()
    );
    let manager = start_router(&config, port).await;

    let address = Address::Tcp(format!("127.0.0.1:{port}"));
    let mut session = Session::connect(&address, DEADLINE).await.unwrap();
    // one frame, one ack for all three records
    session
        .write_chain(&chain_of(&[("a", "1"), ("b", "2"), ("a", "3")]), DEADLINE)
        .await
        .unwrap();

    manager.shutdown().await;

    let file1 = dated(dir.path(), "file1", ".log");
    let file2 = dated(dir.path(), "file2", ".log");
    assert_eq!(std::fs::read_to_string(&file1).unwrap(), "1\n3\n");
    assert_eq!(std::fs::read_to_string(&file2).unwrap(), "2\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_protocol_mismatch_closes_connection_only() {
    let dir = TempDir::new().unwrap();
    let port = free_port().await;
    let config = format!(
        r#"
        [[inputs]]
        address = "tcp://127.0.0.1:PORT"
        timeout_ms = 5000

        [[outputs]]
        type = "file"
        format = "%message%"
        path = "{}/out.log"
        "#,
        dir.path().display()
    );
    let manager = start_router(&config, port).await;

    // Handshake with a corrupt magic: server must drop the connection
    let mut bad = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    let mut frame = [0u8; 9];
    frame[0] = 0x01;
    frame[1..5].copy_from_slice(&0xdead_beefu32.to_le_bytes());
    frame[5..9].copy_from_slice(&1u32.to_le_bytes());
    bad.write_all(&frame).await.unwrap();
    let mut buf = [0u8; 1];
    let n = bad.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0, "server closes without replying");

    // The listener keeps accepting well-formed sessions
    let address = Address::Tcp(format!("127.0.0.1:{port}"));
    let mut session = Session::connect(&address, DEADLINE).await.unwrap();
    session
        .write_chain(&chain_of(&[("app", "still alive")]), DEADLINE)
        .await
        .unwrap();

    manager.shutdown().await;

    let path = dated(dir.path(), "out", ".log");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "still alive\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reconfigure_swaps_outputs_without_dropping_inputs() {
    let dir = TempDir::new().unwrap();
    let port = free_port().await;
    let config_one = format!(
        r#"
        [[inputs]]
        address = "tcp://127.0.0.1:PORT"
        timeout_ms = 5000

        [[outputs]]
        type = "file"
        format = "%message%"
        path = "{}/first.log"
        "#,
        dir.path().display()
    );
    let manager = start_router(&config_one, port).await;

    let address = Address::Tcp(format!("127.0.0.1:{port}"));
    let mut session = Session::connect(&address, DEADLINE).await.unwrap();
    session
        .write_chain(&chain_of(&[("app", "one")]), DEADLINE)
        .await
        .unwrap();

    // Same input, different output
    let config_two: Config = format!(
        r#"
        [[inputs]]
        address = "tcp://127.0.0.1:{port}"
        timeout_ms = 5000

        [[outputs]]
        type = "file"
        format = "%message%"
        path = "{}/second.log"
        "#,
        dir.path().display()
    )
    .parse()
    .unwrap();
    let chain = OutputChain::compile(&config_two.outputs).unwrap();
    manager.reconfigure(&config_two.inputs, chain).await;

    // The existing connection keeps working against the new outputs
    session
        .write_chain(&chain_of(&[("app", "two")]), DEADLINE)
        .await
        .unwrap();

    manager.shutdown().await;

    let first = dated(dir.path(), "first", ".log");
    let second = dated(dir.path(), "second", ".log");
    assert_eq!(std::fs::read_to_string(&first).unwrap(), "one\n");
    assert_eq!(std::fs::read_to_string(&second).unwrap(), "two\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_removed_input_stops_listening() {
    let dir = TempDir::new().unwrap();
    let port = free_port().await;
    let config = format!(
        r#"
        [[inputs]]
        address = "tcp://127.0.0.1:PORT"
        timeout_ms = 5000

        [[outputs]]
        type = "file"
        format = "%message%"
        path = "{}/out.log"
        "#,
        dir.path().display()
    );
    let manager = start_router(&config, port).await;

    let address = Address::Tcp(format!("127.0.0.1:{port}"));
    Session::connect(&address, DEADLINE).await.expect("listening");

    manager.shutdown().await;

    let result = Session::connect(&address, Duration::from_millis(500)).await;
    assert!(
        matches!(result, Err(NetError::Connect { .. }) | Err(NetError::Timeout)),
        "listener should be gone"
    );
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_unix_socket_input() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("parchment.sock");
    let config: Config = format!(
        r#"
        [[inputs]]
        address = "unix://{socket}"
        timeout_ms = 5000
        filemode = "0600"

        [[outputs]]
        type = "file"
        format = "%message%"
        path = "{base}/out.log"
        "#,
        socket = socket.display(),
        base = dir.path().display()
    )
    .parse()
    .unwrap();
    let chain = OutputChain::compile(&config.outputs).unwrap();
    let manager = Arc::new(InputManager::new());
    manager.reconfigure(&config.inputs, chain).await;

    let address = Address::Unix(socket.clone());
    let mut session = Session::connect(&address, DEADLINE).await.unwrap();
    session
        .write_chain(&chain_of(&[("app", "via unix")]), DEADLINE)
        .await
        .unwrap();

    manager.shutdown().await;

    let path = dated(dir.path(), "out", ".log");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "via unix\n");
}
