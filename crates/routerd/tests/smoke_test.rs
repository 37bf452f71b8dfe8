//! Smoke test for the full pipeline
//!
//! producer writer -> router input -> relay output -> upstream router,
//! all over real loopback sockets.

use std::sync::Arc;
use std::time::Duration;

use parchment_client::{ClientConfig, LogWriter};
use parchment_config::Config;
use parchment_net::ServerSession;
use parchment_protocol::Record;
use parchment_router::{InputManager, OutputChain};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

const DEADLINE: Duration = Duration::from_secs(5);

/// Accept loop collecting every record the upstream receives
fn spawn_upstream(listener: TcpListener, seen: Arc<Mutex<Vec<Record>>>) {
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                let Ok(mut session) = ServerSession::accept(Box::new(stream), DEADLINE).await
                else {
                    return;
                };
                while let Ok(Some(chain)) = session.read(DEADLINE).await {
                    seen.lock().await.extend(chain);
                    if session.acknowledge_last(DEADLINE).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn test_producer_to_upstream_through_relay() {
    // Upstream router
    let upstream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream_listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    spawn_upstream(upstream_listener, Arc::clone(&seen));

    // Local router relaying everything upstream
    let spool_dir = TempDir::new().unwrap();
    let input_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let input_port = input_listener.local_addr().unwrap().port();
    drop(input_listener);

    let config: Config = format!(
        r#"
        [[inputs]]
        address = "tcp://127.0.0.1:{input_port}"
        timeout_ms = 5000

        [[outputs]]
        type = "relay"
        remote = "tcp://{upstream_addr}"
        spool_dir = "{spool}"
        "#,
        spool = spool_dir.path().display()
    )
    .parse()
    .unwrap();

    let chain = OutputChain::compile(&config.outputs).unwrap();
    let manager = Arc::new(InputManager::new());
    manager.reconfigure(&config.inputs, chain).await;

    // Producer
    let writer = LogWriter::new(ClientConfig {
        address: format!("tcp://127.0.0.1:{input_port}"),
        timeout: Duration::from_secs(2),
        ..Default::default()
    })
    .unwrap();

    for n in 0..50 {
        writer
            .add_message(b"app", format!("event-{n:02}").as_bytes())
            .unwrap();
    }
    writer.close().await;

    // The relay delivers asynchronously; wait for everything upstream
    for _ in 0..250 {
        if seen.lock().await.len() == 50 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    manager.shutdown().await;

    let seen = seen.lock().await;
    assert_eq!(seen.len(), 50);
    let messages: Vec<String> = seen
        .iter()
        .map(|r| String::from_utf8_lossy(&r.message).into_owned())
        .collect();
    let expected: Vec<String> = (0..50).map(|n| format!("event-{n:02}")).collect();
    assert_eq!(messages, expected);
    assert_eq!(&seen[0].category[..], b"app");
}
