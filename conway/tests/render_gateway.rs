use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use conway::codec;
use conway::patterns;
use conway::{
    GnoRenderGateway, RenderError, RenderGateway, ServiceConfig, SessionConfig, SessionHandle,
    SessionState,
};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const REALM: &str = "gno.land/r/test/life";

type Handler = Arc<dyn Fn(&str) -> (u16, String) + Send + Sync>;

/// Minimal JSON-RPC endpoint on a loopback port. `handler` receives the
/// board text the realm was asked to render and returns status + body.
struct FakeRpc {
    url: String,
    seen: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl Drop for FakeRpc {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn fake_rpc(handler: Handler) -> FakeRpc {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&seen);
    let task = tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let handler = Arc::clone(&handler);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let Ok(body) = read_body(&mut stream).await else {
                    return;
                };
                let board = requested_board(&body);
                log.lock().expect("log lock").push(board.clone());
                let (status, payload) = handler(&board);
                let reason = if status == 200 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                    payload.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    FakeRpc { url, seen, task }
}

async fn read_body(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(Vec::new());
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let start = end + 4;
        while buf.len() < start + length {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        return Ok(buf[start..].to_vec());
    }
}

fn requested_board(body: &[u8]) -> String {
    let request: Value = serde_json::from_slice(body).expect("JSON-RPC request");
    assert_eq!(request["method"], "abci_query");
    assert_eq!(request["params"][0], "vm/qrender");
    let data = request["params"][1].as_str().expect("base64 data");
    let query = String::from_utf8(BASE64.decode(data).expect("base64")).expect("utf8");
    let board = query
        .strip_prefix(&format!("{REALM}:"))
        .expect("query starts with realm path");
    board.to_string()
}

fn rendered(text: &str) -> (u16, String) {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {"response": {"ResponseBase": {
            "Error": null,
            "Data": BASE64.encode(text),
            "Log": ""
        }}}
    });
    (200, body.to_string())
}

fn gateway(url: &str, timeout: Duration) -> GnoRenderGateway {
    let config = ServiceConfig {
        remote_rpc: url.to_string(),
        realm_path: REALM.to_string(),
        request_timeout: timeout,
        ..ServiceConfig::default()
    };
    GnoRenderGateway::new(&config).expect("client builds")
}

fn glider() -> conway::Board {
    patterns::find("glider").expect("preset").board()
}

#[tokio::test]
async fn echo_realm_round_trips_the_board() {
    let rpc = fake_rpc(Arc::new(|board: &str| rendered(board))).await;
    let gateway = gateway(&rpc.url, Duration::from_secs(5));

    let next = gateway.advance(&glider()).await.expect("advance succeeds");
    assert_eq!(next, glider());

    let seen = rpc.seen.lock().expect("log lock").clone();
    assert_eq!(seen, vec![codec::encode(&glider())]);
}

#[tokio::test]
async fn newline_response_with_trimmed_rows_is_tolerated() {
    let rpc = fake_rpc(Arc::new(|_: &str| rendered("\n  O\n   O\n OOO\n\n"))).await;
    let gateway = gateway(&rpc.url, Duration::from_secs(5));

    let next = gateway.advance(&glider()).await.expect("tolerated");
    assert_eq!(next, glider());
}

#[tokio::test]
async fn wrong_shape_is_a_malformed_board() {
    let rpc = fake_rpc(Arc::new(|_: &str| rendered("OO\\nOO"))).await;
    let gateway = gateway(&rpc.url, Duration::from_secs(5));

    let err = gateway.advance(&glider()).await.unwrap_err();
    assert!(err.is_malformed_board(), "{err:?}");
}

#[tokio::test]
async fn http_error_status_is_reported() {
    let rpc = fake_rpc(Arc::new(|_: &str| (500, "{}".to_string()))).await;
    let gateway = gateway(&rpc.url, Duration::from_secs(5));

    let err = gateway.advance(&glider()).await.unwrap_err();
    assert!(matches!(err, RenderError::Status { status: 500, .. }), "{err:?}");
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));
    drop(listener);

    let err = gateway(&url, Duration::from_secs(5))
        .advance(&glider())
        .await
        .unwrap_err();
    assert!(err.is_transport(), "{err:?}");
}

#[tokio::test]
async fn silent_service_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));
    let hold = tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            open.push(stream);
        }
    });

    let err = gateway(&url, Duration::from_millis(150))
        .advance(&glider())
        .await
        .unwrap_err();
    assert!(err.is_transport(), "{err:?}");
    hold.abort();
}

#[tokio::test]
async fn controller_converges_against_echo_realm() {
    let rpc = fake_rpc(Arc::new(|board: &str| rendered(board))).await;
    let config = SessionConfig::builder()
        .tick_period(Duration::from_millis(20))
        .build()
        .expect("valid config");
    let session = SessionHandle::spawn(config, gateway(&rpc.url, Duration::from_secs(5)));
    let mut rx = session.subscribe();

    session.load_preset("block").await.expect("preset exists");
    session.start().await.expect("starts");

    let settled = tokio::time::timeout(
        Duration::from_secs(10),
        rx.wait_for(|s| s.state == SessionState::Paused && s.board.is_some()),
    )
    .await
    .expect("settles in time")
    .expect("controller alive")
    .clone();

    assert_eq!(settled.board, Some(patterns::find("block").expect("preset").board()));
    assert!(settled.last_error.is_none());
    assert_eq!(rpc.seen.lock().expect("log lock").len(), 1);
    session.shutdown().await.expect("shuts down");
}
