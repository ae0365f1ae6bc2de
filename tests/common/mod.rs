#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use colabri_live::{
    AppState,
    client::{ConnectionSession, SessionConfig, SessionEvent},
    config::Config,
    db::InMemoryDocumentStore,
    models::{ServerMessage, Task, TaskAssignment, TaskUser},
    routes::create_app,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const SECRET: &str = "integration-secret";
pub const WAIT: Duration = Duration::from_secs(3);

pub fn token(user_id: &str) -> String {
    let claims = json!({
        "sub": user_id,
        "type": "user",
        "exp": chrono::Utc::now().timestamp() + 600,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

pub fn test_config() -> Config {
    Config {
        cloud_auth_jwt_secret: Some(SECRET.to_string()),
        ..Config::default()
    }
}

pub fn task(id: &str, owner: &str, assignees: &[&str]) -> Task {
    let mut task = Task::new(id, format!("Task {}", id), TaskUser::new(owner));
    task.assignments = assignees
        .iter()
        .map(|user_id| TaskAssignment { user_id: user_id.to_string(), user: None })
        .collect();
    task
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub url: String,
    pub state: AppState,
}

pub async fn start_server(store: InMemoryDocumentStore) -> TestServer {
    let state = AppState::new(test_config(), Arc::new(store));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestServer { addr, url: format!("ws://{}/ws", addr), state }
}

/// TCP pass-through in front of a server whose live links can be cut,
/// standing in for a network failure. New connections keep working.
pub struct TcpRelay {
    pub url: String,
    pipes: Arc<Mutex<Vec<JoinHandle<()>>>>,
    accept: JoinHandle<()>,
}

impl TcpRelay {
    pub async fn start(target: SocketAddr) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let pipes = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::clone(&pipes);
        let accept = tokio::spawn(async move {
            while let Ok((mut inbound, _)) = listener.accept().await {
                let pipe = tokio::spawn(async move {
                    if let Ok(mut outbound) = TcpStream::connect(target).await {
                        let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                    }
                });
                registry.lock().unwrap().push(pipe);
            }
        });
        Self { url: format!("ws://{}/ws", addr), pipes, accept }
    }

    /// Drop every live link without a websocket close handshake.
    pub fn sever(&self) {
        for pipe in self.pipes.lock().unwrap().drain(..) {
            pipe.abort();
        }
    }
}

impl Drop for TcpRelay {
    fn drop(&mut self) {
        self.sever();
        self.accept.abort();
    }
}

pub struct Client {
    pub session: ConnectionSession,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Client {
    /// Next event whose name is `name`, skipping others.
    pub async fn expect(&mut self, name: &str) -> SessionEvent {
        let name = name.to_string();
        timeout(WAIT, async {
            loop {
                let event = self.events.recv().await.expect("event stream closed");
                if event.name() == name {
                    return event;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for '{}'", name))
    }

    /// Round-trip a ping and return every event that arrived before the pong.
    /// Anything the server queued for us earlier has been delivered by then.
    pub async fn fence(&mut self) -> Vec<SessionEvent> {
        self.session.ping().unwrap();
        let mut seen = Vec::new();
        timeout(WAIT, async {
            loop {
                match self.events.recv().await.expect("event stream closed") {
                    SessionEvent::Server(ServerMessage::Pong(_)) => return,
                    other => seen.push(other),
                }
            }
        })
        .await
        .expect("timed out waiting for pong");
        seen
    }
}

/// Connect as `user_id`, recording the named events plus `pong`.
pub async fn connect(server: &TestServer, user_id: &str, events: &[&str]) -> Client {
    connect_url(&server.url, user_id, events).await
}

pub async fn connect_url(url: &str, user_id: &str, events: &[&str]) -> Client {
    let session = ConnectionSession::new(SessionConfig::new(url, token(user_id)));
    let (tx, rx) = mpsc::unbounded_channel();
    for name in events.iter().copied().chain(["pong"]) {
        let tx = tx.clone();
        session.on(name, move |event| {
            let _ = tx.send(event);
        });
    }
    session.connect().await.unwrap();
    Client { session, events: rx }
}

pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(WAIT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
