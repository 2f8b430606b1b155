#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use voteflix::{
    AppState,
    admin::{ActiveConnections, ConnectionObserver},
    config::Config,
    database,
    server::Server,
};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_config() -> Config {
    let mut config = Config::with_secret("integration-test-secret");
    config.bcrypt_cost = 4;
    config
}

pub async fn test_state(config: Config) -> AppState {
    let pool = database::connect_in_memory()
        .await
        .expect("open in-memory database");
    database::init(&pool, &config).await.expect("init schema");
    AppState::new(pool, config)
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub connections: Arc<ActiveConnections>,
    shutdown: CancellationToken,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(test_config()).await
    }

    pub async fn start_with(mut config: Config) -> Self {
        config.server_host = "127.0.0.1".into();
        config.server_port = 0;
        let state = test_state(config).await;
        let connections = Arc::new(ActiveConnections::new());
        let observer: Arc<dyn ConnectionObserver> = connections.clone();
        let server = Server::bind(state.config.bind_addr(), state.clone(), observer)
        .await
        .expect("bind test server");
        let addr = server.local_addr().expect("local addr");
        let shutdown = server.shutdown_token();
        tokio::spawn(server.run());
        Self {
            addr,
            state,
            connections,
            shutdown,
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn client(&self) -> Client {
        Client::connect(self.addr).await
    }

    /// Creates an account through the protocol.
    pub async fn create_user(&self, username: &str, password: &str) {
        let mut client = self.client().await;
        let response = client
            .request(json!({
                "operacao": "CREATE_USER",
                "usuario": { "nome": username, "senha": password },
            }))
            .await;
        assert_eq!(status(&response), "201", "{response}");
    }

    pub async fn user_id(&self, username: &str) -> i64 {
        voteflix::routes::user::User::find_by_username(&self.state.pool, username)
            .await
            .expect("query user")
            .expect("user exists")
            .id
    }

    /// Polls until `check` holds; the server side of a socket close runs
    /// asynchronously to the client observing it.
    pub async fn wait_until(&self, mut check: impl FnMut(&AppState) -> bool) {
        tokio::time::timeout(IO_TIMEOUT, async {
            while !check(&self.state) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub struct Client {
    framed: Framed<TcpStream, LinesCodec>,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self {
            framed: Framed::new(stream, LinesCodec::new()),
        }
    }

    pub async fn send_raw(&mut self, line: &str) {
        self.framed.send(line).await.expect("send line");
    }

    pub async fn send_bytes(&mut self, bytes: &[u8]) {
        self.framed.get_mut().write_all(bytes).await.expect("send bytes");
    }

    pub async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(IO_TIMEOUT, self.framed.next())
            .await
            .expect("response in time")
            .expect("connection still open")
            .expect("valid line");
        serde_json::from_str(&line).expect("response is JSON")
    }

    pub async fn request(&mut self, request: Value) -> Value {
        self.send_raw(&request.to_string()).await;
        self.recv().await
    }

    pub async fn expect_closed(&mut self) {
        let next = tokio::time::timeout(IO_TIMEOUT, self.framed.next())
            .await
            .expect("server should close the connection");
        assert!(
            !matches!(next, Some(Ok(_))),
            "unexpected line before close: {next:?}"
        );
    }

    pub async fn expect_silence(&mut self, wait: Duration) {
        assert!(
            tokio::time::timeout(wait, self.framed.next()).await.is_err(),
            "expected no response"
        );
    }

    pub async fn login(&mut self, username: &str, password: &str) -> String {
        let response = self
            .request(json!({ "operacao": "LOGIN", "usuario": username, "senha": password }))
            .await;
        assert_eq!(status(&response), "200", "{response}");
        response["token"].as_str().expect("token").to_string()
    }
}

pub fn status(response: &Value) -> &str {
    response["status"].as_str().expect("status string")
}
