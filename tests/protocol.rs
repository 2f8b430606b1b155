//! Connection-level behaviour: framing, session lifecycle, eviction and the
//! bounded worker pool.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use serde_json::json;
use voteflix::admin::AdminControl;

use common::{Client, TestServer, status, test_config};

#[tokio::test]
async fn bad_credentials_are_rejected_and_connection_stays_open() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let response = client
        .request(json!({ "operacao": "LOGIN", "usuario": "ghost", "senha": "nope123" }))
        .await;
    assert_eq!(status(&response), "403");
    assert!(server.state.sessions.is_empty());

    let token = client.login("admin", "admin").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn login_registers_exactly_one_session() {
    let server = TestServer::start().await;
    server.create_user("alice", "secret1").await;
    let alice = server.user_id("alice").await;

    let mut client = server.client().await;
    client.login("alice", "secret1").await;

    assert_eq!(server.state.sessions.len(), 1);
    let handle = server.state.sessions.lookup(alice).expect("alice online");
    assert!(!handle.is_closed());
}

#[tokio::test]
async fn logout_answers_then_closes_and_unregisters() {
    let server = TestServer::start().await;
    server.create_user("alice", "secret1").await;

    let mut client = server.client().await;
    let token = client.login("alice", "secret1").await;
    let response = client
        .request(json!({ "operacao": "LOGOUT", "token": token }))
        .await;
    assert_eq!(status(&response), "200");

    client.expect_closed().await;
    server.wait_until(|state| state.sessions.is_empty()).await;
}

#[rstest]
#[case::logout("LOGOUT")]
#[case::delete_account("DELETE_OWN_ACCOUNT")]
#[tokio::test]
async fn failed_session_ending_requests_keep_the_connection(#[case] operation: &str) {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let response = client
        .request(json!({ "operacao": operation, "token": "not-a-token" }))
        .await;
    assert_eq!(status(&response), "401");

    let response = client.request(json!({ "operacao": operation })).await;
    assert_eq!(status(&response), "401");

    client.login("admin", "admin").await;
}

#[tokio::test]
async fn deleting_own_account_closes_the_connection() {
    let server = TestServer::start().await;
    server.create_user("bob", "secret1").await;

    let mut client = server.client().await;
    let token = client.login("bob", "secret1").await;
    let response = client
        .request(json!({ "operacao": "DELETE_OWN_ACCOUNT", "token": token }))
        .await;
    assert_eq!(status(&response), "200");
    client.expect_closed().await;
    server.wait_until(|state| state.sessions.is_empty()).await;

    let mut again = server.client().await;
    let response = again
        .request(json!({ "operacao": "LOGIN", "usuario": "bob", "senha": "secret1" }))
        .await;
    assert_eq!(status(&response), "403");
}

#[rstest]
#[case::not_json("this is not json")]
#[case::array("[1,2,3]")]
#[case::missing_operation(r#"{"usuario":"admin"}"#)]
#[tokio::test]
async fn malformed_lines_get_422_and_connection_stays_open(#[case] line: &str) {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.send_raw(line).await;
    let response = client.recv().await;
    assert_eq!(status(&response), "422");
    assert!(response["mensagem"].is_string());

    client.login("admin", "admin").await;
}

#[tokio::test]
async fn invalid_utf8_gets_422() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    client.send_bytes(b"{\"operacao\":\"\xff\xfe\"}\n").await;
    assert_eq!(status(&client.recv().await), "422");
    client.login("admin", "admin").await;
}

#[tokio::test]
async fn unknown_operations_get_400_with_or_without_token() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    let response = client.request(json!({ "operacao": "TELEPORT" })).await;
    assert_eq!(status(&response), "400");

    let token = client.login("admin", "admin").await;
    let response = client
        .request(json!({ "operacao": "TELEPORT", "token": token }))
        .await;
    assert_eq!(status(&response), "400");

    let response = client
        .request(json!({ "operacao": "LIST_USERS", "token": token }))
        .await;
    assert_eq!(status(&response), "200");
}

#[tokio::test]
async fn every_request_line_gets_exactly_one_response() {
    let server = TestServer::start().await;
    let mut client = server.client().await;

    // 空行不计入请求
    let batch = concat!(
        "{\"operacao\":\"LIST_MOVIES\"}\n",
        "\n",
        "garbage\r\n",
        "{\"operacao\":\"NOPE\"}\n",
        "   \n",
        "{\"operacao\":\"LOGIN\",\"usuario\":\"admin\",\"senha\":\"admin\"}\n",
    );
    client.send_bytes(batch.as_bytes()).await;

    let statuses: Vec<String> = {
        let mut statuses = Vec::new();
        for _ in 0..4 {
            statuses.push(status(&client.recv().await).to_string());
        }
        statuses
    };
    assert_eq!(statuses, ["401", "422", "400", "200"]);
    client.expect_silence(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn oversized_line_gets_422_then_close() {
    let mut config = test_config();
    config.max_line_bytes = 64;
    let server = TestServer::start_with(config).await;
    let mut client = server.client().await;

    let mut line = vec![b'x'; 200];
    line.push(b'\n');
    client.send_bytes(&line).await;

    assert_eq!(status(&client.recv().await), "422");
    client.expect_closed().await;
}

#[tokio::test]
async fn evicting_a_user_closes_their_connection() {
    let server = TestServer::start().await;
    server.create_user("carol", "secret1").await;
    let carol = server.user_id("carol").await;
    let admin = AdminControl::new(&server.state, Arc::clone(&server.connections));

    let mut client = server.client().await;
    client.login("carol", "secret1").await;
    assert_eq!(admin.logged_in_users().len(), 1);

    assert!(admin.evict(carol));
    client.expect_closed().await;
    assert!(server.state.sessions.lookup(carol).is_none());
    assert!(!admin.evict(carol));

    server.wait_until(|_| server.connections.is_empty()).await;
}

#[tokio::test]
async fn admin_delete_user_evicts_the_deleted_session() {
    let server = TestServer::start().await;
    server.create_user("dave", "secret1").await;
    let dave = server.user_id("dave").await;

    let mut victim = server.client().await;
    victim.login("dave", "secret1").await;

    let mut admin = server.client().await;
    let token = admin.login("admin", "admin").await;
    let response = admin
        .request(json!({ "operacao": "ADMIN_DELETE_USER", "token": token, "id": dave.to_string() }))
        .await;
    assert_eq!(status(&response), "200");

    victim.expect_closed().await;
    assert!(server.state.sessions.lookup(dave).is_none());

    let response = admin
        .request(json!({ "operacao": "LIST_USERS", "token": token }))
        .await;
    assert_eq!(status(&response), "200");
    assert_eq!(response["usuarios"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn second_login_replaces_the_entry_without_closing_the_first() {
    let server = TestServer::start().await;
    server.create_user("erin", "secret1").await;
    let erin = server.user_id("erin").await;

    let mut first = server.client().await;
    first.login("erin", "secret1").await;
    let mut second = server.client().await;
    let token = second.login("erin", "secret1").await;
    assert_eq!(server.state.sessions.len(), 1);

    // 第一个连接仍可用
    let response = first
        .request(json!({ "operacao": "GET_OWN_PROFILE", "token": token }))
        .await;
    assert_eq!(status(&response), "200");

    drop(first);
    server.wait_until(|_| server.connections.len() == 1).await;
    assert!(server.state.sessions.lookup(erin).is_some());

    let response = second
        .request(json!({ "operacao": "GET_OWN_PROFILE", "token": token }))
        .await;
    assert_eq!(response["usuario"], json!("erin"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_logins_register_every_user() {
    const USERS: usize = 8;
    let server = TestServer::start().await;
    for i in 0..USERS {
        server.create_user(&format!("user{i}"), "secret1").await;
    }

    let mut tasks = Vec::new();
    for i in 0..USERS {
        let addr = server.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            client.login(&format!("user{i}"), "secret1").await;
            client
        }));
    }
    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.expect("login task"));
    }

    assert_eq!(server.state.sessions.len(), USERS);
    drop(clients);
    server.wait_until(|state| state.sessions.is_empty()).await;
}

#[tokio::test]
async fn pool_limit_defers_extra_clients() {
    let mut config = test_config();
    config.max_connections = 1;
    let server = TestServer::start_with(config).await;

    let mut first = server.client().await;
    first.login("admin", "admin").await;

    let mut second = server.client().await;
    second.send_raw(r#"{"operacao":"LIST_MOVIES"}"#).await;
    second.expect_silence(Duration::from_millis(300)).await;

    drop(first);
    assert_eq!(status(&second.recv().await), "401");
}

#[tokio::test]
async fn shutdown_closes_open_connections() {
    let server = TestServer::start().await;
    let mut client = server.client().await;
    client.login("admin", "admin").await;

    server.shutdown();
    client.expect_closed().await;
    server.wait_until(|state| state.sessions.is_empty()).await;
}
