//! Integration tests for control socket client/server communication
//!
//! These tests verify the full request/response cycle between the control
//! client and server, including auth, error handling, and protocol
//! correctness.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::broadcast;
use warden_common::{Action, Signal};
use warden_control::{
    ControlAuthConfig, ControlClient, ControlError, ControlServer, Result, RuleCommand,
    SystemCommand,
    protocol::{Request, RequestCommand, Response, ResponseData, ResponsePayload},
    server::CommandHandler,
};
use warden_filter::{MatchMode, Rule};

/// Handler backed by a plain vector of rules
struct MockHandler {
    rules: Mutex<Vec<Rule>>,
}

impl MockHandler {
    fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CommandHandler for MockHandler {
    async fn handle_request(&self, request: Request) -> Result<Response> {
        match request.command {
            RequestCommand::Rules(cmd) => match cmd {
                RuleCommand::List => Ok(Response::data(ResponseData::Rules(
                    self.rules.lock().unwrap().clone(),
                ))),
                RuleCommand::Upsert(rule) => {
                    let mut rules = self.rules.lock().unwrap();
                    rules.retain(|existing| existing.id != rule.id);
                    rules.push(*rule);
                    Ok(Response::ok())
                }
                RuleCommand::Delete { id } => {
                    self.rules.lock().unwrap().retain(|rule| rule.id != id);
                    Ok(Response::ok())
                }
                RuleCommand::Clear => {
                    self.rules.lock().unwrap().clear();
                    Ok(Response::ok())
                }
                RuleCommand::Check { .. } => Ok(Response::error("not implemented in mock")),
            },
            RequestCommand::System(SystemCommand::Ping) => Ok(Response::ok()),
            RequestCommand::System(_) | RequestCommand::Process(_) => {
                Ok(Response::error("not implemented in mock"))
            }
        }
    }
}

struct TestServer {
    _tempdir: TempDir,
    socket_path: String,
    shutdown: broadcast::Sender<Signal>,
}

async fn start_server(auth: ControlAuthConfig) -> TestServer {
    let tempdir = TempDir::new().unwrap();
    let socket_path = tempdir
        .path()
        .join("warden.sock")
        .to_string_lossy()
        .into_owned();

    let server = ControlServer::new(socket_path.clone(), auth, Arc::new(MockHandler::new()));
    let (shutdown, _) = broadcast::channel(4);
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.serve(receiver).await;
    });

    // Give the server a beat to bind the socket.
    for _ in 0..50 {
        if std::path::Path::new(&socket_path).exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    TestServer {
        _tempdir: tempdir,
        socket_path,
        shutdown,
    }
}

#[tokio::test]
async fn ping_round_trip() {
    let server = start_server(ControlAuthConfig::default()).await;
    let client = ControlClient::new(&server.socket_path);

    let response = client
        .send_command(RequestCommand::System(SystemCommand::Ping))
        .await
        .unwrap();
    assert!(matches!(response.payload, ResponsePayload::Ok));

    let _ = server.shutdown.send(Signal::Shutdown);
}

#[tokio::test]
async fn rule_upsert_list_delete_cycle() {
    let server = start_server(ControlAuthConfig::default()).await;
    let client = ControlClient::new(&server.socket_path);

    let rule = Rule::new("r1", Action::Block, "example.com", MatchMode::Domain);
    client
        .send_command(RequestCommand::Rules(RuleCommand::Upsert(Box::new(
            rule.clone(),
        ))))
        .await
        .unwrap();

    let response = client
        .send_command(RequestCommand::Rules(RuleCommand::List))
        .await
        .unwrap();
    match response.payload {
        ResponsePayload::Data(data) => match *data {
            ResponseData::Rules(rules) => {
                assert_eq!(rules.len(), 1);
                assert_eq!(rules[0].id, "r1");
            }
            other => panic!("unexpected data {other:?}"),
        },
        other => panic!("unexpected payload {other:?}"),
    }

    // Delete is idempotent: a second delete of the same id still succeeds.
    for _ in 0..2 {
        let response = client
            .send_command(RequestCommand::Rules(RuleCommand::Delete {
                id: "r1".to_string(),
            }))
            .await
            .unwrap();
        assert!(response.is_success());
    }

    let _ = server.shutdown.send(Signal::Shutdown);
}

#[tokio::test]
async fn auth_rejects_missing_or_wrong_tokens() {
    let auth = ControlAuthConfig {
        enabled: true,
        token_hashes: vec![warden_control::auth::hash_token("correct-horse")],
    };
    let server = start_server(auth).await;

    let anonymous = ControlClient::new(&server.socket_path);
    let err = anonymous
        .send_command(RequestCommand::System(SystemCommand::Ping))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::Unauthorized));

    let wrong = ControlClient::new(&server.socket_path).with_token("battery-staple");
    let err = wrong
        .send_command(RequestCommand::System(SystemCommand::Ping))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::Unauthorized));

    let right = ControlClient::new(&server.socket_path).with_token("correct-horse");
    let response = right
        .send_command(RequestCommand::System(SystemCommand::Ping))
        .await
        .unwrap();
    assert!(response.is_success());

    let _ = server.shutdown.send(Signal::Shutdown);
}

#[tokio::test]
async fn one_connection_can_pipeline_requests() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let server = start_server(ControlAuthConfig::default()).await;
    let mut stream = tokio::net::UnixStream::connect(&server.socket_path)
        .await
        .unwrap();

    for _ in 0..3 {
        let request = Request::new(RequestCommand::System(SystemCommand::Ping));
        let frame = bincode::serde::encode_to_vec(&request, bincode::config::legacy()).unwrap();
        let len = u32::try_from(frame.len()).unwrap();
        stream.write_all(&len.to_be_bytes()).await.unwrap();
        stream.write_all(&frame).await.unwrap();

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut reply = vec![0u8; u32::from_be_bytes(len_buf) as usize];
        stream.read_exact(&mut reply).await.unwrap();

        let (response, _): (Response, _) =
            bincode::serde::decode_from_slice(&reply, bincode::config::legacy()).unwrap();
        assert!(matches!(response.payload, ResponsePayload::Ok));
    }

    let _ = server.shutdown.send(Signal::Shutdown);
}

#[tokio::test]
async fn connecting_to_a_missing_socket_fails() {
    let client = ControlClient::new("/tmp/definitely-not-there-warden.sock")
        .with_timeout(Duration::from_secs(1));
    assert!(client.check_socket_exists().is_err());
    assert!(
        client
            .send_command(RequestCommand::System(SystemCommand::Ping))
            .await
            .is_err()
    );
}
