//! Common test utilities for driver integration tests
//!
//! Provides an in-process mock server that speaks the driver wire format and
//! keeps a small in-memory HELLOWORLD table:
//! - `HELLOWORLD.insert(hello, world, dialect)`: one row per dialect
//! - `HELLOWORLD.select(dialect)`: `HELLO`/`WORLD` columns for that dialect

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use volt_driver::protocol::codec::{self, Invocation};
use volt_driver::protocol::login::hash_password;
use volt_driver::protocol::{
    frame, Column, LoginData, LoginResponse, ResponseFrame, ResponseStatus, Table,
    MAX_MESSAGE_SIZE,
};
use volt_driver::{Client, Connection, ConnectionConfig};

/// Handle used for replies nobody asked for
pub const ORPHAN_HANDLE: i64 = -1;

/// How the mock server answers calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Answer every call as soon as it is read
    Immediate,
    /// Collect calls in batches of `n` and answer each batch last-first
    Reversed(usize),
    /// Read calls but never answer
    Silent,
    /// Close the socket after reading `n` calls, without answering them
    DropAfter(usize),
    /// Send a reply for an unknown handle ahead of every real reply
    Orphan,
}

#[derive(Default)]
struct State {
    greetings: Vec<(String, String, String)>,
    handles: Vec<i64>,
}

pub struct MockServer {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Start a server accepting any credentials
    pub async fn start(mode: Mode) -> Self {
        Self::spawn(mode, None).await
    }

    /// Start a server that only accepts `username`/`password`
    pub async fn with_credentials(mode: Mode, username: &str, password: &str) -> Self {
        Self::spawn(mode, Some((username.to_string(), hash_password(password)))).await
    }

    async fn spawn(mode: Mode, credentials: Option<(String, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Mock server has no address");
        let state = Arc::new(Mutex::new(State::default()));
        let credentials = Arc::new(credentials);

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            let mut connection_id = 0;
            while let Ok((stream, _)) = listener.accept().await {
                connection_id += 1;
                tokio::spawn(serve(
                    stream,
                    mode,
                    connection_id,
                    accept_state.clone(),
                    credentials.clone(),
                ));
            }
        });

        Self { addr, state, task }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig::new(&self.address())
    }

    /// Every handle received so far, in arrival order, across connections
    pub fn handles(&self) -> Vec<i64> {
        self.state.lock().handles.clone()
    }

    /// Number of calls received so far
    pub fn calls(&self) -> usize {
        self.state.lock().handles.len()
    }

    pub fn greeting_count(&self) -> usize {
        self.state.lock().greetings.len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Open a connection to `server` with a fresh client
pub async fn connect(server: &MockServer) -> Connection {
    Client::new(server.config())
        .connect()
        .await
        .expect("Failed to connect to mock server")
}

pub fn insert_params(hello: &str, world: &str, dialect: &str) -> Vec<Value> {
    vec![json!(hello), json!(world), json!(dialect)]
}

pub fn login_data(connection_id: i64) -> LoginData {
    LoginData {
        host_id: 0,
        connection_id,
        cluster_start_timestamp: 1_700_000_000_000,
        leader_address: Ipv4Addr::LOCALHOST,
        build_string: "mock-server".to_string(),
    }
}

async fn serve(
    mut stream: TcpStream,
    mode: Mode,
    connection_id: i64,
    state: Arc<Mutex<State>>,
    credentials: Arc<Option<(String, Vec<u8>)>>,
) {
    let Ok((_, payload)) = frame::read_login_frame(&mut stream, MAX_MESSAGE_SIZE).await else {
        return;
    };
    let Ok(login) = codec::deserialize_login_message(&payload) else {
        return;
    };

    let accepted = match credentials.as_ref() {
        Some((username, hash)) => login.username == *username && login.password_hash == *hash,
        None => true,
    };
    let resp = if accepted {
        LoginResponse::accepted(&login_data(connection_id))
    } else {
        LoginResponse::rejected(1)
    };
    let payload = codec::serialize_login_response(&resp).expect("Failed to encode login response");
    if frame::write_frame(&mut stream, &payload, MAX_MESSAGE_SIZE).await.is_err() || !accepted {
        return;
    }

    let mut batch = Vec::new();
    let mut seen = 0;
    loop {
        let Ok(payload) = frame::read_frame(&mut stream, MAX_MESSAGE_SIZE).await else {
            return;
        };
        let call = codec::deserialize_invocation(&payload).expect("Failed to decode invocation");
        state.lock().handles.push(call.handle);
        seen += 1;

        let response = execute(&state, &call);
        let delivered = match mode {
            Mode::Immediate => reply(&mut stream, &response).await,
            Mode::Orphan => {
                let stray = ResponseFrame::success(ORPHAN_HANDLE, Vec::new());
                reply(&mut stream, &stray).await && reply(&mut stream, &response).await
            }
            Mode::Reversed(n) => {
                batch.push(response);
                let mut ok = true;
                if batch.len() >= n {
                    while let Some(resp) = batch.pop() {
                        ok &= reply(&mut stream, &resp).await;
                    }
                }
                ok
            }
            Mode::Silent => true,
            Mode::DropAfter(n) => seen < n,
        };
        if !delivered {
            return;
        }
    }
}

async fn reply(stream: &mut TcpStream, resp: &ResponseFrame) -> bool {
    let payload = codec::serialize_response(resp).expect("Failed to encode response");
    frame::write_frame(stream, &payload, MAX_MESSAGE_SIZE).await.is_ok()
}

fn execute(state: &Mutex<State>, call: &Invocation) -> ResponseFrame {
    match call.procedure.as_str() {
        "HELLOWORLD.insert" => {
            let fields: Vec<String> = call
                .params
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            let [hello, world, dialect] = fields.as_slice() else {
                return ResponseFrame::failure(
                    call.handle,
                    ResponseStatus::GracefulFailure,
                    "HELLOWORLD.insert expects three string parameters",
                );
            };

            let mut state = state.lock();
            if state.greetings.iter().any(|(_, _, d)| d == dialect) {
                return ResponseFrame::failure(
                    call.handle,
                    ResponseStatus::GracefulFailure,
                    &format!("Constraint violation: dialect {} already exists", dialect),
                );
            }
            state
                .greetings
                .push((hello.clone(), world.clone(), dialect.clone()));

            ResponseFrame::success(
                call.handle,
                vec![Table::new(vec![Column::new("modified_tuples", "BIGINT")]).with_row(vec![json!(1)])],
            )
        }
        "HELLOWORLD.select" => {
            let dialect = call.params.first().and_then(Value::as_str).unwrap_or_default();
            let mut table = Table::new(vec![
                Column::new("HELLO", "STRING"),
                Column::new("WORLD", "STRING"),
            ]);
            for (hello, world, d) in state.lock().greetings.iter() {
                if d == dialect {
                    table = table.with_row(vec![json!(hello), json!(world)]);
                }
            }
            ResponseFrame::success(call.handle, vec![table])
        }
        other => ResponseFrame::failure(
            call.handle,
            ResponseStatus::UnexpectedFailure,
            &format!("Procedure {} was not found", other),
        ),
    }
}
