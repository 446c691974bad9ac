use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info, warn};

use crate::error::ChimeError;
use crate::runtime::RuntimeSnapshot;

pub const DEFAULT_API_BIND: &str = "127.0.0.1";
pub const DEFAULT_API_PORT: u16 = 8787;

#[derive(Debug, Default)]
pub struct ApiSharedState {
    pub runtime: RuntimeSnapshot,
    requests_served: u64,
}

impl ApiSharedState {
    pub fn requests_served(&self) -> u64 {
        self.requests_served
    }
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

/// Read-only HTTP view of the runtime, served from a background thread.
pub struct ApiServer {
    pub state: Arc<Mutex<ApiSharedState>>,
    local_addr: Option<SocketAddr>,
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(config: ApiServerConfig) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow!("failed to start API server on {bind}: {err}"))?;
        let local_addr = server.server_addr().to_ip();
        let state = Arc::new(Mutex::new(ApiSharedState::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let state_for_thread = Arc::clone(&state);
        let stop_for_thread = Arc::clone(&stop);
        let http_join = thread::Builder::new()
            .name("status-api".to_string())
            .spawn(move || run_server_loop(server, state_for_thread, stop_for_thread))?;

        info!(
            addr = %local_addr.map(|addr| addr.to_string()).unwrap_or(bind),
            "status API listening"
        );
        Ok(Self {
            state,
            local_addr,
            stop,
            http_join: Some(http_join),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Replaces the served snapshot. A poisoned lock is reported, not fatal.
    pub fn publish(&self, snapshot: RuntimeSnapshot) -> Result<(), ChimeError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| ChimeError::StatusPublishFailure("API state lock poisoned".to_string()))?;
        guard.runtime = snapshot;
        Ok(())
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

fn run_server_loop(server: Server, state: Arc<Mutex<ApiSharedState>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => {
                if let Err(err) = handle_request(request, &state) {
                    warn!(error = %format!("{err:#}"), "API response failed");
                }
            }
            Ok(None) => continue,
            Err(_) => continue,
        }
    }
}

fn handle_request(request: tiny_http::Request, state: &Arc<Mutex<ApiSharedState>>) -> Result<()> {
    if request.method() != &Method::Get {
        return respond(request, 405, PLAIN_TEXT, b"method not allowed".to_vec());
    }

    let Some(remote_addr) = request.remote_addr() else {
        return respond(request, 400, PLAIN_TEXT, b"missing remote address".to_vec());
    };
    if !is_local_network_ip(remote_addr.ip()) {
        return respond(request, 403, PLAIN_TEXT, b"forbidden: local network only".to_vec());
    }

    let path = request_path(request.url()).to_string();
    debug!(%path, remote = %remote_addr, "API request");

    match path.as_str() {
        "/" | "/v1/state" => {
            let snapshot = {
                let Ok(mut guard) = state.lock() else {
                    return respond(request, 500, PLAIN_TEXT, b"internal state lock error".to_vec());
                };
                guard.requests_served += 1;
                guard.runtime.clone()
            };
            respond(request, 200, JSON, serde_json::to_vec(&snapshot)?)
        }
        "/healthz" => respond(request, 200, PLAIN_TEXT, b"ok".to_vec()),
        _ => respond(request, 404, PLAIN_TEXT, b"not found".to_vec()),
    }
}

const JSON: &str = "application/json; charset=utf-8";
const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

fn respond(
    request: tiny_http::Request,
    status: u16,
    content_type: &str,
    body: Vec<u8>,
) -> Result<()> {
    let header = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
        .map_err(|_| anyhow!("bad content type {content_type}"))?;
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(header);
    request.respond(response)?;
    Ok(())
}

/// The routed part of a request target. Query strings and fragments carry no
/// meaning for this API and are ignored.
fn request_path(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    match &url[..end] {
        "" => "/",
        path => path,
    }
}

fn is_local_v4(v4: Ipv4Addr) -> bool {
    v4.is_loopback() || v4.is_private() || v4.is_link_local()
}

fn is_local_network_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_local_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_local_v4(v4),
            None => v6.is_loopback() || v6.is_unique_local() || v6.is_unicast_link_local(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{Ipv6Addr, TcpStream};

    use super::*;

    fn request(addr: SocketAddr, method: &str, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        write!(
            stream,
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        )
        .expect("write request");
        let mut response = String::new();
        stream.read_to_string(&mut response).expect("read response");
        response
    }

    fn start_local() -> ApiServer {
        ApiServer::start(ApiServerConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
        })
        .expect("server")
    }

    #[test]
    fn local_network_ip_filter_accepts_private_and_loopback() {
        assert!(is_local_network_ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert!(is_local_network_ip(IpAddr::V4(Ipv4Addr::new(
            192, 168, 1, 44
        ))));
        assert!(is_local_network_ip(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_local_network_ip(IpAddr::V6(
            Ipv4Addr::new(10, 0, 0, 7).to_ipv6_mapped()
        )));
        assert!(!is_local_network_ip(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
        assert!(!is_local_network_ip(IpAddr::V6(
            Ipv4Addr::new(1, 1, 1, 1).to_ipv6_mapped()
        )));
    }

    #[test]
    fn query_and_fragment_do_not_change_the_route() {
        assert_eq!(request_path("/v1/state?pretty=1"), "/v1/state");
        assert_eq!(request_path("/healthz#top"), "/healthz");
        assert_eq!(request_path("?x=1"), "/");
        assert_eq!(request_path("/v1/state"), "/v1/state");
    }

    #[test]
    fn serves_latest_snapshot() {
        let server = start_local();
        let addr = server.local_addr().expect("bound address");
        server
            .publish(RuntimeSnapshot {
                next_chime: Some("15:30".to_string()),
                minute_of_hour: 30,
                active: true,
                ..RuntimeSnapshot::default()
            })
            .expect("publish");

        let response = request(addr, "GET", "/v1/state?pretty=1");
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"next_chime\":\"15:30\""));
        assert!(response.contains("\"minute_of_hour\":30"));

        let health = request(addr, "GET", "/healthz");
        assert!(health.starts_with("HTTP/1.1 200"));
        assert!(health.ends_with("ok"));

        let served = server.state.lock().expect("state").requests_served();
        assert_eq!(served, 1);
    }

    #[test]
    fn rejects_other_methods_and_paths() {
        let server = start_local();
        let addr = server.local_addr().expect("bound address");
        assert!(request(addr, "POST", "/v1/state").starts_with("HTTP/1.1 405"));
        assert!(request(addr, "GET", "/v1/schedule").starts_with("HTTP/1.1 404"));
    }
}
