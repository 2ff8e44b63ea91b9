use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, anyhow};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use serde::Serialize;
use serde_json::{Value, json};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info, warn};

use crate::controller::WidgetController;

pub const MDNS_SERVICE_TYPE: &str = "_delaystart._tcp.local.";
pub const DEFAULT_API_PORT: u16 = 8420;

pub type SharedController = Arc<Mutex<WidgetController>>;

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub mdns_enabled: bool,
    pub mdns_instance: String,
}

pub struct ApiServer {
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
    mdns: Option<ServiceDaemon>,
}

impl ApiServer {
    pub fn start(config: ApiServerConfig, controller: SharedController) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server =
            Server::http(&bind).map_err(|err| anyhow!("failed to start API server on {bind}: {err}"))?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let http_join =
            thread::spawn(move || run_server_loop(server, controller, stop_for_thread));
        info!(%bind, "widget API listening");

        let mdns = if config.mdns_enabled {
            match start_mdns_advertisement(config.port, &config.mdns_instance) {
                Ok(daemon) => Some(daemon),
                Err(err) => {
                    warn!("mDNS advertisement disabled: {err}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            stop,
            http_join: Some(http_join),
            mdns,
        })
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
        if let Some(mdns) = self.mdns.take() {
            let _ = mdns.shutdown();
        }
        debug!("widget API stopped");
    }
}

fn run_server_loop(server: Server, controller: SharedController, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => handle_request(request, &controller),
            Ok(None) => continue,
            Err(_) => continue,
        }
    }
}

#[derive(Debug)]
enum ApiReply {
    Json(u16, Value),
    Text(u16, String),
}

impl ApiReply {
    fn text(status: u16, body: impl Into<String>) -> Self {
        ApiReply::Text(status, body.into())
    }

    fn json<T: Serialize>(payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => ApiReply::Json(200, value),
            Err(err) => ApiReply::text(500, format!("failed to encode response: {err}")),
        }
    }
}

fn handle_request(request: tiny_http::Request, controller: &SharedController) {
    let Some(remote_addr) = request.remote_addr() else {
        let _ = send_text(request, StatusCode(400), "missing remote address");
        return;
    };
    if !is_local_network_ip(remote_addr.ip()) {
        let _ = send_text(request, StatusCode(403), "forbidden: local network only");
        return;
    }

    let method = request.method().clone();
    let url = request.url().to_string();
    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
    let base_url = request_base_url(&request);

    let reply = match controller.lock() {
        Ok(mut guard) => route(&method, path, query, &base_url, &mut guard),
        Err(_) => ApiReply::text(500, "internal state lock error"),
    };
    debug!(%method, path, "widget API request");

    let _ = match reply {
        ApiReply::Json(status, body) => send_json(request, StatusCode(status), &body),
        ApiReply::Text(status, body) => send_text(request, StatusCode(status), &body),
    };
}

fn route(
    method: &Method,
    path: &str,
    query: &str,
    base_url: &str,
    controller: &mut WidgetController,
) -> ApiReply {
    let is_get = *method == Method::Get;
    let is_post = *method == Method::Post;

    match path {
        "/v1" if is_get => ApiReply::Json(
            200,
            json!({
                "api_base": base_url,
                "state_url": format!("{base_url}/v1/state"),
                "health_url": format!("{base_url}/healthz"),
                "hour_url": format!("{base_url}/v1/hour?delta=1"),
                "minute_url": format!("{base_url}/v1/minute?delta=1"),
                "toggle_url": format!("{base_url}/v1/toggle?enabled=true"),
                "program_url": format!("{base_url}/v1/program?index=0"),
                "price_url": format!("{base_url}/v1/price?value=3600"),
            }),
        ),
        "/healthz" if is_get => ApiReply::text(200, "ok"),
        "/" | "/v1/state" if is_get => ApiReply::json(&controller.snapshot()),
        "/v1/hour" if is_post => match parse_delta(query) {
            Some(delta) => {
                controller.step_hour(delta);
                ApiReply::json(&controller.snapshot())
            }
            None => ApiReply::text(400, "missing or invalid 'delta'"),
        },
        "/v1/minute" if is_post => match parse_delta(query) {
            Some(delta) => {
                controller.step_minute(delta);
                ApiReply::json(&controller.snapshot())
            }
            None => ApiReply::text(400, "missing or invalid 'delta'"),
        },
        "/v1/toggle" if is_post => {
            match query_param(query, "enabled").as_deref().and_then(parse_flag) {
                Some(enabled) => {
                    controller.set_toggle(enabled);
                    ApiReply::json(&controller.snapshot())
                }
                None => ApiReply::text(400, "missing or invalid 'enabled'"),
            }
        }
        "/v1/program" if is_post => {
            let Some(index) = query_param(query, "index").and_then(|raw| raw.trim().parse().ok())
            else {
                return ApiReply::text(400, "missing or invalid 'index'");
            };
            match controller.select_program(index) {
                Ok(()) => ApiReply::json(&controller.snapshot()),
                Err(err) => ApiReply::text(409, err.to_string()),
            }
        }
        "/v1/price" if is_post => {
            let Some(raw) = query_param(query, "value") else {
                return ApiReply::text(400, "missing 'value'");
            };
            controller.apply_price_state(&raw);
            ApiReply::json(&controller.snapshot())
        }
        "/" | "/v1" | "/healthz" | "/v1/state" | "/v1/hour" | "/v1/minute" | "/v1/toggle"
        | "/v1/program" | "/v1/price" => ApiReply::text(405, "method not allowed"),
        _ => ApiReply::text(404, "not found"),
    }
}

fn parse_delta(query: &str) -> Option<i32> {
    query_param(query, "delta")?.trim().parse().ok()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Some(true),
        "false" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn start_mdns_advertisement(api_port: u16, instance_prefix: &str) -> Result<ServiceDaemon> {
    let hostname = sanitize_hostname(
        &std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_default(),
    );
    let instance = match instance_prefix.trim() {
        "" => hostname.clone(),
        prefix => format!("{prefix}-{hostname}"),
    };
    let address = outbound_ipv4().unwrap_or(Ipv4Addr::LOCALHOST);

    let service = ServiceInfo::new(
        MDNS_SERVICE_TYPE,
        &instance,
        &format!("{hostname}.local."),
        [IpAddr::V4(address)].as_slice(),
        api_port,
        None,
    )
    .map_err(|err| anyhow!("could not describe mDNS service: {err}"))?;
    let daemon = ServiceDaemon::new().map_err(|err| anyhow!("could not start mDNS: {err}"))?;
    daemon
        .register(service)
        .map_err(|err| anyhow!("could not register mDNS service: {err}"))?;
    info!(%instance, %address, service = MDNS_SERVICE_TYPE, "mDNS advertisement registered");
    Ok(daemon)
}

fn sanitize_hostname(candidate: &str) -> String {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return "delaystart".to_string();
    }
    trimmed
        .chars()
        .map(|ch| match ch {
            'a'..='z' | '0'..='9' | '-' => ch,
            'A'..='Z' => ch.to_ascii_lowercase(),
            _ => '-',
        })
        .collect()
}

/// Address of the interface that would carry traffic off this host. No packet is sent.
fn outbound_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(v4),
        _ => None,
    }
}

fn send_json(request: tiny_http::Request, status: StatusCode, body: &Value) -> Result<()> {
    respond(
        request,
        status,
        "application/json; charset=utf-8",
        serde_json::to_vec(body)?,
    )
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    respond(
        request,
        status,
        "text/plain; charset=utf-8",
        body.as_bytes().to_vec(),
    )
}

fn respond(
    request: tiny_http::Request,
    status: StatusCode,
    content_type: &str,
    body: Vec<u8>,
) -> Result<()> {
    let header = Header::from_bytes("Content-Type", content_type)
        .map_err(|_| anyhow!("invalid content type {content_type}"))?;
    request.respond(
        Response::from_data(body)
            .with_status_code(status)
            .with_header(header),
    )?;
    Ok(())
}

fn request_base_url(request: &tiny_http::Request) -> String {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv("Host"))
        .map(|header| header.value.as_str().trim())
        .filter(|host| !host.is_empty())
        .map_or_else(
            || format!("http://127.0.0.1:{DEFAULT_API_PORT}"),
            |host| format!("http://{host}"),
        )
}

/// Looks up `key` in a URL query string and percent-decodes its value.
/// `+` counts as a space, as browsers send it in form-encoded queries.
fn query_param(query: &str, key: &str) -> Option<String> {
    let raw = query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        (name == key).then_some(value)
    })?;
    urlencoding::decode(&raw.replace('+', " "))
        .ok()
        .map(|value| value.into_owned())
}

fn is_local_network_ip(ip: IpAddr) -> bool {
    let is_local_v4 = |v4: Ipv4Addr| v4.is_loopback() || v4.is_private() || v4.is_link_local();
    match ip {
        IpAddr::V4(v4) => is_local_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_local_v4(v4),
            None => v6.is_loopback() || v6.is_unique_local() || v6.is_unicast_link_local(),
        },
    }
}
