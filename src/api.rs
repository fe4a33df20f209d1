//! HTTP surface for waking and managing devices.

use crate::devices::{Device, DeviceStore};
use crate::wol;
use lazy_static::lazy_static;
use log::{error, info};
use rouille::{Request, Response};
use serde::Serialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Mutex;

lazy_static! {
    static ref WAKE_PACKETS_SENT: prometheus::IntCounter = prometheus::register_int_counter!(
        "wake_packets_sent_total",
        "Number of magic packets accepted for transmission."
    )
    .unwrap();
}

type WakeFn = fn(Option<IpAddr>, [u8; wol::HW_ADDR_LEN]) -> Result<(), wol::WakeError>;

pub struct Api {
    source_ip: Option<IpAddr>,
    static_dir: Option<PathBuf>,
    store: Mutex<DeviceStore>,
    wake: WakeFn,
}

// Errors under /api/ are JSON, with the status code mirrored in the body.
#[derive(Serialize)]
struct ApiError {
    status: u16,
    message: String,
}

fn error_response(status: u16, message: impl Into<String>) -> Response {
    Response::json(&ApiError {
        status,
        message: message.into(),
    })
    .with_status_code(status)
}

impl Api {
    pub fn new(cache_file: impl Into<PathBuf>) -> Api {
        Api {
            source_ip: None,
            static_dir: None,
            store: Mutex::new(DeviceStore::new(cache_file)),
            wake: wol::wake,
        }
    }

    /// Source IP used as the local address when broadcasting magic packets.
    pub fn with_source_ip(mut self, source_ip: Option<IpAddr>) -> Api {
        self.source_ip = source_ip;
        self
    }

    /// Directory of extra assets served under /static/.
    pub fn with_static_dir(mut self, static_dir: Option<PathBuf>) -> Api {
        self.static_dir = static_dir;
        self
    }

    pub fn handle(&self, request: &Request) -> Response {
        let response = self.route(request);
        info!(
            "{} {} {}",
            request.method(),
            request.raw_url(),
            response.status_code
        );
        response
    }

    fn route(&self, request: &Request) -> Response {
        if let Some(asset_request) = request.remove_prefix("/static") {
            if let Some(static_dir) = &self.static_dir {
                let response = rouille::match_assets(&asset_request, static_dir);
                if response.status_code == 200 {
                    return response;
                }
            }
            return Response::empty_404();
        }
        match request.url().as_str() {
            "/" => Response::html(include_str!("index.html")),
            "/varz" => varz(),
            "/api/v1/wake" => self.wake_handler(request),
            // Unknown requests under /api/ get their 404 in JSON too.
            url if url.starts_with("/api/") => error_response(404, "Resource not found"),
            _ => Response::empty_404(),
        }
    }

    fn wake_handler(&self, request: &Request) -> Response {
        match request.method() {
            "GET" => match self.store.lock().unwrap().read() {
                Ok(devices) => Response::json(&devices),
                Err(err) => {
                    error!("{}", err);
                    error_response(500, "Could not read device list")
                }
            },
            "POST" | "DELETE" => {
                let add = request.method() == "POST";
                let device: Device = match rouille::input::json_input(request) {
                    Ok(device) => device,
                    Err(_) => return error_response(400, "Malformed JSON"),
                };
                if add {
                    let hw_addr = match wol::parse_mac(&device.mac_address) {
                        Ok(hw_addr) => hw_addr,
                        Err(_) => {
                            return error_response(
                                400,
                                format!("Invalid MAC address: {}", device.mac_address),
                            )
                        }
                    };
                    if let Err(err) = (self.wake)(self.source_ip, hw_addr) {
                        error!("{}", err);
                        return error_response(
                            400,
                            format!("Failed to wake device with address {}", device.mac_address),
                        );
                    }
                    WAKE_PACKETS_SENT.inc();
                }
                let mut store = self.store.lock().unwrap();
                let result = if add {
                    store.add(device)
                } else {
                    store.remove(&device)
                };
                match result {
                    Ok(()) => Response::empty_204(),
                    Err(err) => {
                        error!("{}", err);
                        error_response(500, "Could not write device list")
                    }
                }
            }
            method => error_response(
                405,
                format!("Invalid method {}, must be GET, POST or DELETE", method),
            ),
        }
    }
}

fn varz() -> Response {
    let metrics = prometheus::gather();
    let encoder = prometheus::TextEncoder::new();
    match encoder.encode_to_string(&metrics) {
        Ok(text) => Response::text(text),
        Err(err) => Response::text(err.to_string()).with_status_code(500),
    }
}

#[cfg(test)]
mod tests {
    use crate::api::*;
    use crate::wol::WakeError;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop_wake(
        _src: Option<IpAddr>,
        _hw_addr: [u8; wol::HW_ADDR_LEN],
    ) -> Result<(), WakeError> {
        Ok(())
    }

    // Used by a single test so the count is not shared between tests.
    static WAKE_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn recording_wake(
        _src: Option<IpAddr>,
        _hw_addr: [u8; wol::HW_ADDR_LEN],
    ) -> Result<(), WakeError> {
        WAKE_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn failing_wake(
        _src: Option<IpAddr>,
        _hw_addr: [u8; wol::HW_ADDR_LEN],
    ) -> Result<(), WakeError> {
        Err(WakeError::ShortWrite { sent: 0 })
    }

    fn test_api(name: &str, wake: WakeFn) -> Api {
        let path = std::env::temp_dir().join(format!(
            "wakeonlan-api-{}-{}.json",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_file(&path);
        Api {
            source_ip: None,
            static_dir: None,
            store: Mutex::new(DeviceStore::new(path)),
            wake,
        }
    }

    fn json_request(method: &str, body: &str) -> Request {
        Request::fake_http(
            method,
            "/api/v1/wake",
            vec![(
                "Content-Type".to_owned(),
                "application/json".to_owned(),
            )],
            body.as_bytes().to_vec(),
        )
    }

    fn body_string(response: Response) -> String {
        let (mut reader, _) = response.data.into_reader_and_size();
        let mut body = String::new();
        reader.read_to_string(&mut body).unwrap();
        body
    }

    #[test]
    fn test_get_devices_empty() {
        let api = test_api("get-empty", noop_wake);
        let request = Request::fake_http("GET", "/api/v1/wake", vec![], vec![]);
        let response = api.handle(&request);
        assert_eq!(response.status_code, 200);
        assert_eq!(body_string(response), r#"{"devices":[]}"#);
    }

    #[test]
    fn test_post_wakes_and_persists() {
        let api = test_api("post", recording_wake);
        let response = api.handle(&json_request(
            "POST",
            r#"{"macAddress": "aa:bb:cc:dd:ee:ff"}"#,
        ));
        assert_eq!(response.status_code, 204);
        assert_eq!(WAKE_CALLS.load(Ordering::SeqCst), 1);

        let request = Request::fake_http("GET", "/api/v1/wake", vec![], vec![]);
        let body = body_string(api.handle(&request));
        assert_eq!(body, r#"{"devices":[{"macAddress":"aa:bb:cc:dd:ee:ff"}]}"#);
    }

    #[test]
    fn test_post_invalid_mac() {
        // A failing wake fn would turn any wake attempt into a different
        // error, so this also proves the parse failure short-circuits.
        let api = test_api("post-bad-mac", failing_wake);
        let response = api.handle(&json_request("POST", r#"{"macAddress": "foo"}"#));
        assert_eq!(response.status_code, 400);
        assert!(body_string(response).contains("Invalid MAC address: foo"));
        // Nothing was persisted either.
        let request = Request::fake_http("GET", "/api/v1/wake", vec![], vec![]);
        assert_eq!(body_string(api.handle(&request)), r#"{"devices":[]}"#);
    }

    #[test]
    fn test_post_wake_failure() {
        let api = test_api("post-wake-fail", failing_wake);
        let response = api.handle(&json_request(
            "POST",
            r#"{"macAddress": "aa:bb:cc:dd:ee:ff"}"#,
        ));
        assert_eq!(response.status_code, 400);
        assert!(body_string(response)
            .contains("Failed to wake device with address aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_post_malformed_json() {
        let api = test_api("post-bad-json", noop_wake);
        let response = api.handle(&json_request("POST", "{"));
        assert_eq!(response.status_code, 400);
        assert!(body_string(response).contains("Malformed JSON"));
    }

    #[test]
    fn test_delete_removes_device() {
        let api = test_api("delete", noop_wake);
        api.handle(&json_request(
            "POST",
            r#"{"macAddress": "aa:bb:cc:dd:ee:ff"}"#,
        ));
        let response = api.handle(&json_request(
            "DELETE",
            r#"{"macAddress": "aa:bb:cc:dd:ee:ff"}"#,
        ));
        assert_eq!(response.status_code, 204);
        let request = Request::fake_http("GET", "/api/v1/wake", vec![], vec![]);
        assert_eq!(body_string(api.handle(&request)), r#"{"devices":[]}"#);
    }

    #[test]
    fn test_method_not_allowed() {
        let api = test_api("bad-method", noop_wake);
        let request = Request::fake_http("PUT", "/api/v1/wake", vec![], vec![]);
        let response = api.handle(&request);
        assert_eq!(response.status_code, 405);
        assert!(body_string(response).contains("Invalid method PUT"));
    }

    #[test]
    fn test_unknown_api_path_is_json_404() {
        let api = test_api("unknown-api", noop_wake);
        let request = Request::fake_http("GET", "/api/v1/nonsense", vec![], vec![]);
        let response = api.handle(&request);
        assert_eq!(response.status_code, 404);
        assert!(body_string(response).contains("Resource not found"));
    }

    #[test]
    fn test_index_page() {
        let api = test_api("index", noop_wake);
        let request = Request::fake_http("GET", "/", vec![], vec![]);
        let response = api.handle(&request);
        assert_eq!(response.status_code, 200);
    }

    #[test]
    fn test_static_without_dir_is_404() {
        let api = test_api("static-off", noop_wake);
        let request = Request::fake_http("GET", "/static/app.js", vec![], vec![]);
        let response = api.handle(&request);
        assert_eq!(response.status_code, 404);
    }
}
