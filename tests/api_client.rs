// Exercises the real `ApiClient` against a one-shot HTTP responder on
// localhost, checking what goes over the wire and how statuses map to
// results.

use kualitee_cli::api::{ApiClient, KualiteeApi, Payload, ResponseBody};
use kualitee_cli::config::Config;
use kualitee_cli::error::ApiError;
use kualitee_cli::models::{DefectDetails, DefectUpdate, ExecutionStatus, TestCase, TestCycleUpdate};
use reqwest::Method;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

struct Captured {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("JSON request body")
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Accept a single connection, record the request and answer with
/// `status` and `body`. Returns the base URL and the captured request.
fn serve_once(status: u16, body: &'static str) -> (String, mpsc::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("request line");
        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("header line");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((k, v)) = line.split_once(':') {
                headers.push((k.trim().to_string(), v.trim().to_string()));
            }
        }

        let find = |name: &str| {
            headers
                .iter()
                .find(|(k, _): &&(String, String)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        };
        let mut req_body = Vec::new();
        if let Some(len) = find("content-length") {
            let len: usize = len.parse().expect("content-length");
            req_body.resize(len, 0);
            reader.read_exact(&mut req_body).expect("body");
        } else if find("transfer-encoding").is_some() {
            loop {
                let mut size_line = String::new();
                reader.read_line(&mut size_line).expect("chunk size");
                let size = usize::from_str_radix(size_line.trim(), 16).expect("hex size");
                let mut chunk = vec![0; size + 2];
                reader.read_exact(&mut chunk).expect("chunk");
                if size == 0 {
                    break;
                }
                req_body.extend_from_slice(&chunk[..size]);
            }
        }

        let mut stream = stream;
        let response = format!(
            "HTTP/1.1 {} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).expect("write response");
        let _ = tx.send(Captured {
            request_line: request_line.trim_end().to_string(),
            headers,
            body: req_body,
        });
    });

    (format!("http://{}", addr), rx)
}

fn config() -> Config {
    Config {
        token: "abc".into(),
        project_id: 27433,
    }
}

fn client(base_url: &str) -> ApiClient {
    ApiClient::with_base_url(&config(), base_url).expect("client")
}

fn received(rx: &mpsc::Receiver<Captured>) -> Captured {
    rx.recv_timeout(Duration::from_secs(5)).expect("request captured")
}

fn test_case() -> TestCase {
    serde_json::from_value(json!({
        "testcase_id": 55,
        "tc_name": "Login",
        "build_id": 7,
        "testscenario_id": 9
    }))
    .expect("test case")
}

#[test]
fn execute_sends_cycle_and_status_with_bearer_token() {
    let (url, rx) = serve_once(200, r#"{"status":true,"executed_results":[{"id":"991"}]}"#);
    let api = client(&url);
    let update = TestCycleUpdate::new("123", &test_case(), "Pass".parse().unwrap());

    let execution_id = api.execute_test(&update).expect("execute ok");
    assert_eq!(execution_id, "991");

    let req = received(&rx);
    assert_eq!(req.request_line, "POST /test_case_execution/execute HTTP/1.1");
    assert_eq!(req.header("authorization"), Some("Bearer abc"));
    let body = req.json();
    assert_eq!(body["cycle_id"], "123");
    assert_eq!(body["status"], "Passed");
    assert_eq!(body["tc_id"], "55");
    assert_eq!(body["execute"], "yes");
    assert_eq!(body["project_id"], 27433);
    assert_eq!(body["token"], "abc");
}

#[test]
fn execute_not_found_reports_404() {
    let (url, _rx) = serve_once(404, r#"{"message":"Not Found"}"#);
    let api = client(&url);
    let update = TestCycleUpdate::new("123", &test_case(), ExecutionStatus::Passed);

    let err = api.execute_test(&update).unwrap_err();
    assert_eq!(err.status_code(), Some(404));
    assert!(err.to_string().contains("404"));
}

#[test]
fn success_range_returns_response_and_keeps_status() {
    for status in [200u16, 201, 299] {
        let (url, _rx) = serve_once(status, r#"{"ok":1}"#);
        let res = client(&url)
            .send(Method::POST, "/ping", &Payload::Json(json!({"a": 1})), None)
            .expect("2xx is success");
        assert!(res.is_success());
        assert_eq!(res.status, status);
        assert_eq!(res.body, ResponseBody::Json(json!({"ok": 1})));
    }
}

#[test]
fn other_statuses_fail_with_original_code() {
    for status in [400u16, 401, 404, 418, 500, 503] {
        let (url, _rx) = serve_once(status, "oops");
        let err = client(&url)
            .send(Method::POST, "/ping", &Payload::Empty, None)
            .unwrap_err();
        match err {
            ApiError::Status { status: got, body } => {
                assert_eq!(got, status);
                assert_eq!(body, "oops");
            }
            other => panic!("expected Status error, got {:?}", other),
        }
    }
}

#[test]
fn status_false_body_is_rejected() {
    let (url, _rx) = serve_once(200, r#"{"status":false,"message":"Invalid token"}"#);
    let err = client(&url).list_cycles().unwrap_err();
    assert!(matches!(err, ApiError::Rejected(ref m) if m == "Invalid token"));
}

#[test]
fn cycles_are_parsed_from_data() {
    let (url, rx) = serve_once(
        200,
        r#"{"status":true,"data":[{"id":101,"cycle_name":"Sprint 12","status":"Open"}]}"#,
    );
    let cycles = client(&url).list_cycles().expect("cycles");
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].id, "101");
    assert_eq!(cycles[0].cycle_name, "Sprint 12");

    let req = received(&rx);
    assert_eq!(req.request_line, "POST /cycle/list HTTP/1.1");
    assert_eq!(req.json()["project_id"], 27433);
}

#[test]
fn connection_refused_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = client(&format!("http://{}", addr))
        .send(Method::GET, "/ping", &Payload::Empty, None)
        .unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
}

#[test]
fn transport_errors_do_not_leak_the_token() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let cfg = Config {
        token: "SECRETTOKEN123456".into(),
        project_id: 1,
    };
    let api = ApiClient::with_base_url(&cfg, format!("http://{}", addr)).expect("client");
    let err = api.defect_details("42").unwrap_err();

    assert!(matches!(err, ApiError::Network(_)));
    let shown = err.to_string();
    assert!(!shown.contains("SECRETTOKEN123456"), "token leaked: {}", shown);
    assert!(!shown.contains("token="), "query string leaked: {}", shown);
}

#[test]
fn defect_details_uses_query_string() {
    let (url, rx) = serve_once(200, r#"{"id":"265744","status":"open","uc_status":"Open"}"#);
    let details = client(&url).defect_details("265744").expect("details");
    assert_eq!(details.status(), "open");

    let req = received(&rx);
    assert!(req.request_line.starts_with("GET /defects/details?"));
    assert!(req.request_line.contains("defect_id=265744"));
    assert!(req.request_line.contains("project_id=27433"));
    assert!(req.request_line.contains("token=abc"));
}

#[test]
fn defect_details_without_a_record_is_not_found() {
    for body in [
        r#"{"status":true,"data":[]}"#,
        r#"{"status":true,"data":null}"#,
        r#"{"status":true,"data":{}}"#,
    ] {
        let (url, _rx) = serve_once(200, body);
        let err = client(&url).defect_details("999").unwrap_err();
        match err {
            ApiError::Decode(msg) => assert!(msg.contains("no defect found"), "{}", msg),
            other => panic!("expected Decode error for {}, got {:?}", body, other),
        }
    }
}

#[test]
fn defect_update_posts_merged_form() {
    let (url, rx) = serve_once(200, r#"{"status":true}"#);
    let current = DefectDetails(
        json!({"description": "Crash", "status": "open"})
            .as_object()
            .cloned()
            .unwrap_or_default(),
    );
    let update = DefectUpdate::new("265744").set("status", "close");

    client(&url).update_defect(&update, &current).expect("update ok");

    let req = received(&rx);
    assert_eq!(req.request_line, "POST /defects/update HTTP/1.1");
    assert!(req
        .header("content-type")
        .unwrap_or_default()
        .starts_with("application/x-www-form-urlencoded"));
    let body = req.body_text();
    assert!(body.contains("status=close"));
    assert!(body.contains("description=Crash"));
    assert!(body.contains("defect_id=265744"));
    assert!(body.contains("token=abc"));
}

#[test]
fn attachment_goes_out_as_multipart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let shot = dir.path().join("evidence.png");
    std::fs::write(&shot, b"\x89PNG fake").expect("write file");

    let (url, rx) = serve_once(200, r#"{"status":true}"#);
    let update = TestCycleUpdate::new("123", &test_case(), ExecutionStatus::Passed)
        .with_attachment(shot.clone());
    client(&url)
        .upload_attachment(&update, "991", &shot)
        .expect("upload ok");

    let req = received(&rx);
    assert!(req
        .header("content-type")
        .unwrap_or_default()
        .starts_with("multipart/form-data"));
    let body = req.body_text();
    assert!(body.contains(r#"name="attachment[]"; filename="evidence.png""#));
    assert!(body.contains(r#"name="execution_id""#));
    assert!(body.contains("991"));
    assert!(body.contains(r#"name="type""#));
}
