use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;
use task_runner::{
    Completion, FormState, HttpTransport, PlatformInfo, RecordingDisplay, RunOutcome, Script,
    ScriptedEngine, Session, StaticPlatform, TaskConfig, Transport, TransportError,
};

struct Captured {
    is_post: bool,
    url: String,
    content_type: Option<String>,
    cache_control: Option<String>,
    body: String,
}

fn header(request: &tiny_http::Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.to_string())
}

fn serve(statuses: Vec<u16>) -> (String, thread::JoinHandle<Vec<Captured>>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("bind test server");
    let addr = server
        .server_addr()
        .to_ip()
        .expect("test server has an ip address");
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for status in statuses {
            let mut request = server.recv().expect("request");
            let mut body = String::new();
            request
                .as_reader()
                .read_to_string(&mut body)
                .expect("request body");
            seen.push(Captured {
                is_post: *request.method() == tiny_http::Method::Post,
                url: request.url().to_string(),
                content_type: header(&request, "Content-Type"),
                cache_control: header(&request, "Cache-Control"),
                body,
            });
            let page = if status == 200 {
                "<html><body>Thank you!</body></html>"
            } else {
                "busy"
            };
            request
                .respond(tiny_http::Response::from_string(page).with_status_code(status))
                .expect("respond");
        }
        seen
    });
    (format!("http://{}/submit", addr), handle)
}

fn platform() -> Box<StaticPlatform> {
    Box::new(StaticPlatform(PlatformInfo {
        assignment_id: "A1".to_string(),
        hit_id: "H1".to_string(),
        worker_id: "W1".to_string(),
        preview_mode: false,
        outside_turk: false,
    }))
}

fn task_config(endpoint: &str) -> TaskConfig {
    let value = json!({
        "task_id": "T42",
        "practice": false,
        "collect_demo": true,
        "collect_validating_demo": false,
        "submit": endpoint,
        "retry": { "max_retries": 2, "base_delay_ms": 10, "max_delay_ms": 20 },
        "timeout_secs": 5,
        "blocks": [
            { "type": "instructions", "pages": ["instr1"] },
            { "type": "click_choice", "name": "keep", "choice": "keep", "stimuli": [["a.jpg", "b.jpg"]] },
            { "type": "instructions", "pages": ["instr2"] },
            { "type": "click_choice", "name": "reject", "choice": "reject", "stimuli": [["a.jpg", "b.jpg"]] }
        ]
    });
    TaskConfig::from_value(value, &BTreeMap::new()).expect("config")
}

#[test]
fn http_transport_posts_json_without_caching() {
    let (endpoint, handle) = serve(vec![200]);
    let transport = HttpTransport::new(Duration::from_secs(5)).expect("client");
    let url = reqwest::Url::parse(&endpoint).expect("url");
    let page = transport
        .post_json(&url, br#"{"taskId":"T1"}"#)
        .expect("post");
    assert!(page.contains("Thank you!"));

    let seen = handle.join().expect("server thread");
    assert_eq!(seen.len(), 1);
    assert!(seen[0].is_post);
    assert_eq!(seen[0].url, "/submit");
    assert_eq!(
        seen[0].content_type.as_deref(),
        Some("application/json;charset=UTF-8")
    );
    assert_eq!(seen[0].cache_control.as_deref(), Some("no-cache"));
    assert_eq!(seen[0].body, r#"{"taskId":"T1"}"#);
}

#[test]
fn http_transport_reports_server_errors_with_status() {
    let (endpoint, handle) = serve(vec![503]);
    let transport = HttpTransport::new(Duration::from_secs(5)).expect("client");
    let url = reqwest::Url::parse(&endpoint).expect("url");
    let err = transport.post_json(&url, b"{}").expect_err("503");
    assert_eq!(
        err,
        TransportError::Status {
            status: 503,
            body: "busy".to_string()
        }
    );
    assert!(err.is_retryable());
    handle.join().expect("server thread");
}

#[test]
fn truncated_reply_after_200_counts_as_accepted() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !String::from_utf8_lossy(&request).contains("\r\n\r\n{}") {
            let n = stream.read(&mut buf).expect("read request");
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n<html>")
            .expect("write reply");
    });

    let transport = HttpTransport::new(Duration::from_secs(5)).expect("client");
    let url = reqwest::Url::parse(&format!("http://{}/submit", addr)).expect("url");
    let page = transport.post_json(&url, b"{}").expect("accepted");
    assert_eq!(page, "");
    handle.join().expect("server thread");
}

#[test]
fn session_recovers_from_a_busy_server() {
    let (endpoint, handle) = serve(vec![500, 200]);
    let cfg = task_config(&endpoint);
    let transport = HttpTransport::new(cfg.timeout).expect("client");
    let mut session = Session::new(&cfg, platform(), Box::new(transport));
    let mut engine = ScriptedEngine::new(Script {
        forms: vec![
            FormState {
                gender: None,
                birthyear: "1990".to_string(),
            },
            FormState {
                gender: Some("f".to_string()),
                birthyear: "1990".to_string(),
            },
        ],
        ..Script::default()
    });
    let mut display = RecordingDisplay::new();
    let outcome = session.run(&mut engine, &mut display).expect("run");
    match outcome {
        RunOutcome::Completed(Completion::Submitted { delivery, .. }) => {
            assert_eq!(delivery.attempts, 2)
        }
        other => panic!("expected completed run, got {:?}", other),
    }
    assert_eq!(display.alerts(), vec!["You must indicate your gender."]);
    assert_eq!(display.errors().len(), 1);
    assert_eq!(
        display.document(),
        Some("<html><body>Thank you!</body></html>")
    );

    let seen = handle.join().expect("server thread");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].body, seen[1].body);
    let body: Value = serde_json::from_str(&seen[1].body).expect("json body");
    assert_eq!(
        body,
        json!({
            "gender": "f",
            "birthyear": "1990",
            "is_practice": false,
            "passed_practice": true,
            "assignmentId": "A1",
            "hitId": "H1",
            "workerId": "W1",
            "previewMode": false,
            "outsideTurk": false,
            "taskId": "T42"
        })
    );
}
