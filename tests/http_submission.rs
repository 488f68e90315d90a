use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use leafscan::{CapturedFrame, HttpTransport, InferenceResult, InferenceSubmitter, ScanObserver};

struct Recorded {
    headers: Vec<String>,
    body: String,
}

/// Serve exactly one HTTP exchange with a canned response.
fn respond_once(status: &'static str, reply: &'static str) -> (String, JoinHandle<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind responder");
    let url = format!(
        "http://{}/api/detect-disease",
        listener.local_addr().expect("local addr")
    );
    let join = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("read header");
            let line = line.trim_end().to_string();
            if line.is_empty() {
                break;
            }
            headers.push(line.to_lowercase());
        }
        let length = headers
            .iter()
            .find_map(|h| h.strip_prefix("content-length:"))
            .map(|v| v.trim().parse::<usize>().expect("content length"))
            .unwrap_or(0);
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).expect("read body");

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reply.len(),
            reply
        );
        stream
            .write_all(response.as_bytes())
            .expect("write response");
        Recorded {
            headers,
            body: String::from_utf8(body).expect("utf8 body"),
        }
    });
    (url, join)
}

#[derive(Default)]
struct Recorder {
    results: Mutex<Vec<InferenceResult>>,
}

impl ScanObserver for Recorder {
    fn on_result(&self, result: &InferenceResult) {
        self.results.lock().unwrap().push(result.clone());
    }
}

fn frame() -> CapturedFrame {
    CapturedFrame {
        data_url: "data:image/jpeg;base64,/9j/4AAQ".to_string(),
        width: 2,
        height: 2,
        captured_at: Instant::now(),
    }
}

fn submitter(url: &str, recorder: Arc<Recorder>) -> InferenceSubmitter {
    let transport = HttpTransport::new(url, Duration::from_secs(5)).expect("transport");
    InferenceSubmitter::new(Arc::new(transport), recorder)
}

#[test]
fn healthy_verdict_reaches_observer_unchanged() {
    let (url, server) = respond_once("200 OK", r#"{"status":"healthy","confidence":0.42}"#);
    let recorder = Arc::new(Recorder::default());

    submitter(&url, recorder.clone()).submit(frame()).wait();

    let request = server.join().expect("responder");
    assert!(request.headers[0].starts_with("post /api/detect-disease"));
    assert!(request
        .headers
        .iter()
        .any(|h| h.starts_with("content-type: application/json")));
    let body: serde_json::Value = serde_json::from_str(&request.body).expect("json body");
    assert_eq!(body["frame"], "data:image/jpeg;base64,/9j/4AAQ");
    assert!(body.get("crop").is_none());

    let results = recorder.results.lock().unwrap();
    assert_eq!(
        *results,
        vec![InferenceResult {
            status: "healthy".to_string(),
            label: None,
            confidence: Some(0.42),
        }]
    );
}

#[test]
fn crop_and_language_are_sent() {
    let (url, server) = respond_once(
        "200 OK",
        r#"{"status":"diseased","label":"Early Blight","confidence":0.87}"#,
    );
    let recorder = Arc::new(Recorder::default());
    let transport = HttpTransport::new(&url, Duration::from_secs(5))
        .expect("transport")
        .with_language(Some("hi".to_string()));
    let submitter = InferenceSubmitter::new(Arc::new(transport), recorder.clone())
        .with_crop(Some("TOMATO".to_string()));

    submitter.submit(frame()).wait();

    let request = server.join().expect("responder");
    assert!(request.headers.iter().any(|h| h == "x-language: hi"));
    let body: serde_json::Value = serde_json::from_str(&request.body).expect("json body");
    assert_eq!(body["crop"], "TOMATO");

    let results = recorder.results.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].label.as_deref(), Some("Early Blight"));
    assert_eq!(results[0].summary(), "diseased || Early Blight || 87%");
}

#[test]
fn connection_refused_never_calls_back() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let recorder = Arc::new(Recorder::default());
    let submitter = submitter(
        &format!("http://127.0.0.1:{}/api/detect-disease", port),
        recorder.clone(),
    );

    submitter.submit(frame()).wait();

    assert!(recorder.results.lock().unwrap().is_empty());
    assert_eq!(submitter.stats().dropped, 1);
}

#[test]
fn server_error_is_dropped() {
    let (url, server) = respond_once("500 Internal Server Error", r#"{"error":"model down"}"#);
    let recorder = Arc::new(Recorder::default());
    let submitter = submitter(&url, recorder.clone());

    submitter.submit(frame()).wait();
    server.join().expect("responder");

    assert!(recorder.results.lock().unwrap().is_empty());
    assert_eq!(submitter.stats().dropped, 1);
}

#[test]
fn malformed_payload_is_dropped() {
    let (url, server) = respond_once("200 OK", "<html>busy</html>");
    let recorder = Arc::new(Recorder::default());
    let submitter = submitter(&url, recorder.clone());

    submitter.submit(frame()).wait();
    server.join().expect("responder");

    assert!(recorder.results.lock().unwrap().is_empty());
    assert_eq!(submitter.stats().delivered, 0);
}
