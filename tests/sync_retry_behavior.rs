use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

enum Reply {
    Json(String),
    Status(u16, String),
    Empty,
    Hang(Duration),
}

struct Backend {
    url: String,
    hits: Arc<AtomicUsize>,
    hit_times: Arc<Mutex<Vec<Instant>>>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl Backend {
    fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn hit_times(&self) -> Vec<Instant> {
        self.hit_times.lock().expect("hit times").clone()
    }
}

fn spawn_backend<F>(reply: F) -> Backend
where
    F: Fn(usize, &str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock backend");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));
    let hits = Arc::new(AtomicUsize::new(0));
    let hit_times = Arc::new(Mutex::new(Vec::new()));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let reply = Arc::new(reply);
    let thread_hits = hits.clone();
    let thread_hit_times = hit_times.clone();
    let thread_requests = requests.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            // One thread per connection so a hanging reply never blocks the
            // next attempt from being accepted and counted.
            let n = thread_hits.fetch_add(1, Ordering::SeqCst);
            thread_hit_times.lock().expect("hit times").push(Instant::now());
            let reply = reply.clone();
            let requests = thread_requests.clone();
            thread::spawn(move || {
                let (head, body) = read_request(&mut stream);
                requests
                    .lock()
                    .expect("requests lock")
                    .push((head, body.clone()));
                match reply(n, &body) {
                    Reply::Json(body) => write_response(&mut stream, 200, &body),
                    Reply::Status(code, body) => write_response(&mut stream, code, &body),
                    Reply::Empty => write_response(&mut stream, 200, ""),
                    Reply::Hang(wait) => thread::sleep(wait),
                }
            });
        }
    });
    Backend { url, hits, hit_times, requests }
}

fn read_request(stream: &mut TcpStream) -> (String, String) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            return (String::from_utf8_lossy(&buf).to_string(), String::new());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let header_end = buf.windows(4).position(|w| w == b"\r\n\r\n").expect("headers") + 4;
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|l| {
            let (k, v) = l.split_once(':')?;
            if k.eq_ignore_ascii_case("content-length") {
                v.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    (head, body)
}

fn write_response(stream: &mut TcpStream, status: u16, body: &str) {
    let reason = if status == 200 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
}

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn configure(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    backend: &Backend,
    retries: u64,
    timeout_secs: u64,
    backoff_ms: u64,
) {
    let session = std::env::temp_dir()
        .join(format!("schoold-sync-{}", uuid_ish()))
        .join("user.json");
    let resp = request(
        stdin,
        reader,
        "cfg",
        "backend.configure",
        json!({
            "url": backend.url,
            "retries": retries,
            "timeoutSecs": timeout_secs,
            "backoffMs": backoff_ms,
            "sessionPath": session.to_string_lossy(),
        }),
    );
    assert_eq!(resp["ok"], json!(true));
}

fn uuid_ish() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    format!(
        "{}-{}",
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    )
}

fn error_field<'a>(resp: &'a serde_json::Value, key: &str) -> &'a str {
    resp.get("error")
        .and_then(|e| e.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn business_error_is_not_retried_and_stale_hint_applied() {
    let backend = spawn_backend(|_, _| {
        Reply::Json(r#"{"status":"error","message":"Invalid action: listPersonnel"}"#.to_string())
    });
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    configure(&mut stdin, &mut reader, &backend, 3, 30, 10);

    let resp = request(&mut stdin, &mut reader, "1", "personnel.list", json!({}));
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(error_field(&resp, "code"), "backend_error");
    assert!(
        error_field(&resp, "message").contains("Deploy"),
        "expected stale-deployment hint, got: {}",
        error_field(&resp, "message")
    );
    assert_eq!(backend.hit_count(), 1, "business errors must not retry");

    let _ = child.kill();
}

#[test]
fn plain_business_error_surfaces_verbatim() {
    let backend = spawn_backend(|_, _| {
        Reply::Json(r#"{"status":"error","message":"ไม่พบข้อมูลผู้ใช้"}"#.to_string())
    });
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    configure(&mut stdin, &mut reader, &backend, 3, 30, 10);

    let resp = request(&mut stdin, &mut reader, "1", "personnel.list", json!({}));
    assert_eq!(error_field(&resp, "code"), "backend_error");
    assert_eq!(error_field(&resp, "message"), "ไม่พบข้อมูลผู้ใช้");
    assert_eq!(backend.hit_count(), 1);

    let _ = child.kill();
}

#[test]
fn empty_body_is_retried_until_exhausted() {
    let backend = spawn_backend(|_, _| Reply::Empty);
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    configure(&mut stdin, &mut reader, &backend, 3, 30, 10);

    let resp = request(&mut stdin, &mut reader, "1", "students.list", json!({}));
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(error_field(&resp, "code"), "network_failed");
    assert!(error_field(&resp, "message").contains("empty response"));
    assert_eq!(backend.hit_count(), 3, "one call per configured attempt");

    let _ = child.kill();
}

#[test]
fn html_error_page_reports_title_in_diagnostics() {
    let backend = spawn_backend(|_, _| {
        Reply::Status(
            200,
            "<html><head><title>Service invoked too many times</title></head><body>quota</body></html>"
                .to_string(),
        )
    });
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    configure(&mut stdin, &mut reader, &backend, 2, 30, 10);

    let resp = request(&mut stdin, &mut reader, "1", "personnel.list", json!({}));
    assert_eq!(error_field(&resp, "code"), "network_failed");
    assert!(error_field(&resp, "message").contains("Service invoked too many times"));
    assert_eq!(backend.hit_count(), 2);

    let _ = child.kill();
}

#[test]
fn http_error_is_retried_then_recovers() {
    let backend = spawn_backend(|attempt, _| {
        if attempt == 0 {
            Reply::Status(502, "bad gateway".to_string())
        } else {
            Reply::Json(r#"{"status":"success","data":[]}"#.to_string())
        }
    });
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    configure(&mut stdin, &mut reader, &backend, 3, 30, 10);

    let resp = request(&mut stdin, &mut reader, "1", "personnel.list", json!({}));
    assert_eq!(resp["ok"], json!(true), "response: {}", resp);
    assert_eq!(resp["result"]["records"], json!([]));
    assert_eq!(backend.hit_count(), 2);

    let _ = child.kill();
}

#[test]
fn timeout_is_retried_with_growing_backoff_then_surfaces_localized_message() {
    let backend = spawn_backend(|_, _| Reply::Hang(Duration::from_secs(8)));
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    // A large backoff so the growth dominates timing noise: sleeps of
    // 300ms then 600ms between the three attempts.
    configure(&mut stdin, &mut reader, &backend, 3, 1, 300);

    let resp = request(&mut stdin, &mut reader, "1", "personnel.list", json!({}));
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(error_field(&resp, "code"), "network_failed");
    assert!(
        error_field(&resp, "message").contains("เชื่อมต่อเซิร์ฟเวอร์ไม่สำเร็จ"),
        "expected localized timeout message, got: {}",
        error_field(&resp, "message")
    );
    assert_eq!(backend.hit_count(), 3);

    let times = backend.hit_times();
    let first_gap = times[1] - times[0];
    let second_gap = times[2] - times[1];
    assert!(
        second_gap > first_gap + Duration::from_millis(100),
        "backoff must grow between attempts: {:?} then {:?}",
        first_gap,
        second_gap
    );

    let _ = child.kill();
}

#[test]
fn request_shape_matches_the_bridge_contract() {
    let backend = spawn_backend(|_, _| {
        Reply::Json(r#"{"status":"success","data":[]}"#.to_string())
    });
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    configure(&mut stdin, &mut reader, &backend, 1, 30, 10);

    let resp = request(&mut stdin, &mut reader, "1", "personnel.list", json!({}));
    assert_eq!(resp["ok"], json!(true));

    let requests = backend.requests.lock().expect("requests");
    let (head, body) = requests.last().expect("one request").clone();
    let first_line = head.lines().next().unwrap_or("");
    assert!(first_line.starts_with("POST "), "line: {}", first_line);
    assert!(first_line.contains("?t="), "cache buster missing: {}", first_line);
    assert!(
        head.to_ascii_lowercase().contains("content-type: text/plain"),
        "expected text/plain content type, head: {}",
        head
    );
    let parsed: serde_json::Value = serde_json::from_str(&body).expect("json body");
    assert_eq!(parsed["action"], json!("listPersonnel"));

    let _ = child.kill();
}
