use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn dupterm_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_dupterm").expect("dupterm test binary not built")
}

fn free_local_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

#[test]
fn dupterm_help_mentions_name() {
    let output = Command::new(dupterm_bin())
        .arg("--help")
        .output()
        .expect("run dupterm --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("dupterm"));
    assert!(combined.contains("--read-mode"));
}

#[test]
fn dupterm_rejects_unknown_read_mode() {
    let output = Command::new(dupterm_bin())
        .args(["--read-mode", "sometimes"])
        .output()
        .expect("run dupterm --read-mode sometimes");
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("sometimes"));
}

#[test]
fn dupterm_rejects_reserved_interrupt_char() {
    let output = Command::new(dupterm_bin())
        .args(["--no-logs", "--interrupt-char", "13", "--listen", "127.0.0.1:0"])
        .stdin(Stdio::null())
        .output()
        .expect("run dupterm --interrupt-char 13");
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("reserved"));
}

#[test]
fn dupterm_runs_piped_commands() {
    let mut child = Command::new(dupterm_bin())
        .args(["--no-logs", "--listen", "127.0.0.1:0"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn dupterm");
    child
        .stdin
        .take()
        .expect("child stdin")
        .write_all(b"echo duplicated hello\nexit\n")
        .expect("write commands");
    let output = child.wait_with_output().expect("wait for dupterm");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("duplicated hello"));
}

#[test]
fn dupterm_mirrors_output_to_one_remote_console() {
    let port = free_local_port();
    let mut child = Command::new(dupterm_bin())
        .args(["--no-logs", "--listen", &format!("127.0.0.1:{port}")])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn dupterm");

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut remote = loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => break stream,
            Err(_) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(20));
            }
            Err(err) => panic!("dupterm never listened: {err}"),
        }
    };
    remote
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");

    let mut seen = Vec::new();
    let mut buf = [0u8; 256];
    let welcome = b"remote console attached";
    while !seen.windows(welcome.len()).any(|window| window == welcome) {
        let n = remote.read(&mut buf).expect("read welcome");
        assert!(n > 0, "remote console closed early");
        seen.extend_from_slice(&buf[..n]);
    }

    let mut second = TcpStream::connect(("127.0.0.1", port)).expect("connect second peer");
    second
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set read timeout");
    let mut rejected = String::new();
    let _ = second.read_to_string(&mut rejected);
    assert!(rejected.contains("already attached"));

    // Commands typed remotely run in the host and their output comes back.
    remote.write_all(b"status\r").expect("send remote command");
    let needle = b"\"active\": true";
    let mut tail = Vec::new();
    while !tail.windows(needle.len()).any(|window| window == needle) {
        let n = remote.read(&mut buf).expect("read remote echo");
        assert!(n > 0, "remote console closed early");
        tail.extend_from_slice(&buf[..n]);
    }

    remote.write_all(b"exit\r").expect("send exit");
    drop(child.stdin.take());
    let status = child.wait().expect("wait for dupterm");
    assert!(status.success());
}
