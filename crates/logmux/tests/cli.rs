#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/logmux-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn logmux() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_logmux"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn send(path: &PathBuf, input: &str) {
    let mut child = logmux()
        .arg("send")
        .arg(path)
        .stdin(Stdio::piped())
        .spawn()
        .expect("send should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(input.as_bytes())
        .expect("stdin should accept input");
    let status = child.wait().expect("send should finish");
    assert!(status.success());
}

#[test]
fn version_prints_name() {
    let output = logmux().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("logmux "));
}

#[test]
fn send_then_dump_round_trip() {
    let dir = unique_temp_dir("roundtrip");
    let frames = dir.join("frames.bin");

    send(&frames, "alpha\nbeta\n");

    let output = logmux()
        .arg("--format")
        .arg("json")
        .arg("dump")
        .arg(&frames)
        .arg("--id")
        .arg("c1")
        .output()
        .expect("dump should run");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["line"], "alpha");
    assert_eq!(lines[1]["line"], "beta");
    assert_eq!(lines[0]["source"], "stdout");
    assert_eq!(lines[0]["producer_id"], "c1");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn dump_missing_file_fails() {
    let dir = unique_temp_dir("missing");
    let output = logmux()
        .arg("dump")
        .arg(dir.join("absent.bin"))
        .output()
        .expect("dump should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed opening"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn dump_reports_corrupt_frames() {
    let dir = unique_temp_dir("corrupt");
    let frames = dir.join("frames.bin");
    std::fs::write(&frames, [0u8, 0, 0, 2, 0xff, 0xff]).expect("fixture should be written");

    let output = logmux().arg("dump").arg(&frames).output().expect("dump should run");
    assert_eq!(output.status.code(), Some(60));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn ingest_prints_messages_until_end_of_stream() {
    let dir = unique_temp_dir("ingest");
    let fifo = dir.join("c1.fifo");

    let child = logmux()
        .arg("--format")
        .arg("json")
        .arg("ingest")
        .arg(&fifo)
        .arg("--id")
        .arg("c1")
        .arg("--create")
        .arg("--log-path")
        .arg(dir.join("logs").join("c1.log"))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("ingest should start");

    let start = Instant::now();
    while !fifo.exists() {
        assert!(start.elapsed() < Duration::from_secs(5), "fifo was not created");
        thread::sleep(Duration::from_millis(25));
    }

    send(&fifo, "hello\nworld\n");

    let output = child.wait_with_output().expect("ingest should exit at end of stream");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"line\":\"hello\""));
    assert!(stdout.contains("\"line\":\"world\""));
    assert!(stdout.contains("\"producer_id\":\"c1\""));
    assert!(dir.join("logs").is_dir());

    let _ = std::fs::remove_dir_all(&dir);
}
