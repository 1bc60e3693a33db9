use std::fs;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use legal_swarm::config::{ModelConfig, ProviderKind};
use legal_swarm::error::ProviderError;
use legal_swarm::provider::{
    build_provider, ChatMessage, ChatRequest, HttpProvider, OllamaProvider, OpenAiProvider,
    Provider,
};

mod helpers;
use helpers::{unique_test_temp_dir, EnvVarGuard};

fn request() -> ChatRequest {
    ChatRequest {
        model: "gpt-4".to_string(),
        temperature: 0.1,
        system: Some("You are a specialized contract analysis agent".to_string()),
        messages: vec![ChatMessage::user("Review the indemnity clause")],
    }
}

fn no_proxy_value() -> String {
    let mut v = std::env::var("NO_PROXY").unwrap_or_default();
    if !v.is_empty() && !v.ends_with(',') {
        v.push(',');
    }
    v.push_str("127.0.0.1,localhost");
    v
}

/// Accept one connection, capture the full request, answer with `status` and `body`.
fn serve_once(status: &'static str, body: &'static str) -> Option<(SocketAddr, JoinHandle<String>)> {
    let server = match TcpListener::bind("127.0.0.1:0") {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => return None,
        Err(e) => panic!("failed to bind local test server: {e}"),
    };
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = server.accept().unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).unwrap_or(0);
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let len = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if raw.len() >= head_end + 4 + len {
                    break;
                }
            }
        }
        let resp = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let _ = stream.write_all(resp.as_bytes());
        String::from_utf8_lossy(&raw).to_string()
    });
    Some((addr, handle))
}

fn model(kind: ProviderKind, base_url: String, api_key: Option<&str>) -> ModelConfig {
    ModelConfig {
        provider: kind,
        base_url,
        api_key: api_key.map(str::to_string),
        timeout_secs: 5,
        ..ModelConfig::default()
    }
}

#[test]
fn openai_provider_sends_bearer_and_reads_first_choice() {
    let _env = EnvVarGuard::set("NO_PROXY", no_proxy_value());
    let Some((addr, handle)) = serve_once(
        "200 OK",
        r#"{"choices":[{"message":{"role":"assistant","content":"Indemnity is uncapped."}}]}"#,
    ) else {
        return;
    };

    let cfg = model(ProviderKind::OpenAi, format!("http://{addr}/v1"), Some("sk-test"));
    let p = OpenAiProvider::from_config(&cfg).unwrap();
    let out = p.complete(&request()).unwrap();
    assert_eq!(out, "Indemnity is uncapped.");

    let raw = handle.join().unwrap();
    assert!(raw.starts_with("POST /v1/chat/completions"), "request was:\n{raw}");
    assert!(
        raw.to_ascii_lowercase().contains("authorization: bearer sk-test"),
        "request was:\n{raw}"
    );
    assert!(raw.contains(r#""role":"system""#), "request was:\n{raw}");
    assert!(raw.contains("Review the indemnity clause"), "request was:\n{raw}");
}

#[test]
fn openai_provider_surfaces_non_success_status() {
    let _env = EnvVarGuard::set("NO_PROXY", no_proxy_value());
    let Some((addr, handle)) = serve_once("429 Too Many Requests", r#"{"error":"rate limited"}"#)
    else {
        return;
    };

    let cfg = model(ProviderKind::OpenAi, format!("http://{addr}/v1"), Some("sk-test"));
    let err = OpenAiProvider::from_config(&cfg)
        .unwrap()
        .complete(&request())
        .unwrap_err();
    match err.downcast_ref::<ProviderError>() {
        Some(ProviderError::BadStatus { status, body, .. }) => {
            assert_eq!(*status, 429);
            assert!(body.contains("rate limited"));
        }
        other => panic!("expected BadStatus, got {other:?} ({err:#})"),
    }
    let _ = handle.join();
}

#[test]
fn openai_provider_rejects_reply_without_content() {
    let _env = EnvVarGuard::set("NO_PROXY", no_proxy_value());
    let Some((addr, handle)) = serve_once("200 OK", r#"{"choices":[]}"#) else {
        return;
    };

    let cfg = model(ProviderKind::OpenAi, format!("http://{addr}/v1"), Some("sk-test"));
    let err = OpenAiProvider::from_config(&cfg)
        .unwrap()
        .complete(&request())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProviderError>(),
        Some(ProviderError::MissingField { provider: "openai", .. })
    ));
    let _ = handle.join();
}

#[test]
fn http_provider_posts_flattened_prompt() {
    let _env = EnvVarGuard::set("NO_PROXY", no_proxy_value());
    let Some((addr, handle)) = serve_once("200 OK", r#"{"output":"REMOTE_OK"}"#) else {
        return;
    };

    let cfg = model(ProviderKind::Http, format!("http://{addr}/complete"), None);
    let p = HttpProvider::from_config(&cfg).unwrap();
    assert_eq!(p.complete(&request()).unwrap(), "REMOTE_OK");

    let raw = handle.join().unwrap();
    assert!(raw.starts_with("POST /complete"), "request was:\n{raw}");
    assert!(raw.contains(r#"SYSTEM:\nYou are a specialized contract analysis agent"#));
    assert!(!raw.to_ascii_lowercase().contains("authorization:"));
}

#[test]
fn http_provider_requires_output_field() {
    let _env = EnvVarGuard::set("NO_PROXY", no_proxy_value());
    let Some((addr, handle)) = serve_once("200 OK", r#"{"result":"wrong key"}"#) else {
        return;
    };

    let cfg = model(ProviderKind::Http, format!("http://{addr}/complete"), None);
    let err = build_provider(&cfg).unwrap().complete(&request()).unwrap_err();
    assert!(
        format!("{err:#}").contains("missing 'output'"),
        "got: {err:#}"
    );
    let _ = handle.join();
}

/// Accept one connection and never answer within the client timeout.
fn serve_stalled() -> Option<(SocketAddr, JoinHandle<()>)> {
    let server = match TcpListener::bind("127.0.0.1:0") {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => return None,
        Err(e) => panic!("failed to bind local test server: {e}"),
    };
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || {
        if let Ok((mut stream, _)) = server.accept() {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            thread::sleep(Duration::from_secs(3));
        }
    });
    Some((addr, handle))
}

#[test]
fn http_provider_maps_timeout_to_provider_error() {
    let _env = EnvVarGuard::set("NO_PROXY", no_proxy_value());
    let Some((addr, handle)) = serve_stalled() else {
        return;
    };

    let cfg = ModelConfig {
        timeout_secs: 1,
        ..model(ProviderKind::Http, format!("http://{addr}/complete"), None)
    };
    let err = HttpProvider::from_config(&cfg)
        .unwrap()
        .complete(&request())
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<ProviderError>(),
        Some(&ProviderError::Timeout {
            provider: "http",
            secs: 1
        }),
        "got: {err:#}"
    );
    let _ = handle.join();
}

fn write_executable(path: &Path, contents: &str) -> io::Result<()> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

fn mock_ollama(dir: &Path, script: &str) -> PathBuf {
    let bin = dir.join("mock_ollama.sh");
    write_executable(&bin, script).unwrap();
    bin
}

#[cfg(unix)]
#[test]
fn ollama_provider_passes_model_and_transcript() {
    let dir = unique_test_temp_dir("ollama-ok");
    let bin = mock_ollama(
        &dir,
        r#"#!/bin/sh
set -eu
if [ "${1:-}" != "run" ]; then
  echo "expected arg1=run, got '${1:-}'" 1>&2
  exit 2
fi
echo "model=${2:-}"
echo "argc=$#"
cat
"#,
    );
    let _env = EnvVarGuard::set("LEGAL_SWARM_OLLAMA_BIN", &bin);

    let cfg = ModelConfig {
        provider: ProviderKind::Ollama,
        name: "llama3.1:8b".to_string(),
        ..ModelConfig::default()
    };
    let p = OllamaProvider::from_config(&cfg);
    let mut req = request();
    req.model = String::new();
    req.temperature = 0.87;
    let out = p.complete(&req).unwrap();
    assert!(out.contains("model=llama3.1:8b"), "out was: {out}");
    // Only `run <model>`: the CLI takes no temperature.
    assert!(out.contains("argc=2"), "out was: {out}");
    assert!(!out.contains("0.87"), "out was: {out}");
    assert!(out.contains("USER:\nReview the indemnity clause"), "out was: {out}");
}

#[cfg(unix)]
#[test]
fn ollama_provider_surfaces_stderr_on_failure() {
    let dir = unique_test_temp_dir("ollama-fail");
    let bin = mock_ollama(
        &dir,
        "#!/bin/sh\ncat >/dev/null\necho \"something went wrong\" 1>&2\nexit 42\n",
    );
    let _env = EnvVarGuard::set("LEGAL_SWARM_OLLAMA_BIN", &bin);

    let cfg = ModelConfig {
        provider: ProviderKind::Ollama,
        ..ModelConfig::default()
    };
    let err = build_provider(&cfg).unwrap().complete(&request()).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("ollama run failed"), "msg was: {msg}");
    assert!(msg.contains("something went wrong"), "msg was: {msg}");
}

#[cfg(unix)]
#[test]
fn ollama_provider_times_out() {
    let dir = unique_test_temp_dir("ollama-timeout");
    let bin = mock_ollama(&dir, "#!/bin/sh\ncat >/dev/null\nexec sleep 5\n");
    let _env = EnvVarGuard::set_many(&[("LEGAL_SWARM_OLLAMA_BIN", bin.as_os_str())]);

    let cfg = ModelConfig {
        provider: ProviderKind::Ollama,
        timeout_secs: 1,
        ..ModelConfig::default()
    };
    let err = build_provider(&cfg).unwrap().complete(&request()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ProviderError>(),
        Some(&ProviderError::Timeout {
            provider: "ollama",
            secs: 1
        })
    );
}
