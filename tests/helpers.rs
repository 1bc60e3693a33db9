#![allow(dead_code)]

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use anyhow::Result;
use legal_swarm::config::SwarmConfig;
use legal_swarm::provider::{ChatRequest, Provider};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
static TEMP_SEQ: AtomicUsize = AtomicUsize::new(0);

fn env_lock() -> MutexGuard<'static, ()> {
    match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(g) => g,
        // A panicking test must not wedge the rest of the suite.
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// RAII guard for test-only env var mutation, serialised by a global lock.
#[must_use]
pub struct EnvVarGuard {
    entries: Vec<(String, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvVarGuard {
    pub fn set<K: Into<String>, V: AsRef<OsStr>>(key: K, value: V) -> Self {
        let key: String = key.into();
        Self::set_many(&[(key.as_str(), value.as_ref())])
    }

    pub fn unset<K: Into<String>>(key: K) -> Self {
        let key = key.into();
        let lock = env_lock();
        let old = env::var_os(&key);
        unsafe {
            env::remove_var(&key);
        }
        Self {
            entries: vec![(key, old)],
            _lock: lock,
        }
    }

    pub fn set_many(pairs: &[(&str, &OsStr)]) -> Self {
        let lock = env_lock();
        let mut entries = Vec::with_capacity(pairs.len());
        for (key, value) in pairs.iter() {
            let key = (*key).to_string();
            let old = env::var_os(&key);
            unsafe {
                env::set_var(&key, value);
            }
            entries.push((key, old));
        }
        Self {
            entries,
            _lock: lock,
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, old) in self.entries.iter() {
            unsafe {
                match old {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

pub fn unique_test_temp_dir(prefix: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let seq = TEMP_SEQ.fetch_add(1, Ordering::SeqCst);
    let dir = env::temp_dir().join(format!(
        "legal-swarm-{prefix}-{}-{nanos}-{seq}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// Config whose state files land in a fresh temp dir.
pub fn test_config(prefix: &str) -> SwarmConfig {
    SwarmConfig {
        state_dir: unique_test_temp_dir(prefix),
        ..SwarmConfig::default()
    }
}

type Responder = dyn Fn(&ChatRequest, usize) -> Result<String> + Send + Sync;

/// In-process provider that records every request and answers via a closure
/// receiving the request and its zero-based call index.
pub struct ScriptedProvider {
    calls: Mutex<Vec<ChatRequest>>,
    responder: Box<Responder>,
}

impl ScriptedProvider {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&ChatRequest, usize) -> Result<String> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        })
    }

    /// Replies `"<first system line>|<last message>"`.
    pub fn echo() -> Arc<Self> {
        Self::new(|req, _| {
            let who = req
                .system
                .as_deref()
                .and_then(|s| s.lines().next())
                .unwrap_or("")
                .to_string();
            let last = req
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(format!("{who}|{last}"))
        })
    }

    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl Provider for ScriptedProvider {
    fn complete(&self, req: &ChatRequest) -> Result<String> {
        let idx = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(req.clone());
            calls.len() - 1
        };
        (self.responder)(req, idx)
    }
}
