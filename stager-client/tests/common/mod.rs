//! Scripted backend used by coordinator tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;

use stager_client::{
    ClientError, OpenedSession, PartTransmitter, Result, RetryPolicy, UploadAuthorizer, UploadConfig,
};
use stager_core::{ObjectKey, PartAuthorization, PartReceipt, SessionId, UploadSession};

pub const OBJECT_KEY: &str = "reel.zip-01J9ZQ4T0000000000000000";
pub const SESSION_ID: &str = "session-1";

/// How a scripted part behaves on each transmit
#[derive(Debug, Clone)]
pub enum PartScript {
    /// Fail the first `times` attempts with `status`
    Fail { status: u16, times: u32 },
    /// Never resolve until the transfer is dropped
    Hang,
    /// Report a receipt for a different part
    Misreport(u32),
}

#[derive(Debug, Default)]
pub struct Calls {
    pub open: u32,
    pub authorize: Vec<Vec<u32>>,
    /// (part number, token, body length) per transmit attempt
    pub transmits: Vec<(u32, String, usize)>,
    pub finalize: Vec<Vec<PartReceipt>>,
    pub abort: u32,
}

impl Calls {
    pub fn transmits_of(&self, part_number: u32) -> usize {
        self.transmits.iter().filter(|(n, _, _)| *n == part_number).count()
    }
}

/// In-process authorizer and transmitter with scripted faults
#[derive(Default)]
pub struct ScriptedBackend {
    pub calls: Mutex<Calls>,
    scripts: Mutex<HashMap<u32, PartScript>>,
    delays: HashMap<u32, Duration>,
    open_status: Option<u16>,
    authorize_failures: Mutex<Vec<u16>>,
    hang_authorize: bool,
    stale_tokens: Mutex<HashSet<u32>>,
    finalize_status: Option<u16>,
    abort_status: Option<u16>,
    issued: Mutex<HashMap<u32, u32>>,
    active: Mutex<HashSet<u32>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    pub started: Notify,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        ScriptedBackend::default()
    }

    pub fn script(self, part_number: u32, script: PartScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(part_number, script);
        self
    }

    pub fn fail_part(self, part_number: u32, status: u16, times: u32) -> Self {
        self.script(part_number, PartScript::Fail { status, times })
    }

    pub fn delay_part(mut self, part_number: u32, delay: Duration) -> Self {
        self.delays.insert(part_number, delay);
        self
    }

    pub fn fail_open(mut self, status: u16) -> Self {
        self.open_status = Some(status);
        self
    }

    /// Fail the next authorize calls with these statuses, in order
    pub fn fail_authorize(self, statuses: &[u16]) -> Self {
        *self.authorize_failures.lock().unwrap() = statuses.to_vec();
        self
    }

    /// Authorize calls never resolve
    pub fn hang_authorize(mut self) -> Self {
        self.hang_authorize = true;
        self
    }

    /// The next token issued for `part_number` is already past its expiry
    pub fn stale_token(self, part_number: u32) -> Self {
        self.stale_tokens.lock().unwrap().insert(part_number);
        self
    }

    pub fn fail_finalize(mut self, status: u16) -> Self {
        self.finalize_status = Some(status);
        self
    }

    pub fn fail_abort(mut self, status: u16) -> Self {
        self.abort_status = Some(status);
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn http(status: u16) -> ClientError {
        ClientError::Http {
            status,
            body: format!("scripted {}", status),
        }
    }

    fn authorization(&self, part_number: u32) -> PartAuthorization {
        let token = self.token(part_number);
        if self.stale_tokens.lock().unwrap().remove(&part_number) {
            PartAuthorization::with_expiry(part_number, token, SystemTime::UNIX_EPOCH)
        } else {
            PartAuthorization::new(part_number, token, Duration::from_secs(1800))
        }
    }

    fn token(&self, part_number: u32) -> String {
        let mut issued = self.issued.lock().unwrap();
        let version = issued.entry(part_number).or_insert(0);
        *version += 1;
        format!("scripted://part/{}?v={}", part_number, version)
    }
}

#[async_trait]
impl UploadAuthorizer for ScriptedBackend {
    async fn open_session(&self, _file_name: &str, _content_type: &str) -> Result<OpenedSession> {
        self.calls.lock().unwrap().open += 1;
        if let Some(status) = self.open_status {
            return Err(Self::http(status));
        }
        Ok(OpenedSession {
            object_key: ObjectKey::new(OBJECT_KEY)?,
            session_id: SessionId::new(SESSION_ID)?,
        })
    }

    async fn authorize_parts(
        &self,
        _session: &UploadSession,
        part_numbers: &[u32],
    ) -> Result<BTreeMap<u32, PartAuthorization>> {
        self.calls.lock().unwrap().authorize.push(part_numbers.to_vec());
        if self.hang_authorize {
            self.started.notify_one();
            return std::future::pending().await;
        }
        {
            let mut failures = self.authorize_failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(Self::http(failures.remove(0)));
            }
        }
        Ok(part_numbers
            .iter()
            .map(|&n| (n, self.authorization(n)))
            .collect())
    }

    async fn finalize(&self, session: &UploadSession, receipts: &[PartReceipt]) -> Result<ObjectKey> {
        self.calls.lock().unwrap().finalize.push(receipts.to_vec());
        if let Some(status) = self.finalize_status {
            return Err(Self::http(status));
        }
        Ok(session.object_key().clone())
    }

    async fn abort(&self, _session: &UploadSession) -> Result<()> {
        self.calls.lock().unwrap().abort += 1;
        if let Some(status) = self.abort_status {
            return Err(Self::http(status));
        }
        Ok(())
    }
}

/// Tracks concurrent transfers for the lifetime of one transmit call
struct InFlight<'a> {
    backend: &'a ScriptedBackend,
    part_number: u32,
}

impl<'a> InFlight<'a> {
    fn enter(backend: &'a ScriptedBackend, part_number: u32) -> Self {
        assert!(
            backend.active.lock().unwrap().insert(part_number),
            "part {} transferred twice concurrently",
            part_number
        );
        let now = backend.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        backend.peak.fetch_max(now, Ordering::SeqCst);
        InFlight { backend, part_number }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.backend.active.lock().unwrap().remove(&self.part_number);
        self.backend.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PartTransmitter for ScriptedBackend {
    async fn transmit(&self, authorization: &PartAuthorization, body: Bytes) -> Result<PartReceipt> {
        let part_number = authorization.part_number;
        let _guard = InFlight::enter(self, part_number);
        self.calls
            .lock()
            .unwrap()
            .transmits
            .push((part_number, authorization.token.clone(), body.len()));
        self.started.notify_one();

        if let Some(delay) = self.delays.get(&part_number) {
            tokio::time::sleep(*delay).await;
        }

        let script = self.scripts.lock().unwrap().get(&part_number).cloned();
        match script {
            Some(PartScript::Hang) => std::future::pending().await,
            Some(PartScript::Fail { status, times }) if times > 0 => {
                self.scripts
                    .lock()
                    .unwrap()
                    .insert(part_number, PartScript::Fail { status, times: times - 1 });
                Err(Self::http(status))
            }
            Some(PartScript::Misreport(other)) => {
                Ok(PartReceipt::new(other, format!("\"etag-{}\"", other)))
            }
            _ => Ok(PartReceipt::new(part_number, format!("\"etag-{}\"", part_number))),
        }
    }
}

/// Config with millisecond backoff so retry tests stay fast
pub fn fast_config(concurrency: usize) -> UploadConfig {
    let retry = RetryPolicy {
        max_retries: 2,
        base_delay_ms: 1,
        max_delay_ms: 2,
    };
    UploadConfig::default()
        .with_concurrency(NonZeroUsize::new(concurrency).unwrap())
        .with_part_retry(retry)
        .with_control_retry(retry)
}
