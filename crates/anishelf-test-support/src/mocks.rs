//! Scripted [`LookupSession`] for pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anishelf_protocol::{
    AnimeInfo, AuthOutcome, Credentials, Ed2kHash, FileInfo, LookupError, LookupReply, LookupRequest,
    LookupResult, LookupSession,
};
use async_trait::async_trait;

use crate::reply::encode_reply;

/// Scripted answer for one fingerprint.
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer with the records, encoded for whatever masks were requested.
    Found(Box<(FileInfo, AnimeInfo)>),
    /// Answer with a fixed raw line.
    Raw(String),
    /// The server does not know the file.
    NotFound,
    /// Per-item request failure.
    RequestError,
    /// The session is lost.
    SessionError,
}

impl Script {
    /// Shorthand for [`Script::Found`].
    #[must_use]
    pub fn found(file: FileInfo, anime: AnimeInfo) -> Self {
        Self::Found(Box::new((file, anime)))
    }
}

/// In-memory session answering lookups from a script.
#[derive(Debug, Default)]
pub struct ScriptedSession {
    scripts: HashMap<Ed2kHash, Script>,
    reject_login: bool,
    max_in_flight: Option<usize>,
    delay: Option<Duration>,
    lookups: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    requests: Mutex<Vec<LookupRequest>>,
}

impl ScriptedSession {
    /// Session where every fingerprint is unknown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the answer for `ed2k`.
    #[must_use]
    pub fn with_script(mut self, ed2k: Ed2kHash, script: Script) -> Self {
        self.scripts.insert(ed2k, script);
        self
    }

    /// Refuse every login.
    #[must_use]
    pub const fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Advertise a concurrency limit other than the default.
    #[must_use]
    pub const fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = Some(limit);
        self
    }

    /// Hold every lookup for `delay` before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of lookups served.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent lookups observed.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Requests received, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<LookupRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn answer(&self, request: &LookupRequest) -> LookupResult<LookupReply> {
        match self.scripts.get(&request.ed2k) {
            None | Some(Script::NotFound) => Ok(LookupReply::NotFound),
            Some(Script::Found(records)) => {
                let (file, anime) = records.as_ref();
                Ok(LookupReply::Found(encode_reply(
                    file,
                    anime,
                    &request.file_mask,
                    &request.anime_mask,
                )))
            }
            Some(Script::Raw(line)) => Ok(LookupReply::Found(line.clone())),
            Some(Script::RequestError) => Err(LookupError::request(
                "lookup_by_hash",
                anyhow::anyhow!("scripted request failure"),
            )),
            Some(Script::SessionError) => Err(LookupError::session(
                "lookup_by_hash",
                anyhow::anyhow!("scripted session loss"),
            )),
        }
    }
}

#[async_trait]
impl LookupSession for ScriptedSession {
    async fn authenticate(&self, _credentials: &Credentials) -> LookupResult<AuthOutcome> {
        Ok(AuthOutcome {
            success: !self.reject_login,
            has_new_version: false,
        })
    }

    async fn lookup_by_hash(&self, request: &LookupRequest) -> LookupResult<LookupReply> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let answer = self.answer(request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        answer
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.unwrap_or(1)
    }
}
