//! Live drug-configuration refresh.
//!
//! Lifecycle: `Local` (built-in table) → `Loading` → `Live` or `Error`.
//! A failed refresh keeps whatever table was active before; a document is
//! never partially applied. Only one refresh may be in flight.

use crate::document::DrugDocument;
use crate::{ConfigRegistry, DrugRecord, Error, Reconciled, Result, Session};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Somewhere a drug configuration document can be fetched from
pub trait ConfigSource {
    /// Human-readable location, for logs and status text
    fn describe(&self) -> String;

    /// Retrieve the raw document body
    fn fetch(&self) -> Result<String>;
}

/// Fetch over HTTP(S)
pub struct HttpSource {
    url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpSource {
    pub fn new(url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Fetch(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            client,
            timeout_secs,
        })
    }
}

impl ConfigSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn fetch(&self) -> Result<String> {
        let response = self.client.get(&self.url).send().map_err(|e| {
            if e.is_timeout() {
                Error::Fetch(format!(
                    "request to {} timed out after {}s",
                    self.url, self.timeout_secs
                ))
            } else {
                Error::Fetch(format!("request to {} failed: {}", self.url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!(
                "{} responded with status {}",
                self.url,
                status.as_u16()
            )));
        }

        response
            .text()
            .map_err(|e| Error::Fetch(format!("failed to read body from {}: {}", self.url, e)))
    }
}

/// Read a document from disk
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Fetch(format!("failed to read {:?}: {}", self.path, e)))
    }
}

/// Which table the calculator is running on
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    /// Built-in table, no remote data yet
    Local,
    Loading,
    /// Remote table active
    Live,
    /// Last refresh failed; previous table retained
    Error,
}

/// Status as shown to the user
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct StatusReport {
    pub status: LoadStatus,
    pub detail: Option<String>,
    /// RFC 3339 time of the last successful remote update
    pub last_updated: Option<String>,
}

/// Proof that a refresh was started; consumed by [`ConfigLoader::complete`]
#[derive(Debug)]
#[must_use = "a started refresh must be completed or abandoned"]
pub struct RefreshTicket {
    _private: (),
}

/// Drives fetch → validate → swap
#[derive(Debug)]
pub struct ConfigLoader {
    status: LoadStatus,
    detail: Option<String>,
    last_updated: Option<DateTime<Utc>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse and validate a document body into records and a data version
///
/// A missing `dataVersion` becomes the current time.
pub fn load_document(body: &str) -> Result<(Vec<DrugRecord>, DateTime<Utc>)> {
    let document = DrugDocument::parse(body)?;
    let data_version = document.data_version.unwrap_or_else(Utc::now);
    let drugs = document.into_records()?;
    Ok((drugs, data_version))
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            status: LoadStatus::Local,
            detail: None,
            last_updated: None,
        }
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            status: self.status,
            detail: self.detail.clone(),
            last_updated: self.last_updated.map(|ts| ts.to_rfc3339()),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }

    /// Whether a remote table has ever been swapped in
    pub fn has_loaded(&self) -> bool {
        self.last_updated.is_some()
    }

    /// Start a refresh; `None` if one is already in flight
    pub fn begin(&mut self) -> Option<RefreshTicket> {
        if self.is_loading() {
            tracing::debug!("Refresh already in flight, ignoring trigger");
            return None;
        }
        self.status = LoadStatus::Loading;
        self.detail = None;
        Some(RefreshTicket { _private: () })
    }

    /// Give up on a started refresh without a result
    ///
    /// Returns to `Live` if remote data is active, otherwise `Local`.
    pub fn abandon(&mut self, _ticket: RefreshTicket) -> LoadStatus {
        self.status = if self.has_loaded() {
            LoadStatus::Live
        } else {
            LoadStatus::Local
        };
        self.status
    }

    /// Finish a refresh with the fetched body (or the fetch error)
    ///
    /// On success the registry is replaced and the session re-pointed at it.
    /// On any failure both are left exactly as they were.
    pub fn complete(
        &mut self,
        _ticket: RefreshTicket,
        fetched: Result<String>,
        registry: &mut ConfigRegistry,
        session: &mut Session,
    ) -> LoadStatus {
        match fetched.and_then(|body| load_document(&body)) {
            Ok((drugs, data_version)) => {
                let count = drugs.len();
                registry.replace(drugs, data_version);
                let reconciled = session.reconcile(registry);
                if reconciled != Reconciled::Unchanged {
                    tracing::info!("Session adjusted after config swap: {:?}", reconciled);
                }

                self.status = LoadStatus::Live;
                self.detail = Some(format!("{} drugs loaded", count));
                self.last_updated = Some(data_version);
            }
            Err(e) => {
                match &e {
                    Error::Validation(problems) => {
                        for problem in problems {
                            tracing::warn!("Rejected drug config: {}", problem);
                        }
                    }
                    other => tracing::warn!("Drug config refresh failed: {}", other),
                }
                self.status = LoadStatus::Error;
                self.detail = Some(e.to_string());
            }
        }
        self.status
    }

    /// Single-flight fetch, validate and swap against a source
    pub fn refresh(
        &mut self,
        source: &dyn ConfigSource,
        registry: &mut ConfigRegistry,
        session: &mut Session,
    ) -> LoadStatus {
        let Some(ticket) = self.begin() else {
            return self.status;
        };
        tracing::info!("Refreshing drug config from {}", source.describe());
        let fetched = source.fetch();
        self.complete(ticket, fetched, registry, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_default_registry, Language, Mode, RegistryOrigin};
    use std::cell::Cell;

    struct StaticSource {
        body: Result<String>,
        calls: Cell<usize>,
    }

    impl StaticSource {
        fn ok(body: &str) -> Self {
            Self {
                body: Ok(body.to_string()),
                calls: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                body: Err(Error::Fetch("503".into())),
                calls: Cell::new(0),
            }
        }
    }

    impl ConfigSource for StaticSource {
        fn describe(&self) -> String {
            "static".into()
        }

        fn fetch(&self) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            match &self.body {
                Ok(body) => Ok(body.clone()),
                Err(e) => Err(Error::Fetch(e.to_string())),
            }
        }
    }

    fn remote_document(ids: &[&str], data_version: Option<&str>) -> String {
        let drugs: Vec<_> = ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "id": id,
                    "displayName": id.to_uppercase(),
                    "doseMin": 0.5,
                    "doseMax": 20,
                    "concentrations": ["1:1", "4:100"],
                    "defaultConcentration": "1:1",
                    "defaultDose": 2,
                    "ampules": [{ "label": "a", "volumeMl": 5, "concentrationMgPerMl": 10 }],
                    "prepVolumesByConcentration": { "1:1": [50, 100] }
                })
            })
            .collect();
        let mut doc = serde_json::json!({ "schemaVersion": "2", "drugs": drugs });
        if let Some(v) = data_version {
            doc["dataVersion"] = serde_json::json!(v);
        }
        doc.to_string()
    }

    fn setup() -> (ConfigLoader, ConfigRegistry, Session) {
        crate::logging::init_test();
        let registry = build_default_registry();
        let mut session = Session::initial(&registry, Language::En).unwrap();
        session.on_drug_change(&registry, "levophed");
        session.set_mode(Mode::Reverse);
        session.set_weight(Some(70.0));
        session.set_infusion_rate(Some(5.25));
        (ConfigLoader::new(), registry, session)
    }

    #[test]
    fn test_starts_local() {
        let loader = ConfigLoader::new();
        let status = loader.status();
        assert_eq!(status.status, LoadStatus::Local);
        assert_eq!(status.detail, None);
        assert_eq!(status.last_updated, None);
    }

    #[test]
    fn test_successful_swap_goes_live() {
        let (mut loader, mut registry, mut session) = setup();
        let source = StaticSource::ok(&remote_document(
            &["levophed", "vaso"],
            Some("2025-01-02T03:04:05Z"),
        ));

        assert_eq!(loader.refresh(&source, &mut registry, &mut session), LoadStatus::Live);
        assert_eq!(registry.origin(), RegistryOrigin::Remote);
        assert_eq!(registry.len(), 2);

        // levophed still exists but 4:100 is offered, so nothing moves
        assert_eq!(session.selected_drug_id, "levophed");
        assert_eq!(session.selected_concentration.as_str(), "4:100");
        assert_eq!(session.weight_kg, Some(70.0));
        assert_eq!(session.infusion_rate, Some(5.25));
        assert_eq!(session.mode, Mode::Reverse);

        let status = loader.status();
        assert_eq!(status.last_updated.as_deref(), Some("2025-01-02T03:04:05+00:00"));
        assert_eq!(status.detail.as_deref(), Some("2 drugs loaded"));
    }

    #[test]
    fn test_missing_data_version_uses_now() {
        let (mut loader, mut registry, mut session) = setup();
        let before = Utc::now();
        let source = StaticSource::ok(&remote_document(&["alpha"], None));
        loader.refresh(&source, &mut registry, &mut session);

        let stamp = registry.data_version().unwrap();
        assert!(stamp >= before);
        assert!(loader.status().last_updated.is_some());
    }

    #[test]
    fn test_swap_falls_back_to_first_drug() {
        let (mut loader, mut registry, mut session) = setup();
        let source = StaticSource::ok(&remote_document(&["alpha", "beta"], None));
        loader.refresh(&source, &mut registry, &mut session);

        assert_eq!(session.selected_drug_id, "alpha");
        assert_eq!(session.selected_concentration.as_str(), "1:1");
        assert_eq!(session.weight_kg, Some(70.0));
        assert_eq!(session.infusion_rate, Some(5.25));
    }

    #[test]
    fn test_invalid_document_keeps_everything() {
        let (mut loader, mut registry, mut session) = setup();
        let registry_before = registry.drugs().to_vec();
        let session_before = session.clone();

        let mut doc: serde_json::Value =
            serde_json::from_str(&remote_document(&["alpha", "alpha"], None)).unwrap();
        doc["drugs"][0]["concentrations"] = serde_json::json!(["4100"]);
        let source = StaticSource::ok(&doc.to_string());

        assert_eq!(loader.refresh(&source, &mut registry, &mut session), LoadStatus::Error);
        assert_eq!(registry.drugs(), registry_before.as_slice());
        assert_eq!(registry.origin(), RegistryOrigin::Builtin);
        assert_eq!(session, session_before);

        let detail = loader.status().detail.unwrap();
        assert!(detail.contains("duplicate id"));
        assert!(detail.contains("4100"));
    }

    #[test]
    fn test_schema_error_reported() {
        let (mut loader, mut registry, mut session) = setup();
        let source = StaticSource::ok(r#"{"medications": []}"#);
        assert_eq!(loader.refresh(&source, &mut registry, &mut session), LoadStatus::Error);
        assert!(loader.status().detail.unwrap().starts_with("Schema error"));
        assert_eq!(registry.origin(), RegistryOrigin::Builtin);
    }

    #[test]
    fn test_fetch_error_after_live_keeps_remote_table() {
        let (mut loader, mut registry, mut session) = setup();
        loader.refresh(
            &StaticSource::ok(&remote_document(&["alpha"], None)),
            &mut registry,
            &mut session,
        );
        let live_version = loader.status().last_updated;

        assert_eq!(
            loader.refresh(&StaticSource::failing(), &mut registry, &mut session),
            LoadStatus::Error
        );
        assert_eq!(registry.origin(), RegistryOrigin::Remote);
        assert_eq!(registry.first().unwrap().id, "alpha");
        assert_eq!(loader.status().last_updated, live_version);
        assert!(loader.has_loaded());
    }

    #[test]
    fn test_single_flight() {
        let (mut loader, mut registry, mut session) = setup();
        let ticket = loader.begin().unwrap();
        assert!(loader.is_loading());
        assert!(loader.begin().is_none());

        let source = StaticSource::ok(&remote_document(&["alpha"], None));
        assert_eq!(
            loader.refresh(&source, &mut registry, &mut session),
            LoadStatus::Loading
        );
        assert_eq!(source.calls.get(), 0);

        loader.complete(ticket, source.fetch(), &mut registry, &mut session);
        assert_eq!(loader.status().status, LoadStatus::Live);
    }

    #[test]
    fn test_abandon_returns_to_local_until_loaded() {
        let (mut loader, mut registry, mut session) = setup();
        let ticket = loader.begin().unwrap();
        assert_eq!(loader.abandon(ticket), LoadStatus::Local);

        loader.refresh(
            &StaticSource::ok(&remote_document(&["alpha"], None)),
            &mut registry,
            &mut session,
        );
        let ticket = loader.begin().unwrap();
        assert_eq!(loader.abandon(ticket), LoadStatus::Live);
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drugs.json");
        std::fs::write(&path, remote_document(&["alpha"], None)).unwrap();
        assert!(FileSource::new(&path).fetch().unwrap().contains("alpha"));

        let missing = FileSource::new(dir.path().join("missing.json"));
        assert!(matches!(missing.fetch(), Err(Error::Fetch(_))));
    }

    /// Answer a single HTTP request on a loopback port with `response`
    fn serve_once(response: String) -> (String, std::thread::JoinHandle<()>) {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/drugs.json", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
        });
        (url, handle)
    }

    #[test]
    fn test_http_error_status_is_fetch_error() {
        let (url, server) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
        );
        let source = HttpSource::new(&url, 5).unwrap();

        match source.fetch() {
            Err(Error::Fetch(msg)) => assert!(msg.contains("status 503"), "{}", msg),
            other => panic!("expected fetch error, got {:?}", other),
        }
        server.join().unwrap();
    }

    #[test]
    fn test_http_document_goes_live() {
        let (mut loader, mut registry, mut session) = setup();
        let body = remote_document(&["levophed", "vaso"], Some("2025-01-02T03:04:05Z"));
        let (url, server) = serve_once(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ));
        let source = HttpSource::new(&url, 5).unwrap();
        assert_eq!(source.describe(), url);

        assert_eq!(loader.refresh(&source, &mut registry, &mut session), LoadStatus::Live);
        assert_eq!(registry.len(), 2);
        assert!(registry.resolve("vaso").is_some());
        server.join().unwrap();
    }
}
