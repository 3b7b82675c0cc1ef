#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use plist::{Dictionary, Value};
use provx_core::{IndexHandle, ProfileError, ProfileLoader};
use provx_domain::{
    CertificateDecoder, CertificateSummary, DocumentDecoder, PlistDocumentDecoder,
};

pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Base mtime for fixture files, well before anything the OS stamps itself.
pub const EPOCH_SECS: i64 = 1_600_000_000;

/// Builds profile documents and writes them wrapped in a fake signature.
#[derive(Debug, Clone)]
pub struct Fixture {
    name: String,
    uuid: String,
    application_identifier: String,
    platforms: Vec<&'static str>,
    created: SystemTime,
    expires: SystemTime,
    devices: bool,
    get_task_allow: bool,
    provisions_all_devices: bool,
    certificates: Vec<(String, String)>,
}

impl Fixture {
    /// A valid iOS development profile for `T1.com.example.app`.
    pub fn new(name: &str, uuid: &str) -> Self {
        let now = SystemTime::now();
        Self {
            name: name.to_string(),
            uuid: uuid.to_string(),
            application_identifier: "T1.com.example.app".to_string(),
            platforms: vec!["iOS"],
            created: now - 10 * DAY,
            expires: now + 365 * DAY,
            devices: true,
            get_task_allow: true,
            provisions_all_devices: false,
            certificates: Vec::new(),
        }
    }

    pub fn app_id(mut self, application_identifier: &str) -> Self {
        self.application_identifier = application_identifier.to_string();
        self
    }

    pub fn platforms(mut self, platforms: &[&'static str]) -> Self {
        self.platforms = platforms.to_vec();
        self
    }

    pub fn created_days_ago(mut self, days: u32) -> Self {
        self.created = SystemTime::now() - days * DAY;
        self
    }

    pub fn expired(mut self) -> Self {
        self.expires = SystemTime::now() - DAY;
        self
    }

    pub fn app_store(mut self) -> Self {
        self.devices = false;
        self.get_task_allow = false;
        self.provisions_all_devices = false;
        self
    }

    pub fn ad_hoc(mut self) -> Self {
        self.devices = true;
        self.get_task_allow = false;
        self
    }

    pub fn certificate(mut self, name: &str, thumbprint: &str) -> Self {
        self.certificates
            .push((name.to_string(), thumbprint.to_string()));
        self
    }

    pub fn document(&self) -> Dictionary {
        let mut doc = Dictionary::new();
        doc.insert("Name".into(), Value::String(self.name.clone()));
        doc.insert("UUID".into(), Value::String(self.uuid.clone()));
        doc.insert("CreationDate".into(), Value::Date(self.created.into()));
        doc.insert("ExpirationDate".into(), Value::Date(self.expires.into()));
        doc.insert(
            "Platform".into(),
            Value::Array(
                self.platforms
                    .iter()
                    .map(|platform| Value::String((*platform).to_string()))
                    .collect(),
            ),
        );
        let mut entitlements = Dictionary::new();
        entitlements.insert(
            "application-identifier".into(),
            Value::String(self.application_identifier.clone()),
        );
        entitlements.insert("get-task-allow".into(), Value::Boolean(self.get_task_allow));
        doc.insert("Entitlements".into(), Value::Dictionary(entitlements));
        if self.devices {
            doc.insert(
                "ProvisionedDevices".into(),
                Value::Array(vec![Value::String("00008030-000000000000002E".into())]),
            );
        }
        if self.provisions_all_devices {
            doc.insert("ProvisionsAllDevices".into(), Value::Boolean(true));
        }
        doc.insert(
            "DeveloperCertificates".into(),
            Value::Array(
                self.certificates
                    .iter()
                    .map(|(name, thumbprint)| {
                        Value::Data(format!("{name}|{thumbprint}").into_bytes())
                    })
                    .collect(),
            ),
        );
        doc
    }

    /// Document bytes inside a stand-in CMS envelope.
    pub fn bytes(&self) -> Vec<u8> {
        let mut xml = Vec::new();
        Value::Dictionary(self.document())
            .to_writer_xml(&mut xml)
            .expect("serialize fixture plist");
        let mut data = b"0\x82\x1f\x00fake-cms-header".to_vec();
        data.extend_from_slice(&xml);
        data.extend_from_slice(b"\x00\x00fake-signature");
        data
    }

    /// Writes `<dir>/<file_name>` with its mtime set to `EPOCH_SECS + offset`.
    pub fn write(&self, dir: &Path, file_name: &str, offset: i64) -> PathBuf {
        let path = dir.join(file_name);
        fs::write(&path, self.bytes()).expect("write fixture");
        set_mtime(&path, offset);
        path
    }
}

pub fn set_mtime(path: &Path, offset: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(EPOCH_SECS + offset, 0))
        .expect("set mtime");
}

/// Certificates encoded as `name|thumbprint` text.
#[derive(Debug, Default)]
pub struct TextCertificateDecoder;

impl CertificateDecoder for TextCertificateDecoder {
    fn decode(&self, der: &[u8]) -> Result<CertificateSummary, ProfileError> {
        let text = std::str::from_utf8(der)
            .map_err(|err| ProfileError::Certificate(err.to_string()))?;
        let (name, thumbprint) = text
            .split_once('|')
            .ok_or_else(|| ProfileError::Certificate(format!("malformed fixture `{text}`")))?;
        Ok(CertificateSummary {
            common_name: name.to_string(),
            thumbprint: thumbprint.to_string(),
            der: der.to_vec(),
        })
    }
}

/// Counts how many documents were decoded.
#[derive(Debug, Default)]
pub struct CountingDocumentDecoder {
    calls: Arc<AtomicUsize>,
}

impl DocumentDecoder for CountingDocumentDecoder {
    fn decode(&self, data: &[u8]) -> Result<Dictionary, ProfileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        PlistDocumentDecoder.decode(data)
    }
}

#[derive(Debug, Clone)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn counting_loader() -> (ProfileLoader, Counter) {
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = ProfileLoader::new(
        Arc::new(CountingDocumentDecoder {
            calls: Arc::clone(&calls),
        }),
        Arc::new(TextCertificateDecoder),
    );
    (loader, Counter(calls))
}

/// A profile directory plus cache path under one temp dir.
pub struct Workspace {
    pub temp: tempfile::TempDir,
    pub profiles: PathBuf,
    pub cache: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let profiles = temp.path().join("Provisioning Profiles");
        fs::create_dir_all(&profiles).expect("profiles dir");
        let cache = temp.path().join("cache").join("Provisioning Profiles.index");
        Self {
            temp,
            profiles,
            cache,
        }
    }

    pub fn handle(&self, loader: ProfileLoader) -> IndexHandle {
        IndexHandle::with_loader(vec![self.profiles.clone()], self.cache.clone(), loader)
    }

    /// Pins the directory mtime so later edits are the only thing that moves
    /// the watermark.
    pub fn settle(&self, offset: i64) {
        set_mtime(&self.profiles, offset);
    }
}
