//! Loopback provider: parts are PUT back to this gateway and kept in memory

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use ulid::Ulid;
use url::Url;

use stager_net::{routes, UploadedPart};

use super::{ProviderError, ProviderResult, StorageProvider};

struct PendingUpload {
    object_key: String,
    content_type: String,
    parts: BTreeMap<u32, StoredPart>,
}

struct StoredPart {
    etag: String,
    data: Bytes,
}

#[derive(Default)]
struct Store {
    uploads: HashMap<String, PendingUpload>,
    objects: HashMap<String, StoredObject>,
}

/// A finalized object
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content_type: String,
    pub data: Bytes,
}

/// In-memory multipart storage for development and tests.
///
/// Presigned URLs point at `PUT /parts/{uploadId}/{partNumber}` on
/// `public_url` and carry an expiry plus a keyed signature over the
/// upload, part and expiry. Nothing survives a restart.
pub struct MemoryProvider {
    public_url: Url,
    key: [u8; 32],
    store: Mutex<Store>,
}

impl MemoryProvider {
    pub fn new(mut public_url: Url) -> Self {
        // Part paths are joined relative to the base path
        if !public_url.path().ends_with('/') {
            let path = format!("{}/", public_url.path());
            public_url.set_path(&path);
        }
        MemoryProvider {
            public_url,
            key: rand::random(),
            store: Mutex::new(Store::default()),
        }
    }

    pub fn public_url(&self) -> &Url {
        &self.public_url
    }

    /// Finalized object under `object_key`
    pub fn object(&self, object_key: &str) -> Option<StoredObject> {
        self.lock().ok()?.objects.get(object_key).cloned()
    }

    pub fn open_uploads(&self) -> usize {
        self.lock().map(|store| store.uploads.len()).unwrap_or(0)
    }

    fn lock(&self) -> ProviderResult<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| ProviderError::Backend("memory store lock poisoned".to_string()))
    }

    fn signature(&self, upload_id: &str, part_number: u32, expires: u64) -> blake3::Hash {
        let message = format!("{}:{}:{}", upload_id, part_number, expires);
        blake3::keyed_hash(&self.key, message.as_bytes())
    }

    fn sign_at(
        &self,
        upload_id: &str,
        part_number: u32,
        validity: Duration,
        now: SystemTime,
    ) -> ProviderResult<String> {
        let expires = unix_secs(now) + validity.as_secs();
        let mut url = self
            .public_url
            .join(&format!(
                "{}{}/{}",
                routes::PARTS_PREFIX.trim_start_matches('/'),
                upload_id,
                part_number
            ))
            .map_err(|e| ProviderError::Backend(format!("cannot build part URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &self.signature(upload_id, part_number, expires).to_hex());
        Ok(url.into())
    }

    fn verify_at(&self, upload_id: &str, part_number: u32, query: &str, now: SystemTime) -> ProviderResult<()> {
        let mut expires = None;
        let mut signature = None;
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match name.as_ref() {
                "expires" => expires = value.parse::<u64>().ok(),
                "signature" => signature = blake3::Hash::from_hex(value.as_bytes()).ok(),
                _ => {}
            }
        }

        let (Some(expires), Some(signature)) = (expires, signature) else {
            return Err(ProviderError::Denied("missing or malformed signature".to_string()));
        };
        // Hash equality is constant time
        if signature != self.signature(upload_id, part_number, expires) {
            return Err(ProviderError::Denied("signature mismatch".to_string()));
        }
        if unix_secs(now) > expires {
            return Err(ProviderError::Denied(format!("URL for part {} expired", part_number)));
        }
        Ok(())
    }

    fn store_part_at(
        &self,
        upload_id: &str,
        part_number: u32,
        query: &str,
        body: Bytes,
        now: SystemTime,
    ) -> ProviderResult<String> {
        self.verify_at(upload_id, part_number, query, now)?;

        let etag = format!("\"{}\"", blake3::hash(&body).to_hex());
        let mut store = self.lock()?;
        let upload = store
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| ProviderError::NoSuchUpload(upload_id.to_string()))?;

        debug!("Stored part {} of {} ({} bytes)", part_number, upload_id, body.len());
        // A retried part replaces the earlier copy
        upload.parts.insert(
            part_number,
            StoredPart {
                etag: etag.clone(),
                data: body,
            },
        );
        Ok(etag)
    }
}

fn unix_secs(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn matching_upload<'a>(
    store: &'a mut Store,
    object_key: &str,
    upload_id: &str,
) -> ProviderResult<&'a mut PendingUpload> {
    match store.uploads.get_mut(upload_id) {
        Some(upload) if upload.object_key == object_key => Ok(upload),
        _ => Err(ProviderError::NoSuchUpload(upload_id.to_string())),
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_upload(&self, object_key: &str, content_type: &str) -> ProviderResult<String> {
        let upload_id = Ulid::new().to_string();
        self.lock()?.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                object_key: object_key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn presign_part(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
        validity: Duration,
    ) -> ProviderResult<String> {
        matching_upload(&mut *self.lock()?, object_key, upload_id)?;
        self.sign_at(upload_id, part_number, validity, SystemTime::now())
    }

    async fn complete_upload(
        &self,
        object_key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> ProviderResult<()> {
        let mut store = self.lock()?;
        let upload = matching_upload(&mut store, object_key, upload_id)?;

        let mut data = BytesMut::new();
        for part in parts {
            match upload.parts.get(&part.part_number) {
                Some(stored) if stored.etag == part.etag => data.extend_from_slice(&stored.data),
                Some(_) => {
                    return Err(ProviderError::Rejected(format!(
                        "ETag mismatch for part {}",
                        part.part_number
                    )))
                }
                None => {
                    return Err(ProviderError::Rejected(format!(
                        "part {} was never uploaded",
                        part.part_number
                    )))
                }
            }
        }

        let content_type = upload.content_type.clone();
        store.uploads.remove(upload_id);
        store.objects.insert(
            object_key.to_string(),
            StoredObject {
                content_type,
                data: data.freeze(),
            },
        );
        Ok(())
    }

    async fn abort_upload(&self, object_key: &str, upload_id: &str) -> ProviderResult<()> {
        let mut store = self.lock()?;
        matching_upload(&mut store, object_key, upload_id)?;
        store.uploads.remove(upload_id);
        Ok(())
    }

    async fn accept_part(
        &self,
        upload_id: &str,
        part_number: u32,
        query: &str,
        body: Bytes,
    ) -> ProviderResult<String> {
        self.store_part_at(upload_id, part_number, query, body, SystemTime::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> MemoryProvider {
        MemoryProvider::new(Url::parse("http://127.0.0.1:8080").unwrap())
    }

    fn query_of(url: &str) -> String {
        Url::parse(url).unwrap().query().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_presigned_url_shape() {
        let provider = provider();
        let id = provider.create_upload("reel.zip-1", "application/zip").await.unwrap();
        let url = provider
            .presign_part("reel.zip-1", &id, 3, Duration::from_secs(60))
            .await
            .unwrap();

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), format!("/parts/{}/3", id));
        assert!(parsed.query_pairs().any(|(k, _)| k == "signature"));
    }

    #[tokio::test]
    async fn test_public_url_path_is_kept() {
        let provider = MemoryProvider::new(Url::parse("https://uploads.example.com/stager").unwrap());
        let id = provider.create_upload("reel.zip-1", "application/zip").await.unwrap();
        let url = provider
            .presign_part("reel.zip-1", &id, 2, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(
            url.starts_with(&format!("https://uploads.example.com/stager/parts/{}/2?", id)),
            "unexpected part URL {}",
            url
        );
    }

    #[tokio::test]
    async fn test_signature_binds_part_and_expiry() {
        let provider = provider();
        let id = provider.create_upload("k", "application/zip").await.unwrap();
        let now = SystemTime::now();
        let url = provider.sign_at(&id, 1, Duration::from_secs(60), now).unwrap();
        let query = query_of(&url);

        assert!(provider.verify_at(&id, 1, &query, now).is_ok());
        assert!(matches!(provider.verify_at(&id, 2, &query, now), Err(ProviderError::Denied(_))));
        assert!(matches!(
            provider.verify_at(&id, 1, &query, now + Duration::from_secs(120)),
            Err(ProviderError::Denied(_))
        ));
        assert!(matches!(provider.verify_at(&id, 1, "", now), Err(ProviderError::Denied(_))));
    }

    #[tokio::test]
    async fn test_complete_concatenates_in_order() {
        let provider = provider();
        let id = provider.create_upload("k", "application/zip").await.unwrap();
        let now = SystemTime::now();

        let mut parts = Vec::new();
        for (n, data) in [(2u32, "world"), (1u32, "hello ")] {
            let query = query_of(&provider.sign_at(&id, n, Duration::from_secs(60), now).unwrap());
            let etag = provider.store_part_at(&id, n, &query, Bytes::from(data), now).unwrap();
            assert!(etag.starts_with('"') && etag.ends_with('"'));
            parts.push(UploadedPart { part_number: n, etag });
        }
        parts.sort_by_key(|p| p.part_number);

        provider.complete_upload("k", &id, &parts).await.unwrap();
        let object = provider.object("k").unwrap();
        assert_eq!(&object.data[..], b"hello world");
        assert_eq!(object.content_type, "application/zip");
        assert_eq!(provider.open_uploads(), 0);
    }

    #[tokio::test]
    async fn test_complete_rejects_wrong_etag() {
        let provider = provider();
        let id = provider.create_upload("k", "application/zip").await.unwrap();
        let now = SystemTime::now();
        let query = query_of(&provider.sign_at(&id, 1, Duration::from_secs(60), now).unwrap());
        provider.store_part_at(&id, 1, &query, Bytes::from_static(b"x"), now).unwrap();

        let parts = [UploadedPart { part_number: 1, etag: "\"nope\"".to_string() }];
        assert!(matches!(
            provider.complete_upload("k", &id, &parts).await,
            Err(ProviderError::Rejected(_))
        ));
        assert_eq!(provider.open_uploads(), 1);
    }

    #[tokio::test]
    async fn test_abort_discards_and_rejects_unknown() {
        let provider = provider();
        let id = provider.create_upload("k", "application/zip").await.unwrap();

        assert!(matches!(
            provider.abort_upload("other-key", &id).await,
            Err(ProviderError::NoSuchUpload(_))
        ));
        provider.abort_upload("k", &id).await.unwrap();
        assert_eq!(provider.open_uploads(), 0);
        assert!(matches!(
            provider.abort_upload("k", &id).await,
            Err(ProviderError::NoSuchUpload(_))
        ));
    }
}
