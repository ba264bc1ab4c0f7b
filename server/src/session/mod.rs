//! Session identity, lifecycle, and persisted data, layered over a
//! `KvStore` black box (`hset`/`hget`/`hgetall`/`expire`) the way
//! spec.md §4.3 describes, grounded in the teacher's
//! `git_http::state::GitHttpState` trait-abstraction pattern.

pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use base64::Engine as _;
use blake2::{Blake2b512, Digest};
use gitoboros_engine::ObjectId;
use uuid::Uuid;

pub use store::{InMemoryKvStore, KvStore, RedisKvStore};

/// 16 raw UUID bytes, displayed/parsed as a base58 (Bitcoin alphabet) string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; 16]);

impl SessionId {
    pub fn from_fingerprint(namespace: Uuid, handle: &str, email: &str, branch: &str) -> Self {
        let input = format!("{handle} + {email} ({branch})");
        let digest = Blake2b512::digest(input.as_bytes());
        let fingerprint_hex = hex_encode(&digest);
        let uuid = Uuid::new_v5(&namespace, fingerprint_hex.as_bytes());
        SessionId(*uuid.as_bytes())
    }

    pub fn from_uri(uri: &str) -> Result<Self> {
        let bytes = bs58::decode(uri)
            .into_vec()
            .context("invalid-session: not valid base58")?;
        ensure!(
            bytes.len() == 16,
            "invalid-session: decoded to {} bytes, want 16",
            bytes.len()
        );
        let mut id = [0u8; 16];
        id.copy_from_slice(&bytes);
        Ok(SessionId(id))
    }

    pub fn as_uri(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Internal key used against the key-value store; distinct from the
    /// public base58 URI form, which is derived fresh from these same
    /// bytes whenever needed.
    fn kv_key(&self) -> String {
        format!("sess:{}", hex_encode(&self.0))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opened,
    Closed,
}

impl SessionState {
    fn as_str(self) -> &'static str {
        match self {
            SessionState::Opened => "SESSION_OPENED",
            SessionState::Closed => "SESSION_CLOSED",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "SESSION_OPENED" => Some(SessionState::Opened),
            "SESSION_CLOSED" => Some(SessionState::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionData {
    pub total_objects: u64,
    pub latest_object: ObjectId,
    pub packfile: Vec<u8>,
    pub branch: String,
}

const FIELD_BRANCH: &str = "branch";
const FIELD_STATE: &str = "state";
const FIELD_TOTAL_OBJECTS: &str = "total_objects";
const FIELD_LATEST_OBJECT: &str = "latest_object";
const FIELD_PACKFILE: &str = "packfile";

/// A session handle bound to one id, backed by a shared `KvStore`. Mirrors
/// spec.md §4.3's operation table one-for-one.
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    kv: Arc<dyn KvStore>,
    expiry_secs: u64,
}

impl Session {
    pub async fn make_from_data(
        kv: Arc<dyn KvStore>,
        namespace: Uuid,
        handle: &str,
        email: &str,
        branch: &str,
        expiry_secs: u64,
    ) -> Result<Self> {
        let id = SessionId::from_fingerprint(namespace, handle, email, branch);
        let session = Session { id, kv, expiry_secs };
        session
            .kv
            .hset(&session.id.kv_key(), FIELD_BRANCH, branch.to_string())
            .await?;
        Ok(session)
    }

    pub fn make_from_uri(kv: Arc<dyn KvStore>, uri: &str, expiry_secs: u64) -> Result<Self> {
        let id = SessionId::from_uri(uri)?;
        Ok(Session { id, kv, expiry_secs })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn as_uri(&self) -> String {
        self.id.as_uri()
    }

    pub async fn open(&self) -> Result<()> {
        self.kv
            .hset(&self.id.kv_key(), FIELD_STATE, SessionState::Opened.as_str().to_string())
            .await
    }

    pub async fn close(&self) -> Result<()> {
        self.kv
            .hset(&self.id.kv_key(), FIELD_STATE, SessionState::Closed.as_str().to_string())
            .await
    }

    async fn state(&self) -> Result<Option<SessionState>> {
        let raw = self.kv.hget(&self.id.kv_key(), FIELD_STATE).await?;
        Ok(raw.and_then(|s| SessionState::from_str(&s)))
    }

    pub async fn is_opened(&self) -> Result<bool> {
        Ok(self.state().await? == Some(SessionState::Opened))
    }

    pub async fn is_valid(&self) -> Result<bool> {
        Ok(self.state().await? == Some(SessionState::Closed))
    }

    pub async fn set_data(&self, data: &SessionData) -> Result<()> {
        let packfile_b64 = base64::engine::general_purpose::STANDARD.encode(&data.packfile);
        let fields = vec![
            (FIELD_TOTAL_OBJECTS, data.total_objects.to_string()),
            (FIELD_LATEST_OBJECT, data.latest_object.to_string()),
            (FIELD_PACKFILE, packfile_b64),
            (FIELD_BRANCH, data.branch.clone()),
        ];
        self.kv.hset_many(&self.id.kv_key(), &fields).await
    }

    pub async fn get_data(&self) -> Result<SessionData> {
        let fields: HashMap<String, String> = self.kv.hgetall(&self.id.kv_key()).await?;

        let total_objects: u64 = fields
            .get(FIELD_TOTAL_OBJECTS)
            .context("unknown-repo: session missing total_objects")?
            .parse()
            .context("session total_objects is not an integer")?;
        let latest_object_hex = fields
            .get(FIELD_LATEST_OBJECT)
            .context("unknown-repo: session missing latest_object")?;
        let latest_object = ObjectId::from_hex(latest_object_hex)?;
        let packfile_b64 = fields
            .get(FIELD_PACKFILE)
            .context("unknown-repo: session missing packfile")?;
        let packfile = base64::engine::general_purpose::STANDARD
            .decode(packfile_b64)
            .context("session packfile is not valid base64")?;
        let branch = fields
            .get(FIELD_BRANCH)
            .context("unknown-repo: session missing branch")?
            .clone();

        Ok(SessionData { total_objects, latest_object, packfile, branch })
    }

    pub async fn extend(&self) -> Result<()> {
        self.kv.expire(&self.id.kv_key(), self.expiry_secs).await
    }

    pub async fn delete(&self) -> Result<()> {
        self.kv.del(&self.id.kv_key()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_inputs_derive_same_uri() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let ns = Uuid::NAMESPACE_URL;
        let a = Session::make_from_data(kv.clone(), ns, "alice", "a@example.com", "main", 300)
            .await
            .unwrap();
        let b = Session::make_from_data(kv, ns, "alice", "a@example.com", "main", 300)
            .await
            .unwrap();
        assert_eq!(a.as_uri(), b.as_uri());
    }

    #[tokio::test]
    async fn different_branch_derives_different_uri() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let ns = Uuid::NAMESPACE_URL;
        let a = Session::make_from_data(kv.clone(), ns, "alice", "a@example.com", "main", 300)
            .await
            .unwrap();
        let b = Session::make_from_data(kv, ns, "alice", "a@example.com", "dev", 300)
            .await
            .unwrap();
        assert_ne!(a.as_uri(), b.as_uri());
    }

    #[tokio::test]
    async fn uri_is_22_base58_chars_for_typical_inputs() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let session = Session::make_from_data(
            kv,
            Uuid::NAMESPACE_URL,
            "octocat",
            "octocat@example.com",
            "main",
            300,
        )
        .await
        .unwrap();
        assert_eq!(session.as_uri().len(), 22);
    }

    #[tokio::test]
    async fn invalid_uri_rejected() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        assert!(Session::make_from_uri(kv, "not-base58-!!!", 300).is_err());
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let session =
            Session::make_from_data(kv, Uuid::NAMESPACE_URL, "bob", "b@example.com", "main", 300)
                .await
                .unwrap();
        assert!(!session.is_opened().await.unwrap());
        assert!(!session.is_valid().await.unwrap());

        session.open().await.unwrap();
        assert!(session.is_opened().await.unwrap());
        assert!(!session.is_valid().await.unwrap());

        session.close().await.unwrap();
        assert!(!session.is_opened().await.unwrap());
        assert!(session.is_valid().await.unwrap());
    }

    #[tokio::test]
    async fn set_and_get_data_roundtrips() {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let session =
            Session::make_from_data(kv, Uuid::NAMESPACE_URL, "carl", "c@example.com", "main", 300)
                .await
                .unwrap();
        let head = ObjectId::from_hex(&"ab".repeat(20)).unwrap();
        let data = SessionData {
            total_objects: 3,
            latest_object: head,
            packfile: vec![1, 2, 3, 4],
            branch: "main".to_string(),
        };
        session.set_data(&data).await.unwrap();
        let read_back = session.get_data().await.unwrap();
        assert_eq!(read_back.total_objects, 3);
        assert_eq!(read_back.latest_object, head);
        assert_eq!(read_back.packfile, vec![1, 2, 3, 4]);
        assert_eq!(read_back.branch, "main");
    }
}
