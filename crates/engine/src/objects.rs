//! The in-memory Git object engine: hashing, storage, tree/commit
//! construction, and packfile assembly.
//!
//! Object identity, pack object-header encoding, and the fixed index
//! metadata (mode/uid/gid/device) follow the reference implementation's
//! `GitObjectStore`/`GitRepo` exactly, so that packfiles are byte-identical
//! across independent builds of the same contribution history.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, ensure, Context, Result};
use sha1::{Digest, Sha1};

/// A 20-byte SHA-1 object id, displayed/parsed as 40 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        ensure!(s.len() == 40, "object id must be 40 hex chars, got {}", s.len());
        let mut bytes = [0u8; 20];
        for (i, chunk) in bytes.iter_mut().enumerate() {
            *chunk = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .with_context(|| format!("invalid hex in object id: {s}"))?;
        }
        Ok(ObjectId(bytes))
    }
}

impl FromStr for ObjectId {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        ObjectId::from_hex(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
}

impl ObjectKind {
    fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
        }
    }

    /// Pack object type tag per the pack format (commit=1, tree=2, blob=3).
    fn pack_tag(self) -> u8 {
        match self {
            ObjectKind::Commit => 1,
            ObjectKind::Tree => 2,
            ObjectKind::Blob => 3,
        }
    }
}

/// One tracked file in the next tree to be written.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub ctime_s: i64,
    pub ctime_ns: i64,
    pub mtime_s: i64,
    pub mtime_ns: i64,
    pub dev: u32,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub sha1: ObjectId,
    pub flags: u16,
    pub path: String,
}

const REGULAR_FILE_MODE: u32 = 0o100644;
const SYNTHETIC_UID_GID: u32 = 1000;
const SYNTHETIC_DEVICE: u32 = 16_777_221;

#[derive(Debug, Default)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    fn insert(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
        self.entries.sort_by(|a, b| a.path.cmp(&b.path));
    }
}

/// Hash-and-store + read operations over zlib-compressed, header-framed
/// object bytes. Storage is process-local and never persisted beyond the
/// lifetime of the owning [`Repository`].
#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: BTreeMap<ObjectId, Vec<u8>>,
}

impl ObjectStore {
    /// Compute the object id and store the zlib-compressed framed bytes.
    /// Idempotent: hashing the same (kind, payload) twice returns the same
    /// id and overwrites with identical bytes.
    pub fn hash_and_store(&mut self, kind: ObjectKind, payload: &[u8]) -> Result<ObjectId> {
        let header = format!("{} {}", kind.as_str(), payload.len());
        let mut framed = Vec::with_capacity(header.len() + 1 + payload.len());
        framed.extend_from_slice(header.as_bytes());
        framed.push(0);
        framed.extend_from_slice(payload);

        let digest = Sha1::digest(&framed);
        let id = ObjectId(digest.into());

        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&framed)?;
        let compressed = encoder.finish()?;
        self.objects.insert(id, compressed);

        Ok(id)
    }

    /// Decompress and re-parse an object's header, returning its kind and payload.
    pub fn read(&self, id: ObjectId) -> Result<(ObjectKind, Vec<u8>)> {
        let compressed = self
            .objects
            .get(&id)
            .with_context(|| format!("unknown-object: {id}"))?;

        let mut decoder = flate2::read::ZlibDecoder::new(compressed.as_slice());
        let mut framed = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut framed)?;

        let nul = framed
            .iter()
            .position(|&b| b == 0)
            .context("object missing header terminator")?;
        let header = std::str::from_utf8(&framed[..nul]).context("object header is not UTF-8")?;
        let mut parts = header.splitn(2, ' ');
        let kind_str = parts.next().context("object header missing kind")?;
        let size_str = parts.next().context("object header missing size")?;
        let size: usize = size_str.parse().context("object header size is not a number")?;

        let kind = match kind_str {
            "commit" => ObjectKind::Commit,
            "tree" => ObjectKind::Tree,
            "blob" => ObjectKind::Blob,
            other => bail!("unknown object kind: {other}"),
        };

        let payload = framed[nul + 1..].to_vec();
        ensure!(
            payload.len() == size,
            "object size mismatch: header says {size}, got {} bytes",
            payload.len()
        );

        Ok((kind, payload))
    }

    pub fn all_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Author used for every synthesized commit, per the reference implementation.
pub const DEFAULT_AUTHOR: &str = "Gitoboros";

/// A single in-memory repository: current HEAD, its object store, and the
/// index used to build the next tree.
#[derive(Debug, Default)]
pub struct Repository {
    head: Option<ObjectId>,
    store: ObjectStore,
    index: Index,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<ObjectId> {
        self.head
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn object_count(&self) -> usize {
        self.store.len()
    }

    /// Add a blob to the index. Only single-directory (no `/`) paths are supported.
    pub fn add_blob(&mut self, path: &str, data: &[u8], timestamp: Option<i64>) -> Result<ObjectId> {
        ensure!(!path.contains('/'), "only single-directory paths are supported: {path}");

        let id = self.store.hash_and_store(ObjectKind::Blob, data)?;
        let ts = timestamp.unwrap_or_else(now_unix);
        let flags = path.len() as u16;
        ensure!(flags < (1 << 12), "path too long to fit in 12-bit flags: {path}");

        self.index.insert(IndexEntry {
            ctime_s: ts,
            ctime_ns: 0,
            mtime_s: ts,
            mtime_ns: 0,
            dev: SYNTHETIC_DEVICE,
            ino: rand::random(),
            mode: REGULAR_FILE_MODE,
            uid: SYNTHETIC_UID_GID,
            gid: SYNTHETIC_UID_GID,
            size: data.len() as u32,
            sha1: id,
            flags,
            path: path.to_string(),
        });

        Ok(id)
    }

    /// Write the current index as a tree object, path-sorted, and return its id.
    pub fn write_tree(&mut self) -> Result<ObjectId> {
        let mut body = Vec::new();
        for entry in self.index.entries() {
            body.extend_from_slice(format!("{:o} {}", entry.mode, entry.path).as_bytes());
            body.push(0);
            body.extend_from_slice(entry.sha1.as_bytes());
        }
        self.store.hash_and_store(ObjectKind::Tree, &body)
    }

    /// Write the current tree and a commit object pointing at it (and at
    /// the current HEAD as its parent, if any). Advances HEAD.
    pub fn commit(
        &mut self,
        author: &str,
        email: &str,
        message: &str,
        timestamp: Option<i64>,
    ) -> Result<ObjectId> {
        let tree = self.write_tree()?;
        let ts = timestamp.unwrap_or_else(now_unix);

        let mut lines = vec![format!("tree {tree}")];
        if let Some(parent) = self.head {
            lines.push(format!("parent {parent}"));
        }
        lines.push(format!("author {author} <{email}> {ts} +0000"));
        lines.push(format!("committer {author} <{email}> {ts} +0000"));
        lines.push(String::new());
        lines.push(message.to_string());
        lines.push(String::new());

        let body = lines.join("\n");
        let id = self.store.hash_and_store(ObjectKind::Commit, body.as_bytes())?;
        self.head = Some(id);
        Ok(id)
    }

    /// Assemble a packfile containing exactly `ids`, in ascending
    /// lexicographic order, as required for deterministic output.
    pub fn pack(&self, ids: &[ObjectId]) -> Result<Vec<u8>> {
        let mut sorted = ids.to_vec();
        sorted.sort();

        let mut out = Vec::new();
        out.extend_from_slice(b"PACK");
        out.extend_from_slice(&2u32.to_be_bytes());
        out.extend_from_slice(&(sorted.len() as u32).to_be_bytes());

        for id in &sorted {
            let (kind, payload) = self.store.read(*id)?;
            out.extend_from_slice(&encode_pack_object_header(kind, payload.len() as u64));

            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&payload)?;
            out.extend_from_slice(&encoder.finish()?);
        }

        let trailer = Sha1::digest(&out);
        out.extend_from_slice(&trailer);
        Ok(out)
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Git's variable-length pack object header: first byte packs
/// `(type << 4) | (size & 0xF)`, with a continuation bit when more size
/// bits remain; subsequent bytes carry 7 bits each, high bit set on all
/// but the last.
fn encode_pack_object_header(kind: ObjectKind, size: u64) -> Vec<u8> {
    let mut n = size >> 4;
    let mut first = ((kind.pack_tag()) << 4) | (size & 0x0F) as u8;
    let mut out = Vec::new();

    if n != 0 {
        first |= 0x80;
    }
    out.push(first);

    while n != 0 {
        let mut byte = (n & 0x7f) as u8;
        n >>= 7;
        if n != 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }

    out
}
