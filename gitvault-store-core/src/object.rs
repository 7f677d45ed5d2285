//! Raw objects and their canonical identity.

use derive_more::Display;
use gitvault_utils_hash::{Algorithm, Context};
use thiserror::Error;

use crate::id::ObjectId;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("unknown object kind '{0}'")]
pub struct UnknownObjectKind(pub String);

/// The four-way object type tag.
///
/// The numeric values are the persisted `type_num` column and must not
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum ObjectKind {
    #[display("commit")]
    Commit = 1,
    #[display("tree")]
    Tree = 2,
    #[display("blob")]
    Blob = 3,
    #[display("tag")]
    Tag = 4,
}

impl ObjectKind {
    pub const fn type_num(&self) -> i64 {
        *self as i64
    }

    pub fn from_type_num(num: i64) -> Result<Self, UnknownObjectKind> {
        match num {
            1 => Ok(ObjectKind::Commit),
            2 => Ok(ObjectKind::Tree),
            3 => Ok(ObjectKind::Blob),
            4 => Ok(ObjectKind::Tag),
            _ => Err(UnknownObjectKind(num.to_string())),
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Tag => "tag",
        }
    }
}

/// An object as handed to the storage engine: a kind tag plus the raw
/// payload bytes (no framing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

impl RawObject {
    pub fn new(kind: ObjectKind, data: impl Into<Vec<u8>>) -> Self {
        RawObject {
            kind,
            data: data.into(),
        }
    }

    /// The content-addressed id: SHA-1 over the canonical
    /// `"<type> <len>\0"` framing followed by the payload.
    pub fn id(&self) -> ObjectId {
        let mut ctx = Context::new(Algorithm::SHA1);
        ctx.update(self.kind.name());
        ctx.update(b" ");
        ctx.update(self.data.len().to_string());
        ctx.update([0u8]);
        ctx.update(&self.data);
        let hash = ctx.finish();
        let mut out = [0u8; 20];
        out.copy_from_slice(hash.digest_bytes());
        ObjectId::new(out)
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_num_roundtrip() {
        for kind in [
            ObjectKind::Commit,
            ObjectKind::Tree,
            ObjectKind::Blob,
            ObjectKind::Tag,
        ] {
            assert_eq!(ObjectKind::from_type_num(kind.type_num()).unwrap(), kind);
        }
        assert!(ObjectKind::from_type_num(0).is_err());
        assert!(ObjectKind::from_type_num(5).is_err());
    }

    #[test]
    fn blob_id_matches_known_vector() {
        // `echo -n "hello world" | git hash-object --stdin`
        let blob = RawObject::new(ObjectKind::Blob, b"hello world".to_vec());
        assert_eq!(
            blob.id().to_string(),
            "95d09f2b10159347eece71399a7e2e907ea3df4f"
        );
    }

    #[test]
    fn empty_blob_id() {
        // The well-known empty-blob id.
        let blob = RawObject::new(ObjectKind::Blob, Vec::new());
        assert_eq!(
            blob.id().to_string(),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
    }
}
