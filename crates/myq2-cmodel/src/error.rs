// error.rs - collision model error taxonomy

use std::io;

use thiserror::Error;

/// Broad class of a [`CmError`], so callers can tell a bad argument from a
/// broken map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The map failed validation while loading. The load is aborted.
    Malformed,
    /// An internal consistency check failed on an already loaded map.
    Corrupt,
    /// A public call was made with an out-of-range argument.
    BadCall,
    /// The map reader or a save-game stream failed.
    Io,
}

#[derive(Debug, Error)]
pub enum CmError {
    // ---- load / validation ----
    #[error("{name}: BSP file too short ({len} bytes)")]
    Truncated { name: String, len: usize },

    #[error("{name}: not an IBSP file")]
    BadIdent { name: String },

    #[error("{name}: wrong version number ({found} should be {expected})")]
    BadVersion { name: String, found: i32, expected: i32 },

    #[error("funny lump size ({lump})")]
    FunnyLumpSize { lump: &'static str },

    #[error("lump {lump} lies outside the file")]
    LumpOutOfRange { lump: &'static str },

    #[error("map with no {what}")]
    Empty { what: &'static str },

    #[error("map has too many {what} ({count} > {max})")]
    TooMany {
        what: &'static str,
        count: usize,
        max: usize,
    },

    #[error("map leaf 0 is not CONTENTS_SOLID")]
    LeafZeroNotSolid,

    #[error("map does not have an empty leaf")]
    NoEmptyLeaf,

    #[error("{owner} {owner_index} references bad {what} {index}")]
    BadIndex {
        owner: &'static str,
        owner_index: usize,
        what: &'static str,
        index: i64,
    },

    // ---- internal consistency ----
    #[error("area {area} reflooded")]
    Reflooded { area: usize },

    // ---- bad calls ----
    #[error("bad area number {area} (map has {count})")]
    BadArea { area: usize, count: usize },

    #[error("bad areaportal number {portal} (map has {count})")]
    BadPortal { portal: usize, count: usize },

    #[error("bad leaf number {leaf} (map has {count})")]
    BadLeaf { leaf: usize, count: usize },

    #[error("bad cluster {cluster} (map has {count})")]
    BadCluster { cluster: i32, count: usize },

    #[error("bad headnode {headnode} (map has {count} nodes)")]
    BadHeadnode { headnode: usize, count: usize },

    #[error("bad inline model name {name:?}")]
    BadInlineModel { name: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CmError::Truncated { .. }
            | CmError::BadIdent { .. }
            | CmError::BadVersion { .. }
            | CmError::FunnyLumpSize { .. }
            | CmError::LumpOutOfRange { .. }
            | CmError::Empty { .. }
            | CmError::TooMany { .. }
            | CmError::LeafZeroNotSolid
            | CmError::NoEmptyLeaf
            | CmError::BadIndex { .. } => ErrorKind::Malformed,
            CmError::Reflooded { .. } => ErrorKind::Corrupt,
            CmError::BadArea { .. }
            | CmError::BadPortal { .. }
            | CmError::BadLeaf { .. }
            | CmError::BadCluster { .. }
            | CmError::BadHeadnode { .. }
            | CmError::BadInlineModel { .. } => ErrorKind::BadCall,
            CmError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_bad_call(&self) -> bool {
        self.kind() == ErrorKind::BadCall
    }

    pub(crate) fn bad_index(
        owner: &'static str,
        owner_index: usize,
        what: &'static str,
        index: i64,
    ) -> Self {
        CmError::BadIndex {
            owner,
            owner_index,
            what,
            index,
        }
    }
}

pub type Result<T> = std::result::Result<T, CmError>;
