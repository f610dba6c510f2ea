//! File-type recognition.
//!
//! The set of supported formats is closed: adding one means adding a
//! variant here, not registering a plugin.

use std::path::Path;

use pcmseq_error::{PcmError, Result};
use serde::{Deserialize, Serialize};

use crate::config::PcmConfig;
use crate::file::{Mode, PcmFile};

/// A file format this crate can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Segmented multi-entry PCM_SEQ2.
    PcmSeq2,
}

impl FormatKind {
    pub const ALL: [Self; 1] = [Self::PcmSeq2];

    /// File name suffixes claimed by this format, without the dot.
    #[must_use]
    pub const fn suffixes(self) -> &'static [&'static str] {
        match self {
            Self::PcmSeq2 => &["pcm_seq2", "pcm_seq", "pcmseq2", "pcmseq"],
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PcmSeq2 => "pcm_seq2",
        }
    }

    /// Does this format claim `path`? Suffixes compare case-insensitively.
    #[must_use]
    pub fn claims(self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.suffixes()
                    .iter()
                    .any(|suffix| ext.eq_ignore_ascii_case(suffix))
            })
    }

    /// Pick the format for `path` from its suffix.
    pub fn recognize(path: &Path) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.claims(path))
            .ok_or_else(|| PcmError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
    }

    /// Open `path` as this format.
    pub fn open(self, path: &Path, mode: Mode, config: &PcmConfig) -> Result<PcmFile> {
        match self {
            Self::PcmSeq2 => PcmFile::open_kind(self, path, mode, config),
        }
    }
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
