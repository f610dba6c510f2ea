//! Init and match keys linking an entry header to its segments.

use crate::format::{INIT_KEY_MARKER, KEY_LEN, KEY_MATCH_RANGE, KEY_SCAN_RANGE, MATCH_KEY_MARKER};

/// Offset of the entry-number field inside a writer-generated key.
const ENTRY_FIELD_OFFSET: usize = 21;
/// Characters of the file name copied into a writer-generated key.
const NAME_PREFIX_LEN: usize = 7;

/// 28-byte key stored in entry headers (init key) and segments (match key).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey([u8; KEY_LEN]);

impl RecordKey {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Copy a key out of a buffer; `None` if fewer than 28 bytes are present.
    #[must_use]
    pub fn from_slice(src: &[u8]) -> Option<Self> {
        src.get(..KEY_LEN)?.try_into().ok().map(Self)
    }

    /// Build the init key a writer stores for `entry` of the file `file_name`.
    ///
    /// Layout: `" 2"`, up to seven bytes of the file name, spaces to column
    /// 21, then the entry number right-aligned in three columns followed by
    /// `"   1"`.
    #[must_use]
    pub fn for_entry(file_name: &str, entry: u32) -> Self {
        let mut key = [b' '; KEY_LEN];
        key[..2].copy_from_slice(&INIT_KEY_MARKER);
        let name = file_name.as_bytes();
        let name_len = name.len().min(NAME_PREFIX_LEN);
        key[2..2 + name_len].copy_from_slice(&name[..name_len]);
        let field = format!("{entry:>3}   1");
        let field = field.as_bytes();
        let field_len = field.len().min(KEY_LEN - ENTRY_FIELD_OFFSET);
        key[ENTRY_FIELD_OFFSET..ENTRY_FIELD_OFFSET + field_len]
            .copy_from_slice(&field[..field_len]);
        Self(key)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// The same key with the match-key marker, as written into segments.
    #[must_use]
    pub fn to_match_key(self) -> Self {
        let mut bytes = self.0;
        bytes[..2].copy_from_slice(&MATCH_KEY_MARKER);
        Self(bytes)
    }

    #[must_use]
    pub fn has_init_marker(&self) -> bool {
        self.0[..2] == INIT_KEY_MARKER
    }

    #[must_use]
    pub fn has_match_marker(&self) -> bool {
        self.0[..2] == MATCH_KEY_MARKER
    }

    /// Whether a segment carrying `match_key` belongs to the entry with this init key.
    #[must_use]
    pub fn matches(&self, match_key: &Self) -> bool {
        self.0[KEY_MATCH_RANGE] == match_key.0[KEY_MATCH_RANGE]
    }

    /// Interior bytes used as the needle of a truncated-segment search.
    #[must_use]
    pub fn scan_needle(&self) -> &[u8] {
        &self.0[KEY_SCAN_RANGE]
    }
}

impl std::fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecordKey({:?})", String::from_utf8_lossy(&self.0))
    }
}
