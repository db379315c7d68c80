//! The native-function database: a read-only oracle mapping a native's
//! 64-bit call hash to its human-readable identity. The real game-engine
//! database is out of scope; this crate ships a trait plus an in-memory
//! implementation usable in tests and as the CLI's `--natives <file>` loader.

use std::collections::HashMap;

/// What's known about one native function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeInfo {
    /// The hash this one was renamed from in an earlier game version, if any.
    pub original_hash: u64,
    pub name: String,
    pub signature: String,
}

/// A read-only mapping from 64-bit hash to native identity. Shareable across
/// compilations (`&dyn NativeDatabase`; no concurrency is in play so an
/// `Arc` wrapper is unnecessary, but callers are free to add one).
pub trait NativeDatabase {
    /// Resolves `hash` to the native it originally named, following any
    /// version-translation table. Returns `None` if the hash is unknown;
    /// this is not itself a compile error — the hash is still emitted into
    /// the import table, only the disassembler's naming degrades.
    fn resolve_original(&self, hash: u64) -> Option<&NativeInfo>;
}

/// A `HashMap`-backed [`NativeDatabase`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryNativeDatabase {
    entries: HashMap<u64, NativeInfo>,
}

impl InMemoryNativeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hash: u64, info: NativeInfo) {
        self.entries.insert(hash, info);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loads a database from a JSON array of `{hash, name, signature,
    /// original_hash?}` entries. `original_hash` defaults to `hash` itself
    /// (the common case of a native that was never renamed).
    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        let entries: Vec<NativeEntryJson> = serde_json::from_str(data)?;
        let mut db = Self::new();
        for entry in entries {
            db.insert(
                entry.hash,
                NativeInfo {
                    original_hash: entry.original_hash.unwrap_or(entry.hash),
                    name: entry.name,
                    signature: entry.signature,
                },
            );
        }
        Ok(db)
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
struct NativeEntryJson {
    hash: u64,
    #[serde(default)]
    original_hash: Option<u64>,
    name: String,
    #[serde(default)]
    signature: String,
}

impl NativeDatabase for InMemoryNativeDatabase {
    fn resolve_original(&self, hash: u64) -> Option<&NativeInfo> {
        self.entries.get(&hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_hash_resolves_to_none() {
        let db = InMemoryNativeDatabase::new();
        assert!(db.resolve_original(0xdead_beef).is_none());
    }

    #[test]
    fn from_json_defaults_original_hash_to_hash_itself() {
        let db = InMemoryNativeDatabase::from_json(
            r#"[{"hash": 4660, "name": "GET_ENTITY_COORDS", "signature": "(Entity) -> VECTOR3"}]"#,
        )
        .unwrap();
        let info = db.resolve_original(4660).unwrap();
        assert_eq!(info.name, "GET_ENTITY_COORDS");
        assert_eq!(info.original_hash, 4660);
    }

    #[test]
    fn known_hash_resolves_to_its_info() {
        let mut db = InMemoryNativeDatabase::new();
        db.insert(
            0x1234,
            NativeInfo {
                original_hash: 0x1234,
                name: "GET_ENTITY_COORDS".to_string(),
                signature: "(Entity, BOOL) -> VECTOR3".to_string(),
            },
        );
        let info = db.resolve_original(0x1234).unwrap();
        assert_eq!(info.name, "GET_ENTITY_COORDS");
    }
}
