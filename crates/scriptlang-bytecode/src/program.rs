//! The in-memory compiled program container.
//!
//! Mirrors the external binary layout (see [`crate::header`]) but keeps
//! everything as owned, randomly-accessible Rust collections; `to_bytes`
//! and `from_bytes` are the only places that deal with the wire format.

use crate::header::{CODE_PAGE_SIZE, Header, SECTION_ALIGN};

/// A fully compiled, not-yet-packaged program.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CompiledProgram {
    pub name: String,
    pub hash: u64,
    pub globals_block_index: u32,
    /// 8-byte cells.
    pub globals_image: Vec<u64>,
    /// 8-byte cells; the last `args_count` entries are the script's args.
    pub statics_image: Vec<u64>,
    pub args_count: u32,
    /// Concatenated, NUL-terminated UTF-8 string pool.
    pub strings: Vec<String>,
    /// Deduplicated, insertion-ordered native hashes.
    pub natives: Vec<u64>,
    /// Flat code, already split into fixed-size pages.
    pub code_pages: Vec<[u8; CODE_PAGE_SIZE]>,
}

#[derive(Debug, thiserror::Error)]
pub enum DisasmError {
    #[error("bad magic bytes: expected {expected:?}, found {found:?}")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),
    #[error("checksum mismatch: header says {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("truncated input: need at least {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("string pool entry is not valid UTF-8")]
    InvalidStringData,
    #[error("globals/statics cell value exceeds u32 at index {index}")]
    CellOverflow { index: usize },
}

impl CompiledProgram {
    /// Serialize into the on-disk/in-memory binary container.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut string_blob = Vec::new();
        let mut string_count = 0u32;
        for s in &self.strings {
            string_blob.extend_from_slice(s.as_bytes());
            string_blob.push(0);
            string_count += 1;
        }

        let code_page_count = self.code_pages.len() as u32;

        let mut header = Header {
            script_hash: self.hash,
            name_len: self.name.len() as u16,
            globals_block_index: self.globals_block_index,
            globals_count: self.globals_image.len() as u32,
            statics_count: self.statics_image.len() as u32,
            args_count: self.args_count,
            string_count,
            string_blob_size: string_blob.len() as u32,
            natives_count: self.natives.len() as u32,
            code_page_count,
            code_size: code_page_count * CODE_PAGE_SIZE as u32,
            ..Header::default()
        };

        let offsets = header.compute_offsets();
        let total_size = offsets.code_pages + code_page_count * CODE_PAGE_SIZE as u32;
        header.total_size = total_size;

        let mut body = vec![0u8; (total_size - SECTION_ALIGN as u32) as usize];
        let base = SECTION_ALIGN as u32;
        let put = |body: &mut [u8], offset: u32, bytes: &[u8]| {
            let start = (offset - base) as usize;
            body[start..start + bytes.len()].copy_from_slice(bytes);
        };

        put(&mut body, offsets.name_blob, self.name.as_bytes());
        put(&mut body, offsets.string_blob, &string_blob);

        let mut string_table = Vec::with_capacity((string_count as usize + 1) * 4);
        let mut cursor = 0u32;
        for s in &self.strings {
            string_table.extend_from_slice(&cursor.to_le_bytes());
            cursor += s.len() as u32 + 1;
        }
        string_table.extend_from_slice(&cursor.to_le_bytes());
        put(&mut body, offsets.string_table, &string_table);

        let mut natives_table = Vec::with_capacity(self.natives.len() * 8);
        for hash in &self.natives {
            natives_table.extend_from_slice(&hash.to_le_bytes());
        }
        put(&mut body, offsets.natives_table, &natives_table);

        let mut globals_table = Vec::with_capacity(self.globals_image.len() * 8);
        for cell in &self.globals_image {
            globals_table.extend_from_slice(&cell.to_le_bytes());
        }
        put(&mut body, offsets.globals_image, &globals_table);

        let mut statics_table = Vec::with_capacity(self.statics_image.len() * 8);
        for cell in &self.statics_image {
            statics_table.extend_from_slice(&cell.to_le_bytes());
        }
        put(&mut body, offsets.statics_image, &statics_table);

        let mut code_offset = offsets.code_pages;
        for page in &self.code_pages {
            put(&mut body, code_offset, page);
            code_offset += CODE_PAGE_SIZE as u32;
        }

        header.checksum = crc32fast::hash(&body);

        let mut out = Vec::with_capacity(total_size as usize);
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Deserialize from the binary container, validating magic, version,
    /// and checksum before trusting any section content.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DisasmError> {
        if bytes.len() < 64 {
            return Err(DisasmError::Truncated {
                offset: 0,
                needed: 64,
                available: bytes.len(),
            });
        }
        let header = Header::from_bytes(bytes);
        if !header.validate_magic() {
            return Err(DisasmError::BadMagic {
                expected: crate::header::MAGIC,
                found: header.magic,
            });
        }
        if !header.validate_version() {
            return Err(DisasmError::UnsupportedVersion(header.version));
        }

        let body = &bytes[64..];
        let actual = crc32fast::hash(body);
        if actual != header.checksum {
            return Err(DisasmError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        let offsets = header.compute_offsets();
        let base = SECTION_ALIGN as u32;
        let slice = |offset: u32, len: u32| -> Result<&[u8], DisasmError> {
            let start = (offset - base) as usize;
            let end = start + len as usize;
            bytes
                .get(64 + start..64 + end)
                .ok_or(DisasmError::Truncated {
                    offset: start,
                    needed: len as usize,
                    available: bytes.len().saturating_sub(64 + start),
                })
        };

        let name_bytes = slice(offsets.name_blob, header.name_len as u32)?;
        let name = String::from_utf8(name_bytes.to_vec())
            .map_err(|_| DisasmError::InvalidStringData)?;

        let string_blob = slice(offsets.string_blob, header.string_blob_size)?;
        let string_table = slice(offsets.string_table, (header.string_count + 1) * 4)?;
        let mut strings = Vec::with_capacity(header.string_count as usize);
        for i in 0..header.string_count as usize {
            let start = u32::from_le_bytes(string_table[i * 4..i * 4 + 4].try_into().unwrap());
            let end =
                u32::from_le_bytes(string_table[i * 4 + 4..i * 4 + 8].try_into().unwrap());
            let raw = &string_blob[start as usize..end.saturating_sub(1) as usize];
            strings.push(
                std::str::from_utf8(raw)
                    .map_err(|_| DisasmError::InvalidStringData)?
                    .to_string(),
            );
        }

        let natives_bytes = slice(offsets.natives_table, header.natives_count * 8)?;
        let natives = natives_bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();

        let globals_bytes = slice(offsets.globals_image, header.globals_count * 8)?;
        let globals_image = globals_bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();

        let statics_bytes = slice(offsets.statics_image, header.statics_count * 8)?;
        let statics_image = statics_bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();

        let mut code_pages = Vec::with_capacity(header.code_page_count as usize);
        let mut code_offset = offsets.code_pages;
        for _ in 0..header.code_page_count {
            let page_bytes = slice(code_offset, CODE_PAGE_SIZE as u32)?;
            let mut page = [0u8; CODE_PAGE_SIZE];
            page.copy_from_slice(page_bytes);
            code_pages.push(page);
            code_offset += CODE_PAGE_SIZE as u32;
        }

        Ok(CompiledProgram {
            name,
            hash: header.script_hash,
            globals_block_index: header.globals_block_index,
            globals_image,
            statics_image,
            args_count: header.args_count,
            strings,
            natives,
            code_pages,
        })
    }

    /// Flat view of the code across all pages, NOP padding included.
    pub fn code(&self) -> Vec<u8> {
        self.code_pages.iter().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CompiledProgram {
        let mut page = [0u8; CODE_PAGE_SIZE];
        page[0] = 0x64; // Enter
        CompiledProgram {
            name: "test_script".to_string(),
            hash: 0x1234_5678_9abc_def0,
            globals_block_index: 7,
            globals_image: vec![1, 2, 3],
            statics_image: vec![10, 20, 30, 40],
            args_count: 1,
            strings: vec!["hello".to_string(), "world".to_string()],
            natives: vec![0xdead_beef, 0xcafe_babe],
            code_pages: vec![page],
        }
    }

    #[test]
    fn roundtrips_through_bytes() {
        let program = sample();
        let bytes = program.to_bytes();
        let decoded = CompiledProgram::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, program);
    }

    #[test]
    fn rejects_bad_magic() {
        let program = sample();
        let mut bytes = program.to_bytes();
        bytes[0] = b'X';
        let err = CompiledProgram::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, DisasmError::BadMagic { .. }));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let program = sample();
        let mut bytes = program.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = CompiledProgram::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, DisasmError::ChecksumMismatch { .. }));
    }

    #[test]
    fn rejects_truncated_input() {
        let err = CompiledProgram::from_bytes(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, DisasmError::Truncated { .. }));
    }
}
