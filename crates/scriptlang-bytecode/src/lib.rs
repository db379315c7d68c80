//! Compiled program container format and VM instruction encoding for
//! ScriptLang.
//!
//! - [`header`]: the 64-byte file header and section offset computation.
//! - [`program`]: the in-memory [`program::CompiledProgram`] and its
//!   binary (de)serialization.
//! - [`opcode`]: the VM's instruction opcodes and operand widths.
//! - [`page`]: splitting a flat instruction stream into fixed-size,
//!   NOP-padded code pages.

pub mod header;
pub mod opcode;
pub mod page;
pub mod program;

pub use header::{CODE_PAGE_SIZE, Header, MAGIC, SECTION_ALIGN, SectionOffsets, VERSION};
pub use opcode::Opcode;
pub use page::split_into_pages;
pub use program::{CompiledProgram, DisasmError};
