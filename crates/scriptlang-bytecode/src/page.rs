//! Splits a flat instruction stream into fixed-size code pages.
//!
//! The target VM's instruction fetch never crosses a page boundary,
//! so an instruction that would straddle one is pushed to the start of the
//! next page and the gap is filled with `NOP` (opcode `0x00`).

use crate::header::CODE_PAGE_SIZE;
use crate::opcode::Opcode;

/// Split `code` into `CODE_PAGE_SIZE`-byte pages, padding with NOPs so that
/// no instruction straddles a page boundary.
///
/// `instruction_lens` gives the byte length of each instruction in `code`,
/// in order; their sum must equal `code.len()`.
pub fn split_into_pages(code: &[u8], instruction_lens: &[usize]) -> Vec<Vec<u8>> {
    let mut pages: Vec<Vec<u8>> = Vec::new();
    let mut page = Vec::with_capacity(CODE_PAGE_SIZE);
    let mut cursor = 0usize;

    for &len in instruction_lens {
        if page.len() + len > CODE_PAGE_SIZE {
            page.resize(CODE_PAGE_SIZE, Opcode::Nop as u8);
            pages.push(std::mem::replace(&mut page, Vec::with_capacity(CODE_PAGE_SIZE)));
        }
        page.extend_from_slice(&code[cursor..cursor + len]);
        cursor += len;
    }

    if !page.is_empty() {
        page.resize(CODE_PAGE_SIZE, Opcode::Nop as u8);
        pages.push(page);
    }

    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_page_no_padding_needed_is_still_padded() {
        let code = vec![1u8, 2, 3];
        let pages = split_into_pages(&code, &[1, 1, 1]);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].len(), CODE_PAGE_SIZE);
        assert_eq!(&pages[0][0..3], &[1, 2, 3]);
        assert!(pages[0][3..].iter().all(|&b| b == Opcode::Nop as u8));
    }

    #[test]
    fn instruction_straddling_boundary_is_pushed_to_next_page() {
        // Fill page to within 2 bytes of the boundary, then add a 4-byte
        // instruction: it must not straddle, so NOPs fill the remainder.
        let filler_len = CODE_PAGE_SIZE - 2;
        let mut code = vec![0xAAu8; filler_len];
        code.extend_from_slice(&[1, 2, 3, 4]);

        let mut lens = vec![1; filler_len];
        lens.push(4);

        let pages = split_into_pages(&code, &lens);
        assert_eq!(pages.len(), 2);
        assert_eq!(&pages[0][filler_len..], &[Opcode::Nop as u8, Opcode::Nop as u8]);
        assert_eq!(&pages[1][0..4], &[1, 2, 3, 4]);
    }
}
