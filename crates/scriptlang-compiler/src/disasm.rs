//! Disassembler: recovers a readable assembly listing from a
//! [`CompiledProgram`]. See §4.9.
//!
//! Two passes over the decoded instruction stream: the first discovers
//! every label (function entries, jump/switch targets) without emitting
//! anything, the second walks the same stream again printing mnemonics and
//! prefixing label lines at the addresses the first pass found.

use std::collections::HashMap;
use std::fmt::Write as _;

use scriptlang_bytecode::{CompiledProgram, DisasmError, Opcode};

use crate::native_db::NativeDatabase;

struct Instr {
    addr: usize,
    opcode: Opcode,
    operands: Vec<u8>,
}

fn decode(code: &[u8]) -> Vec<Instr> {
    let mut out = Vec::new();
    let mut addr = 0usize;
    while addr < code.len() {
        let opcode = match Opcode::from_u8(code[addr]) {
            Some(op) => op,
            None => break,
        };
        let len = match opcode.fixed_operand_len() {
            Some(n) => n,
            None => match opcode {
                Opcode::Enter => {
                    let name_len = code[addr + 4] as usize;
                    4 + name_len
                }
                Opcode::Switch => {
                    let count = code[addr + 1] as usize;
                    1 + count * 6
                }
                _ => unreachable!("only ENTER/SWITCH are variable-length"),
            },
        };
        let operands = code[addr + 1..addr + 1 + len].to_vec();
        out.push(Instr { addr, opcode, operands });
        addr += 1 + len;
    }
    out
}

fn s16_at(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u24_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], 0])
}

struct Labels {
    /// addr -> name, e.g. "main", "func_137", "lbl_42".
    names: HashMap<usize, String>,
}

fn discover_labels(instrs: &[Instr]) -> Labels {
    let mut names = HashMap::new();
    let mut func_addrs = Vec::new();
    let mut jump_addrs = Vec::new();

    for instr in instrs {
        let end = instr.addr + 1 + instr.operands.len();
        match instr.opcode {
            Opcode::Enter => func_addrs.push(instr.addr),
            Opcode::Call => jump_addrs.push(u24_at(&instr.operands, 0) as usize),
            Opcode::J | Opcode::Jz | Opcode::IEqJz | Opcode::INeJz | Opcode::IGtJz | Opcode::IGeJz | Opcode::ILtJz | Opcode::ILeJz => {
                let delta = s16_at(&instr.operands, 0);
                jump_addrs.push((end as i64 + delta as i64) as usize);
            }
            Opcode::Switch => {
                let count = instr.operands[0] as usize;
                for i in 0..count {
                    let entry_off = 1 + i * 6;
                    let jump_field = entry_off + 4;
                    let delta = s16_at(&instr.operands, jump_field);
                    let anchor = instr.addr + 1 + entry_off + 6;
                    jump_addrs.push((anchor as i64 + delta as i64) as usize);
                }
            }
            _ => {}
        }
    }

    for &addr in &func_addrs {
        names.insert(addr, format!("func_{addr}"));
    }
    if let Some(first) = func_addrs.first().copied() {
        if first == 0 {
            names.insert(0, "main".to_string());
        }
    }
    for addr in jump_addrs {
        names.entry(addr).or_insert_with(|| format!("lbl_{addr}"));
    }

    Labels { names }
}

/// `a<CamelCasedFirst25IdentChars>`: alphanumerics only, first character
/// uppercased, truncated to 25 source characters before filtering.
fn string_label(s: &str) -> String {
    if s.is_empty() {
        return "aEmptyString".to_string();
    }
    let filtered: String = s.chars().take(25).filter(|c| c.is_alphanumeric()).collect();
    if filtered.is_empty() {
        return "aEmptyString".to_string();
    }
    let mut chars = filtered.chars();
    let first = chars.next().unwrap().to_uppercase().to_string();
    format!("a{first}{}", chars.as_str())
}

fn string_labels(strings: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, u32> = HashMap::new();
    strings
        .iter()
        .map(|s| {
            let base = string_label(s);
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{base}_{count}")
            }
        })
        .collect()
}

fn operand_text(instr: &Instr, labels: &Labels, native_names: &[String]) -> String {
    use Opcode::*;
    match instr.opcode {
        PushConstU8 | LocalU8 | LocalU8Load | LocalU8Store | StaticU8 | StaticU8Load | StaticU8Store
        | ArrayU8 | ArrayU8Load | ArrayU8Store | IOffsetU8 | IOffsetU8Load | IOffsetU8Store => {
            format!(" {}", instr.operands[0])
        }
        PushConstS16 | LocalU16 | LocalU16Load | LocalU16Store | StaticU16 | StaticU16Load | StaticU16Store
        | GlobalU16 | GlobalU16Load | GlobalU16Store | ArrayU16 | ArrayU16Load | ArrayU16Store
        | IOffsetS16 | IOffsetS16Load | IOffsetS16Store => {
            format!(" {}", s16_at(&instr.operands, 0))
        }
        LocalU24 | LocalU24Load | LocalU24Store | StaticU24 | StaticU24Load | StaticU24Store
        | GlobalU24 | GlobalU24Load | GlobalU24Store | PushConstU24 => {
            format!(" {}", u24_at(&instr.operands, 0))
        }
        PushConstU32 => format!(" {}", u32::from_le_bytes(instr.operands[0..4].try_into().unwrap())),
        PushConstF => format!(" {}", f32::from_le_bytes(instr.operands[0..4].try_into().unwrap())),
        J | Jz | IEqJz | INeJz | IGtJz | IGeJz | ILtJz | ILeJz => {
            let end = instr.addr + 1 + instr.operands.len();
            let target = (end as i64 + s16_at(&instr.operands, 0) as i64) as usize;
            format!(" {}", labels.names.get(&target).cloned().unwrap_or_else(|| format!("lbl_{target}")))
        }
        Call => {
            let target = u24_at(&instr.operands, 0) as usize;
            format!(" {}", labels.names.get(&target).cloned().unwrap_or_else(|| format!("func_{target}")))
        }
        Native => {
            let packed = instr.operands[0];
            let arg_count = packed >> 2;
            let ret_count = packed & 0x3;
            let index = u16::from_le_bytes([instr.operands[1], instr.operands[2]]) as usize;
            let name = native_names.get(index).cloned().unwrap_or_else(|| format!("_0x{index:016X}"));
            format!(" {arg_count},{ret_count},{name}")
        }
        Enter => {
            let args_size = instr.operands[0];
            let locals_size = u16::from_le_bytes([instr.operands[1], instr.operands[2]]);
            let name_len = instr.operands[3] as usize;
            let name = String::from_utf8_lossy(&instr.operands[4..4 + name_len]);
            format!(" {args_size},{locals_size},'{name}'")
        }
        Leave => format!(" {},{}", instr.operands[0], instr.operands[1]),
        Switch => {
            let count = instr.operands[0] as usize;
            let mut s = format!(" {count}");
            for i in 0..count {
                let entry_off = 1 + i * 6;
                let case_value = u32::from_le_bytes(instr.operands[entry_off..entry_off + 4].try_into().unwrap());
                let delta = s16_at(&instr.operands, entry_off + 4);
                let anchor = instr.addr + 1 + entry_off + 6;
                let target = (anchor as i64 + delta as i64) as usize;
                let label = labels.names.get(&target).cloned().unwrap_or_else(|| format!("lbl_{target}"));
                write!(s, " case {case_value}:{label}").unwrap();
            }
            s
        }
        TextLabelAssignString | TextLabelAssignInt | TextLabelAppendString | TextLabelAppendInt => {
            format!(" {}", instr.operands[0])
        }
        _ => String::new(),
    }
}

fn mnemonic(op: Opcode) -> &'static str {
    use Opcode::*;
    match op {
        Nop => "NOP",
        IAdd => "IADD",
        ISub => "ISUB",
        IMul => "IMUL",
        IDiv => "IDIV",
        IMod => "IMOD",
        INot => "INOT",
        INeg => "INEG",
        IEq => "IEQ",
        INe => "INE",
        IGt => "IGT",
        IGe => "IGE",
        ILt => "ILT",
        ILe => "ILE",
        FAdd => "FADD",
        FSub => "FSUB",
        FMul => "FMUL",
        FDiv => "FDIV",
        FMod => "FMOD",
        FNeg => "FNEG",
        FEq => "FEQ",
        FNe => "FNE",
        FGt => "FGT",
        FGe => "FGE",
        FLt => "FLT",
        FLe => "FLE",
        VAdd => "VADD",
        VSub => "VSUB",
        VMul => "VMUL",
        VDiv => "VDIV",
        VNeg => "VNEG",
        IAnd => "IAND",
        IOr => "IOR",
        IXor => "IXOR",
        I2F => "I2F",
        F2I => "F2I",
        F2V => "F2V",
        Dup => "DUP",
        Drop => "DROP",
        PushConst0 => "PUSH_CONST_0",
        PushConst1 => "PUSH_CONST_1",
        PushConst2 => "PUSH_CONST_2",
        PushConst3 => "PUSH_CONST_3",
        PushConst4 => "PUSH_CONST_4",
        PushConst5 => "PUSH_CONST_5",
        PushConst6 => "PUSH_CONST_6",
        PushConst7 => "PUSH_CONST_7",
        PushConstU8 => "PUSH_CONST_U8",
        PushConstU8U8 => "PUSH_CONST_U8_U8",
        PushConstU8U8U8 => "PUSH_CONST_U8_U8_U8",
        PushConstS16 => "PUSH_CONST_S16",
        PushConstU24 => "PUSH_CONST_U24",
        PushConstU32 => "PUSH_CONST_U32",
        PushConstF => "PUSH_CONST_F",
        LocalU8 => "LOCAL_U8",
        LocalU8Load => "LOCAL_U8_LOAD",
        LocalU8Store => "LOCAL_U8_STORE",
        LocalU16 => "LOCAL_U16",
        LocalU16Load => "LOCAL_U16_LOAD",
        LocalU16Store => "LOCAL_U16_STORE",
        LocalU24 => "LOCAL_U24",
        LocalU24Load => "LOCAL_U24_LOAD",
        LocalU24Store => "LOCAL_U24_STORE",
        StaticU8 => "STATIC_U8",
        StaticU8Load => "STATIC_U8_LOAD",
        StaticU8Store => "STATIC_U8_STORE",
        StaticU16 => "STATIC_U16",
        StaticU16Load => "STATIC_U16_LOAD",
        StaticU16Store => "STATIC_U16_STORE",
        StaticU24 => "STATIC_U24",
        StaticU24Load => "STATIC_U24_LOAD",
        StaticU24Store => "STATIC_U24_STORE",
        GlobalU16 => "GLOBAL_U16",
        GlobalU16Load => "GLOBAL_U16_LOAD",
        GlobalU16Store => "GLOBAL_U16_STORE",
        GlobalU24 => "GLOBAL_U24",
        GlobalU24Load => "GLOBAL_U24_LOAD",
        GlobalU24Store => "GLOBAL_U24_STORE",
        ArrayU8 => "ARRAY_U8",
        ArrayU8Load => "ARRAY_U8_LOAD",
        ArrayU8Store => "ARRAY_U8_STORE",
        ArrayU16 => "ARRAY_U16",
        ArrayU16Load => "ARRAY_U16_LOAD",
        ArrayU16Store => "ARRAY_U16_STORE",
        IOffsetU8 => "IOFFSET_U8",
        IOffsetU8Load => "IOFFSET_U8_LOAD",
        IOffsetU8Store => "IOFFSET_U8_STORE",
        IOffsetS16 => "IOFFSET_S16",
        IOffsetS16Load => "IOFFSET_S16_LOAD",
        IOffsetS16Store => "IOFFSET_S16_STORE",
        J => "J",
        Jz => "JZ",
        IEqJz => "IEQ_JZ",
        INeJz => "INE_JZ",
        IGtJz => "IGT_JZ",
        IGeJz => "IGE_JZ",
        ILtJz => "ILT_JZ",
        ILeJz => "ILE_JZ",
        Call => "CALL",
        Native => "NATIVE",
        Enter => "ENTER",
        Leave => "LEAVE",
        String => "STRING",
        Switch => "SWITCH",
        Catch => "CATCH",
        Throw => "THROW",
        TextLabelAssignString => "TEXT_LABEL_ASSIGN_STRING",
        TextLabelAssignInt => "TEXT_LABEL_ASSIGN_INT",
        TextLabelAppendString => "TEXT_LABEL_APPEND_STRING",
        TextLabelAppendInt => "TEXT_LABEL_APPEND_INT",
    }
}

/// Run-length compresses `cells` into `.int` directives, one line per run.
fn dump_cells(out: &mut String, cells: &[u64]) -> Result<(), DisasmError> {
    let mut i = 0;
    while i < cells.len() {
        let value = cells[i];
        if value > u32::MAX as u64 {
            return Err(DisasmError::CellOverflow { index: i });
        }
        let mut run = 1;
        while i + run < cells.len() && cells[i + run] == value {
            run += 1;
        }
        if run == 1 {
            writeln!(out, ".int {value}").unwrap();
        } else {
            writeln!(out, ".int {run} dup ({value})").unwrap();
        }
        i += run;
    }
    Ok(())
}

/// Recovers a readable assembly listing from `program`. `natives` resolves
/// each imported hash to a symbolic name, falling back to `_0xHHHH...` when
/// unknown - this is never itself a disassembly error.
pub fn disassemble(program: &CompiledProgram, natives: &dyn NativeDatabase) -> Result<String, DisasmError> {
    let span = tracing::info_span!("disasm", name = %program.name);
    let _enter = span.enter();

    let code = program.code();
    let instrs = decode(&code);
    let labels = discover_labels(&instrs);
    let native_names: Vec<String> = program
        .natives
        .iter()
        .map(|&hash| {
            natives
                .resolve_original(hash)
                .map(|info| info.name.clone())
                .unwrap_or_else(|| format!("_0x{hash:016X}"))
        })
        .collect();
    let str_labels = string_labels(&program.strings);

    let mut out = String::new();
    writeln!(out, "; name={} hash={:#018x} globals_block={}", program.name, program.hash, program.globals_block_index).unwrap();

    writeln!(out, "\n.strings").unwrap();
    for (s, label) in program.strings.iter().zip(&str_labels) {
        let escaped: String = s
            .chars()
            .map(|c| if c.is_ascii_graphic() || c == ' ' { c.to_string() } else { format!("\\x{:02x}", c as u32) })
            .collect();
        writeln!(out, "{label}: \"{escaped}\"").unwrap();
    }

    writeln!(out, "\n.globals").unwrap();
    dump_cells(&mut out, &program.globals_image)?;

    writeln!(out, "\n.statics").unwrap();
    let split = program.statics_image.len().saturating_sub(program.args_count as usize);
    dump_cells(&mut out, &program.statics_image[..split])?;

    writeln!(out, "\n.args").unwrap();
    dump_cells(&mut out, &program.statics_image[split..])?;

    writeln!(out, "\n.code").unwrap();
    for instr in &instrs {
        if let Some(name) = labels.names.get(&instr.addr) {
            if instr.opcode == Opcode::Enter && !out.ends_with(".code\n") {
                writeln!(out).unwrap();
            }
            writeln!(out, "{name}:").unwrap();
        }
        writeln!(out, "    {}{}", mnemonic(instr.opcode), operand_text(instr, &labels, &native_names)).unwrap();
    }

    tracing::info!(instructions = instrs.len(), labels = labels.names.len(), "disassembled");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native_db::InMemoryNativeDatabase;

    #[test]
    fn disassembles_minimal_program_with_main_label() {
        let db = InMemoryNativeDatabase::new();
        let mut page = [0u8; scriptlang_bytecode::CODE_PAGE_SIZE];
        page[0..9].copy_from_slice(&[0x64, 0x00, 0x02, 0x00, 0x01, b't', 0x65, 0x00, 0x00]);
        let program = CompiledProgram {
            name: "t".to_string(),
            hash: 0,
            globals_block_index: 0,
            globals_image: vec![],
            statics_image: vec![],
            args_count: 0,
            strings: vec![],
            natives: vec![],
            code_pages: vec![page],
        };
        let text = disassemble(&program, &db).unwrap();
        assert!(text.contains("main:"));
        assert!(text.contains("ENTER 0,2,'t'"));
        assert!(text.contains("LEAVE 0,0"));
    }

    #[test]
    fn run_length_compresses_repeated_cells() {
        let mut out = String::new();
        dump_cells(&mut out, &[1, 1, 1, 2]).unwrap();
        assert_eq!(out, ".int 3 dup (1)\n.int 2\n");
    }

    #[test]
    fn cell_exceeding_u32_is_a_hard_fatal() {
        let mut out = String::new();
        let err = dump_cells(&mut out, &[u32::MAX as u64 + 1]).unwrap_err();
        assert!(matches!(err, DisasmError::CellOverflow { index: 0 }));
    }

    #[test]
    fn string_label_camel_cases_and_disambiguates_collisions() {
        let labels = string_labels(&["hello world".to_string(), "hello!!!".to_string(), "".to_string()]);
        assert_eq!(labels[0], "aHelloworld");
        assert_eq!(labels[1], "aHello_2");
        assert_eq!(labels[2], "aEmptyString");
    }
}
