use anyhow::{Context, Result, anyhow};
use std::path::Path;

const SOCK_FILTER_SIZE: usize = std::mem::size_of::<libc::sock_filter>();

/* Size of struct seccomp_data, the only memory BPF_ABS loads may touch. */
const SECCOMP_DATA_SIZE: u32 = 64;
/* BPF scratch memory slots. */
const BPF_MEMWORDS: u32 = 16;

/* Instruction classes */
const BPF_LD: u16 = 0x00;
const BPF_LDX: u16 = 0x01;
const BPF_ST: u16 = 0x02;
const BPF_STX: u16 = 0x03;
const BPF_ALU: u16 = 0x04;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_MISC: u16 = 0x07;

/* Fields */
const BPF_W: u16 = 0x00;
const BPF_IMM: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_MEM: u16 = 0x60;
const BPF_LEN: u16 = 0x80;
const BPF_K: u16 = 0x00;
const BPF_X: u16 = 0x08;
const BPF_A: u16 = 0x10;
const BPF_JA: u16 = 0x00;
const BPF_JEQ: u16 = 0x10;
const BPF_JGT: u16 = 0x20;
const BPF_JGE: u16 = 0x30;
const BPF_JSET: u16 = 0x40;
const BPF_TAX: u16 = 0x00;
const BPF_TXA: u16 = 0x80;

const ALU_OPS: [u16; 11] = [
    0x00, /* add */
    0x10, /* sub */
    0x20, /* mul */
    0x30, /* div */
    0x40, /* or */
    0x50, /* and */
    0x60, /* lsh */
    0x70, /* rsh */
    0x80, /* neg */
    0x90, /* mod */
    0xa0, /* xor */
];

/// A precompiled classic-BPF seccomp program, as written by minijail's
/// `compile_seccomp_policy` from a text policy. Loaded up front so that
/// installing it after fork involves no allocation or file access.
pub struct SeccompProgram {
    filters: Vec<libc::sock_filter>,
}

impl SeccompProgram {
    pub fn load(path: &Path) -> Result<SeccompProgram> {
        let bytes = std::fs::read(path).context(format!(
            "failed to read seccomp program {}",
            path.display()
        ))?;
        SeccompProgram::from_bytes(&bytes).context(format!(
            "{} is not a compiled seccomp program",
            path.display()
        ))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<SeccompProgram> {
        if bytes.is_empty() || bytes.len() % SOCK_FILTER_SIZE != 0 {
            return Err(anyhow!(
                "BPF program length {} is not a non-zero multiple of {}",
                bytes.len(),
                SOCK_FILTER_SIZE
            ));
        }
        if bytes.len() / SOCK_FILTER_SIZE > u16::MAX as usize {
            return Err(anyhow!("BPF program is too long"));
        }

        let filters: Vec<libc::sock_filter> = bytes
            .chunks_exact(SOCK_FILTER_SIZE)
            .map(|chunk| libc::sock_filter {
                code: u16::from_ne_bytes([chunk[0], chunk[1]]),
                jt: chunk[2],
                jf: chunk[3],
                k: u32::from_ne_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]),
            })
            .collect();
        check_program(&filters)?;
        Ok(SeccompProgram { filters })
    }

    /// Installs the filter on the calling thread. no_new_privs has to be set
    /// first unless the caller holds CAP_SYS_ADMIN.
    pub fn install(&self) -> Result<()> {
        let program = libc::sock_fprog {
            len: self.filters.len() as libc::c_ushort,
            filter: self.filters.as_ptr() as *mut libc::sock_filter,
        };
        let result = unsafe {
            libc::prctl(
                libc::PR_SET_SECCOMP,
                libc::SECCOMP_MODE_FILTER as libc::c_ulong,
                &program as *const libc::sock_fprog,
            )
        };
        if result != 0 {
            return Err(nix::errno::Errno::last())
                .context("failed to install seccomp filter");
        }
        Ok(())
    }
}

/**
 * Applies the kernel's seccomp filter rules up front: only the opcodes
 * seccomp accepts, loads confined to `seccomp_data`, every jump landing
 * inside the program, and a return as the last instruction. A text policy
 * handed over by mistake fails here instead of at StartServer time.
 */
fn check_program(filters: &[libc::sock_filter]) -> Result<()> {
    let len = filters.len();
    for (pc, filter) in filters.iter().enumerate() {
        let code = filter.code;
        let remaining = (len - pc - 1) as u32;
        let valid = match code & 0x07 {
            BPF_LD => match code {
                c if c == BPF_LD | BPF_W | BPF_ABS => {
                    filter.k < SECCOMP_DATA_SIZE && filter.k % 4 == 0
                }
                c if c == BPF_LD | BPF_W | BPF_LEN => true,
                c if c == BPF_LD | BPF_IMM => true,
                c if c == BPF_LD | BPF_MEM => filter.k < BPF_MEMWORDS,
                _ => false,
            },
            BPF_LDX => match code {
                c if c == BPF_LDX | BPF_W | BPF_LEN => true,
                c if c == BPF_LDX | BPF_IMM => true,
                c if c == BPF_LDX | BPF_MEM => filter.k < BPF_MEMWORDS,
                _ => false,
            },
            BPF_ST | BPF_STX => code & !0x07 == 0 && filter.k < BPF_MEMWORDS,
            BPF_ALU => {
                let op = code & 0xf0;
                let source = code & 0x08;
                code & !0xff == 0
                    && ALU_OPS.contains(&op)
                    && !(op == 0x80 && source == BPF_X)
                    && !((op == 0x30 || op == 0x90)
                        && source == BPF_K
                        && filter.k == 0)
            }
            BPF_JMP => match code & 0xf0 {
                BPF_JA => code == BPF_JMP | BPF_JA && filter.k < remaining,
                BPF_JEQ | BPF_JGT | BPF_JGE | BPF_JSET => {
                    code & !0xf8 == BPF_JMP
                        && (filter.jt as u32) < remaining
                        && (filter.jf as u32) < remaining
                }
                _ => false,
            },
            BPF_RET => code == BPF_RET | BPF_K || code == BPF_RET | BPF_A,
            BPF_MISC => {
                code == BPF_MISC | BPF_TAX || code == BPF_MISC | BPF_TXA
            }
            _ => false,
        };
        if !valid {
            return Err(anyhow!(
                "Invalid BPF instruction {} (code {:#06x})",
                pc,
                code
            ));
        }
    }

    match filters.last() {
        Some(last) if last.code & 0x07 == BPF_RET => Ok(()),
        _ => Err(anyhow!("BPF program does not end with a return")),
    }
}
