//! Binary envelope between the daemon and the semantic-index worker.
//!
//! The worker speaks a strictly turn-based protocol over its standard
//! input/output: the daemon writes one request, then reads responses until
//! `EndOfDefs`. Messages are concatenated binary records with no outer
//! framing beyond the tag byte.
//!
//! ## Byte-exact framing
//!
//! - Integers are big-endian: `u8` for tags and booleans, `u32` for lengths
//!   and line/column numbers, `u64` for timestamps.
//! - Strings are length-prefixed UTF-16 big-endian: a `u32` count of UTF-16
//!   code units followed by that many `u16` code units. Chosen for
//!   cross-language stability; it is bijective on valid Unicode.
//! - String vectors are a `u32` element count followed by the strings.
//! - Composite records are the concatenation of their fields in declaration
//!   order.
//!
//! Message tags:
//!
//! | tag    | message          | payload                                        |
//! |--------|------------------|------------------------------------------------|
//! | `0x01` | `Analyze`        | `CommandInfo`: file, dir, command, args, stamp |
//! | `0x02` | `Shutdown`       | empty                                          |
//! | `0x10` | `FoundDef`       | `DefInfo`: usr, name, file, line, col, kind    |
//! | `0x11` | `FoundInclusion` | includer, included, direct                     |
//! | `0x12` | `FoundOverride`  | usr, overridden                                |
//! | `0x13` | `FoundCaller`    | caller, callee                                 |
//! | `0x14` | `FoundRef`       | file, line, col, end line, end col, usr        |
//! | `0x1f` | `EndOfDefs`      | empty                                          |
//!
//! Any unknown tag or truncated payload is a protocol desynchronization and
//! is treated as a worker failure by the caller.

use std::io::{self, Read, Write};

use crate::error::{Error, Result};
use crate::model::{CallEdge, CommandInfo, DefInfo, Inclusion, OverrideInfo, Reference, SourceLocation, SourceRange};

const TAG_ANALYZE: u8 = 0x01;
const TAG_SHUTDOWN: u8 = 0x02;
const TAG_FOUND_DEF: u8 = 0x10;
const TAG_FOUND_INCLUSION: u8 = 0x11;
const TAG_FOUND_OVERRIDE: u8 = 0x12;
const TAG_FOUND_CALLER: u8 = 0x13;
const TAG_FOUND_REF: u8 = 0x14;
const TAG_END_OF_DEFS: u8 = 0x1f;

/// Request from the daemon to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerRequest {
    /// Parse one translation unit and stream back its facts.
    Analyze(CommandInfo),
    /// Exit cleanly after the current turn.
    Shutdown,
}

/// One message of a worker's response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResponse {
    FoundDef(DefInfo),
    FoundInclusion(Inclusion),
    FoundOverride(OverrideInfo),
    FoundCaller(CallEdge),
    FoundRef(Reference),
    /// Terminates the stream for the current `Analyze`.
    EndOfDefs,
}

// === primitive writers ===

fn write_u8<W: Write>(w: &mut W, v: u8) -> Result<()> {
    w.write_all(&[v])?;
    Ok(())
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<()> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

fn write_bool<W: Write>(w: &mut W, v: bool) -> Result<()> {
    write_u8(w, u8::from(v))
}

fn write_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = u32::try_from(units.len())
        .map_err(|_| Error::Protocol(format!("string too long for wire: {} units", units.len())))?;
    write_u32(w, len)?;
    for unit in units {
        w.write_all(&unit.to_be_bytes())?;
    }
    Ok(())
}

fn write_strings<W: Write>(w: &mut W, items: &[String]) -> Result<()> {
    let len = u32::try_from(items.len())
        .map_err(|_| Error::Protocol("argument vector too long for wire".to_string()))?;
    write_u32(w, len)?;
    for item in items {
        write_string(w, item)?;
    }
    Ok(())
}

// === primitive readers ===

fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Like `read_u8` but distinguishes a clean end of stream from a mid-record
/// truncation. Used only at message boundaries.
fn read_tag<R: Read>(r: &mut R) -> Result<Option<u8>> {
    let mut buf = [0u8; 1];
    match r.read_exact(&mut buf) {
        Ok(()) => Ok(Some(buf[0])),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

fn read_bool<R: Read>(r: &mut R) -> Result<bool> {
    match read_u8(r)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::Protocol(format!("invalid boolean byte 0x{other:02x}"))),
    }
}

fn read_string<R: Read>(r: &mut R) -> Result<String> {
    let len = read_u32(r)? as usize;
    let mut units = Vec::with_capacity(len.min(64 * 1024));
    for _ in 0..len {
        let mut buf = [0u8; 2];
        r.read_exact(&mut buf)?;
        units.push(u16::from_be_bytes(buf));
    }
    String::from_utf16(&units)
        .map_err(|_| Error::Protocol("string payload is not valid UTF-16".to_string()))
}

fn read_strings<R: Read>(r: &mut R) -> Result<Vec<String>> {
    let len = read_u32(r)? as usize;
    let mut items = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        items.push(read_string(r)?);
    }
    Ok(items)
}

// === record codecs ===

fn write_command_info<W: Write>(w: &mut W, ci: &CommandInfo) -> Result<()> {
    write_string(w, &ci.file)?;
    write_string(w, &ci.working_dir)?;
    write_string(w, &ci.command)?;
    write_strings(w, &ci.args)?;
    write_u64(w, ci.last_indexed)
}

fn read_command_info<R: Read>(r: &mut R) -> Result<CommandInfo> {
    Ok(CommandInfo {
        file: read_string(r)?,
        working_dir: read_string(r)?,
        command: read_string(r)?,
        args: read_strings(r)?,
        last_indexed: read_u64(r)?,
    })
}

fn write_def_info<W: Write>(w: &mut W, def: &DefInfo) -> Result<()> {
    write_string(w, &def.usr)?;
    write_string(w, &def.name)?;
    write_string(w, &def.location.file)?;
    write_u32(w, def.location.line)?;
    write_u32(w, def.location.col)?;
    write_string(w, &def.kind)
}

fn read_def_info<R: Read>(r: &mut R) -> Result<DefInfo> {
    Ok(DefInfo {
        usr: read_string(r)?,
        name: read_string(r)?,
        location: SourceLocation {
            file: read_string(r)?,
            line: read_u32(r)?,
            col: read_u32(r)?,
        },
        kind: read_string(r)?,
    })
}

impl WorkerRequest {
    /// Encode this request onto `w`. The caller flushes.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        match self {
            Self::Analyze(ci) => {
                write_u8(w, TAG_ANALYZE)?;
                write_command_info(w, ci)
            }
            Self::Shutdown => write_u8(w, TAG_SHUTDOWN),
        }
    }

    /// Decode the next request from `r`.
    ///
    /// Returns `Ok(None)` on a clean end of stream, which a worker treats
    /// the same as `Shutdown`.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Option<Self>> {
        let Some(tag) = read_tag(r)? else {
            return Ok(None);
        };
        match tag {
            TAG_ANALYZE => Ok(Some(Self::Analyze(read_command_info(r)?))),
            TAG_SHUTDOWN => Ok(Some(Self::Shutdown)),
            other => Err(Error::Protocol(format!("unknown request tag 0x{other:02x}"))),
        }
    }
}

impl WorkerResponse {
    /// Encode this response onto `w`. The caller flushes.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        match self {
            Self::FoundDef(def) => {
                write_u8(w, TAG_FOUND_DEF)?;
                write_def_info(w, def)
            }
            Self::FoundInclusion(inc) => {
                write_u8(w, TAG_FOUND_INCLUSION)?;
                write_string(w, &inc.includer)?;
                write_string(w, &inc.included)?;
                write_bool(w, inc.direct)
            }
            Self::FoundOverride(ov) => {
                write_u8(w, TAG_FOUND_OVERRIDE)?;
                write_string(w, &ov.usr)?;
                write_string(w, &ov.overridden)
            }
            Self::FoundCaller(edge) => {
                write_u8(w, TAG_FOUND_CALLER)?;
                write_string(w, &edge.caller)?;
                write_string(w, &edge.callee)
            }
            Self::FoundRef(reference) => {
                write_u8(w, TAG_FOUND_REF)?;
                write_string(w, &reference.range.file)?;
                write_u32(w, reference.range.line)?;
                write_u32(w, reference.range.col)?;
                write_u32(w, reference.range.end_line)?;
                write_u32(w, reference.range.end_col)?;
                write_string(w, &reference.usr)
            }
            Self::EndOfDefs => write_u8(w, TAG_END_OF_DEFS),
        }
    }

    /// Decode the next response from `r`.
    ///
    /// An end of stream here is a desynchronization, not a clean close: a
    /// worker may only stop between turns, and within a turn the stream is
    /// terminated by `EndOfDefs`.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let Some(tag) = read_tag(r)? else {
            return Err(Error::Protocol(
                "worker stream closed before EndOfDefs".to_string(),
            ));
        };
        match tag {
            TAG_FOUND_DEF => Ok(Self::FoundDef(read_def_info(r)?)),
            TAG_FOUND_INCLUSION => Ok(Self::FoundInclusion(Inclusion {
                includer: read_string(r)?,
                included: read_string(r)?,
                direct: read_bool(r)?,
            })),
            TAG_FOUND_OVERRIDE => Ok(Self::FoundOverride(OverrideInfo {
                usr: read_string(r)?,
                overridden: read_string(r)?,
            })),
            TAG_FOUND_CALLER => Ok(Self::FoundCaller(CallEdge {
                caller: read_string(r)?,
                callee: read_string(r)?,
            })),
            TAG_FOUND_REF => Ok(Self::FoundRef(Reference {
                range: SourceRange {
                    file: read_string(r)?,
                    line: read_u32(r)?,
                    col: read_u32(r)?,
                    end_line: read_u32(r)?,
                    end_col: read_u32(r)?,
                },
                usr: read_string(r)?,
            })),
            TAG_END_OF_DEFS => Ok(Self::EndOfDefs),
            other => Err(Error::Protocol(format!("unknown response tag 0x{other:02x}"))),
        }
    }
}
