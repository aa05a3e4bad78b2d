//! Cumulus wire format — the two message kinds that share one datagram channel.
//!
//! A Command travels as printable text, `"<VERB> <file_name>"`. A Chunk
//! travels as a binary envelope: a fixed 20-byte header, the UTF-8 file name,
//! then the payload bytes.
//!
//! The envelope magic begins with 0xC5 followed by an ASCII byte. That pair is
//! never valid UTF-8, so an encoded chunk can never be mistaken for a command,
//! whichever order the decoder tries the two shapes in.
//!
//! These types ARE the protocol. Changing a field, a size or a constant here
//! is a breaking change for every deployed client and server.

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U16, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default upper bound on a chunk payload, and the unit of block offsets.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Largest chunk size either endpoint will accept.
/// `declared_size` is a u32 on the wire; this keeps well clear of it.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM: usize = 65_507;

/// Default UDP port the storage server listens on.
pub const SERVER_PORT: u16 = 8888;

/// Default UDP port the client listens on for commands.
pub const CLIENT_PORT: u16 = 5678;

/// Default scanner period in seconds.
pub const SCAN_INTERVAL_SECS: u64 = 5;

/// Default status report period in seconds.
pub const STATUS_INTERVAL_SECS: u64 = 10;

/// Longest file name, in bytes, that may appear in a message.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Envelope magic. The first byte is a UTF-8 lead byte that requires a
/// continuation byte (0x80..=0xBF); `'C'` is not one.
pub const CHUNK_MAGIC: [u8; 4] = [0xC5, b'C', b'M', b'L'];

/// Current chunk envelope version.
pub const CHUNK_VERSION: u8 = 0x01;

/// Set on the last chunk of a file. The receiver truncates the file to
/// `offset + declared_size` when it sees this flag.
pub const FLAG_FINAL: u8 = 0x01;

/// Flag bits that must be zero.
pub const RESERVED_FLAGS: u8 = !FLAG_FINAL;

/// Fixed size of the envelope header in bytes.
pub const CHUNK_HEADER_LEN: usize = std::mem::size_of::<ChunkHeader>();

// ── Chunk Header ──────────────────────────────────────────────────────────────

/// Fixed-size prefix of every chunk envelope.
///
/// Multi-byte fields are big-endian so client and server agree regardless of
/// host architecture. Every field is byte-aligned, so `repr(C)` has no padding.
///
/// Wire size: 20 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct ChunkHeader {
    /// Always `CHUNK_MAGIC`.
    pub magic: [u8; 4],

    /// Envelope version. Currently 0x01.
    pub version: u8,

    /// Bit flags:
    ///   bit    0: final chunk of the file
    ///   bits 1-7: reserved, must be zero
    pub flags: u8,

    /// Length in bytes of the UTF-8 file name that follows the header.
    pub name_len: U16<BigEndian>,

    /// Position of this chunk within the file, counted in whole chunks.
    pub block_number: U64<BigEndian>,

    /// Length of the payload as transmitted. Checked against the bytes that
    /// actually follow the name.
    pub declared_size: U32<BigEndian>,
}

assert_eq_size!(ChunkHeader, [u8; 20]);

// ── Messages ──────────────────────────────────────────────────────────────────

/// Control verb carried by a Command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Delete,
    Update,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Delete => "DELETE",
            Verb::Update => "UPDATE",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "DELETE" => Some(Verb::Delete),
            "UPDATE" => Some(Verb::Update),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A control message naming a target file and an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    pub file_name: String,
}

impl Command {
    /// Build a command, rejecting names that could not survive the
    /// two-token text form.
    pub fn new(verb: Verb, file_name: impl Into<String>) -> Result<Self, WireError> {
        let file_name = file_name.into();
        validate_file_name(&file_name)?;
        Ok(Self { verb, file_name })
    }

    pub fn delete(file_name: impl Into<String>) -> Result<Self, WireError> {
        Self::new(Verb::Delete, file_name)
    }

    pub fn update(file_name: impl Into<String>) -> Result<Self, WireError> {
        Self::new(Verb::Update, file_name)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.verb, self.file_name)
    }
}

/// One bounded slice of a file, tagged with its name and position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub file_name: String,
    /// Index of this chunk within the file, from 0.
    pub block_number: u64,
    pub data: Bytes,
    /// Length of `data` as transmitted.
    pub declared_size: u32,
    /// True for the last chunk of the file.
    pub is_final: bool,
}

impl Chunk {
    /// Build a chunk, deriving `declared_size` from the payload.
    pub fn new(
        file_name: impl Into<String>,
        block_number: u64,
        data: Bytes,
        is_final: bool,
    ) -> Result<Self, WireError> {
        let file_name = file_name.into();
        validate_file_name(&file_name)?;
        if data.len() > MAX_CHUNK_SIZE {
            return Err(WireError::PayloadTooLarge(data.len()));
        }
        Ok(Self {
            file_name,
            block_number,
            declared_size: data.len() as u32,
            data,
            is_final,
        })
    }

    /// Byte offset of this chunk within the file for a given chunk size.
    /// None if the offset does not fit in a u64.
    pub fn offset(&self, chunk_size: usize) -> Option<u64> {
        self.block_number.checked_mul(chunk_size as u64)
    }
}

/// Everything that can travel on the datagram channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Command(Command),
    Chunk(Chunk),
}

impl Message {
    /// Serialize to the bytes of exactly one datagram.
    pub fn encode(&self) -> Bytes {
        match self {
            Message::Command(cmd) => Bytes::from(cmd.to_string()),
            Message::Chunk(chunk) => encode_chunk(chunk),
        }
    }

    /// Parse one datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }
}

impl From<Command> for Message {
    fn from(cmd: Command) -> Self {
        Message::Command(cmd)
    }
}

impl From<Chunk> for Message {
    fn from(chunk: Chunk) -> Self {
        Message::Chunk(chunk)
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Serialize a message. Equivalent to `Message::encode`.
pub fn encode(message: &Message) -> Bytes {
    message.encode()
}

/// Parse a datagram. The command grammar is tried first; the binary envelope
/// only when that fails.
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let command_err = match parse_command(bytes) {
        Ok(cmd) => return Ok(Message::Command(cmd)),
        Err(e) => e,
    };

    match decode_chunk(bytes) {
        Ok(chunk) => Ok(Message::Chunk(chunk)),
        // Report whichever shape the datagram was trying to be.
        Err(chunk_err) if bytes.starts_with(&CHUNK_MAGIC[..1]) => Err(chunk_err),
        Err(_) => Err(command_err),
    }
}

fn parse_command(bytes: &[u8]) -> Result<Command, DecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| DecodeError::Malformed("command is not UTF-8 text".into()))?;
    let text = text.trim_end_matches(|c: char| c.is_whitespace() || c == '\0');

    let mut tokens = text.split(' ');
    let (verb, name) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(verb), Some(name), None) => (verb, name),
        _ => {
            return Err(DecodeError::Malformed(
                "command must be exactly two tokens".into(),
            ))
        }
    };

    let verb = Verb::from_token(verb)
        .ok_or_else(|| DecodeError::Malformed(format!("unknown command verb {verb:?}")))?;
    Command::new(verb, name).map_err(|e| DecodeError::Malformed(e.to_string()))
}

fn encode_chunk(chunk: &Chunk) -> Bytes {
    let header = ChunkHeader {
        magic: CHUNK_MAGIC,
        version: CHUNK_VERSION,
        flags: if chunk.is_final { FLAG_FINAL } else { 0 },
        name_len: U16::new(chunk.file_name.len() as u16),
        block_number: U64::new(chunk.block_number),
        declared_size: U32::new(chunk.declared_size),
    };

    let mut buf =
        BytesMut::with_capacity(CHUNK_HEADER_LEN + chunk.file_name.len() + chunk.data.len());
    buf.put_slice(header.as_bytes());
    buf.put_slice(chunk.file_name.as_bytes());
    buf.put_slice(&chunk.data);
    buf.freeze()
}

fn decode_chunk(bytes: &[u8]) -> Result<Chunk, DecodeError> {
    let header = ChunkHeader::read_from_prefix(bytes)
        .ok_or_else(|| DecodeError::Malformed("truncated chunk header".into()))?;

    if header.magic != CHUNK_MAGIC {
        return Err(DecodeError::Malformed("bad chunk magic".into()));
    }
    if header.version != CHUNK_VERSION {
        return Err(DecodeError::Malformed(format!(
            "unknown chunk version 0x{:02x}",
            header.version
        )));
    }
    if header.flags & RESERVED_FLAGS != 0 {
        return Err(DecodeError::Malformed(format!(
            "reserved flags set: 0x{:02x}",
            header.flags
        )));
    }

    let name_end = CHUNK_HEADER_LEN + header.name_len.get() as usize;
    let name = bytes
        .get(CHUNK_HEADER_LEN..name_end)
        .ok_or_else(|| DecodeError::Malformed("truncated file name".into()))?;
    let file_name = std::str::from_utf8(name)
        .map_err(|_| DecodeError::Malformed("file name is not UTF-8".into()))?;
    validate_file_name(file_name).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let payload = &bytes[name_end..];
    let declared_size = header.declared_size.get();
    if payload.len() != declared_size as usize {
        return Err(DecodeError::Malformed(format!(
            "declared size {} but {} payload bytes",
            declared_size,
            payload.len()
        )));
    }

    Ok(Chunk {
        file_name: file_name.to_string(),
        block_number: header.block_number.get(),
        data: Bytes::copy_from_slice(payload),
        declared_size,
        is_final: header.flags & FLAG_FINAL != 0,
    })
}

/// Check that a name is a single plain path component that fits in the
/// command grammar.
pub fn validate_file_name(name: &str) -> Result<(), WireError> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.len() > MAX_FILE_NAME_LEN {
        "too long"
    } else if name == "." || name == ".." {
        "relative path component"
    } else if name.contains(|c: char| c == '/' || c == '\\') {
        "contains a path separator"
    } else if name.contains(|c: char| c.is_whitespace() || c.is_control()) {
        "contains whitespace or control characters"
    } else {
        return Ok(());
    };
    Err(WireError::InvalidFileName {
        name: name.to_string(),
        reason,
    })
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors building a message from local values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("invalid file name {name:?}: {reason}")]
    InvalidFileName { name: String, reason: &'static str },

    #[error("payload length {0} exceeds maximum {}", MAX_CHUNK_SIZE)]
    PayloadTooLarge(usize),

    #[error("chunk size {0} must be between 1 and {}", MAX_CHUNK_SIZE)]
    InvalidChunkSize(usize),
}

/// Errors interpreting an inbound datagram. Always logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed datagram: {0}")]
    Malformed(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
