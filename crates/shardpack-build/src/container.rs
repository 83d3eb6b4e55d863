//! Binary container codec
//!
//! A container packs several member buffers into one file:
//!
//! ```text
//! +--------------------------------------------+
//! | magic "SPAK"            (4 bytes)          |
//! | format version  u32 LE  (4 bytes)          |
//! | member count N  u32 LE  (4 bytes)          |
//! | N x (offset u32 LE, size u32 LE)           |
//! +--------------------------------------------+
//! | member 0 bytes, zero-padded to 4 bytes     |
//! | member 1 bytes, zero-padded to 4 bytes     |
//! | ...                                        |
//! +--------------------------------------------+
//! ```
//!
//! Offsets are measured from the start of the payload section. Sizes are the
//! true, unpadded member lengths.

use thiserror::Error;

/// Magic token at the start of every container
pub const CONTAINER_MAGIC: [u8; 4] = *b"SPAK";
/// Current container format version
pub const CONTAINER_VERSION: u32 = 1;
/// Magic + version + count
pub const HEADER_FIXED_LEN: usize = 12;
/// One (offset, size) pair
pub const ENTRY_LEN: usize = 8;
/// Payload member alignment in bytes
pub const ALIGNMENT: usize = 4;

/// Container format errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("container too short: {len} bytes, header needs at least {HEADER_FIXED_LEN}")]
    TooShort { len: usize },

    #[error("bad magic number {found:?}, this is not a shardpack container")]
    BadMagic { found: [u8; 4] },

    #[error("container version mismatch: file has version {found}, this reader supports version {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("header declares {count} members but the member table is truncated")]
    TruncatedHeader { count: u32 },

    #[error("member {index} (offset {offset}, size {size}) reads past the payload end ({payload_len} bytes)")]
    MemberOutOfBounds {
        index: usize,
        offset: u32,
        size: u32,
        payload_len: usize,
    },

    #[error("member {index} starts at unaligned offset {offset}")]
    MisalignedMember { index: usize, offset: u32 },

    #[error("payload is {found} bytes but its members span {expected} bytes")]
    PayloadLengthMismatch { expected: usize, found: usize },

    #[error("member {index} is {size} bytes, larger than a container member can be")]
    MemberTooLarge { index: usize, size: usize },

    #[error("{count} members do not fit in a container header")]
    TooManyMembers { count: usize },

    #[error("payload exceeds the addressable container size")]
    PayloadTooLarge,
}

/// Location of one member inside the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerEntry {
    /// Aligned start, relative to the payload
    pub offset: u32,
    /// Unpadded member length
    pub size: u32,
}

impl ContainerEntry {
    fn range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.size as usize
    }
}

/// Round `len` up to the next multiple of [`ALIGNMENT`]
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(ALIGNMENT) * ALIGNMENT
}

/// Size of the header for `count` members
pub fn header_len(count: usize) -> usize {
    HEADER_FIXED_LEN + count * ENTRY_LEN
}

/// Encode member buffers into a container, preserving their order
pub fn encode<B: AsRef<[u8]>>(buffers: &[B]) -> Result<Vec<u8>, FormatError> {
    let count = u32::try_from(buffers.len()).map_err(|_| FormatError::TooManyMembers {
        count: buffers.len(),
    })?;

    let mut entries = Vec::with_capacity(buffers.len());
    let mut cursor = 0usize;
    for (index, buffer) in buffers.iter().enumerate() {
        let len = buffer.as_ref().len();
        let size =
            u32::try_from(len).map_err(|_| FormatError::MemberTooLarge { index, size: len })?;
        let offset = u32::try_from(cursor).map_err(|_| FormatError::PayloadTooLarge)?;
        entries.push(ContainerEntry { offset, size });
        cursor = cursor
            .checked_add(padded_len(len))
            .ok_or(FormatError::PayloadTooLarge)?;
    }

    let mut bytes = Vec::with_capacity(header_len(buffers.len()) + cursor);

    // Header
    bytes.extend_from_slice(&CONTAINER_MAGIC);
    bytes.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    bytes.extend_from_slice(&count.to_le_bytes());
    for entry in &entries {
        bytes.extend_from_slice(&entry.offset.to_le_bytes());
        bytes.extend_from_slice(&entry.size.to_le_bytes());
    }

    // Payload
    for buffer in buffers {
        let buffer = buffer.as_ref();
        bytes.extend_from_slice(buffer);
        bytes.resize(bytes.len() + padded_len(buffer.len()) - buffer.len(), 0);
    }

    Ok(bytes)
}

/// Decode a container into its member buffers, in stored order
pub fn decode(container: &[u8]) -> Result<Vec<Vec<u8>>, FormatError> {
    let view = ContainerView::parse(container)?;
    Ok(view.iter().map(|member| member.to_vec()).collect())
}

/// Zero-copy view over an encoded container
#[derive(Debug, Clone)]
pub struct ContainerView<'a> {
    entries: Vec<ContainerEntry>,
    payload: &'a [u8],
}

impl<'a> ContainerView<'a> {
    /// Validate the header and member table of `bytes`
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_FIXED_LEN {
            return Err(FormatError::TooShort { len: bytes.len() });
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != CONTAINER_MAGIC {
            return Err(FormatError::BadMagic { found: magic });
        }

        let version = read_u32(bytes, 4);
        if version != CONTAINER_VERSION {
            return Err(FormatError::UnsupportedVersion {
                found: version,
                expected: CONTAINER_VERSION,
            });
        }

        let count = read_u32(bytes, 8);
        let table_end = (count as usize)
            .checked_mul(ENTRY_LEN)
            .and_then(|table| table.checked_add(HEADER_FIXED_LEN))
            .filter(|end| *end <= bytes.len())
            .ok_or(FormatError::TruncatedHeader { count })?;

        let payload = &bytes[table_end..];
        let mut entries = Vec::with_capacity(count as usize);
        let mut extent = 0usize;

        for index in 0..count as usize {
            let at = HEADER_FIXED_LEN + index * ENTRY_LEN;
            let entry = ContainerEntry {
                offset: read_u32(bytes, at),
                size: read_u32(bytes, at + 4),
            };

            if entry.offset as usize % ALIGNMENT != 0 {
                return Err(FormatError::MisalignedMember {
                    index,
                    offset: entry.offset,
                });
            }

            let end = (entry.offset as usize).checked_add(entry.size as usize);
            match end {
                Some(end) if end <= payload.len() => {
                    extent = extent.max(entry.offset as usize + padded_len(entry.size as usize));
                }
                _ => {
                    return Err(FormatError::MemberOutOfBounds {
                        index,
                        offset: entry.offset,
                        size: entry.size,
                        payload_len: payload.len(),
                    });
                }
            }

            entries.push(entry);
        }

        if extent != payload.len() {
            return Err(FormatError::PayloadLengthMismatch {
                expected: extent,
                found: payload.len(),
            });
        }

        Ok(Self { entries, payload })
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the container holds no members
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Member table
    pub fn entries(&self) -> &[ContainerEntry] {
        &self.entries
    }

    /// Unpadded bytes of member `index`
    pub fn member(&self, index: usize) -> Option<&'a [u8]> {
        self.entries.get(index).map(|entry| &self.payload[entry.range()])
    }

    /// Iterate member bytes in stored order
    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        let payload = self.payload;
        self.entries.iter().map(move |entry| &payload[entry.range()])
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
