//! Container header codec
//!
//! ```text
//! MAGIC(6) | VERSION(1) | WrappedKeyLen(2 BE) | WrappedKey | BaseNonce(8) |
//! NameLen(2 BE) | Name(UTF-8) | ChunkSize(4 BE)
//! ```
//!
//! Chunk records follow directly after the header:
//! `ChunkLen(4 BE) | Ciphertext(ChunkLen) | Tag(16)`.

use std::io::{self, Read, Write};

use mmdrez_core::{MmdrezError, MmdrezResult};
use serde::Serialize;

use crate::{BASE_NONCE_SIZE, MAGIC, MAX_CHUNK_SIZE, TAG_SIZE, VERSION};

/// Parsed container header. `file_name` holds the raw stored bytes, which
/// are also the chunk AAD prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub wrapped_key: Vec<u8>,
    pub base_nonce: [u8; BASE_NONCE_SIZE],
    pub file_name: Vec<u8>,
    pub chunk_size: u32,
}

/// Displayable view of a header (no key material beyond its length).
#[derive(Debug, Clone, Serialize)]
pub struct HeaderSummary {
    pub version: u8,
    pub wrapped_key_len: usize,
    pub base_nonce: String,
    pub file_name: String,
    pub chunk_size: u32,
    pub header_len: usize,
}

impl ContainerHeader {
    /// Serialized size in bytes
    pub fn encoded_len(&self) -> usize {
        MAGIC.len()
            + 1
            + 2
            + self.wrapped_key.len()
            + BASE_NONCE_SIZE
            + 2
            + self.file_name.len()
            + 4
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> MmdrezResult<()> {
        let key_len = u16::try_from(self.wrapped_key.len()).map_err(|_| {
            MmdrezError::invalid_argument(format!(
                "wrapped key too long: {} bytes",
                self.wrapped_key.len()
            ))
        })?;
        let name_len = u16::try_from(self.file_name.len()).map_err(|_| {
            MmdrezError::invalid_argument(format!(
                "file name too long: {} bytes (maximum {})",
                self.file_name.len(),
                u16::MAX
            ))
        })?;

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&key_len.to_be_bytes());
        buf.extend_from_slice(&self.wrapped_key);
        buf.extend_from_slice(&self.base_nonce);
        buf.extend_from_slice(&name_len.to_be_bytes());
        buf.extend_from_slice(&self.file_name);
        buf.extend_from_slice(&self.chunk_size.to_be_bytes());

        writer.write_all(&buf)?;
        Ok(())
    }

    /// Read and validate a header. Magic and version are checked before any
    /// other field is read.
    pub fn read_from<R: Read>(reader: &mut R) -> MmdrezResult<Self> {
        let mut magic = [0u8; 6];
        read_exact_or_truncated(reader, &mut magic, "magic")?;
        if &magic != MAGIC {
            return Err(MmdrezError::invalid_format("not an mmdrez container (magic mismatch)"));
        }

        let mut version = [0u8; 1];
        read_exact_or_truncated(reader, &mut version, "version")?;
        if version[0] != VERSION {
            return Err(MmdrezError::invalid_format(format!(
                "unsupported container version {}",
                version[0]
            )));
        }

        let key_len = read_u16(reader, "wrapped key length")? as usize;
        if key_len == 0 {
            return Err(MmdrezError::invalid_format("empty wrapped key"));
        }
        let mut wrapped_key = vec![0u8; key_len];
        read_exact_or_truncated(reader, &mut wrapped_key, "wrapped key")?;

        let mut base_nonce = [0u8; BASE_NONCE_SIZE];
        read_exact_or_truncated(reader, &mut base_nonce, "base nonce")?;

        let name_len = read_u16(reader, "name length")? as usize;
        let mut file_name = vec![0u8; name_len];
        read_exact_or_truncated(reader, &mut file_name, "file name")?;

        let chunk_size = read_u32(reader, "chunk size")?;
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(MmdrezError::invalid_format(format!(
                "chunk size {chunk_size} outside 1..={MAX_CHUNK_SIZE}"
            )));
        }

        Ok(Self {
            wrapped_key,
            base_nonce,
            file_name,
            chunk_size,
        })
    }

    /// The stored name as UTF-8, exactly as written (not sanitized).
    pub fn file_name_str(&self) -> MmdrezResult<&str> {
        std::str::from_utf8(&self.file_name)
            .map_err(|_| MmdrezError::invalid_format("stored file name is not valid UTF-8"))
    }

    pub fn summary(&self) -> HeaderSummary {
        HeaderSummary {
            version: VERSION,
            wrapped_key_len: self.wrapped_key.len(),
            base_nonce: hex_encode(&self.base_nonce),
            file_name: String::from_utf8_lossy(&self.file_name).into_owned(),
            chunk_size: self.chunk_size,
            header_len: self.encoded_len(),
        }
    }
}

/// Write one chunk record: `len(4 BE) | ciphertext | tag(16)`.
pub fn write_chunk_record<W: Write>(
    writer: &mut W,
    ciphertext: &[u8],
    tag: &[u8; TAG_SIZE],
) -> MmdrezResult<()> {
    let len = u32::try_from(ciphertext.len())
        .map_err(|_| MmdrezError::invalid_argument("chunk longer than 4 GiB"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(ciphertext)?;
    writer.write_all(tag)?;
    Ok(())
}

/// Read the next chunk length. `Ok(None)` at a clean end of stream; a length
/// field cut short is a format error.
pub fn read_chunk_len<R: Read>(reader: &mut R) -> MmdrezResult<Option<u32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(MmdrezError::invalid_format("truncated chunk length")),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(u32::from_be_bytes(buf)))
}

/// `read_exact`, with a premature end of stream reported as a format error.
pub fn read_exact_or_truncated<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &str,
) -> MmdrezResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            MmdrezError::invalid_format(format!("truncated {what}"))
        } else {
            MmdrezError::Io(e)
        }
    })
}

fn read_u16<R: Read>(reader: &mut R, what: &str) -> MmdrezResult<u16> {
    let mut buf = [0u8; 2];
    read_exact_or_truncated(reader, &mut buf, what)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R, what: &str) -> MmdrezResult<u32> {
    let mut buf = [0u8; 4];
    read_exact_or_truncated(reader, &mut buf, what)?;
    Ok(u32::from_be_bytes(buf))
}

fn hex_encode(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for byte in data {
        s.push_str(&format!("{:02x}", byte));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmdrez_core::ErrorKind;
    use std::io::Cursor;

    fn sample() -> ContainerHeader {
        ContainerHeader {
            wrapped_key: vec![0xAA; 256],
            base_nonce: [1, 2, 3, 4, 5, 6, 7, 8],
            file_name: b"photo.jpg".to_vec(),
            chunk_size: 65536,
        }
    }

    #[test]
    fn test_header_byte_layout() {
        let header = ContainerHeader {
            wrapped_key: vec![0xEE, 0xFF],
            base_nonce: [9; 8],
            file_name: b"ab".to_vec(),
            chunk_size: 0x0001_0000,
        };
        let mut out = Vec::new();
        header.write_to(&mut out).unwrap();

        let mut expected = b"MMDREZ".to_vec();
        expected.push(1);
        expected.extend_from_slice(&[0x00, 0x02, 0xEE, 0xFF]);
        expected.extend_from_slice(&[9; 8]);
        expected.extend_from_slice(&[0x00, 0x02, b'a', b'b']);
        expected.extend_from_slice(&[0x00, 0x01, 0x00, 0x00]);

        assert_eq!(out, expected);
        assert_eq!(header.encoded_len(), expected.len());
    }

    #[test]
    fn test_header_read_back() {
        let header = sample();
        let mut out = Vec::new();
        header.write_to(&mut out).unwrap();
        out.extend_from_slice(b"trailing chunk data");

        let mut cursor = Cursor::new(&out);
        let parsed = ContainerHeader::read_from(&mut cursor).unwrap();

        assert_eq!(parsed, header);
        assert_eq!(cursor.position() as usize, header.encoded_len());
    }

    #[test]
    fn test_bad_magic() {
        let mut out = Vec::new();
        sample().write_to(&mut out).unwrap();
        out[0] = b'X';

        let err = ContainerHeader::read_from(&mut Cursor::new(&out)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn test_bad_version() {
        let mut out = Vec::new();
        sample().write_to(&mut out).unwrap();
        out[6] = 2;

        let err = ContainerHeader::read_from(&mut Cursor::new(&out)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn test_truncated_everywhere() {
        let mut out = Vec::new();
        sample().write_to(&mut out).unwrap();

        for cut in 0..out.len() {
            let err = ContainerHeader::read_from(&mut Cursor::new(&out[..cut])).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFormat, "cut at {cut}");
        }
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut header = sample();
        header.chunk_size = 0;
        let mut out = Vec::new();
        header.write_to(&mut out).unwrap();

        let err = ContainerHeader::read_from(&mut Cursor::new(&out)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn test_oversized_chunk_size_rejected() {
        let mut header = sample();
        header.chunk_size = MAX_CHUNK_SIZE + 1;
        let mut out = Vec::new();
        header.write_to(&mut out).unwrap();

        let err = ContainerHeader::read_from(&mut Cursor::new(&out)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn test_name_too_long() {
        let mut header = sample();
        header.file_name = vec![b'a'; u16::MAX as usize + 1];

        let err = header.write_to(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_file_name_utf8() {
        let mut header = sample();
        assert_eq!(header.file_name_str().unwrap(), "photo.jpg");

        header.file_name = vec![0xFF, 0xFE];
        assert_eq!(
            header.file_name_str().unwrap_err().kind(),
            ErrorKind::InvalidFormat
        );
    }

    #[test]
    fn test_chunk_len_eof_handling() {
        assert_eq!(read_chunk_len(&mut Cursor::new(&[] as &[u8])).unwrap(), None);
        assert_eq!(
            read_chunk_len(&mut Cursor::new(&[0u8, 0, 1, 0])).unwrap(),
            Some(256)
        );
        let err = read_chunk_len(&mut Cursor::new(&[0u8, 0])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn test_summary() {
        let summary = sample().summary();
        assert_eq!(summary.base_nonce, "0102030405060708");
        assert_eq!(summary.file_name, "photo.jpg");
        assert_eq!(summary.wrapped_key_len, 256);
        assert_eq!(summary.header_len, 6 + 1 + 2 + 256 + 8 + 2 + 9 + 4);
    }
}
