//! Hybrid file encryption: RSA-OAEP wrapped content key + chunked AES-256-GCM
//!
//! Every call generates a fresh content key and base nonce, so a (key, nonce)
//! pair is never reused across files. The content key lives only for the
//! duration of one call and is zeroized on every exit path.
//!
//! Integrity: each chunk is authenticated individually. The v1 format does not
//! authenticate the total chunk count, so a container cut exactly at a chunk
//! boundary still decrypts (to a shorter plaintext). The reader rejects every
//! other truncation: all chunks but the last must be exactly `chunk_size`
//! long, and a record cut short is a format error.

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use mmdrez_core::{MmdrezError, MmdrezResult};
use rand::RngCore;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use zeroize::{Zeroize, Zeroizing};

use crate::chunk::ChunkCipher;
use crate::header::{
    read_chunk_len, read_exact_or_truncated, write_chunk_record, ContainerHeader, HeaderSummary,
};
use crate::keys::{generate_content_key, parse_private_key, parse_public_key, unwrap_key, wrap_key};
use crate::names::sanitize_file_name;
use crate::{BASE_NONCE_SIZE, CONTAINER_EXTENSION, MAX_CHUNK_SIZE, TAG_SIZE};

/// Counters reported by the streaming encrypt/decrypt paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    /// Number of chunk records
    pub chunks: u64,
    /// Plaintext bytes
    pub bytes: u64,
}

/// Result of an in-memory decryption.
pub struct DecryptedFile {
    /// Stored name with directory components stripped
    pub file_name: String,
    pub plaintext: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for DecryptedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedFile")
            .field("file_name", &self.file_name)
            .field("plaintext", &format_args!("[{} bytes]", self.plaintext.len()))
            .finish()
    }
}

/// Result of a path-level operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOutcome {
    /// Final output location
    pub path: PathBuf,
    pub summary: StreamSummary,
}

/// Header and chunk layout of a container, read without any key.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    pub header: HeaderSummary,
    pub chunks: u64,
    pub plaintext_len: u64,
}

fn check_chunk_size(chunk_size: u32) -> MmdrezResult<()> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(MmdrezError::invalid_argument(format!(
            "chunk size {chunk_size} outside 1..={MAX_CHUNK_SIZE}"
        )));
    }
    Ok(())
}

// ── Streaming core ──────────────────────────────────────────────────────────

/// Encrypt everything `reader` yields into a container written to `writer`.
///
/// `file_name` is stored verbatim and bound into every chunk's AAD.
pub fn encrypt_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    file_name: &str,
    recipient: &RsaPublicKey,
    chunk_size: u32,
) -> MmdrezResult<StreamSummary> {
    check_chunk_size(chunk_size)?;
    if file_name.len() > u16::MAX as usize {
        return Err(MmdrezError::invalid_argument(format!(
            "file name too long: {} bytes (maximum {})",
            file_name.len(),
            u16::MAX
        )));
    }

    let cek = generate_content_key();
    let mut base_nonce = [0u8; BASE_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut base_nonce);

    let header = ContainerHeader {
        wrapped_key: wrap_key(recipient, &cek)?,
        base_nonce,
        file_name: file_name.as_bytes().to_vec(),
        chunk_size,
    };
    header.write_to(writer)?;
    tracing::debug!(
        wrapped_key_len = header.wrapped_key.len(),
        chunk_size,
        "container header written"
    );

    let cipher = ChunkCipher::new(&cek, base_nonce);
    base_nonce.zeroize();

    let mut buf = Zeroizing::new(vec![0u8; chunk_size as usize]);
    let mut summary = StreamSummary::default();

    loop {
        let n = fill_chunk(reader, &mut buf)?;
        if n == 0 {
            break;
        }
        let index = u32::try_from(summary.chunks).map_err(|_| {
            MmdrezError::invalid_argument("input too large: chunk index exceeds 32 bits")
        })?;

        let tag = cipher.seal(index, &header.file_name, &mut buf[..n])?;
        write_chunk_record(writer, &buf[..n], &tag)?;

        buf[..n].zeroize();
        summary.chunks += 1;
        summary.bytes += n as u64;

        if n < buf.len() {
            break;
        }
    }

    writer.flush()?;
    tracing::debug!(chunks = summary.chunks, bytes = summary.bytes, "encryption complete");
    Ok(summary)
}

/// Decrypt a container from `reader`, writing plaintext to `writer` chunk by
/// chunk.
///
/// On error, whatever was already written to `writer` is unauthenticated
/// output and must be discarded by the caller. The returned name is
/// sanitized.
pub fn decrypt_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    recipient: &RsaPrivateKey,
) -> MmdrezResult<(String, StreamSummary)> {
    let header = ContainerHeader::read_from(reader)?;
    decrypt_records(header, reader, writer, recipient)
}

/// Decrypt the chunk records following an already-parsed header.
fn decrypt_records<R: Read, W: Write>(
    header: ContainerHeader,
    reader: &mut R,
    writer: &mut W,
    recipient: &RsaPrivateKey,
) -> MmdrezResult<(String, StreamSummary)> {
    tracing::debug!(
        wrapped_key_len = header.wrapped_key.len(),
        chunk_size = header.chunk_size,
        "container header read"
    );

    let cek = unwrap_key(recipient, &header.wrapped_key)?;
    let cipher = ChunkCipher::new(&cek, header.base_nonce);
    drop(cek);

    let mut buf = Zeroizing::new(Vec::with_capacity(header.chunk_size as usize));
    let mut tag = [0u8; TAG_SIZE];
    let mut summary = StreamSummary::default();
    let mut saw_short_chunk = false;

    while let Some(len) = read_chunk_len(reader)? {
        if len > header.chunk_size {
            return Err(MmdrezError::invalid_format(format!(
                "chunk {} is {len} bytes, larger than chunk size {}",
                summary.chunks, header.chunk_size
            )));
        }
        if saw_short_chunk {
            return Err(MmdrezError::invalid_format("short chunk before end of stream"));
        }
        let index = u32::try_from(summary.chunks)
            .map_err(|_| MmdrezError::invalid_format("chunk index exceeds 32 bits"))?;

        buf.resize(len as usize, 0);
        read_exact_or_truncated(reader, &mut buf, "chunk ciphertext")?;
        read_exact_or_truncated(reader, &mut tag, "chunk tag")?;

        if let Err(e) = cipher.open(index, &header.file_name, &mut buf, &tag) {
            tracing::debug!(chunk = index, "chunk authentication failed");
            buf.zeroize();
            return Err(e);
        }
        writer.write_all(&buf)?;
        buf.zeroize();

        saw_short_chunk = len < header.chunk_size;
        summary.chunks += 1;
        summary.bytes += u64::from(len);
    }

    writer.flush()?;
    let file_name = sanitize_file_name(header.file_name_str()?);
    tracing::debug!(chunks = summary.chunks, bytes = summary.bytes, "decryption complete");
    Ok((file_name, summary))
}

/// Read until `buf` is full or the reader is exhausted.
fn fill_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> MmdrezResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

// ── In-memory API ───────────────────────────────────────────────────────────

/// Encrypt `input` for the holder of `public_key_pem`, returning container bytes.
pub fn encrypt_file(
    input: &[u8],
    file_name: &str,
    public_key_pem: &str,
    chunk_size: u32,
) -> MmdrezResult<Vec<u8>> {
    let recipient = parse_public_key(public_key_pem)?;
    let mut out = Vec::with_capacity(input.len() + input.len() / 64 + 1024);
    encrypt_stream(&mut Cursor::new(input), &mut out, file_name, &recipient, chunk_size)?;
    Ok(out)
}

/// Decrypt container bytes with `private_key_pem`.
///
/// Nothing is returned unless every chunk authenticates; partial plaintext is
/// zeroized on failure.
///
/// The container header is validated before the key is parsed, so a
/// non-container input is always `InvalidFormat`.
pub fn decrypt_file(container: &[u8], private_key_pem: &str) -> MmdrezResult<DecryptedFile> {
    let mut reader = Cursor::new(container);
    let header = ContainerHeader::read_from(&mut reader)?;
    let recipient = parse_private_key(private_key_pem)?;
    // Plaintext is never longer than the container; reserving up front avoids
    // reallocations that would leave unzeroized copies behind.
    let mut plaintext = Zeroizing::new(Vec::with_capacity(container.len()));
    let (file_name, _) = decrypt_records(header, &mut reader, &mut *plaintext, &recipient)?;
    Ok(DecryptedFile {
        file_name,
        plaintext,
    })
}

// ── Path-level API ──────────────────────────────────────────────────────────

/// `input` with its extension replaced by `extension` (no leading dot).
pub fn default_output_path(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn temp_file_in(dir: &Path) -> MmdrezResult<tempfile::NamedTempFile> {
    Ok(tempfile::Builder::new()
        .prefix(".mmdrez-")
        .suffix(".tmp")
        .tempfile_in(dir)?)
}

/// Encrypt the file at `input` into a container.
///
/// The output (default: `input` with a `.mmdrez` extension) is written to a
/// temporary file next to it and only renamed into place once complete.
pub fn encrypt_path(
    input: &Path,
    public_key_pem: &str,
    output: Option<&Path>,
    chunk_size: u32,
) -> MmdrezResult<PathOutcome> {
    if !input.is_file() {
        return Err(MmdrezError::NotFound(input.to_path_buf()));
    }
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input, CONTAINER_EXTENSION));
    if output == input {
        return Err(MmdrezError::invalid_argument(
            "output path must differ from the input path",
        ));
    }
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let recipient = parse_public_key(public_key_pem)?;
    let mut reader = File::open(input)?;
    let mut tmp = temp_file_in(&parent_dir(&output))?;

    let summary = {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        let summary = encrypt_stream(&mut reader, &mut writer, &file_name, &recipient, chunk_size)?;
        writer.flush()?;
        summary
    };
    tmp.as_file().sync_all()?;
    tmp.persist(&output).map_err(|e| MmdrezError::Io(e.error))?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        chunks = summary.chunks,
        bytes = summary.bytes,
        "file encrypted"
    );
    Ok(PathOutcome {
        path: output,
        summary,
    })
}

/// Decrypt the container at `input` into `out_dir` (default: the container's
/// directory), under its sanitized stored name.
///
/// Plaintext goes to a temporary file first; it replaces any existing file at
/// the final name only after every chunk authenticated. On failure the
/// temporary file is removed and nothing is left behind.
pub fn decrypt_path(
    input: &Path,
    private_key_pem: &str,
    out_dir: Option<&Path>,
) -> MmdrezResult<PathOutcome> {
    if !input.is_file() {
        return Err(MmdrezError::NotFound(input.to_path_buf()));
    }
    let out_dir = out_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| parent_dir(input));
    if !out_dir.is_dir() {
        return Err(MmdrezError::NotFound(out_dir));
    }

    let mut reader = BufReader::new(File::open(input)?);
    let header = ContainerHeader::read_from(&mut reader)?;
    let recipient = parse_private_key(private_key_pem)?;
    let mut tmp = temp_file_in(&out_dir)?;

    // Unbuffered: a BufWriter would keep plaintext copies we cannot zeroize.
    let (file_name, summary) =
        decrypt_records(header, &mut reader, tmp.as_file_mut(), &recipient)?;
    tmp.as_file().sync_all()?;

    let final_path = out_dir.join(&file_name);
    tmp.persist(&final_path).map_err(|e| MmdrezError::Io(e.error))?;

    tracing::info!(
        input = %input.display(),
        output = %final_path.display(),
        chunks = summary.chunks,
        bytes = summary.bytes,
        "file decrypted"
    );
    Ok(PathOutcome {
        path: final_path,
        summary,
    })
}

/// Parse the header and walk the chunk records of a container without
/// decrypting anything.
pub fn inspect<R: Read>(reader: &mut R) -> MmdrezResult<ContainerInfo> {
    let header = ContainerHeader::read_from(reader)?;
    let mut chunks = 0u64;
    let mut plaintext_len = 0u64;

    while let Some(len) = read_chunk_len(reader)? {
        if len > header.chunk_size {
            return Err(MmdrezError::invalid_format(format!(
                "chunk {chunks} is {len} bytes, larger than chunk size {}",
                header.chunk_size
            )));
        }
        let skip = u64::from(len) + TAG_SIZE as u64;
        let skipped = std::io::copy(&mut reader.by_ref().take(skip), &mut std::io::sink())?;
        if skipped != skip {
            return Err(MmdrezError::invalid_format("truncated chunk record"));
        }
        chunks += 1;
        plaintext_len += u64::from(len);
    }

    Ok(ContainerInfo {
        header: header.summary(),
        chunks,
        plaintext_len,
    })
}
