//! Write-ahead log for durable version chains.
//!
//! Records are framed as a tag byte, a length-prefixed entity key, an
//! optional length-prefixed bincode payload, and a big-endian commit
//! timestamp in microseconds. Replaying the log in order reconstructs the
//! exact current and history stores, because every record carries the
//! timestamp the coordinator committed with.

use crate::config::SyncMode;
use crate::error::{ChronicaError, Result};
use crate::types::{Payload, Timestamp};
use bytes::{BufMut, Bytes, BytesMut};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// WAL configuration.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Suggest compaction once the file exceeds this many bytes.
    pub rewrite_size_threshold: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            rewrite_size_threshold: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// A logged coordinator operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WalCommand {
    Insert {
        key: Bytes,
        payload: Payload,
        at: Timestamp,
    },
    Update {
        key: Bytes,
        payload: Payload,
        at: Timestamp,
    },
    Delete {
        key: Bytes,
        at: Timestamp,
    },
}

/// Append-only log file with buffered writes and explicit sync control.
pub struct WalFile {
    file: File,
    writer: BufWriter<File>,
    path: PathBuf,
    size: u64,
    config: WalConfig,
    rewrite_in_progress: bool,
    scratch: BytesMut,
}

const SCRATCH_INITIAL_CAPACITY: usize = 8 * 1024;
const SCRATCH_SHRINK_THRESHOLD: usize = 1 << 20;

impl WalFile {
    const TAG_INSERT: u8 = 0;
    const TAG_UPDATE: u8 = 1;
    const TAG_DELETE: u8 = 2;

    /// Open a WAL file with default configuration.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, WalConfig::default())
    }

    /// Open a WAL file with custom configuration.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: WalConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let size = file.metadata()?.len();
        let writer_file = file.try_clone()?;
        let writer = BufWriter::new(writer_file);

        Ok(WalFile {
            file,
            writer,
            path,
            size,
            config,
            rewrite_in_progress: false,
            scratch: BytesMut::with_capacity(SCRATCH_INITIAL_CAPACITY),
        })
    }

    /// Current file size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the file has outgrown the configured compaction threshold.
    pub fn needs_compaction(&self) -> bool {
        !self.rewrite_in_progress && self.size >= self.config.rewrite_size_threshold
    }

    pub fn write_insert(&mut self, key: &Bytes, payload: &Payload, at: Timestamp) -> Result<()> {
        self.write_command(&WalCommand::Insert {
            key: key.clone(),
            payload: payload.clone(),
            at,
        })
    }

    pub fn write_update(&mut self, key: &Bytes, payload: &Payload, at: Timestamp) -> Result<()> {
        self.write_command(&WalCommand::Update {
            key: key.clone(),
            payload: payload.clone(),
            at,
        })
    }

    pub fn write_delete(&mut self, key: &Bytes, at: Timestamp) -> Result<()> {
        self.write_command(&WalCommand::Delete {
            key: key.clone(),
            at,
        })
    }

    /// Append a command to the log.
    pub fn write_command(&mut self, command: &WalCommand) -> Result<()> {
        if self.rewrite_in_progress {
            return Err(ChronicaError::RewriteInProgress);
        }

        let written_len = self.serialize_command(command)?;
        self.writer.write_all(&self.scratch[..written_len])?;
        self.size += written_len as u64;

        if self.scratch.capacity() > SCRATCH_SHRINK_THRESHOLD
            && written_len <= SCRATCH_INITIAL_CAPACITY
        {
            self.scratch = BytesMut::with_capacity(SCRATCH_INITIAL_CAPACITY);
        }

        Ok(())
    }

    /// Serialize a command into the reusable scratch buffer.
    fn serialize_command(&mut self, command: &WalCommand) -> Result<usize> {
        self.scratch.clear();

        match command {
            WalCommand::Insert { key, payload, at } | WalCommand::Update { key, payload, at } => {
                let tag = if matches!(command, WalCommand::Insert { .. }) {
                    Self::TAG_INSERT
                } else {
                    Self::TAG_UPDATE
                };
                let encoded = bincode::serialize(payload)
                    .map_err(|e| ChronicaError::Serialization(e.to_string()))?;

                let needed = 1 + 4 + key.len() + 4 + encoded.len() + 8;
                if self.scratch.capacity() < needed {
                    self.scratch.reserve(needed - self.scratch.capacity());
                }
                let buf = &mut self.scratch;

                buf.put_u8(tag);
                buf.put_u32(key.len() as u32);
                buf.put(key.as_ref());
                buf.put_u32(encoded.len() as u32);
                buf.put(encoded.as_slice());
                buf.put_u64(at.as_micros());

                Ok(buf.len())
            }
            WalCommand::Delete { key, at } => {
                let needed = 1 + 4 + key.len() + 8;
                if self.scratch.capacity() < needed {
                    self.scratch.reserve(needed - self.scratch.capacity());
                }
                let buf = &mut self.scratch;

                buf.put_u8(Self::TAG_DELETE);
                buf.put_u32(key.len() as u32);
                buf.put(key.as_ref());
                buf.put_u64(at.as_micros());

                Ok(buf.len())
            }
        }
    }

    /// Replay all commands in append order.
    pub fn replay(&mut self) -> Result<Vec<WalCommand>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut self.file);
        let mut commands = Vec::new();

        loop {
            match Self::deserialize_command(&mut reader) {
                Ok(command) => commands.push(command),
                Err(ChronicaError::UnexpectedEof) => break, // End of file
                Err(e) => return Err(e),
            }
        }

        Ok(commands)
    }

    fn deserialize_command(reader: &mut BufReader<&mut File>) -> Result<WalCommand> {
        let mut tag_buf = [0u8; 1];
        if reader.read_exact(&mut tag_buf).is_err() {
            return Err(ChronicaError::UnexpectedEof);
        }

        match tag_buf[0] {
            Self::TAG_INSERT | Self::TAG_UPDATE => {
                let tag = tag_buf[0];
                let key = Self::read_bytes(reader)?;
                let encoded = Self::read_bytes(reader)?;
                let payload: Payload = bincode::deserialize(&encoded)
                    .map_err(|e| ChronicaError::Serialization(e.to_string()))?;
                let at = Self::read_timestamp(reader)?;

                if tag == Self::TAG_INSERT {
                    Ok(WalCommand::Insert { key, payload, at })
                } else {
                    Ok(WalCommand::Update { key, payload, at })
                }
            }
            Self::TAG_DELETE => {
                let key = Self::read_bytes(reader)?;
                let at = Self::read_timestamp(reader)?;
                Ok(WalCommand::Delete { key, at })
            }
            _ => Err(ChronicaError::InvalidFormat),
        }
    }

    fn read_bytes(reader: &mut BufReader<&mut File>) -> Result<Bytes> {
        let mut len_buf = [0u8; 4];
        Self::read_or_eof(reader, &mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut buf = vec![0u8; len];
        Self::read_or_eof(reader, &mut buf)?;

        Ok(Bytes::from(buf))
    }

    fn read_timestamp(reader: &mut BufReader<&mut File>) -> Result<Timestamp> {
        let mut ts_buf = [0u8; 8];
        Self::read_or_eof(reader, &mut ts_buf)?;
        Ok(Timestamp::from_micros(u64::from_be_bytes(ts_buf)))
    }

    // EOF inside a record is a torn tail, not a clean end of log.
    fn read_or_eof(reader: &mut BufReader<&mut File>, buf: &mut [u8]) -> Result<()> {
        reader.read_exact(buf).map_err(|err| match err.kind() {
            std::io::ErrorKind::UnexpectedEof => ChronicaError::InvalidFormat,
            _ => ChronicaError::from(err),
        })
    }

    /// Replace the log with a compacted command stream.
    ///
    /// Writes the commands to a sibling file, syncs it, then atomically
    /// renames it over the current log before reopening handles.
    pub(crate) fn rewrite(&mut self, commands: &[WalCommand]) -> Result<()> {
        if self.rewrite_in_progress {
            return Err(ChronicaError::RewriteInProgress);
        }

        self.rewrite_in_progress = true;

        let result = (|| {
            self.writer.flush()?;
            self.file.sync_all()?;

            let rewrite_path = self.path.with_extension("wal.rewrite");
            let _ = std::fs::remove_file(&rewrite_path);
            let mut rewrite_file = Self::open_with_config(&rewrite_path, self.config.clone())?;

            for command in commands {
                rewrite_file.write_command(command)?;
            }
            rewrite_file.flush()?;
            rewrite_file.sync()?;
            drop(rewrite_file);

            std::fs::rename(&rewrite_path, &self.path)?;

            let new_file = OpenOptions::new()
                .create(true)
                .append(true)
                .read(true)
                .open(&self.path)?;

            let new_size = new_file.metadata()?.len();
            let writer_file = new_file.try_clone()?;

            log::info!(
                "compacted WAL {:?}: {} -> {} bytes ({} commands)",
                self.path,
                self.size,
                new_size,
                commands.len()
            );

            self.file = new_file;
            self.writer = BufWriter::new(writer_file);
            self.size = new_size;

            Ok(())
        })();

        self.rewrite_in_progress = false;

        result
    }

    /// Flush buffered writes to the OS.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and sync to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.sync_with_mode(SyncMode::All)
    }

    /// Flush and sync using the provided mode.
    pub fn sync_with_mode(&mut self, mode: SyncMode) -> Result<()> {
        self.writer.flush()?;
        match mode {
            SyncMode::All => self.file.sync_all()?,
            SyncMode::Data => self.file.sync_data()?,
        }
        Ok(())
    }

    /// The file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WalFile {
    fn drop(&mut self) {
        // Best effort flush on drop, ignore errors
        let _ = self.writer.flush();
    }
}
