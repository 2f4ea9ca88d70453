use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Change;

/// Upper bound on one record's payload. A length word above it is damage, not data.
const MAX_FRAME_LEN: u32 = 1 << 20;

/// Frame one change as `[u32 len][bincode payload][u32 crc32]`, little-endian.
fn write_frame(writer: &mut impl Write, change: &Change) -> io::Result<()> {
    let payload =
        bincode::serialize(change).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&len| len <= MAX_FRAME_LEN)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "WAL record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read `buf.len()` bytes, or report a clean end of log.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next intact payload, or `None` at the end of the log or at the first damaged frame.
fn read_frame(reader: &mut impl Read) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    if !read_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Ok(None);
    }
    let mut payload = vec![0u8; len as usize];
    if !read_or_eof(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_or_eof(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(Some(payload))
}

/// Intact prefix of a log file.
#[derive(Debug, Default)]
pub struct Replay {
    pub changes: Vec<Change>,
    /// Byte length of the intact frames; anything past it is a torn or corrupt tail.
    pub valid_len: u64,
}

/// Append-only change log backing the store.
///
/// A crash can leave a partial frame at the tail. Replay stops there, and
/// [`Wal::recover`] cuts the file back to the last intact frame before appending.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Replay `path`, truncate any damaged tail, and open it for appending.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Change>)> {
        let replay = Self::scan(path)?;
        if let Ok(meta) = fs::metadata(path)
            && meta.len() > replay.valid_len
        {
            warn!(
                path = %path.display(),
                dropped_bytes = meta.len() - replay.valid_len,
                "truncating damaged WAL tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }
        Ok((Self::open(path)?, replay.changes))
    }

    #[cfg(test)]
    pub fn append(&mut self, change: &Change) -> io::Result<()> {
        self.append_buffered(change)?;
        self.flush_sync()
    }

    /// Buffer a change. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, change: &Change) -> io::Result<()> {
        write_frame(&mut self.writer, change)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a replacement log next to `path` and fsync it. Slow; runs without
    /// holding up appends.
    pub fn write_compact_file(path: &Path, changes: &[Change]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_tmp_path(path))?);
        for change in changes {
            write_frame(&mut writer, change)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the replacement log over the live one and reopen for appending.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, changes: &[Change]) -> io::Result<()> {
        Self::write_compact_file(&self.path, changes)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// All intact changes in log order.
    #[cfg(test)]
    pub fn replay(path: &Path) -> io::Result<Vec<Change>> {
        Ok(Self::scan(path)?.changes)
    }

    /// Read frames up to the first damaged one. A missing file is an empty log.
    pub fn scan(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();
        while let Some(payload) = read_frame(&mut reader)? {
            let Ok(change) = bincode::deserialize::<Change>(&payload) else {
                break;
            };
            replay.changes.push(change);
            replay.valid_len += 8 + payload.len() as u64;
        }
        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventInfo, Span};
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("venuebook_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn venue(name: &str) -> Change {
        Change::VenueCreated {
            id: Ulid::new(),
            name: name.into(),
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let venue_id = Ulid::new();
        let changes = vec![
            Change::VenueCreated {
                id: venue_id,
                name: "Hall".into(),
            },
            Change::ReservationConfirmed {
                id: Ulid::new(),
                event_id: Ulid::new(),
                venue_id,
                zone_ids: vec![],
                span: Span::new(1000, 2000).unwrap(),
                comment: None,
            },
        ];
        {
            let mut wal = Wal::open(&path).unwrap();
            for c in &changes {
                wal.append(c).unwrap();
            }
        }
        assert_eq!(Wal::replay(&path).unwrap(), changes);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn truncated_tail_is_dropped() {
        let path = tmp_path("truncated_tail.wal");
        let first = venue("Hall");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![first]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn recover_cuts_torn_tail_before_appending() {
        let path = tmp_path("recover_torn_tail.wal");
        let first = venue("Hall");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        let intact = fs::metadata(&path).unwrap().len();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[200u8, 0, 0, 0, 1, 2]).unwrap();
        }

        let second = venue("Gym");
        {
            let (mut wal, changes) = Wal::recover(&path).unwrap();
            assert_eq!(changes, vec![first.clone()]);
            assert_eq!(fs::metadata(&path).unwrap().len(), intact);
            wal.append(&second).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![first, second]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn oversized_length_word_is_a_torn_tail() {
        let path = tmp_path("oversized_len.wal");
        let good = venue("Hall");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&u32::MAX.to_le_bytes()).unwrap();
            f.write_all(&[0u8; 16]).unwrap();
        }
        let replay = Wal::scan(&path).unwrap();
        assert_eq!(replay.changes, vec![good]);
        assert!(replay.valid_len < fs::metadata(&path).unwrap().len());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn oversized_record_is_not_written() {
        let path = tmp_path("oversized_record.wal");
        let mut wal = Wal::open(&path).unwrap();
        let huge = venue(&"x".repeat(MAX_FRAME_LEN as usize + 1));
        let err = wal.append(&huge).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        drop(wal);
        assert!(Wal::replay(&path).unwrap().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_empty_log() {
        let path = tmp_path("missing.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn bad_checksum_stops_replay() {
        let path = tmp_path("bad_crc.wal");
        let good = venue("Hall");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let payload = bincode::serialize(&venue("Gym")).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compaction_shrinks_and_keeps_appending() {
        let path = tmp_path("compaction.wal");
        let hall = venue("Hall");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&hall).unwrap();
            for _ in 0..20 {
                let id = Ulid::new();
                wal.append(&Change::event_created(&EventInfo::new(id, "Rehearsal", 0)))
                    .unwrap();
                wal.append(&Change::EventDeleted { id }).unwrap();
            }
        }
        let before = fs::metadata(&path).unwrap().len();

        let gym = venue("Gym");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.compact(std::slice::from_ref(&hall)).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
            wal.append(&gym).unwrap();
        }
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "{after} < {before}");
        assert_eq!(Wal::replay(&path).unwrap(), vec![hall, gym]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn buffered_appends_count_until_flush() {
        let path = tmp_path("buffered.wal");
        let changes: Vec<Change> = (0..5).map(|i| venue(&format!("V{i}"))).collect();
        {
            let mut wal = Wal::open(&path).unwrap();
            for c in &changes {
                wal.append_buffered(c).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 5);
            wal.flush_sync().unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), changes);
        let _ = fs::remove_file(&path);
    }
}
