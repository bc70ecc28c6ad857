use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicBool, Ordering};

use super::encoding::Encoding;

/// Read buffer per open record stream. A merge task holds two of these.
const READ_BUF_SIZE: usize = 256 * 1024;

/// Write buffer per record sink.
const WRITE_BUF_SIZE: usize = 256 * 1024;

/// Track whether O_NOATIME is supported to avoid repeated failed open() attempts.
/// After the first EPERM, we never try O_NOATIME again (saves one syscall per file).
#[cfg(target_os = "linux")]
static NOATIME_SUPPORTED: AtomicBool = AtomicBool::new(true);

/// Open a file with O_NOATIME on Linux to avoid atime inode writes.
/// Caches whether O_NOATIME works to avoid double-open on every file.
#[cfg(target_os = "linux")]
fn open_noatime(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    if NOATIME_SUPPORTED.load(Ordering::Relaxed) {
        match fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOATIME)
            .open(path)
        {
            Ok(f) => return Ok(f),
            Err(ref e) if e.raw_os_error() == Some(libc::EPERM) => {
                // O_NOATIME requires file ownership or CAP_FOWNER
                NOATIME_SUPPORTED.store(false, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }
    }
    File::open(path)
}

#[cfg(not(target_os = "linux"))]
fn open_noatime(path: &Path) -> io::Result<File> {
    File::open(path)
}

/// Streaming reader of `\n`-terminated records under a character encoding.
///
/// By default a `\r` immediately before the terminator is stripped, so CRLF
/// sources read like LF ones. A trailing line with no terminator is still
/// returned as a record.
pub struct RecordReader<R> {
    inner: R,
    encoding: Encoding,
    strip_cr: bool,
    line: Vec<u8>,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R, encoding: Encoding) -> Self {
        RecordReader {
            inner,
            encoding,
            strip_cr: true,
            line: Vec::with_capacity(256),
        }
    }

    /// Reader for files written by [`RecordWriter`]: every byte before the
    /// `\n` belongs to the record, a trailing `\r` included.
    pub fn raw(inner: R, encoding: Encoding) -> Self {
        RecordReader {
            strip_cr: false,
            ..RecordReader::new(inner, encoding)
        }
    }

    /// Next decoded record, or `None` at end of input.
    pub fn next_record(&mut self) -> io::Result<Option<String>> {
        if !self.fill_line()? {
            return Ok(None);
        }
        if self.strip_cr && self.line.last() == Some(&b'\r') {
            self.line.pop();
        }
        self.encoding.decode(&self.line).map(Some)
    }

    /// Scan the buffered input for the next terminator with memchr, copying
    /// the raw line into `self.line`. Returns false at clean EOF.
    fn fill_line(&mut self) -> io::Result<bool> {
        self.line.clear();
        loop {
            let available = match self.inner.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(!self.line.is_empty());
            }
            match memchr::memchr(b'\n', available) {
                Some(pos) => {
                    self.line.extend_from_slice(&available[..pos]);
                    self.inner.consume(pos + 1);
                    return Ok(true);
                }
                None => {
                    let n = available.len();
                    self.line.extend_from_slice(available);
                    self.inner.consume(n);
                }
            }
        }
    }
}

impl RecordReader<BufReader<File>> {
    /// Open a source file for sequential record reading.
    pub fn open(path: &Path, encoding: Encoding) -> io::Result<Self> {
        let file = open_noatime(path)?;
        Ok(RecordReader::new(
            BufReader::with_capacity(READ_BUF_SIZE, file),
            encoding,
        ))
    }

    /// Open a file this crate wrote itself; see [`RecordReader::raw`].
    pub fn open_raw(path: &Path, encoding: Encoding) -> io::Result<Self> {
        let file = open_noatime(path)?;
        Ok(RecordReader::raw(
            BufReader::with_capacity(READ_BUF_SIZE, file),
            encoding,
        ))
    }
}

/// Buffered writer of records, one per line, each terminated by `\n`.
pub struct RecordWriter<W: Write> {
    inner: BufWriter<W>,
    encoding: Encoding,
    scratch: Vec<u8>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W, encoding: Encoding) -> Self {
        RecordWriter {
            inner: BufWriter::with_capacity(WRITE_BUF_SIZE, inner),
            encoding,
            scratch: Vec::with_capacity(256),
        }
    }

    pub fn write_record(&mut self, record: &str) -> io::Result<()> {
        self.scratch.clear();
        self.encoding.encode_into(record, &mut self.scratch)?;
        self.scratch.push(b'\n');
        self.inner.write_all(&self.scratch)
    }

    /// Flush buffered output and hand back the underlying writer.
    pub fn finish(self) -> io::Result<W> {
        self.inner.into_inner().map_err(|e| e.into_error())
    }
}

impl RecordWriter<File> {
    /// Create (or truncate) `path` for record output.
    pub fn create(path: &Path, encoding: Encoding) -> io::Result<Self> {
        Ok(RecordWriter::new(File::create(path)?, encoding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn records(data: &[u8]) -> Vec<String> {
        let mut reader = RecordReader::new(Cursor::new(data.to_vec()), Encoding::Utf8);
        let mut out = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            out.push(record);
        }
        out
    }

    #[test]
    fn test_reader_terminators() {
        assert_eq!(records(b"a\nb\n"), ["a", "b"]);
        assert_eq!(records(b"a\r\nb"), ["a", "b"]);
        assert_eq!(records(b"\n\n"), ["", ""]);
        assert!(records(b"").is_empty());
    }

    #[test]
    fn test_reader_small_buffer() {
        let data = b"first line\nsecond\n";
        let inner = BufReader::with_capacity(4, Cursor::new(data.to_vec()));
        let mut reader = RecordReader::new(inner, Encoding::Utf8);
        assert_eq!(reader.next_record().unwrap().as_deref(), Some("first line"));
        assert_eq!(reader.next_record().unwrap().as_deref(), Some("second"));
        assert_eq!(reader.next_record().unwrap(), None);
    }

    #[test]
    fn test_raw_reader_keeps_trailing_cr() {
        let mut writer = RecordWriter::new(Vec::new(), Encoding::Utf8);
        writer.write_record("a\r").unwrap();
        writer.write_record("b").unwrap();
        let written = writer.finish().unwrap();

        let mut reader = RecordReader::raw(Cursor::new(written.clone()), Encoding::Utf8);
        assert_eq!(reader.next_record().unwrap().as_deref(), Some("a\r"));
        assert_eq!(reader.next_record().unwrap().as_deref(), Some("b"));
        assert_eq!(reader.next_record().unwrap(), None);

        assert_eq!(records(&written), ["a", "b"]);
    }

    #[test]
    fn test_writer_terminates_every_record() {
        let mut writer = RecordWriter::new(Vec::new(), Encoding::Latin1);
        writer.write_record("zé").unwrap();
        writer.write_record("").unwrap();
        assert_eq!(writer.finish().unwrap(), b"z\xe9\n\n");
    }
}
