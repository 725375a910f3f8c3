use popen_core::BufferMode;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, IoSlice, IoSliceMut, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use crate::plan::ParentEnds;

/// Parent's write end of the child's stdin.
///
/// Dropping it closes the pipe, which is how the child sees end-of-input.
/// A buffered handle flushes on drop and ignores errors doing so; call
/// [`Write::flush`] first to observe them.
#[derive(Debug)]
pub struct PipeWriter(Writer);

#[derive(Debug)]
enum Writer {
    Direct(File),
    Buffered(BufWriter<File>),
}

/// Parent's read end of the child's stdout or stderr.
#[derive(Debug)]
pub struct PipeReader(Reader);

#[derive(Debug)]
enum Reader {
    Direct(File),
    Buffered(BufReader<File>),
}

pub type ChildStdin = PipeWriter;
pub type ChildStdout = PipeReader;
pub type ChildStderr = PipeReader;

impl PipeWriter {
    pub(crate) fn new(fd: OwnedFd, mode: BufferMode) -> Self {
        let file = File::from(fd);
        match mode.capacity() {
            Some(cap) => Self(Writer::Buffered(BufWriter::with_capacity(cap, file))),
            None => Self(Writer::Direct(file)),
        }
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self.0, Writer::Buffered(_))
    }

    fn file(&self) -> &File {
        match &self.0 {
            Writer::Direct(f) => f,
            Writer::Buffered(w) => w.get_ref(),
        }
    }
}

impl PipeReader {
    pub(crate) fn new(fd: OwnedFd, mode: BufferMode) -> Self {
        let file = File::from(fd);
        match mode.capacity() {
            Some(cap) => Self(Reader::Buffered(BufReader::with_capacity(cap, file))),
            None => Self(Reader::Direct(file)),
        }
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self.0, Reader::Buffered(_))
    }

    fn file(&self) -> &File {
        match &self.0 {
            Reader::Direct(f) => f,
            Reader::Buffered(r) => r.get_ref(),
        }
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.0 {
            Writer::Direct(f) => f.write(buf),
            Writer::Buffered(w) => w.write(buf),
        }
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        match &mut self.0 {
            Writer::Direct(f) => f.write_vectored(bufs),
            Writer::Buffered(w) => w.write_vectored(bufs),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.0 {
            Writer::Direct(f) => f.flush(),
            Writer::Buffered(w) => w.flush(),
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.0 {
            Reader::Direct(f) => f.read(buf),
            Reader::Buffered(r) => r.read(buf),
        }
    }

    fn read_vectored(&mut self, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize> {
        match &mut self.0 {
            Reader::Direct(f) => f.read_vectored(bufs),
            Reader::Buffered(r) => r.read_vectored(bufs),
        }
    }
}

impl AsFd for PipeWriter {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file().as_fd()
    }
}

impl AsRawFd for PipeWriter {
    fn as_raw_fd(&self) -> RawFd {
        self.file().as_raw_fd()
    }
}

impl AsFd for PipeReader {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file().as_fd()
    }
}

impl AsRawFd for PipeReader {
    fn as_raw_fd(&self) -> RawFd {
        self.file().as_raw_fd()
    }
}

/// Wrap whatever pipe ends the parent kept. Slots that were not `Pipe`
/// intents get no handle.
pub(crate) fn wrap(
    ends: ParentEnds,
    mode: BufferMode,
) -> (Option<ChildStdin>, Option<ChildStdout>, Option<ChildStderr>) {
    (
        ends.stdin.map(|fd| PipeWriter::new(fd, mode)),
        ends.stdout.map(|fd| PipeReader::new(fd, mode)),
        ends.stderr.map(|fd| PipeReader::new(fd, mode)),
    )
}
