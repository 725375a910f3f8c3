use log::trace;
use popen_core::{FileMode, OsErrorKind, PopenError, Result, StdStream, StreamIntent, Streams};
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::fd::make_cloexec_pipe;

/// Permission bits for files created by a `File` intent.
const CREATE_MODE: u32 = 0o640;

/// The descriptor a child installs into a standard slot.
#[derive(Debug)]
enum ChildEnd {
    /// Caller's descriptor. Never closed by us.
    Borrowed(RawFd),
    /// Opened for this launch; the parent drops it right after fork.
    Owned(OwnedFd),
}

impl ChildEnd {
    fn raw(&self) -> RawFd {
        match self {
            Self::Borrowed(fd) => *fd,
            Self::Owned(fd) => fd.as_raw_fd(),
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    parent: Option<OwnedFd>,
    child: Option<ChildEnd>,
}

/// Concrete descriptors for stdin, stdout and stderr, resolved before fork.
#[derive(Debug)]
pub(crate) struct StreamPlan {
    slots: [Slot; 3],
}

/// What the parent keeps after fork: its ends of the `Pipe` intents.
#[derive(Debug, Default)]
pub(crate) struct ParentEnds {
    pub(crate) stdin: Option<OwnedFd>,
    pub(crate) stdout: Option<OwnedFd>,
    pub(crate) stderr: Option<OwnedFd>,
}

impl StreamPlan {
    /// Open files and create pipes for every slot. On error, whatever was
    /// already opened is closed on drop.
    pub(crate) fn resolve(streams: &Streams) -> Result<Self> {
        let mut slots: [Slot; 3] = Default::default();
        for stream in StdStream::ALL {
            slots[stream.fileno() as usize] = resolve_slot(stream, streams.get(stream))?;
        }
        Ok(Self { slots })
    }

    /// Source descriptor per standard slot; `None` leaves the slot inherited.
    pub(crate) fn child_fds(&self) -> [Option<RawFd>; 3] {
        [0, 1, 2].map(|i| self.slots[i].child.as_ref().map(ChildEnd::raw))
    }

    /// Parent-held pipe ends per slot, for the child to close.
    pub(crate) fn parent_fds(&self) -> [Option<RawFd>; 3] {
        [0, 1, 2].map(|i| self.slots[i].parent.as_ref().map(AsRawFd::as_raw_fd))
    }

    /// Parent side of fork: close every child-held end we own and keep ours.
    pub(crate) fn into_parent_ends(self) -> ParentEnds {
        let [stdin, stdout, stderr] = self.slots.map(|slot| {
            if let Some(ChildEnd::Owned(fd)) = &slot.child {
                trace!("closing child end fd {}", fd.as_raw_fd());
            }
            slot.parent
        });
        ParentEnds {
            stdin,
            stdout,
            stderr,
        }
    }
}

fn resolve_slot(stream: StdStream, intent: &StreamIntent) -> Result<Slot> {
    let slot = match intent {
        StreamIntent::Inherit => Slot::default(),
        StreamIntent::Descriptor(fd) => {
            if *fd < 0 {
                return Err(PopenError::InvalidConfig(format!(
                    "{}: negative descriptor {fd}",
                    stream.name()
                )));
            }
            Slot {
                parent: None,
                child: Some(ChildEnd::Borrowed(*fd)),
            }
        }
        StreamIntent::File { path, mode } => {
            let mode = mode.unwrap_or(FileMode::default_for(stream));
            Slot {
                parent: None,
                child: Some(ChildEnd::Owned(open_file(path, mode)?)),
            }
        }
        StreamIntent::Pipe => {
            let (read, write) = make_cloexec_pipe()?;
            let (parent, child) = if stream.is_input() {
                (write, read)
            } else {
                (read, write)
            };
            trace!(
                "{} pipe: parent fd {}, child fd {}",
                stream.name(),
                parent.as_raw_fd(),
                child.as_raw_fd()
            );
            Slot {
                parent: Some(parent),
                child: Some(ChildEnd::Owned(child)),
            }
        }
    };
    Ok(slot)
}

/// std opens with O_CLOEXEC, so the file only reaches the child through
/// the dup2 onto its standard slot.
fn open_file(path: &Path, mode: FileMode) -> Result<OwnedFd> {
    let mut opts = OpenOptions::new();
    match mode {
        FileMode::Read => opts.read(true),
        FileMode::Append => opts.append(true).create(true),
        FileMode::Truncate => opts.write(true).create(true).truncate(true),
    };
    opts.mode(CREATE_MODE);
    let file = opts.open(path).map_err(|e| {
        PopenError::os(
            OsErrorKind::FileOpenFailed,
            io::Error::new(e.kind(), format!("{}: {e}", path.display())),
        )
    })?;
    Ok(file.into())
}
