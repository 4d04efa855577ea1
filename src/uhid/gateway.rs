use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::Duration;

/// Byte transport to the kernel side of a uhid device.
///
/// Reads and writes are whole frames; `wait_readable` lets the event loop
/// interleave replay writes with kernel traffic on a single thread.
pub trait Gateway: Read + Write {
    /// Wait up to `timeout` for a frame to become readable.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;
}

/// The `/dev/uhid` character device.
pub struct UhidFile {
    file: File,
}

impl UhidFile {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }
}

impl Read for UhidFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for UhidFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Gateway for UhidFile {
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = timeout
            .as_micros()
            .div_ceil(1000)
            .min(libc::c_int::MAX as u128) as libc::c_int;

        loop {
            let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            // POLLHUP/POLLERR also count: the following read reports them.
            return Ok(ret > 0);
        }
    }
}
