use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;

use super::{CreateRequest, Frame, FrameError, Gateway, UhidFile, UHID_EVENT_SIZE};
use crate::capture::Capture;
use crate::error::Result;
use crate::signal::Signals;

/// How long `create` waits for the kernel's first answer to CREATE.
const CREATE_ACK_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("cannot open {}: {source}", path.display())]
    CannotOpen { path: PathBuf, source: io::Error },
    #[error("kernel rejected device creation: {0}")]
    CreateRejected(String),
    #[error("short write: {written} of {UHID_EVENT_SIZE} bytes")]
    TruncatedWrite { written: usize },
    #[error("short read: {read} of {UHID_EVENT_SIZE} bytes")]
    TruncatedRead { read: usize },
    #[error("gateway closed")]
    EndOfStream,
    #[error("device has not been created")]
    NotCreated,
    #[error("device already created")]
    AlreadyCreated,
    #[error("handle is unusable after an earlier fatal error")]
    Poisoned,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Strings presented to the kernel for the synthetic device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: String,
    pub phys: String,
    /// Stable per-device id, conventionally a `:`-separated MAC address.
    pub uniq: String,
}

impl DeviceIdentity {
    pub fn from_capture(capture: &Capture, uniq: impl Into<String>) -> Self {
        Self {
            name: capture.name.clone(),
            phys: capture.phys.clone(),
            uniq: uniq.into(),
        }
    }
}

/// Owner of one gateway descriptor for the lifetime of one synthetic device.
///
/// Single use: once destroyed, or once a write has failed, the handle no
/// longer touches the descriptor.
pub struct DeviceHandle<G: Gateway = UhidFile> {
    gateway: Option<G>,
    identity: Option<DeviceIdentity>,
    /// `uniq` set before CREATE, overriding the one passed to `create`.
    uniq: Option<String>,
    signals: Signals,
    pending: VecDeque<Frame>,
    created: bool,
    poisoned: bool,
}

impl DeviceHandle<UhidFile> {
    /// Open the gateway character device read/write.
    pub fn open(path: &Path) -> Result<Self> {
        let file = UhidFile::open(path).map_err(|source| GatewayError::CannotOpen {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Opened {}", path.display());
        Ok(Self::new(file))
    }
}

impl<G: Gateway> DeviceHandle<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            gateway: Some(gateway),
            identity: None,
            uniq: None,
            signals: Signals::new(),
            pending: VecDeque::new(),
            created: false,
            poisoned: false,
        }
    }

    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    /// Identity the device was created with.
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Change the `uniq` presented at CREATE. Fails once the device exists.
    pub fn set_uniq(&mut self, uniq: impl Into<String>) -> Result<()> {
        if self.created {
            return Err(GatewayError::AlreadyCreated.into());
        }
        self.uniq = Some(uniq.into());
        Ok(())
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Register the device with the kernel. The handle keeps `identity`
    /// from here on, so `uniq` can no longer change.
    ///
    /// Once CREATE is written the device counts as created, even when the
    /// kernel then rejects it, so `destroy` still sends DESTROY.
    pub fn create(&mut self, capture: &Capture, mut identity: DeviceIdentity) -> Result<()> {
        if self.created {
            return Err(GatewayError::AlreadyCreated.into());
        }
        if let Some(uniq) = &self.uniq {
            identity.uniq = uniq.clone();
        }

        let frame = Frame::Create(CreateRequest {
            name: identity.name.clone(),
            phys: identity.phys.clone(),
            uniq: identity.uniq.clone(),
            bus: capture.bus,
            vendor: capture.vendor_id.into(),
            product: capture.product_id.into(),
            version: capture.version.into(),
            country: capture.country.into(),
            descriptor: capture.descriptor.clone(),
        });

        match self.write_frame(&frame) {
            Ok(()) => {}
            Err(crate::Error::Gateway(GatewayError::Io(e))) => {
                return Err(GatewayError::CreateRejected(e.to_string()).into());
            }
            Err(e) => return Err(e),
        }
        log::debug!("CREATE written, uniq {}", identity.uniq);
        self.created = true;
        self.identity = Some(identity);

        // A STOP straight after CREATE means the kernel refused the
        // descriptor; anything else belongs to the event loop. Unknown tags
        // are skipped.
        let deadline = Instant::now() + CREATE_ACK_WAIT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.wait_readable(remaining)? {
                break;
            }
            match self.read_frame() {
                Ok(Frame::Stop) => {
                    return Err(GatewayError::CreateRejected("STOP after CREATE".into()).into());
                }
                Ok(frame) => {
                    self.pending.push_back(frame);
                    break;
                }
                Err(crate::Error::Protocol(FrameError::UnknownTag(tag))) => {
                    log::debug!("Skipping frame with unknown tag {} after CREATE", tag);
                }
                Err(e) => return Err(e),
            }
        }

        log::info!(
            "Created uhid device '{}' ({:04x}:{:04x})",
            capture.name,
            capture.vendor_id,
            capture.product_id
        );
        Ok(())
    }

    /// Write DESTROY and close the descriptor. Safe to call repeatedly.
    pub fn destroy(&mut self) -> Result<()> {
        if self.gateway.is_none() {
            return Ok(());
        }

        let result = if self.created && !self.poisoned {
            self.write_frame(&Frame::Destroy)
        } else {
            Ok(())
        };

        self.gateway = None;
        self.pending.clear();
        log::debug!("Device handle closed");
        result
    }

    /// Write one whole frame in a single call. No partial-write retry: a
    /// short write poisons the handle.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.poisoned {
            return Err(GatewayError::Poisoned.into());
        }
        let buf = frame.encode()?;
        let gateway = self.gateway.as_mut().ok_or(GatewayError::EndOfStream)?;

        let written = loop {
            match gateway.write(&buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.poisoned = true;
                    return Err(GatewayError::Io(e).into());
                }
            }
        };

        if written != UHID_EVENT_SIZE {
            self.poisoned = true;
            return Err(GatewayError::TruncatedWrite { written }.into());
        }
        log::trace!("-> {}", frame.event_type());
        Ok(())
    }

    /// Read one whole frame, blocking.
    pub fn read_frame(&mut self) -> Result<Frame> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }
        if self.poisoned {
            return Err(GatewayError::Poisoned.into());
        }
        let gateway = self.gateway.as_mut().ok_or(GatewayError::EndOfStream)?;

        let mut buf = vec![0u8; UHID_EVENT_SIZE];
        let read = loop {
            match gateway.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.poisoned = true;
                    return Err(GatewayError::Io(e).into());
                }
            }
        };

        if read == 0 {
            self.poisoned = true;
            return Err(GatewayError::EndOfStream.into());
        }
        if read < UHID_EVENT_SIZE {
            self.poisoned = true;
            return Err(GatewayError::TruncatedRead { read }.into());
        }

        let frame = Frame::decode(&buf)?;
        log::trace!("<- {}", frame.event_type());
        Ok(frame)
    }

    /// Wait up to `timeout` for a frame.
    pub fn wait_readable(&mut self, timeout: Duration) -> Result<bool> {
        if !self.pending.is_empty() {
            return Ok(true);
        }
        if self.poisoned {
            return Err(GatewayError::Poisoned.into());
        }
        let gateway = self.gateway.as_mut().ok_or(GatewayError::EndOfStream)?;
        match gateway.wait_readable(timeout) {
            Ok(ready) => Ok(ready),
            Err(e) => {
                self.poisoned = true;
                Err(GatewayError::Io(e).into())
            }
        }
    }

    /// Deliver one input report.
    pub fn inject(&mut self, report: &[u8]) -> Result<()> {
        if !self.created {
            return Err(GatewayError::NotCreated.into());
        }
        self.write_frame(&Frame::Input(report.to_vec()))
    }
}

impl<G: Gateway> Drop for DeviceHandle<G> {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            log::warn!("Failed to destroy device on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture;
    use crate::uhid::mock::MockGateway;
    use crate::Error;

    fn capture() -> Capture {
        capture::parse("# name test pad\n# info 3 054c 0268\nR 2 5 1\n").unwrap()
    }

    fn identity() -> DeviceIdentity {
        DeviceIdentity::from_capture(&capture(), "00:01:23:45:67:89")
    }

    #[test]
    fn test_create_writes_create2() {
        let mock = MockGateway::new();
        mock.queue_frame(&Frame::Start { dev_flags: 0 }).unwrap();
        let mut handle = DeviceHandle::new(mock.clone());

        handle.create(&capture(), identity()).unwrap();

        let frames = mock.written_frames();
        let Frame::Create(req) = &frames[0] else {
            panic!("expected CREATE, got {:?}", frames[0]);
        };
        assert_eq!(req.name, "test pad");
        assert_eq!(req.uniq, "00:01:23:45:67:89");
        assert_eq!(req.vendor, 0x054c);
        assert_eq!(req.descriptor, vec![5, 1]);

        // START is kept for the event loop.
        assert_eq!(handle.read_frame().unwrap(), Frame::Start { dev_flags: 0 });
    }

    #[test]
    fn test_stop_after_create_is_rejection() {
        let mock = MockGateway::new();
        mock.queue_frame(&Frame::Stop).unwrap();
        let mut handle = DeviceHandle::new(mock);

        let err = handle.create(&capture(), identity()).unwrap_err();
        assert!(matches!(err, Error::Gateway(GatewayError::CreateRejected(_))));
    }

    #[test]
    fn test_rejected_device_is_still_destroyed() {
        let mock = MockGateway::new();
        mock.queue_frame(&Frame::Stop).unwrap();
        let mut handle = DeviceHandle::new(mock.clone());

        assert!(handle.create(&capture(), identity()).is_err());
        assert!(handle.is_created());
        handle.destroy().unwrap();
        assert_eq!(mock.written_frames().last(), Some(&Frame::Destroy));
    }

    #[test]
    fn test_unknown_tag_after_create_is_skipped() {
        let mut legacy = vec![0u8; UHID_EVENT_SIZE];
        legacy[..4].copy_from_slice(&7u32.to_ne_bytes());

        let mock = MockGateway::new();
        mock.queue_raw(legacy);
        mock.queue_frame(&Frame::Start { dev_flags: 0 }).unwrap();
        let mut handle = DeviceHandle::new(mock.clone());

        handle.create(&capture(), identity()).unwrap();
        assert!(handle.is_created());
        assert_eq!(handle.read_frame().unwrap(), Frame::Start { dev_flags: 0 });
        assert_eq!(mock.pending_reads(), 0);
    }

    #[test]
    fn test_set_uniq_before_create() {
        let mock = MockGateway::new();
        let mut handle = DeviceHandle::new(mock.clone());

        handle.set_uniq("aa:bb:cc:dd:ee:ff").unwrap();
        handle.create(&capture(), identity()).unwrap();

        assert_eq!(handle.identity().unwrap().uniq, "aa:bb:cc:dd:ee:ff");
        let Frame::Create(req) = &mock.written_frames()[0] else {
            panic!("expected CREATE");
        };
        assert_eq!(req.uniq, "aa:bb:cc:dd:ee:ff");

        let err = handle.set_uniq("00:00:00:00:00:00").unwrap_err();
        assert!(matches!(err, Error::Gateway(GatewayError::AlreadyCreated)));
        assert_eq!(handle.identity().unwrap().uniq, "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_failed_create_write_is_rejection() {
        let mock = MockGateway::new();
        mock.fail_write(0, io::ErrorKind::InvalidInput);
        let mut handle = DeviceHandle::new(mock);

        let err = handle.create(&capture(), identity()).unwrap_err();
        assert!(matches!(err, Error::Gateway(GatewayError::CreateRejected(_))));
    }

    #[test]
    fn test_inject_requires_create() {
        let mut handle = DeviceHandle::new(MockGateway::new());
        let err = handle.inject(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::Gateway(GatewayError::NotCreated)));
    }

    #[test]
    fn test_truncated_write_poisons_handle() {
        let mock = MockGateway::new();
        mock.queue_frame(&Frame::Start { dev_flags: 0 }).unwrap();
        mock.truncate_write(1, UHID_EVENT_SIZE - 1);
        let mut handle = DeviceHandle::new(mock.clone());
        handle.create(&capture(), identity()).unwrap();

        let err = handle.inject(&[1]).unwrap_err();
        assert!(matches!(
            err,
            Error::Gateway(GatewayError::TruncatedWrite { written })
                if written == UHID_EVENT_SIZE - 1
        ));
        assert!(handle.is_poisoned());

        let calls = mock.write_calls();
        let err = handle.inject(&[2]).unwrap_err();
        assert!(matches!(err, Error::Gateway(GatewayError::Poisoned)));
        assert_eq!(mock.write_calls(), calls);

        // No DESTROY on a poisoned handle either.
        handle.destroy().unwrap();
        assert_eq!(mock.write_calls(), calls);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mock = MockGateway::new();
        let mut handle = DeviceHandle::new(mock.clone());
        handle.create(&capture(), identity()).unwrap();

        handle.destroy().unwrap();
        handle.destroy().unwrap();
        drop(handle);

        let frames = mock.written_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], Frame::Destroy);
    }

    #[test]
    fn test_read_errors() {
        let mock = MockGateway::new();
        mock.queue_raw(vec![0u8; 12]);
        let mut handle = DeviceHandle::new(mock);
        let err = handle.read_frame().unwrap_err();
        assert!(matches!(err, Error::Gateway(GatewayError::TruncatedRead { read: 12 })));

        let mock = MockGateway::new();
        mock.queue_eof();
        let mut handle = DeviceHandle::new(mock);
        let err = handle.read_frame().unwrap_err();
        assert!(matches!(err, Error::Gateway(GatewayError::EndOfStream)));
    }

    #[test]
    fn test_second_create_rejected() {
        let mut handle = DeviceHandle::new(MockGateway::new());
        let mut id = identity();
        id.uniq = "aa:bb:cc:dd:ee:ff".into();

        handle.create(&capture(), id).unwrap();
        assert_eq!(handle.identity().unwrap().uniq, "aa:bb:cc:dd:ee:ff");

        let err = handle.create(&capture(), identity()).unwrap_err();
        assert!(matches!(err, Error::Gateway(GatewayError::AlreadyCreated)));
        assert_eq!(handle.identity().unwrap().uniq, "aa:bb:cc:dd:ee:ff");
    }
}
