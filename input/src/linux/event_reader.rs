use crate::capability::{AbsInfo, Bitmap, CapabilitySource};
use crate::event::DeviceIdentity;
use crate::linux::glue;
use libc::c_ulong;
use nix::poll::{poll, PollFd, PollFlags};
use std::fs::{File, OpenOptions};
use std::io::{Error, ErrorKind, Read};
use std::mem;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::time::Duration;

const NAME_SIZE: usize = 256;

/// A physical input device node, opened read-only.
pub struct SourceDevice {
    file: File,
    poll_timeout: Option<Duration>,
}

impl SourceDevice {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = OpenOptions::new().read(true).open(path)?;

        Ok(Self {
            file,
            poll_timeout: None,
        })
    }

    pub fn identity(&self) -> Result<DeviceIdentity, Error> {
        let mut id = glue::input_id::default();
        unsafe { glue::eviocgid(self.fd(), &mut id) }?;

        let mut name = [0u8; NAME_SIZE];
        unsafe { glue::eviocgname(self.fd(), &mut name) }?;
        let len = name.iter().position(|byte| *byte == 0).unwrap_or(NAME_SIZE);

        Ok(DeviceIdentity {
            name: String::from_utf8_lossy(&name[..len]).into_owned(),
            bustype: id.bustype,
            vendor: id.vendor,
            product: id.product,
            version: id.version,
        })
    }

    /// Takes the device for ourselves; nobody else receives its events until the handle is
    /// closed.
    pub fn grab(&mut self) -> Result<(), Error> {
        unsafe { glue::eviocgrab(self.fd(), 1) }?;
        Ok(())
    }

    /// Bounds how long a read may wait for the device. A read that times out fails with
    /// `ErrorKind::WouldBlock` without consuming anything.
    pub fn set_poll_timeout(&mut self, timeout: Option<Duration>) {
        self.poll_timeout = timeout;
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Read for SourceDevice {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if let Some(timeout) = self.poll_timeout {
            let mut fds = [PollFd::new(self.fd(), PollFlags::POLLIN)];
            let timeout = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
            if poll(&mut fds, timeout)? == 0 {
                return Err(ErrorKind::WouldBlock.into());
            }
        }

        self.file.read(buf)
    }
}

impl CapabilitySource for SourceDevice {
    fn query_bits(&self, type_: u16, bitmap: &mut Bitmap) -> Result<(), Error> {
        let word_bits = mem::size_of::<c_ulong>() * 8;
        let bits = bitmap.max() as usize + 1;
        let mut words = vec![0 as c_ulong; (bits + word_bits - 1) / word_bits];
        unsafe { glue::eviocgbit(self.fd(), type_, &mut words) }?;

        bitmap.clear();
        for code in 0..bits {
            if words[code / word_bits] & (1 << (code % word_bits)) != 0 {
                bitmap.insert(code as u16);
            }
        }

        Ok(())
    }

    fn query_abs_info(&self, code: u16) -> Result<AbsInfo, Error> {
        let mut info = glue::input_absinfo::default();
        unsafe { glue::eviocgabs(self.fd(), code, &mut info) }?;
        Ok(info.into())
    }
}
