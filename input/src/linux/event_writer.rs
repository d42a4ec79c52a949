use crate::capability::{AbsInfo, CapabilitySet, Declaration};
use crate::channel::EventSink;
use crate::event::{DeviceIdentity, InputEvent, EV_ABS, EV_KEY, EV_MSC, EV_REL, EV_SYN};
use crate::linux::event::RAW_EVENT_SIZE;
use crate::linux::glue;
use nix::errno::Errno;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Error, ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::thread;
use std::time::Duration;
use thiserror::Error;

pub const UINPUT_PATH: &str = "/dev/uinput";

/// Step of virtual device creation, for error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateStep {
    Open,
    Setup,
    Declare(Declaration),
    Create,
}

impl fmt::Display for CreateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateStep::Open => write!(f, "opening {}", UINPUT_PATH),
            CreateStep::Setup => write!(f, "declaring device identity"),
            CreateStep::Declare(Declaration::EventType(type_)) => {
                write!(f, "declaring event type {:#x}", type_)
            }
            CreateStep::Declare(Declaration::Key(code)) => write!(f, "declaring key {:#x}", code),
            CreateStep::Declare(Declaration::Rel(code)) => {
                write!(f, "declaring relative axis {:#x}", code)
            }
            CreateStep::Declare(Declaration::Abs { code, .. }) => {
                write!(f, "declaring absolute axis {:#x}", code)
            }
            CreateStep::Declare(Declaration::Misc(code)) => {
                write!(f, "declaring misc event {:#x}", code)
            }
            CreateStep::Create => write!(f, "creating device"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct CreateError {
    pub step: CreateStep,
    #[source]
    pub source: Error,
}

impl CreateError {
    fn at(step: CreateStep) -> impl FnOnce(Error) -> Self {
        move |source| CreateError { step, source }
    }
}

/// A uinput device. Destroyed exactly once: through `destroy`, or when dropped.
pub struct VirtualDevice {
    file: File,
    created: bool,
}

impl VirtualDevice {
    /// Creates a device carrying exactly `capabilities`, then waits `settle` so the new node
    /// has a chance to show up before anyone looks for it. The wait is a best effort, the kernel
    /// does not tell us when the device is visible.
    pub fn create(
        identity: &DeviceIdentity,
        capabilities: &CapabilitySet,
        settle: Duration,
    ) -> Result<Self, CreateError> {
        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(UINPUT_PATH)
            .map_err(CreateError::at(CreateStep::Open))?;
        let fd = file.as_raw_fd();

        let setup = raw_setup(identity);
        unsafe { glue::ui_dev_setup(fd, &setup) }
            .map_err(|errno| CreateError::at(CreateStep::Setup)(errno.into()))?;

        let mut uinput = Uinput(fd);
        for declaration in capabilities.declarations() {
            declare(&mut uinput, &declaration)
                .map_err(|errno| CreateError::at(CreateStep::Declare(declaration))(errno.into()))?;
        }

        unsafe { glue::ui_dev_create(fd) }
            .map_err(|errno| CreateError::at(CreateStep::Create)(errno.into()))?;

        log::debug!("Created virtual device \"{}\"", identity.name);
        thread::sleep(settle);

        Ok(Self {
            file,
            created: true,
        })
    }

    pub fn destroy(mut self) -> Result<(), Error> {
        self.destroy_device()
    }

    fn destroy_device(&mut self) -> Result<(), Error> {
        if !self.created {
            return Ok(());
        }

        self.created = false;
        unsafe { glue::ui_dev_destroy(self.file.as_raw_fd()) }?;
        Ok(())
    }
}

impl EventSink for VirtualDevice {
    fn write_event(&mut self, event: &InputEvent) -> Result<(), Error> {
        // The FD is nonblocking, so a full kernel buffer shows up here as WouldBlock and the
        // event is dropped.
        let written = self.file.write(&event.to_bytes())?;
        if written != RAW_EVENT_SIZE {
            return Err(Error::new(
                ErrorKind::WriteZero,
                format!("short write to {} ({} bytes)", UINPUT_PATH, written),
            ));
        }

        Ok(())
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        if let Err(err) = self.destroy_device() {
            log::warn!("Failed to destroy virtual device: {}", err);
        }
    }
}

fn raw_setup(identity: &DeviceIdentity) -> glue::uinput_setup {
    let mut name = [0; glue::UINPUT_MAX_NAME_SIZE];
    // Leave room for the terminator, and stop at any NUL the name might carry.
    let bytes = identity.name.bytes().take_while(|byte| *byte != 0);
    for (slot, byte) in name[..glue::UINPUT_MAX_NAME_SIZE - 1].iter_mut().zip(bytes) {
        *slot = byte as libc::c_char;
    }

    glue::uinput_setup {
        id: glue::input_id {
            bustype: identity.bustype,
            vendor: identity.vendor,
            product: identity.product,
            version: identity.version,
        },
        name,
        ff_effects_max: 0,
    }
}

/// The capability calls made on a uinput file descriptor before `UI_DEV_CREATE`.
trait DeclareTarget {
    fn set_bit(&mut self, type_: u16, code: u16) -> nix::Result<()>;

    fn abs_setup(&mut self, code: u16, info: AbsInfo) -> nix::Result<()>;
}

struct Uinput(RawFd);

impl DeclareTarget for Uinput {
    /// `type_` 0 enables an event type, anything else enables `code` within that type.
    fn set_bit(&mut self, type_: u16, code: u16) -> nix::Result<()> {
        let code = code as nix::sys::ioctl::ioctl_param_type;
        unsafe {
            match type_ {
                EV_SYN => glue::ui_set_evbit(self.0, code),
                EV_KEY => glue::ui_set_keybit(self.0, code),
                EV_REL => glue::ui_set_relbit(self.0, code),
                EV_ABS => glue::ui_set_absbit(self.0, code),
                EV_MSC => glue::ui_set_mscbit(self.0, code),
                _ => return Err(Errno::EINVAL),
            }
        }?;

        Ok(())
    }

    fn abs_setup(&mut self, code: u16, info: AbsInfo) -> nix::Result<()> {
        let setup = glue::uinput_abs_setup {
            code,
            absinfo: info.into(),
        };
        unsafe { glue::ui_abs_setup(self.0, &setup) }?;
        Ok(())
    }
}

fn declare<T: DeclareTarget>(target: &mut T, declaration: &Declaration) -> nix::Result<()> {
    match *declaration {
        Declaration::EventType(type_) => target.set_bit(EV_SYN, type_),
        Declaration::Key(code) => target.set_bit(EV_KEY, code),
        Declaration::Rel(code) => target.set_bit(EV_REL, code),
        // The kernel wants the axis range before the axis bit.
        Declaration::Abs { code, info } => {
            target.abs_setup(code, info)?;
            target.set_bit(EV_ABS, code)
        }
        Declaration::Misc(code) => target.set_bit(EV_MSC, code),
    }
}
