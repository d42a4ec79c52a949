//! Kernel input and uinput ABI used by the rest of the crate.
#![allow(non_camel_case_types)]

use libc::{c_char, c_int, c_ulong, timeval};
use nix::errno::Errno;
use std::mem;
use std::os::unix::io::RawFd;

pub const UINPUT_MAX_NAME_SIZE: usize = 80;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct input_event {
    pub time: timeval,
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct input_absinfo {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct input_id {
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct uinput_setup {
    pub id: input_id,
    pub name: [c_char; UINPUT_MAX_NAME_SIZE],
    pub ff_effects_max: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct uinput_abs_setup {
    pub code: u16,
    pub absinfo: input_absinfo,
}

nix::ioctl_read!(eviocgid, b'E', 0x02, input_id);
nix::ioctl_read_buf!(eviocgname, b'E', 0x06, u8);
nix::ioctl_write_int!(eviocgrab, b'E', 0x90);

nix::ioctl_none!(ui_dev_create, b'U', 1);
nix::ioctl_none!(ui_dev_destroy, b'U', 2);
nix::ioctl_write_ptr!(ui_dev_setup, b'U', 3, uinput_setup);
nix::ioctl_write_ptr!(ui_abs_setup, b'U', 4, uinput_abs_setup);
nix::ioctl_write_int!(ui_set_evbit, b'U', 100);
nix::ioctl_write_int!(ui_set_keybit, b'U', 101);
nix::ioctl_write_int!(ui_set_relbit, b'U', 102);
nix::ioctl_write_int!(ui_set_absbit, b'U', 103);
nix::ioctl_write_int!(ui_set_mscbit, b'U', 104);

/// `EVIOCGBIT(type_, len)`: the request number depends on the event type, so it can't go
/// through the fixed-number ioctl macros.
pub unsafe fn eviocgbit(fd: RawFd, type_: u16, buf: &mut [c_ulong]) -> nix::Result<c_int> {
    let request = nix::request_code_read!(b'E', 0x20 + type_ as u32, mem::size_of_val(&*buf));
    Errno::result(libc::ioctl(fd, request, buf.as_mut_ptr()))
}

/// `EVIOCGABS(code)`.
pub unsafe fn eviocgabs(fd: RawFd, code: u16, info: &mut input_absinfo) -> nix::Result<c_int> {
    let request = nix::request_code_read!(
        b'E',
        0x40 + code as u32,
        mem::size_of::<input_absinfo>()
    );
    Errno::result(libc::ioctl(fd, request, info as *mut input_absinfo))
}
