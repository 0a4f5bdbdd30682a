// src/tty.rs
//! Terminal name lookup
//!
//! Unrelated to decryption; the CLI uses it to decide whether it may prompt
//! for a password.

use std::ffi::{c_char, CStr};
use std::io;
use std::os::fd::RawFd;

const INITIAL_BUF_LEN: usize = 64;
const MAX_BUF_LEN: usize = 4096;

/// Path of the terminal connected to `fd` (`ttyname_r(3)`)
pub fn ttyname(fd: RawFd) -> io::Result<String> {
    let mut buf: Vec<c_char> = vec![0; INITIAL_BUF_LEN];
    loop {
        let rc = unsafe { libc::ttyname_r(fd, buf.as_mut_ptr(), buf.len()) };
        match rc {
            0 => {
                // SAFETY: on success the buffer holds a NUL-terminated path
                let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
                return Ok(name.to_string_lossy().into_owned());
            }
            libc::ERANGE if buf.len() < MAX_BUF_LEN => buf.resize(buf.len() * 2, 0),
            errno => return Err(io::Error::from_raw_os_error(errno)),
        }
    }
}

/// `true` if `fd` refers to a terminal
pub fn is_tty(fd: RawFd) -> bool {
    ttyname(fd).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    #[test]
    fn test_ttyname_on_regular_file_is_enotty() {
        let file = tempfile::tempfile().unwrap();
        let err = ttyname(file.as_raw_fd()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOTTY));
        assert!(!is_tty(file.as_raw_fd()));
    }

    #[test]
    fn test_ttyname_on_closed_fd_is_ebadf() {
        let err = ttyname(-1).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }
}
