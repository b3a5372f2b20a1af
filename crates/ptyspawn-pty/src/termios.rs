//! Terminal modes applied to a freshly spawned pty

use nix::errno::Errno;
use nix::sys::termios::{
    tcgetattr, tcsetattr, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg,
    SpecialCharacterIndices, Termios,
};
use std::io::{self, IsTerminal};
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

/// Terminal dimensions in character cells (pixel sizes are optional)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub rows: u16,
    pub cols: u16,
    pub pixel_width: u16,
    pub pixel_height: u16,
}

impl WindowSize {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }

    pub(crate) fn to_winsize(self) -> libc::winsize {
        libc::winsize {
            ws_row: self.rows,
            ws_col: self.cols,
            ws_xpixel: self.pixel_width,
            ws_ypixel: self.pixel_height,
        }
    }

    pub(crate) fn from_fd(fd: RawFd) -> io::Result<Self> {
        let mut ws = libc::winsize {
            ws_row: 0,
            ws_col: 0,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        unsafe {
            if libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws as *mut _) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(Self {
            rows: ws.ws_row,
            cols: ws.ws_col,
            pixel_width: ws.ws_xpixel,
            pixel_height: ws.ws_ypixel,
        })
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(24, 80)
    }
}

/// Window size of the invoking terminal, if stdin is one.
pub fn invoking_window_size() -> Option<WindowSize> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return None;
    }
    WindowSize::from_fd(stdin.as_raw_fd()).ok()
}

/// Modes of the invoking terminal, if stdin is one.
pub fn invoking_termios() -> Option<Termios> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return None;
    }
    tcgetattr(&stdin).ok()
}

/// Reset a mode set to the conventional interactive defaults, in the manner
/// of `stty sane`.
pub fn make_sane(t: &mut Termios) {
    t.input_flags.remove(
        InputFlags::IGNBRK
            | InputFlags::INLCR
            | InputFlags::IGNCR
            | InputFlags::IXOFF
            | InputFlags::IXANY,
    );
    t.input_flags
        .insert(InputFlags::BRKINT | InputFlags::ICRNL | InputFlags::IXON | InputFlags::IMAXBEL);

    t.output_flags
        .remove(OutputFlags::OCRNL | OutputFlags::ONOCR | OutputFlags::ONLRET);
    t.output_flags.insert(OutputFlags::OPOST | OutputFlags::ONLCR);

    t.control_flags.insert(ControlFlags::CREAD);

    t.local_flags.remove(
        LocalFlags::ECHONL | LocalFlags::NOFLSH | LocalFlags::TOSTOP | LocalFlags::ECHOPRT,
    );
    t.local_flags.insert(
        LocalFlags::ISIG
            | LocalFlags::ICANON
            | LocalFlags::IEXTEN
            | LocalFlags::ECHO
            | LocalFlags::ECHOE
            | LocalFlags::ECHOK
            | LocalFlags::ECHOCTL
            | LocalFlags::ECHOKE,
    );

    let defaults = [
        (SpecialCharacterIndices::VINTR, 0x03),
        (SpecialCharacterIndices::VQUIT, 0x1c),
        (SpecialCharacterIndices::VERASE, 0x7f),
        (SpecialCharacterIndices::VKILL, 0x15),
        (SpecialCharacterIndices::VEOF, 0x04),
        (SpecialCharacterIndices::VSTART, 0x11),
        (SpecialCharacterIndices::VSTOP, 0x13),
        (SpecialCharacterIndices::VSUSP, 0x1a),
    ];
    for (index, value) in defaults {
        t.control_chars[index as usize] = value;
    }
}

/// Terminal setup the child applies to its new stdin.
///
/// Built in the parent so the child only issues the ioctls.
pub(crate) struct TtyPlan {
    pub copy: Option<Termios>,
    pub init: bool,
}

impl TtyPlan {
    pub fn apply(&self, fd: BorrowedFd<'_>) -> Result<(), Errno> {
        if let Some(original) = &self.copy {
            tcsetattr(fd, SetArg::TCSANOW, original)?;
        }
        if self.init {
            let mut t = tcgetattr(fd)?;
            make_sane(&mut t);
            tcsetattr(fd, SetArg::TCSANOW, &t)?;
        }
        Ok(())
    }
}
