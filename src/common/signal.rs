/// Signal numbers as defined by the GDB Remote Serial Protocol.
///
/// These are GDB's target-independent numbers (see `gdb/signals.def`), which
/// do not necessarily match the host's numbering. Use [`Signal::from_host`]
/// and [`Signal::to_host`] to translate.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signal(pub u8);

#[allow(clippy::upper_case_acronyms)]
#[rustfmt::skip]
impl Signal {
    #[doc = "Signal 0 (no signal)"]          pub const SIGZERO:   Self = Self(0);
    #[doc = "Hangup"]                        pub const SIGHUP:    Self = Self(1);
    #[doc = "Interrupt"]                     pub const SIGINT:    Self = Self(2);
    #[doc = "Quit"]                          pub const SIGQUIT:   Self = Self(3);
    #[doc = "Illegal instruction"]           pub const SIGILL:    Self = Self(4);
    #[doc = "Trace/breakpoint trap"]         pub const SIGTRAP:   Self = Self(5);
    #[doc = "Aborted"]                       pub const SIGABRT:   Self = Self(6);
    #[doc = "Emulation trap"]                pub const SIGEMT:    Self = Self(7);
    #[doc = "Arithmetic exception"]          pub const SIGFPE:    Self = Self(8);
    #[doc = "Killed"]                        pub const SIGKILL:   Self = Self(9);
    #[doc = "Bus error"]                     pub const SIGBUS:    Self = Self(10);
    #[doc = "Segmentation fault"]            pub const SIGSEGV:   Self = Self(11);
    #[doc = "Bad system call"]               pub const SIGSYS:    Self = Self(12);
    #[doc = "Broken pipe"]                   pub const SIGPIPE:   Self = Self(13);
    #[doc = "Alarm clock"]                   pub const SIGALRM:   Self = Self(14);
    #[doc = "Terminated"]                    pub const SIGTERM:   Self = Self(15);
    #[doc = "Urgent I/O condition"]          pub const SIGURG:    Self = Self(16);
    #[doc = "Stopped (signal)"]              pub const SIGSTOP:   Self = Self(17);
    #[doc = "Stopped (user)"]                pub const SIGTSTP:   Self = Self(18);
    #[doc = "Continued"]                     pub const SIGCONT:   Self = Self(19);
    #[doc = "Child status changed"]          pub const SIGCHLD:   Self = Self(20);
    #[doc = "Stopped (tty input)"]           pub const SIGTTIN:   Self = Self(21);
    #[doc = "Stopped (tty output)"]          pub const SIGTTOU:   Self = Self(22);
    #[doc = "I/O possible"]                  pub const SIGIO:     Self = Self(23);
    #[doc = "CPU time limit exceeded"]       pub const SIGXCPU:   Self = Self(24);
    #[doc = "File size limit exceeded"]      pub const SIGXFSZ:   Self = Self(25);
    #[doc = "Virtual timer expired"]         pub const SIGVTALRM: Self = Self(26);
    #[doc = "Profiling timer expired"]       pub const SIGPROF:   Self = Self(27);
    #[doc = "Window size changed"]           pub const SIGWINCH:  Self = Self(28);
    #[doc = "User defined signal 1"]         pub const SIGUSR1:   Self = Self(30);
    #[doc = "User defined signal 2"]         pub const SIGUSR2:   Self = Self(31);
    #[doc = "Power fail/restart"]            pub const SIGPWR:    Self = Self(32);
}

// (gdb number, linux number)
#[rustfmt::skip]
const LINUX: &[(u8, i32)] = &[
    (1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6), (8, 8), (9, 9),
    (10, 7), (11, 11), (12, 31), (13, 13), (14, 14), (15, 15), (16, 23),
    (17, 19), (18, 20), (19, 18), (20, 17), (21, 21), (22, 22), (23, 29),
    (24, 24), (25, 25), (26, 26), (27, 27), (28, 28), (30, 10), (31, 12),
    (32, 30),
];

impl Signal {
    /// Translate a Linux signal number.
    pub fn from_host(sig: i32) -> Signal {
        LINUX
            .iter()
            .find(|(_, host)| *host == sig)
            .map(|(gdb, _)| Signal(*gdb))
            .unwrap_or(Signal::SIGZERO)
    }

    /// Translate to a Linux signal number.
    pub fn to_host(self) -> Option<i32> {
        LINUX
            .iter()
            .find(|(gdb, _)| *gdb == self.0)
            .map(|(_, host)| *host)
    }
}

impl core::fmt::Display for Signal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        #[rustfmt::skip]
        let s = match *self {
            Signal::SIGZERO   => "SIGZERO - Signal 0",
            Signal::SIGHUP    => "SIGHUP - Hangup",
            Signal::SIGINT    => "SIGINT - Interrupt",
            Signal::SIGQUIT   => "SIGQUIT - Quit",
            Signal::SIGILL    => "SIGILL - Illegal instruction",
            Signal::SIGTRAP   => "SIGTRAP - Trace/breakpoint trap",
            Signal::SIGABRT   => "SIGABRT - Aborted",
            Signal::SIGFPE    => "SIGFPE - Arithmetic exception",
            Signal::SIGKILL   => "SIGKILL - Killed",
            Signal::SIGBUS    => "SIGBUS - Bus error",
            Signal::SIGSEGV   => "SIGSEGV - Segmentation fault",
            Signal::SIGPIPE   => "SIGPIPE - Broken pipe",
            Signal::SIGALRM   => "SIGALRM - Alarm clock",
            Signal::SIGTERM   => "SIGTERM - Terminated",
            Signal::SIGSTOP   => "SIGSTOP - Stopped (signal)",
            Signal::SIGCHLD   => "SIGCHLD - Child status changed",
            Signal::SIGUSR1   => "SIGUSR1 - User defined signal 1",
            Signal::SIGUSR2   => "SIGUSR2 - User defined signal 2",
            _                 => return write!(f, "signal {}", self.0),
        };

        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_translation() {
        assert_eq!(Signal::from_host(7), Signal::SIGBUS);
        assert_eq!(Signal::from_host(10), Signal::SIGUSR1);
        assert_eq!(Signal::SIGSEGV.to_host(), Some(11));
        assert_eq!(Signal::SIGCHLD.to_host(), Some(17));
        assert_eq!(Signal(200).to_host(), None);
    }
}
