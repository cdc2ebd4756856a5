use std::fmt;
use std::ops::{BitOr, BitOrAssign};

macro_rules! flag {
    ($name: ident => $bit: expr) => {
        pub const $name: Interest = Interest($bit);
    };
}

/// A bitset of readiness interests a [`Channel`](crate::Channel) registers
/// with the demultiplexer.
///
/// Unlike `mio::Interest`, which only exposes the portable `READABLE` /
/// `WRITABLE` pair, `Interest` exposes the full set the kernel's channel
/// dispatch (§4.1) distinguishes between, matching the original's
/// `EPOLLIN | EPOLLPRI | EPOLLRDHUP` read mask and `EPOLLERR` handling.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Interest(u8);

impl Interest {
    flag!(READABLE => 0b0000_0001);
    flag!(WRITABLE => 0b0000_0010);
    flag!(HANGUP_READ => 0b0000_0100);
    flag!(PRIORITY => 0b0000_1000);
    flag!(ERROR_OBSERVED => 0b0001_0000);

    /// The empty interest set, used to signal "disable all".
    pub const NONE: Interest = Interest(0);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Interest) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Interest) {
        self.0 &= !other.0;
    }

    pub(crate) fn as_u8(self) -> u8 {
        self.0
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl Default for Interest {
    fn default() -> Interest {
        Interest::NONE
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut write_one = |f: &mut fmt::Formatter<'_>, name: &str, set: bool| -> fmt::Result {
            if set {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
            Ok(())
        };

        write_one(f, "READABLE", self.contains(Interest::READABLE))?;
        write_one(f, "WRITABLE", self.contains(Interest::WRITABLE))?;
        write_one(f, "HANGUP_READ", self.contains(Interest::HANGUP_READ))?;
        write_one(f, "PRIORITY", self.contains(Interest::PRIORITY))?;
        write_one(
            f,
            "ERROR_OBSERVED",
            self.contains(Interest::ERROR_OBSERVED),
        )?;
        if first {
            f.write_str("NONE")?;
        }
        Ok(())
    }
}
