//! Open flags. Grounded in the teacher's `fcntl.rs` `bitflags!` usage,
//! extended with the bit values spec.md section 6 requires.

bitflags::bitflags! {
    pub struct OpenFlags: i32 {
        const RDONLY = 0;
        const WRONLY = 0x1;
        const RDWR   = 0x2;
        const ACCESS_MASK = 0x3;
        const CREAT  = 0x40;
        const EXCL   = 0x80;
        const TRUNC  = 0x200;
        const APPEND = 0x400;
    }
}

impl OpenFlags {
    pub fn is_readable(self) -> bool {
        let access = self.bits() & Self::ACCESS_MASK.bits();
        access == Self::RDONLY.bits() || access == Self::RDWR.bits()
    }

    pub fn is_writable(self) -> bool {
        let access = self.bits() & Self::ACCESS_MASK.bits();
        access == Self::WRONLY.bits() || access == Self::RDWR.bits()
    }
}

/// `lseek` whence values.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SeekWhence {
    Set,
    Current,
    End,
}
