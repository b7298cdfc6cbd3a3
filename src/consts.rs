/// Default SSH server version banner, matching a real, slightly dated
/// OpenSSH build so automated scanners see something plausible.
pub const DEFAULT_VERSION_STRING: &str = "SSH-2.0-OpenSSH_5.1p1 Debian-5";

/// Default PATH seeded into every session's environment.
pub const DEFAULT_PATH: &str = "/bin:/usr/bin:/sbin:/usr/sbin";

/// Cap on the bytes buffered while decoding a CSI/OSC/title escape
/// sequence. A hostile peer that never sends a terminator would
/// otherwise grow this buffer without bound.
pub const MAX_ESCAPE_BUFFER: usize = 4096;

/// Bound on symlink-following depth during path resolution, to turn
/// symlink loops into a reported error instead of an infinite loop.
pub const MAX_SYMLINK_DEPTH: usize = 16;

// tty log framing op codes (little-endian on the wire, see ttylog.rs).
pub const TTYLOG_OP_OPEN: u32 = 3;
pub const TTYLOG_OP_READ: u32 = 1;
pub const TTYLOG_OP_WRITE: u32 = 2;
