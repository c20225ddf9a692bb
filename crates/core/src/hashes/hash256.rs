//! An incremental double-SHA256 writer, for streaming sighash preimages
//! straight into the digest without buffering them first.

use sha2::{Digest, Sha256};
use std::io::{Result as IOResult, Write};

use crate::primitives::H256;

/// Exposes a `Write` interface backed by an incremental SHA-256 hasher;
/// [`finish`](Hash256Writer::finish) applies the second SHA-256 pass.
#[derive(Default)]
pub struct Hash256Writer {
    inner: Sha256,
}

impl Hash256Writer {
    /// Consume the writer, returning `hash256` of everything written to it.
    pub fn finish(self) -> H256 {
        let once = self.inner.finalize();
        H256::from_bytes(Sha256::digest(once).into())
    }
}

impl Write for Hash256Writer {
    fn write(&mut self, buf: &[u8]) -> IOResult<usize> {
        self.inner.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> IOResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::hash256;

    #[test]
    fn matches_one_shot_hash256() {
        let mut w = Hash256Writer::default();
        w.write_all(b"some").unwrap();
        w.write_all(b" data").unwrap();
        assert_eq!(w.finish(), hash256(b"some data"));
    }
}
