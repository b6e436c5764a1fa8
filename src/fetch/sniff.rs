use std::io::{self, ErrorKind, Read};

/// Wraps a body reader so that its first bytes can be inspected before any
/// of it is written anywhere.  After [`SniffReader::sniff`], reading replays
/// the retained prefix and then passes the rest of the body through.
pub struct SniffReader<R> {
    inner: R,
    prefix: Vec<u8>,
    pos: usize,
}

impl<R: Read> SniffReader<R> {
    pub fn new(inner: R) -> SniffReader<R> {
        SniffReader {
            inner,
            prefix: Vec::new(),
            pos: 0,
        }
    }

    /// Buffer up to `limit` bytes, fewer only if the body ends first.  Must be
    /// called before the first `read`.
    pub fn sniff(&mut self, limit: usize) -> io::Result<&[u8]> {
        debug_assert_eq!(self.pos, 0, "sniff after read");
        while self.prefix.len() < limit {
            let start = self.prefix.len();
            self.prefix.resize(limit, 0);
            let res = self.inner.read(&mut self.prefix[start..]);
            match res {
                Ok(0) => {
                    self.prefix.truncate(start);
                    break;
                }
                Ok(n) => self.prefix.truncate(start + n),
                Err(e) if e.kind() == ErrorKind::Interrupted => self.prefix.truncate(start),
                Err(e) => {
                    self.prefix.truncate(start);
                    return Err(e);
                }
            }
        }
        Ok(&self.prefix)
    }

}

impl<R: Read> Read for SniffReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.prefix.len() {
            let rest = &self.prefix[self.pos..];
            let n = rest.len().min(buf.len());
            buf[..n].copy_from_slice(&rest[..n]);
            self.pos += n;
            return Ok(n);
        }
        self.inner.read(buf)
    }
}
