//! Reader for the dot-terminated payload of the DATA command

use std::io::{self, BufRead, Read};

use crate::smtp::error::{SmtpError, SmtpLimits};

/// Streams the message sent after `354`, up to the terminating `.` line.
///
/// Lines are delivered with CRLF endings and leading dots unstuffed. When a
/// line or the whole message exceeds [`SmtpLimits`] the reader returns an
/// error wrapping the [`SmtpError`], then silently discards the rest of the
/// payload so the connection stays in sync.
#[derive(Debug)]
pub struct DataReader<'a, R> {
    inner: &'a mut R,
    line: Vec<u8>,
    pending: Vec<u8>,
    offset: usize,
    size: usize,
    done: bool,
    discarding: bool,
}

impl<'a, R: BufRead> DataReader<'a, R> {
    /// Start reading a payload from `inner`, positioned just after the `354` reply
    pub fn new(inner: &'a mut R) -> Self {
        Self {
            inner,
            line: Vec::new(),
            pending: Vec::new(),
            offset: 0,
            size: 0,
            done: false,
            discarding: false,
        }
    }

    /// Whether the terminating `.` line has been read
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume whatever is left of the payload
    pub fn drain(&mut self) -> io::Result<u64> {
        io::copy(self, &mut io::sink())
    }

    /// Read the next line into `pending`; returns false at the end of the payload
    fn fill(&mut self) -> io::Result<bool> {
        while !self.done {
            self.line.clear();
            // one extra byte for a stuffed leading dot
            let (read, overlong) = read_bounded_line(
                self.inner,
                &mut self.line,
                SmtpLimits::TEXT_LINE_MAX_LENGTH + 1,
            )?;
            if read == 0 {
                self.done = true;
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed during DATA",
                ));
            }

            let mut line = self.line.as_slice();
            line = line.strip_suffix(b"\n").unwrap_or(line);
            line = line.strip_suffix(b"\r").unwrap_or(line);

            if line == b"." {
                self.done = true;
                return Ok(false);
            }
            if self.discarding {
                continue;
            }
            if overlong {
                return Err(self.limit_exceeded(SmtpError::LineTooLong {
                    max: SmtpLimits::TEXT_LINE_MAX_LENGTH,
                }));
            }

            let line = line.strip_prefix(b".").unwrap_or(line);
            let line_size = line.len() + 2;
            if line_size > SmtpLimits::TEXT_LINE_MAX_LENGTH {
                return Err(self.limit_exceeded(SmtpError::LineTooLong {
                    max: SmtpLimits::TEXT_LINE_MAX_LENGTH,
                }));
            }
            if self.size + line_size > SmtpLimits::MAX_DATA_SIZE {
                return Err(self.limit_exceeded(SmtpError::TooMuchData {
                    max: SmtpLimits::MAX_DATA_SIZE,
                }));
            }

            self.size += line_size;
            self.pending.clear();
            self.pending.extend_from_slice(line);
            self.pending.extend_from_slice(b"\r\n");
            self.offset = 0;
            return Ok(true);
        }
        Ok(false)
    }

    fn limit_exceeded(&mut self, err: SmtpError) -> io::Error {
        self.discarding = true;
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

impl<R: BufRead> Read for DataReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.pending.len() && !self.fill()? {
            return Ok(0);
        }

        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}

/// Read one line into `buf`, keeping at most `limit` bytes of it.
///
/// Returns the number of bytes consumed from `reader` and whether the line
/// was longer than `limit`. The remainder of an over-long line is consumed
/// without being buffered.
pub(crate) fn read_bounded_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> io::Result<(usize, bool)> {
    let read = reader.by_ref().take(limit as u64).read_until(b'\n', buf)?;
    if read < limit || buf.ends_with(b"\n") {
        return Ok((read, false));
    }

    let mut skipped = 0;
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            break;
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                skipped += pos + 1;
                break;
            }
            None => {
                let n = available.len();
                reader.consume(n);
                skipped += n;
            }
        }
    }
    Ok((read + skipped, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(input: &str) -> (io::Result<String>, Cursor<Vec<u8>>) {
        let mut cursor = Cursor::new(input.as_bytes().to_vec());
        let mut reader = DataReader::new(&mut cursor);
        let mut body = String::new();
        let result = reader.read_to_string(&mut body).map(|_| body);
        (result, cursor)
    }

    #[test]
    fn test_reads_until_terminator() {
        let (body, mut rest) = read_all("Subject: Test\r\n\r\nHello\r\n.\r\nQUIT\r\n");
        assert_eq!(body.unwrap(), "Subject: Test\r\n\r\nHello\r\n");

        let mut remaining = String::new();
        rest.read_to_string(&mut remaining).unwrap();
        assert_eq!(remaining, "QUIT\r\n");
    }

    #[test]
    fn test_bare_lf_lines_become_crlf() {
        let (body, _) = read_all("Subject: Test\n\nHello\n.\n");
        assert_eq!(body.unwrap(), "Subject: Test\r\n\r\nHello\r\n");
    }

    #[test]
    fn test_dot_unstuffing() {
        let (body, _) = read_all("..leading dot\r\n.\r\n");
        assert_eq!(body.unwrap(), ".leading dot\r\n");
    }

    #[test]
    fn test_empty_message() {
        let (body, _) = read_all(".\r\n");
        assert_eq!(body.unwrap(), "");
    }

    #[test]
    fn test_unexpected_eof() {
        let (body, _) = read_all("Subject: Test\r\n");
        assert_eq!(body.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_bounded_line_keeps_at_most_limit() {
        let input = format!("{}\r\nNEXT\r\n", "a".repeat(100_000));
        let mut cursor = Cursor::new(input.into_bytes());
        let mut buf = Vec::new();

        let (read, overlong) = read_bounded_line(&mut cursor, &mut buf, 16).unwrap();
        assert!(overlong);
        assert_eq!(read, 100_002);
        assert_eq!(buf.len(), 16);

        buf.clear();
        let (read, overlong) = read_bounded_line(&mut cursor, &mut buf, 16).unwrap();
        assert!(!overlong);
        assert_eq!(read, 6);
        assert_eq!(buf, b"NEXT\r\n");
    }

    #[test]
    fn test_bounded_line_exact_fit() {
        let mut cursor = Cursor::new(b"abc\r\n".to_vec());
        let mut buf = Vec::new();
        assert_eq!(read_bounded_line(&mut cursor, &mut buf, 5).unwrap(), (5, false));
        assert_eq!(buf, b"abc\r\n");
    }

    #[test]
    fn test_unterminated_huge_line_is_rejected() {
        let input = format!("{}\r\n.\r\nQUIT\r\n", "x".repeat(1_000_000));
        let mut cursor = Cursor::new(input.into_bytes());
        let mut reader = DataReader::new(&mut cursor);

        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        let inner = err.get_ref().unwrap().downcast_ref::<SmtpError>();
        assert!(matches!(inner, Some(SmtpError::LineTooLong { .. })));
        assert!(reader.line.capacity() <= 4 * SmtpLimits::TEXT_LINE_MAX_LENGTH);

        reader.drain().unwrap();
        let mut remaining = String::new();
        cursor.read_to_string(&mut remaining).unwrap();
        assert_eq!(remaining, "QUIT\r\n");
    }

    #[test]
    fn test_line_too_long_discards_rest() {
        let long_line = "a".repeat(SmtpLimits::TEXT_LINE_MAX_LENGTH);
        let input = format!("{long_line}\r\nmore\r\n.\r\nNOOP\r\n");
        let mut cursor = Cursor::new(input.into_bytes());
        let mut reader = DataReader::new(&mut cursor);

        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let inner = err.get_ref().unwrap().downcast_ref::<SmtpError>();
        assert!(matches!(inner, Some(SmtpError::LineTooLong { .. })));

        assert!(!reader.is_done());
        assert_eq!(reader.drain().unwrap(), 0);
        assert!(reader.is_done());

        let mut remaining = String::new();
        cursor.read_to_string(&mut remaining).unwrap();
        assert_eq!(remaining, "NOOP\r\n");
    }
}
