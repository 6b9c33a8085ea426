use core::fmt;

/// Largest chunk of console text handed to the sink at once. Each chunk
/// becomes one `O` packet, hex encoded.
pub const MAX_CONSOLE_CHUNK: usize = 256;

/// Line-buffered text sink for the GDB client console.
///
/// Text is handed to the sink one complete line at a time (long lines are cut
/// at [`MAX_CONSOLE_CHUNK`] bytes), so a listing shows up in GDB while it is
/// still being produced. Whatever is left over is sent on [`flush`] or drop.
///
/// Use the [`output!`] and [`outputln!`] macros to write to it.
///
/// [`flush`]: ConsoleOutput::flush
/// [`output!`]: crate::output
/// [`outputln!`]: crate::outputln
pub struct ConsoleOutput<'a> {
    line: Vec<u8>,
    sink: &'a mut dyn FnMut(&[u8]),
}

impl fmt::Write for ConsoleOutput<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_raw(s.as_bytes());
        Ok(())
    }
}

impl<'a> ConsoleOutput<'a> {
    pub(crate) fn new(sink: &'a mut dyn FnMut(&[u8])) -> ConsoleOutput<'a> {
        ConsoleOutput {
            line: Vec::with_capacity(MAX_CONSOLE_CHUNK),
            sink,
        }
    }

    /// Write raw, not necessarily UTF-8, bytes to the console.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.line.push(b);
            if b == b'\n' || self.line.len() == MAX_CONSOLE_CHUNK {
                self.flush();
            }
        }
    }

    /// Send any partial line.
    pub fn flush(&mut self) {
        if !self.line.is_empty() {
            (self.sink)(&self.line);
            self.line.clear();
        }
    }
}

impl Drop for ConsoleOutput<'_> {
    fn drop(&mut self) {
        self.flush()
    }
}

/// Write formatted text to a [`ConsoleOutput`].
#[macro_export]
macro_rules! output {
    ($console_output:expr, $($args:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($console_output, $($args)*);
    }};
}

/// Write formatted text and a newline to a [`ConsoleOutput`].
#[macro_export]
macro_rules! outputln {
    ($console_output:expr) => {{
        use core::fmt::Write;
        let _ = writeln!($console_output);
    }};
    ($console_output:expr,) => {
        $crate::outputln!($console_output)
    };
    ($console_output:expr, $($args:tt)*) => {{
        use core::fmt::Write;
        let _ = writeln!($console_output, $($args)*);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(f: impl FnOnce(&mut ConsoleOutput<'_>)) -> Vec<Vec<u8>> {
        let mut sent = Vec::new();
        let mut sink = |chunk: &[u8]| sent.push(chunk.to_vec());
        {
            let mut out = ConsoleOutput::new(&mut sink);
            f(&mut out);
        }
        sent
    }

    #[test]
    fn sends_whole_lines() {
        let sent = chunks(|out| {
            output!(out, "a");
            outputln!(out, "b{}", 1);
            output!(out, "tail");
        });
        assert_eq!(sent, vec![b"ab1\n".to_vec(), b"tail".to_vec()]);
    }

    #[test]
    fn long_lines_are_cut() {
        let sent = chunks(|out| out.write_raw(&[b'x'; MAX_CONSOLE_CHUNK + 1]));
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].len(), MAX_CONSOLE_CHUNK);
        assert_eq!(sent[1], b"x");
    }
}
