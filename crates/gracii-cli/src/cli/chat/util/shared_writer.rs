use std::io::{
    self,
    Write,
};
use std::sync::{
    Arc,
    Mutex,
};

/// A cloneable handle to the terminal output of a chat session.
///
/// Every clone writes to the same underlying sink, which lets the session, the renderer and
/// tests share one output.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<Box<dyn Write + Send + 'static>>>,
}

impl SharedWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, Box<dyn Write + Send + 'static>>> {
        self.inner
            .lock()
            .map_err(|_poisoned| io::Error::other("terminal writer lock poisoned"))
    }
}

impl std::fmt::Debug for SharedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedWriter").finish()
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

/// Collects everything written to it, for assertions in tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct TestWriterWithSink {
    pub sink: Arc<Mutex<Vec<u8>>>,
}

#[cfg(test)]
impl TestWriterWithSink {
    pub fn get_content(&self) -> Vec<u8> {
        self.sink.lock().unwrap().clone()
    }

    /// The collected output with ANSI escape sequences removed.
    pub fn get_text(&self) -> String {
        strip_ansi_escapes::strip_str(String::from_utf8_lossy(&self.get_content()))
    }
}

#[cfg(test)]
impl Write for TestWriterWithSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
