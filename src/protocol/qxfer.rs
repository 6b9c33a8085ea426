//! Paged transfer of bulk objects (`qXfer:<object>:read:<annex>:<off>,<len>`).
//!
//! A producer renders the whole object into the [`QxferBuffer`] once. Pages
//! are then cut from the cached rendering until the final page is delivered,
//! or until a different object/annex pair is requested.

use super::reply::ReplyBuffer;

/// Transfer objects the server knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QxferObject {
    /// `<library-list>` of loaded modules.
    Libraries,
    /// `<threads>` of the current process.
    Threads,
    /// Target description (`target.xml`).
    Features,
    /// Path of the debuggee's executable.
    ExecFile,
}

impl QxferObject {
    /// Look up an object by its wire name.
    pub fn from_name(name: &[u8]) -> Option<QxferObject> {
        let obj = match name {
            b"libraries" => QxferObject::Libraries,
            b"threads" => QxferObject::Threads,
            b"features" => QxferObject::Features,
            b"exec-file" => QxferObject::ExecFile,
            _ => return None,
        };
        Some(obj)
    }

    pub fn name(self) -> &'static str {
        match self {
            QxferObject::Libraries => "libraries",
            QxferObject::Threads => "threads",
            QxferObject::Features => "features",
            QxferObject::ExecFile => "exec-file",
        }
    }
}

/// Cached rendering of one transfer object.
#[derive(Debug, Default)]
pub struct QxferBuffer {
    data: ReplyBuffer,
    object: Option<QxferObject>,
    annex: String,
}

impl QxferBuffer {
    pub fn new() -> QxferBuffer {
        QxferBuffer::default()
    }

    /// Whether the cached rendering belongs to `object`/`annex`.
    pub fn is_cached(&self, object: QxferObject, annex: &str) -> bool {
        self.object == Some(object) && self.annex == annex
    }

    /// Drop the cached rendering.
    pub fn invalidate(&mut self) {
        self.data.clear();
        self.object = None;
        self.annex.clear();
    }

    /// Render `object`/`annex` with `produce`, unless it is already cached.
    ///
    /// If `produce` fails, the cache is left empty.
    pub fn fill<E>(
        &mut self,
        object: QxferObject,
        annex: &str,
        produce: impl FnOnce(&mut ReplyBuffer) -> Result<(), E>,
    ) -> Result<(), E> {
        if self.is_cached(object, annex) {
            return Ok(());
        }

        self.invalidate();
        if let Err(e) = produce(&mut self.data) {
            self.invalidate();
            return Err(e);
        }
        self.object = Some(object);
        self.annex.push_str(annex);
        Ok(())
    }

    /// Total length of the cached rendering.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the page `[offset, offset + len)` into `res`, prefixed with `m`
    /// if more data follows or `l` if this is the last page. Delivering the
    /// last page invalidates the cache.
    pub fn page(&mut self, res: &mut ReplyBuffer, offset: usize, len: usize) {
        let data = self.data.as_bytes();
        let start = offset.min(data.len());
        let end = offset.saturating_add(len).min(data.len());

        if end >= data.len() {
            res.write(b'l');
            res.write_binary(&data[start..end]);
            self.invalidate();
        } else {
            res.write(b'm');
            res.write_binary(&data[start..end]);
        }
    }
}
