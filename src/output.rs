//! Layered output buffer for one render
//!
//! Every render writes into the top frame. Capturing pushes a fresh frame and
//! returns its contents when popped, so nested captures compose.

#[derive(Debug)]
pub struct OutputStack {
    frames: Vec<String>,
}

impl Default for OutputStack {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputStack {
    pub fn new() -> Self {
        Self {
            frames: vec![String::new()],
        }
    }

    pub fn write_str(&mut self, text: &str) {
        if let Some(top) = self.frames.last_mut() {
            top.push_str(text);
        }
    }

    /// Run `f` with a fresh frame on top and return what it wrote.
    ///
    /// The frame is popped whether or not `f` succeeds; on failure its
    /// contents are dropped.
    pub fn capture<E>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), E>,
    ) -> Result<String, E> {
        self.frames.push(String::new());
        let result = f(self);
        let captured = self.frames.pop().unwrap_or_default();
        result.map(|()| captured)
    }

    /// Number of open frames, including the base frame
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Everything written to the base frame
    pub fn finish(mut self) -> String {
        self.frames.truncate(1);
        self.frames.pop().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_isolates_output() {
        let mut out = OutputStack::new();
        out.write_str("a");
        let captured = out
            .capture(|out| {
                out.write_str("b");
                Ok::<(), ()>(())
            })
            .unwrap();
        out.write_str("c");
        assert_eq!(captured, "b");
        assert_eq!(out.finish(), "ac");
    }

    #[test]
    fn test_nested_capture() {
        let mut out = OutputStack::new();
        let outer = out
            .capture(|out| {
                out.write_str("<");
                let inner = out.capture(|out| {
                    out.write_str("x");
                    Ok::<(), ()>(())
                })?;
                out.write_str(&inner.repeat(2));
                out.write_str(">");
                Ok::<(), ()>(())
            })
            .unwrap();
        assert_eq!(outer, "<xx>");
        assert_eq!(out.finish(), "");
    }

    #[test]
    fn test_failed_capture_pops_frame() {
        let mut out = OutputStack::new();
        let result = out.capture(|out| {
            out.write_str("partial");
            Err::<(), _>("boom")
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(out.depth(), 1);
        out.write_str("after");
        assert_eq!(out.finish(), "after");
    }
}
