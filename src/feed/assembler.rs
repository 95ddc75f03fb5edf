use crate::error::{Error, Result};

/// Upper bound for one reassembled message.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// One network frame of a feed message; `fin` marks the last fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFrame {
    pub payload: Vec<u8>,
    pub fin: bool,
}

impl FeedFrame {
    /// A complete, unfragmented message.
    pub fn message(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            fin: true,
        }
    }

    pub fn fragment(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            fin: false,
        }
    }
}

/// Buffers fragments until a frame with `fin` completes the message.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    max_size: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_max_size(MAX_MESSAGE_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_size,
        }
    }

    /// Returns the full message once its final fragment arrives.
    ///
    /// An oversized message is discarded and reported as a decode error;
    /// the assembler is ready for the next message afterwards.
    pub fn push(&mut self, frame: FeedFrame) -> Result<Option<Vec<u8>>> {
        if frame.fin && self.buffer.is_empty() {
            return self.check_size(frame.payload.len()).map(|_| Some(frame.payload));
        }

        self.check_size(self.buffer.len() + frame.payload.len())?;
        self.buffer.extend_from_slice(&frame.payload);

        if frame.fin {
            Ok(Some(std::mem::take(&mut self.buffer)))
        } else {
            Ok(None)
        }
    }

    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn check_size(&mut self, len: usize) -> Result<()> {
        if len > self.max_size {
            self.buffer.clear();
            return Err(Error::Decode(format!(
                "feed message exceeds {} bytes",
                self.max_size
            )));
        }
        Ok(())
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_message_passes_through() {
        let mut asm = FrameAssembler::new();
        let out = asm.push(FeedFrame::message("{}")).unwrap();
        assert_eq!(out.as_deref(), Some(&b"{}"[..]));
        assert!(!asm.has_partial());
    }

    #[test]
    fn test_fragments_are_buffered_until_fin() {
        let mut asm = FrameAssembler::new();
        assert_eq!(asm.push(FeedFrame::fragment(r#"{"type":"#)).unwrap(), None);
        assert!(asm.has_partial());
        assert_eq!(asm.push(FeedFrame::fragment(r#""add","#)).unwrap(), None);

        let out = asm
            .push(FeedFrame::message(r#""domains":[]}"#))
            .unwrap()
            .unwrap();
        assert_eq!(out, br#"{"type":"add","domains":[]}"#.to_vec());
        assert!(!asm.has_partial());
    }

    #[test]
    fn test_oversized_message_is_dropped() {
        let mut asm = FrameAssembler::with_max_size(8);
        assert_eq!(asm.push(FeedFrame::fragment("12345")).unwrap(), None);
        assert!(matches!(
            asm.push(FeedFrame::message("67890")),
            Err(Error::Decode(_))
        ));
        assert!(!asm.has_partial());

        // Next message is unaffected
        let out = asm.push(FeedFrame::message("ok")).unwrap();
        assert_eq!(out, Some(b"ok".to_vec()));
    }
}
