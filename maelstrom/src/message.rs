//! Scoped progress reporting.

use std::time::Instant;

/// Logs `text` when created and again, with the elapsed time, when dropped.
///
/// ```
/// # use maelstrom::message::Message;
/// {
///     let _message = Message::new("Computing pressure correction");
///     // ...
/// } // "Computing pressure correction... done"
/// ```
#[must_use = "the scope ends as soon as the message is dropped"]
pub struct Message {
    text: String,
    start: Instant,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        log::info!("{text}...");
        Self {
            text,
            start: Instant::now(),
        }
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        log::info!("{}... done ({:.3?})", self.text, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_closes_on_early_return() {
        fn fails() -> Result<(), &'static str> {
            let _message = Message::new("Failing stage");
            Err("stage failed")
        }
        assert!(fails().is_err());
    }
}
