/// Non-fatal conversion problems found while building one record, reported
/// together as a single `; `-separated message.
#[derive(Debug, Clone, Default)]
pub struct ErrorAccumulator(Vec<String>);

impl ErrorAccumulator {
    pub fn push(&mut self, msg: impl Into<String>) {
        self.0.push(msg.into());
    }

    /// A tag whose value could not be converted, reported as `Key='value'`.
    pub fn reject_tag(&mut self, key: &str, raw: &str) {
        self.0.push(format!("{key}='{raw}'"));
    }

    /// `None` when nothing went wrong.
    pub fn finish(self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorAccumulator;

    #[test]
    fn test_clean_record_has_no_error() {
        assert_eq!(ErrorAccumulator::default().finish(), None);
    }

    #[test]
    fn test_reject_tag_quotes_raw_value() {
        let mut errors = ErrorAccumulator::default();
        errors.reject_tag("WhiteElo", "abc");

        assert_eq!(errors.finish().as_deref(), Some("WhiteElo='abc'"));
    }

    #[test]
    fn test_messages_keep_order_and_separator() {
        let mut errors = ErrorAccumulator::default();
        errors.push("moves: illegal move 'Ke3' at ply 3");
        errors.reject_tag("Date", "1999.02.30");

        assert_eq!(
            errors.finish().as_deref(),
            Some("moves: illegal move 'Ke3' at ply 3; Date='1999.02.30'")
        );
    }
}
