/// Position within a test, for the progress bar and `current/total` counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionProgress {
    /// 1-based index of the question on screen; 0 before questions load.
    pub current: usize,
    pub total: usize,
    pub answered: usize,
}

impl SessionProgress {
    /// Share of the test reached so far, in percent.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.current as f64 / self.total as f64;
        ratio * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_tracks_current_question() {
        let progress = SessionProgress {
            current: 1,
            total: 4,
            answered: 0,
        };
        assert!((progress.percent() - 25.0).abs() < f64::EPSILON);
        assert_eq!(SessionProgress::default().percent(), 0.0);
    }
}
