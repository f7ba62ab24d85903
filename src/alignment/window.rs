use crate::alignment::transcript::ReferenceTranscript;
use crate::config::AlignerConfig;
use crate::types::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub start: usize,
    pub end: usize,
}

impl SearchWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    Expanded,
    /// Window already spans the maximum length for the current chunk.
    AtMaximum,
    /// Window already reaches the end of the transcript.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPolicy {
    pub initial_factor: f64,
    pub max_factor: f64,
    pub overlap_pullback: usize,
}

impl WindowPolicy {
    pub fn from_config(config: &AlignerConfig) -> Self {
        Self {
            initial_factor: config.initial_window_factor,
            max_factor: config.max_window_expansion_factor,
            overlap_pullback: config.overlap_pullback,
        }
    }
}

/// Owns the search window and the cursor/floor that drive it.
///
/// `floor` is the end of the last accepted match: no window ever starts
/// before it. `cursor` is where the next window opens before the overlap
/// pullback is applied. It only runs ahead of `floor` after unmatched chunks.
#[derive(Debug, Clone)]
pub struct WindowManager {
    policy: WindowPolicy,
    transcript_len: usize,
    cursor: usize,
    floor: usize,
    window: SearchWindow,
    expected_len: usize,
}

impl WindowManager {
    pub fn new(policy: WindowPolicy, transcript_len: usize) -> Self {
        Self {
            policy,
            transcript_len,
            cursor: 0,
            floor: 0,
            window: SearchWindow { start: 0, end: 0 },
            expected_len: 0,
        }
    }

    /// Resets to the beginning of the transcript and opens the first chunk's window.
    pub fn initial_window(
        &mut self,
        transcript: &ReferenceTranscript,
        expected_len: usize,
    ) -> Option<SearchWindow> {
        self.cursor = 0;
        self.floor = 0;
        self.open(transcript, expected_len)
    }

    /// Opens the window for the next chunk. `None` means no transcript is left,
    /// counting text a recovering search can still reach back to.
    pub fn open(
        &mut self,
        transcript: &ReferenceTranscript,
        expected_len: usize,
    ) -> Option<SearchWindow> {
        self.expected_len = expected_len.max(1);
        let start = self
            .cursor
            .saturating_sub(self.policy.overlap_pullback)
            .max(self.floor)
            .min(self.transcript_len);
        let end = start.saturating_add(self.step_len()).min(self.transcript_len);
        self.window = SearchWindow { start, end };
        self.snap_to_punctuation(transcript);

        if start >= self.transcript_len && self.reach_back() >= self.transcript_len {
            return None;
        }
        Some(self.window)
    }

    pub fn window(&self) -> SearchWindow {
        self.window
    }

    pub fn floor(&self) -> usize {
        self.floor
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Lowest begin offset a candidate may use in the current window.
    ///
    /// Equal to the window start while the cursor sits on the floor. After
    /// unmatched chunks the fallback may have pushed the cursor past text the
    /// next chunk still needs, so begins reach back toward the floor, at most
    /// one maximum window length behind the start.
    pub fn reach_back(&self) -> usize {
        if self.cursor <= self.floor {
            return self.window.start;
        }
        self.window
            .start
            .saturating_sub(self.max_len())
            .max(self.floor)
            .min(self.window.start)
    }

    pub fn max_len(&self) -> usize {
        ((self.policy.max_factor * self.expected_len as f64).ceil() as usize).max(1)
    }

    /// Widens the window forward by one initial window length.
    pub fn expand(&mut self, transcript: &ReferenceTranscript) -> Expansion {
        if self.window.end >= self.transcript_len {
            return Expansion::Exhausted;
        }
        let cap = self.cap();
        if self.window.end >= cap {
            return Expansion::AtMaximum;
        }
        self.window.end = self.window.end.saturating_add(self.step_len()).min(cap);
        self.snap_to_punctuation(transcript);
        Expansion::Expanded
    }

    pub fn advance(&mut self, accepted: Span) {
        debug_assert!(
            accepted.begin >= self.floor,
            "accepted span {accepted:?} starts before floor {}",
            self.floor
        );
        self.cursor = accepted.end.max(self.floor).min(self.transcript_len);
        self.floor = self.cursor;
    }

    /// Moves the cursor past an unmatched chunk so the search cannot stall.
    pub fn fallback(&mut self, step: usize) {
        self.cursor = self
            .cursor
            .max(self.floor)
            .saturating_add(step.max(1))
            .min(self.transcript_len);
    }

    fn step_len(&self) -> usize {
        let initial = (self.policy.initial_factor * self.expected_len as f64).ceil() as usize;
        initial.clamp(1, self.max_len())
    }

    fn cap(&self) -> usize {
        self.window.start.saturating_add(self.max_len()).min(self.transcript_len)
    }

    /// Stretches `end` to the next punctuation anchor when it fits under the cap.
    fn snap_to_punctuation(&mut self, transcript: &ReferenceTranscript) {
        if self.window.end == 0 || self.window.end >= self.transcript_len {
            return;
        }
        if let Some(anchor) = transcript.next_punctuation_anchor(self.window.end - 1) {
            if anchor <= self.cap() {
                self.window.end = anchor;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    const FAIRY_TALE: &str = "Once upon a time, in a faraway land, there lived a king.";

    fn policy() -> WindowPolicy {
        WindowPolicy {
            initial_factor: 2.0,
            max_factor: 6.0,
            overlap_pullback: 8,
        }
    }

    #[test]
    fn initial_window_snaps_to_following_punctuation() {
        let transcript = ReferenceTranscript::new(FAIRY_TALE, ",.");
        let mut manager = WindowManager::new(policy(), transcript.len());
        let window = manager.initial_window(&transcript, 15).expect("window");
        // 2 x 15 = 30, next anchor after 30 is 36 ("land,")
        assert_eq!(window, SearchWindow { start: 0, end: 36 });
    }

    #[test]
    fn advance_moves_floor_and_start() {
        let transcript = ReferenceTranscript::new(FAIRY_TALE, ",.");
        let mut manager = WindowManager::new(policy(), transcript.len());
        manager.initial_window(&transcript, 15);
        manager.advance(Span::new(0, 17));
        let window = manager.open(&transcript, 16).expect("window");
        assert_eq!(window.start, 17);
        assert_eq!(manager.floor(), 17);
    }

    #[test]
    fn fallback_pullback_never_precedes_floor() {
        let transcript = ReferenceTranscript::new(FAIRY_TALE, ",.");
        let mut manager = WindowManager::new(policy(), transcript.len());
        manager.initial_window(&transcript, 10);
        manager.advance(Span::new(0, 17));
        manager.open(&transcript, 4);
        manager.fallback(4);
        let window = manager.open(&transcript, 4).expect("window");
        assert_eq!(window.start, 17);

        manager.fallback(20);
        let window = manager.open(&transcript, 4).expect("window");
        // cursor 41, pulled back by 8
        assert_eq!(window.start, 33);
        // begins may still reach the floor, max_len is 24
        assert_eq!(manager.reach_back(), 17);
    }

    #[test]
    fn reach_back_stays_at_window_start_without_fallback() {
        let transcript = ReferenceTranscript::new(FAIRY_TALE, ",.");
        let mut manager = WindowManager::new(policy(), transcript.len());
        manager.initial_window(&transcript, 10);
        assert_eq!(manager.reach_back(), 0);
        manager.advance(Span::new(0, 17));
        manager.open(&transcript, 10);
        assert_eq!(manager.reach_back(), 17);
    }

    #[test]
    fn reach_back_is_bounded_by_one_max_window() {
        let text = "word ".repeat(40);
        let transcript = ReferenceTranscript::new(text.as_str(), ".");
        let mut manager = WindowManager::new(policy(), transcript.len());
        manager.initial_window(&transcript, 2);
        for _ in 0..10 {
            manager.fallback(12);
        }
        let window = manager.open(&transcript, 2).expect("window");
        assert_eq!(window.start, 112);
        // max_len is 6 x 2 = 12
        assert_eq!(manager.reach_back(), 100);
    }

    #[test]
    fn fallback_to_the_end_still_opens_while_floor_lags() {
        let transcript = ReferenceTranscript::new("abc def", ".");
        let no_pullback = WindowPolicy {
            overlap_pullback: 0,
            ..policy()
        };
        let mut manager = WindowManager::new(no_pullback, transcript.len());
        manager.initial_window(&transcript, 3);
        manager.advance(Span::new(0, 3));
        manager.fallback(40);
        let window = manager.open(&transcript, 3).expect("window");
        assert_eq!(window, SearchWindow { start: 7, end: 7 });
        assert_eq!(manager.reach_back(), 3);
    }

    #[test]
    fn huge_factors_saturate_instead_of_overflowing() {
        let transcript = ReferenceTranscript::new(FAIRY_TALE, ",.");
        let huge = WindowPolicy {
            initial_factor: 1e20,
            max_factor: 1e20,
            overlap_pullback: 8,
        };
        let mut manager = WindowManager::new(huge, transcript.len());
        let window = manager.initial_window(&transcript, 15).expect("window");
        assert_eq!(window, SearchWindow { start: 0, end: transcript.len() });
        assert_eq!(manager.max_len(), usize::MAX);
        assert_eq!(manager.expand(&transcript), Expansion::Exhausted);

        manager.advance(Span::new(0, 17));
        manager.fallback(usize::MAX);
        assert_eq!(manager.cursor(), transcript.len());
        let window = manager.open(&transcript, 15).expect("window");
        assert_eq!(window.end, transcript.len());
    }

    #[test]
    fn expand_reports_maximum_then_exhaustion() {
        let transcript = ReferenceTranscript::new("a b c d e f g h i j k l m n o p", ".");
        let mut manager = WindowManager::new(policy(), transcript.len());
        manager.initial_window(&transcript, 2);
        assert_eq!(manager.window().len(), 4);
        assert_eq!(manager.expand(&transcript), Expansion::Expanded);
        assert_eq!(manager.expand(&transcript), Expansion::Expanded);
        assert_eq!(manager.window().len(), 12);
        assert_eq!(manager.expand(&transcript), Expansion::AtMaximum);

        let short = ReferenceTranscript::new("abc", ".");
        let mut manager = WindowManager::new(policy(), short.len());
        manager.initial_window(&short, 2);
        assert_eq!(manager.expand(&short), Expansion::Exhausted);
    }

    #[test]
    fn open_past_the_end_is_exhausted() {
        let transcript = ReferenceTranscript::new("abc def", ".");
        let mut manager = WindowManager::new(policy(), transcript.len());
        manager.initial_window(&transcript, 3);
        manager.advance(Span::new(0, 7));
        assert!(manager.open(&transcript, 3).is_none());
        assert_eq!(manager.window(), SearchWindow { start: 7, end: 7 });
    }

    #[test]
    fn offsets_stay_in_bounds_under_random_sequences() {
        let transcript = ReferenceTranscript::new(FAIRY_TALE, ",.");
        let len = transcript.len();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut manager = WindowManager::new(policy(), len);
            manager.initial_window(&transcript, rng.gen_range(0..30));
            for _ in 0..40 {
                match rng.gen_range(0..4) {
                    0 => {
                        manager.expand(&transcript);
                    }
                    1 => {
                        let w = manager.window();
                        let begin = rng.gen_range(w.start..=w.end);
                        let end = rng.gen_range(begin..=w.end);
                        manager.advance(Span::new(begin, end));
                        manager.open(&transcript, rng.gen_range(0..30));
                    }
                    2 => manager.fallback(rng.gen_range(0..40)),
                    _ => {
                        manager.open(&transcript, rng.gen_range(0..30));
                    }
                }
                let w = manager.window();
                assert!(w.start <= w.end, "{w:?}");
                assert!(w.end <= len, "{w:?}");
                assert!(w.start >= manager.floor().min(len));
                assert!(w.len() <= manager.max_len());
                let reach = manager.reach_back();
                assert!(reach <= w.start && reach >= manager.floor().min(w.start));
            }
        }
    }
}
