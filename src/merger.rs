//! Overlap-aware stitching of per-chunk transcriptions.
//!
//! Consecutive audio chunks share an overlap region, so the head of each new
//! transcription usually repeats words already emitted for the previous
//! chunk. The transcription model does not render the shared audio
//! identically in both chunks (casing, punctuation, and the occasional word
//! differ with context), so the stitcher aligns on a tolerant word-run match
//! instead of exact substring equality, and appends only what follows the
//! matched run. When no confident alignment exists it appends the whole
//! chunk: a duplicated word at a boundary is preferred over a lost one.

use strsim::levenshtein;
use tracing::debug;

/// Estimated speaking rate, used to convert the overlap duration into an
/// expected number of overlap words.
const WORDS_PER_SEC: f64 = 3.0;

/// Minimum matched word run accepted as an alignment point. Shorter runs
/// are too likely to be coincidence ("the", "and") to trim on.
const MIN_MATCH_RUN: usize = 3;

/// Words shorter than this (after normalization) must match exactly; one
/// edit on a three-letter word is a different word, not jitter.
const FUZZY_MIN_CHARS: usize = 4;

/// Maximum edit distance still counted as the same word.
const FUZZY_MAX_DISTANCE: usize = 1;

/// Append-only transcript accumulated over one capture session.
///
/// Created at session start, appended to once per merged chunk, and read a
/// final time at shutdown. It never shrinks and never reorders.
#[derive(Debug, Default, Clone)]
pub struct RunningTranscript {
    words: Vec<String>,
}

impl RunningTranscript {
    /// Full accumulated text, words joined by single spaces.
    pub fn text(&self) -> String {
        self.words.join(" ")
    }

    /// Number of words accumulated so far.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// True until the first non-silent chunk is merged.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn append<'a>(&mut self, words: impl IntoIterator<Item = &'a str>) {
        self.words.extend(words.into_iter().map(str::to_owned));
    }
}

/// Merges per-chunk transcriptions into a [`RunningTranscript`],
/// deduplicating the words repeated across each chunk boundary.
///
/// The stitcher remembers the last *k* words of the previous chunk, where
/// `k = round(WORDS_PER_SEC × overlap_sec)`, and searches the first `2k`
/// words of each new chunk for the longest run of matching words. A run of
/// at least [`MIN_MATCH_RUN`] marks the alignment point; everything after it
/// is new. Alignment never fails hard: an unmatched chunk is appended in
/// full.
///
/// # Examples
///
/// ```
/// use streamscribe::TranscriptStitcher;
///
/// let mut stitcher = TranscriptStitcher::new(1.0);
/// stitcher.push_chunk("the quick brown fox jumps over");
/// let appended = stitcher.push_chunk("fox jumps over the lazy dog");
///
/// assert_eq!(appended, "the lazy dog");
/// assert_eq!(
///     stitcher.into_transcript().text(),
///     "the quick brown fox jumps over the lazy dog",
/// );
/// ```
#[derive(Debug)]
pub struct TranscriptStitcher {
    transcript: RunningTranscript,
    /// Last `overlap_words` words of the previous chunk, empty when the
    /// next chunk has no adjacent predecessor to deduplicate against.
    prev_tail: Vec<String>,
    overlap_words: usize,
    search_words: usize,
}

impl TranscriptStitcher {
    /// Creates a stitcher for chunks sharing `overlap_sec` seconds of audio.
    ///
    /// An overlap of zero disables deduplication: every chunk is appended
    /// in full.
    pub fn new(overlap_sec: f64) -> Self {
        let overlap_words = (overlap_sec * WORDS_PER_SEC).round() as usize;
        Self {
            transcript: RunningTranscript::default(),
            prev_tail: Vec::new(),
            overlap_words,
            search_words: overlap_words * 2,
        }
    }

    /// Merges the transcription of the next chunk and returns the portion
    /// that was actually appended (empty for silence or a fully repeated
    /// chunk).
    ///
    /// Chunks must be pushed in capture order; the overlap reference is
    /// only valid for the immediately following chunk.
    pub fn push_chunk(&mut self, text: &str) -> String {
        let words: Vec<String> = text.split_whitespace().map(str::to_owned).collect();
        if words.is_empty() {
            // A silent chunk leaves the next one with no adjacent words to
            // align against.
            self.prev_tail.clear();
            return String::new();
        }

        let fresh_from = self.alignment_point(&words);
        let appended = words[fresh_from..].join(" ");
        self.transcript.append(words[fresh_from..].iter().map(String::as_str));
        self.remember_tail(words);
        appended
    }

    /// Drops the overlap reference after a failed or skipped chunk.
    ///
    /// The next chunk's audio is no longer adjacent to the remembered tail,
    /// so it is appended in full rather than deduplicated against words
    /// from before the gap.
    pub fn mark_gap(&mut self) {
        self.prev_tail.clear();
    }

    /// The transcript accumulated so far.
    pub fn transcript(&self) -> &RunningTranscript {
        &self.transcript
    }

    /// Consumes the stitcher, yielding the final transcript.
    pub fn into_transcript(self) -> RunningTranscript {
        self.transcript
    }

    /// Index of the first word of `words` that is new relative to the
    /// remembered tail, or 0 when no confident alignment exists.
    fn alignment_point(&self, words: &[String]) -> usize {
        if self.prev_tail.is_empty() {
            return 0;
        }
        let head = &words[..words.len().min(self.search_words)];
        let (run_len, run_end) = longest_common_run(&self.prev_tail, head);
        if run_len >= MIN_MATCH_RUN {
            debug!(run_len, run_end, "aligned chunk against overlap tail");
            run_end
        } else {
            debug!(run_len, "no confident alignment, appending chunk in full");
            0
        }
    }

    fn remember_tail(&mut self, mut words: Vec<String>) {
        if words.len() > self.overlap_words {
            words.drain(..words.len() - self.overlap_words);
        }
        self.prev_tail = words;
    }
}

/// Longest run of consecutively matching words between `tail` and `head`,
/// returned as `(run length, index just past the run in head)`.
fn longest_common_run(tail: &[String], head: &[String]) -> (usize, usize) {
    let mut best = (0, 0);
    let mut prev_row = vec![0usize; head.len() + 1];
    for tail_word in tail {
        let mut row = vec![0usize; head.len() + 1];
        for (j, head_word) in head.iter().enumerate() {
            if words_match(tail_word, head_word) {
                let len = prev_row[j] + 1;
                row[j + 1] = len;
                if len > best.0 {
                    best = (len, j + 1);
                }
            }
        }
        prev_row = row;
    }
    best
}

/// Whether two raw words count as the same spoken word.
///
/// Case and punctuation never matter; for longer words a single edit of
/// transcription jitter ("gray" vs "grey") is tolerated as well.
fn words_match(a: &str, b: &str) -> bool {
    let a = normalize_word(a);
    let b = normalize_word(b);
    if a == b {
        return true;
    }
    a.chars().count() >= FUZZY_MIN_CHARS
        && b.chars().count() >= FUZZY_MIN_CHARS
        && levenshtein(&a, &b) <= FUZZY_MAX_DISTANCE
}

fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_chunk_is_appended_verbatim() {
        let mut stitcher = TranscriptStitcher::new(1.0);
        assert!(stitcher.transcript().is_empty());
        let appended = stitcher.push_chunk("Hello there, everyone.");
        assert_eq!(appended, "Hello there, everyone.");
        assert_eq!(stitcher.transcript().text(), "Hello there, everyone.");
        assert!(!stitcher.transcript().is_empty());
    }

    #[test]
    fn overlap_run_is_emitted_exactly_once() {
        let mut stitcher = TranscriptStitcher::new(1.0);
        stitcher.push_chunk("the quick brown fox jumps over");
        let appended = stitcher.push_chunk("fox jumps over the lazy dog");
        assert_eq!(appended, "the lazy dog");
        assert_eq!(
            stitcher.transcript().text(),
            "the quick brown fox jumps over the lazy dog"
        );
    }

    #[test]
    fn divergent_chunk_falls_back_to_full_append() {
        let mut stitcher = TranscriptStitcher::new(1.0);
        stitcher.push_chunk("hello world");
        let appended = stitcher.push_chunk("completely unrelated text");
        assert_eq!(appended, "completely unrelated text");
        assert_eq!(
            stitcher.transcript().text(),
            "hello world completely unrelated text"
        );
    }

    #[test]
    fn identical_repeated_chunk_adds_nothing() {
        let mut stitcher = TranscriptStitcher::new(2.0);
        stitcher.push_chunk("the quick brown fox jumps over");
        let appended = stitcher.push_chunk("the quick brown fox jumps over");
        assert_eq!(appended, "");
        assert_eq!(stitcher.transcript().text(), "the quick brown fox jumps over");
    }

    #[test]
    fn alignment_tolerates_case_and_punctuation() {
        let mut stitcher = TranscriptStitcher::new(1.0);
        stitcher.push_chunk("meet me at the train station");
        let appended = stitcher.push_chunk("The train station, platform nine");
        assert_eq!(appended, "platform nine");
    }

    #[test]
    fn alignment_tolerates_one_letter_of_jitter() {
        let mut stitcher = TranscriptStitcher::new(1.0);
        stitcher.push_chunk("the fence was painted bright gray");
        let appended = stitcher.push_chunk("painted bright grey and the gate blue");
        assert_eq!(appended, "and the gate blue");
        assert_eq!(
            stitcher.transcript().text(),
            "the fence was painted bright gray and the gate blue"
        );
    }

    #[test]
    fn short_coincidental_match_does_not_trim() {
        let mut stitcher = TranscriptStitcher::new(1.0);
        stitcher.push_chunk("pass me the salt please");
        // "the salt" recurs, but a two-word run is below the threshold.
        let appended = stitcher.push_chunk("the salt mines of poland");
        assert_eq!(appended, "the salt mines of poland");
    }

    #[test]
    fn silence_resets_the_overlap_reference() {
        let mut stitcher = TranscriptStitcher::new(1.0);
        stitcher.push_chunk("the quick brown fox jumps over");
        assert_eq!(stitcher.push_chunk("   "), "");
        // A genuine repetition after silence is new speech, not overlap.
        let appended = stitcher.push_chunk("fox jumps over the hedge");
        assert_eq!(appended, "fox jumps over the hedge");
    }

    #[test]
    fn gap_after_failed_chunk_forces_full_append() {
        let mut stitcher = TranscriptStitcher::new(1.0);
        stitcher.push_chunk("the quick brown fox jumps over");
        stitcher.mark_gap();
        let appended = stitcher.push_chunk("fox jumps over the lazy dog");
        assert_eq!(appended, "fox jumps over the lazy dog");
    }

    #[test]
    fn zero_overlap_never_deduplicates() {
        let mut stitcher = TranscriptStitcher::new(0.0);
        stitcher.push_chunk("one two three");
        let appended = stitcher.push_chunk("one two three four");
        assert_eq!(appended, "one two three four");
        assert_eq!(stitcher.transcript().word_count(), 7);
    }

    #[test]
    fn word_count_is_monotonic_across_merges() {
        let chunks = [
            "the quick brown fox jumps over",
            "fox jumps over the lazy dog",
            "",
            "dog barked at the moon",
            "at the moon and the stars",
        ];
        let mut stitcher = TranscriptStitcher::new(1.0);
        let mut previous = 0;
        for chunk in chunks {
            stitcher.push_chunk(chunk);
            let count = stitcher.transcript().word_count();
            assert!(count >= previous, "merge must never remove words");
            previous = count;
        }
    }

    #[test]
    fn words_match_requires_exactness_on_short_words() {
        assert!(words_match("gray", "grey"));
        assert!(words_match("Station,", "station"));
        assert!(words_match("FOX", "fox"));
        assert!(!words_match("cat", "car"));
        assert!(!words_match("melody", "melodies"));
    }
}
