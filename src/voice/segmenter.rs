//! Sentence segmentation over a live token stream
//!
//! The language model yields fragments that may split words, markers and
//! sentences anywhere. [`SentenceSegmenter`] rebuilds speakable sentences as
//! soon as they are complete and drops `<think>...</think>` spans, which must
//! never reach synthesis or the caller.

use crate::Result;

/// Opening marker of a suppressed reasoning span
pub const THINK_OPEN: &str = "<think>";

/// Closing marker of a suppressed reasoning span
pub const THINK_CLOSE: &str = "</think>";

const fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | ';' | '\n')
}

/// Byte offset just past the first sentence terminator in `text`
///
/// A run of terminators ("...", "?!") ends the sentence as a unit. A '.'
/// between two digits is a decimal point; a '.' right after a digit at the
/// very end of `text` is ambiguous and waits for more input.
fn find_sentence_end(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();
    let mut prev: Option<char> = None;

    while let Some((idx, c)) = chars.next() {
        if is_terminator(c) {
            if c == '.' && prev.is_some_and(|p| p.is_ascii_digit()) {
                match chars.peek() {
                    Some((_, next)) if next.is_ascii_digit() => {
                        prev = Some(c);
                        continue;
                    }
                    None => return None,
                    Some(_) => {}
                }
            }

            let mut end = idx + c.len_utf8();
            if c != '\n' {
                while let Some(&(next_idx, next)) = chars.peek() {
                    if next == '\n' || !is_terminator(next) {
                        break;
                    }
                    end = next_idx + next.len_utf8();
                    chars.next();
                }
            }
            return Some(end);
        }
        prev = Some(c);
    }

    None
}

/// Lazily turns a fragment stream into trimmed, non-empty sentences
///
/// Markers are searched across the whole buffer, so a marker split over
/// several fragments is still recognized. Text before an open marker is still
/// spoken; an unclosed span at end of stream is discarded. A producer error
/// is yielded once and ends the sequence.
pub struct SentenceSegmenter<I> {
    fragments: I,
    buffer: String,
    /// Byte offset in `buffer` where an unclosed suppressed span begins
    suppressed_from: Option<usize>,
    finished: bool,
}

impl<I> SentenceSegmenter<I>
where
    I: Iterator<Item = Result<String>>,
{
    pub const fn new(fragments: I) -> Self {
        Self {
            fragments,
            buffer: String::new(),
            suppressed_from: None,
            finished: false,
        }
    }

    /// Whether an open marker is waiting for its close marker
    #[must_use]
    pub const fn is_suppressing(&self) -> bool {
        self.suppressed_from.is_some()
    }

    fn absorb(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);

        loop {
            let start = match self.suppressed_from {
                Some(start) => start,
                None => match self.buffer.find(THINK_OPEN) {
                    Some(start) => {
                        self.suppressed_from = Some(start);
                        start
                    }
                    None => break,
                },
            };

            let body = start + THINK_OPEN.len();
            let Some(close) = self.buffer[body..].find(THINK_CLOSE) else {
                break;
            };
            self.buffer
                .replace_range(start..body + close + THINK_CLOSE.len(), "");
            self.suppressed_from = None;
        }
    }

    fn take_sentence(&mut self) -> Option<String> {
        loop {
            let speakable = self.suppressed_from.unwrap_or(self.buffer.len());
            let end = find_sentence_end(&self.buffer[..speakable])?;

            let sentence: String = self.buffer.drain(..end).collect();
            if let Some(start) = self.suppressed_from.as_mut() {
                *start -= end;
            }

            let trimmed = sentence.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    fn flush(&mut self) -> Option<String> {
        if let Some(start) = self.suppressed_from.take() {
            tracing::debug!("stream ended inside a suppressed span");
            self.buffer.truncate(start);
        }
        let rest = std::mem::take(&mut self.buffer);
        let trimmed = rest.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

impl<I> Iterator for SentenceSegmenter<I>
where
    I: Iterator<Item = Result<String>>,
{
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if let Some(sentence) = self.take_sentence() {
                return Some(Ok(sentence));
            }

            match self.fragments.next() {
                Some(Ok(fragment)) => self.absorb(&fragment),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    return self.flush().map(Ok);
                }
            }
        }
    }
}

/// Remove suppressed spans from a complete (one-shot) model response
///
/// Complete spans are removed wherever they occur; an unclosed span swallows
/// the rest of the text.
#[must_use]
pub fn strip_suppressed(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..start]);
        let body = &rest[start + THINK_OPEN.len()..];
        match body.find(THINK_CLOSE) {
            Some(close) => rest = &body[close + THINK_CLOSE.len()..],
            None => return out,
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn segment(fragments: &[&str]) -> Vec<String> {
        let source = fragments
            .iter()
            .map(|f| Ok((*f).to_string()))
            .collect::<Vec<Result<String>>>();
        SentenceSegmenter::new(source.into_iter())
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_splits_on_terminators() {
        assert_eq!(
            segment(&["Hola. ¿Qué tal? Bien!", " Adiós; hasta luego\nChao"]),
            vec!["Hola.", "¿Qué tal?", "Bien!", "Adiós;", "hasta luego", "Chao"]
        );
    }

    #[test]
    fn test_reassembles_split_tokens() {
        assert_eq!(
            segment(&["Ho", "la mun", "do", ". Otra", " frase"]),
            vec!["Hola mundo.", "Otra frase"]
        );
    }

    #[test]
    fn test_removes_think_block() {
        assert_eq!(
            segment(&["<think>Debo saludar.</think>", "Hola. Buenos días."]),
            vec!["Hola.", "Buenos días."]
        );
    }

    #[test]
    fn test_markers_split_across_fragments() {
        assert_eq!(
            segment(&["Vale. <thi", "nk>razono. mucho.</th", "ink>Listo."]),
            vec!["Vale.", "Listo."]
        );
    }

    #[test]
    fn test_text_before_marker_is_spoken() {
        assert_eq!(
            segment(&["Primero <think>oculto.", " más oculto.", "</think> segundo."]),
            vec!["Primero  segundo."]
        );
    }

    #[test]
    fn test_unclosed_span_is_dropped() {
        assert_eq!(segment(&["Hola. <think>nunca cierra."]), vec!["Hola."]);
    }

    #[test]
    fn test_multiple_spans() {
        assert_eq!(
            segment(&["A<think>1</think>B<think>2</think>C."]),
            vec!["ABC."]
        );
    }

    #[test]
    fn test_decimal_point_is_not_a_boundary() {
        assert_eq!(
            segment(&["Avanzo 2", ".", "5 metros. Listo"]),
            vec!["Avanzo 2.5 metros.", "Listo"]
        );
    }

    #[test]
    fn test_terminator_runs_stay_together() {
        assert_eq!(
            segment(&["Bueno... vale?! Sí"]),
            vec!["Bueno...", "vale?!", "Sí"]
        );
    }

    #[test]
    fn test_never_emits_empty() {
        assert!(segment(&["  ", "\n\n", " . "]).iter().all(|s| !s.is_empty()));
        assert!(segment(&[]).is_empty());
        assert!(segment(&["<think>solo razonamiento</think>"]).is_empty());
    }

    #[test]
    fn test_error_ends_sequence() {
        let source = vec![
            Ok("Uno. Dos".to_string()),
            Err(Error::Llm("boom".to_string())),
            Ok("Tres.".to_string()),
        ];
        let mut segmenter = SentenceSegmenter::new(source.into_iter());
        assert_eq!(segmenter.next().unwrap().unwrap(), "Uno.");
        assert!(segmenter.next().unwrap().is_err());
        assert!(segmenter.next().is_none());
    }

    #[test]
    fn test_strip_suppressed() {
        assert_eq!(strip_suppressed("Hola <think>x</think>mundo"), "Hola mundo");
        assert_eq!(strip_suppressed("<think>\n\n</think>\n{\"a\":1}"), "\n{\"a\":1}");
        assert_eq!(strip_suppressed("Hola <think>sin cierre"), "Hola ");
        assert_eq!(strip_suppressed("sin marcas"), "sin marcas");
    }
}
