//! Sentence-by-sentence synthesis
//!
//! Both modes pull sentences from a [`SentenceSegmenter`](super::SentenceSegmenter)
//! so synthesis starts while the model is still generating. Batch mode
//! returns one WAV at the end; chunked mode hands each sentence's WAV to a
//! sink as a length-prefixed frame the moment it is ready.

use crate::Result;
use crate::engine::Synthesizer;

use super::{framing, wav};

/// Audio and text of a completed batch reply
#[derive(Debug, Clone)]
pub struct SpokenReply {
    /// Single WAV covering every sentence
    pub audio: Vec<u8>,
    /// Sentences joined with a space
    pub text: String,
    pub sentences: usize,
}

/// Drives a [`Synthesizer`] over a sentence stream
pub struct SynthesisOrchestrator<'a> {
    synthesizer: &'a dyn Synthesizer,
}

impl<'a> SynthesisOrchestrator<'a> {
    #[must_use]
    pub const fn new(synthesizer: &'a dyn Synthesizer) -> Self {
        Self { synthesizer }
    }

    /// Synthesize every sentence and concatenate the raw audio
    ///
    /// # Errors
    ///
    /// Returns the first generation or synthesis error; no partial audio is
    /// returned
    pub fn batch<I>(&self, sentences: I) -> Result<SpokenReply>
    where
        I: Iterator<Item = Result<String>>,
    {
        let mut pcm = Vec::new();
        let mut parts = Vec::new();

        for sentence in sentences {
            let sentence = sentence?;
            tracing::debug!(sentence = %sentence, "synthesizing");
            pcm.extend(self.synthesizer.synthesize_raw(&sentence)?);
            parts.push(sentence);
        }

        let audio = wav::pcm_to_wav(&pcm, self.synthesizer.sample_rate())?;
        Ok(SpokenReply {
            audio,
            text: parts.join(" "),
            sentences: parts.len(),
        })
    }

    /// Synthesize sentences one at a time into framed chunks
    ///
    /// `sink` receives each frame and returns `false` once the consumer has
    /// gone away. From then on generation still runs to completion, but no
    /// further audio is synthesized. The end-of-stream marker is only sent
    /// after a successful run. Returns the full reply text.
    ///
    /// # Errors
    ///
    /// Returns the first generation or synthesis error; the marker is then
    /// withheld so the consumer can tell the stream was cut short
    pub fn chunked<I, S>(&self, sentences: I, mut sink: S) -> Result<String>
    where
        I: Iterator<Item = Result<String>>,
        S: FnMut(Vec<u8>) -> bool,
    {
        let mut attached = true;
        let mut parts = Vec::new();

        for sentence in sentences {
            let sentence = sentence?;

            if attached {
                tracing::debug!(sentence = %sentence, "synthesizing chunk");
                let audio = self.synthesizer.synthesize(&sentence)?;
                attached = sink(framing::encode_frame(&audio)?);
                if !attached {
                    tracing::info!("consumer detached, finishing generation without audio");
                }
            }

            parts.push(sentence);
        }

        if attached {
            sink(framing::END_OF_STREAM.to_vec());
        }

        Ok(parts.join(" "))
    }
}
