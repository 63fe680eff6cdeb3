//! Reply voicing: sentence segmentation, synthesis and chunk framing

pub mod framing;
mod segmenter;
mod synthesis;
pub mod wav;

pub use segmenter::{SentenceSegmenter, THINK_CLOSE, THINK_OPEN, strip_suppressed};
pub use synthesis::{SpokenReply, SynthesisOrchestrator};
