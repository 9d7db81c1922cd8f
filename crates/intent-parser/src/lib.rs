//! Intent resolution for spoken and typed commands
//!
//! Turns an utterance into a command of the closed vocabulary through a
//! strict cascade. Termination cues always win, whole-utterance trigger
//! words come next, then the pluggable strategies compete on confidence.
//! When nothing is confident enough the text is forwarded as a PROMPT.

mod direct;
mod error;
mod normalize;
mod pipeline;
mod result;
mod strategies;
mod termination;

pub use direct::{DirectMatcher, ResolveContext};
pub use error::{IntentError, Result};
pub use normalize::normalize;
pub use pipeline::{IntentPipeline, PipelineConfig};
pub use result::{Candidate, IntentResult, ResolutionMethod};
pub use strategies::{
    IntentStrategy, KeywordStrategy, PatternStrategy, SemanticStrategy, UtteranceText,
};
pub use termination::{TerminationDetector, TerminationMatch};

/// Resolve with a default pipeline. Convenient for one-off calls; long-lived
/// callers should keep an [`IntentPipeline`].
pub fn resolve_text(text: &str) -> Result<IntentResult> {
    Ok(IntentPipeline::new(PipelineConfig::default())?.resolve(text))
}
