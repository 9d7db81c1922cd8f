//! The resolution cascade: termination, direct match, strategies, fallback.

use crate::direct::{DirectMatcher, ResolveContext};
use crate::strategies::{
    IntentStrategy, KeywordStrategy, PatternStrategy, SemanticStrategy, UtteranceText,
};
use crate::termination::TerminationDetector;
use crate::{Candidate, IntentError, IntentResult, ResolutionMethod, Result};
use command_core::Command;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum strategy confidence for a candidate to be accepted.
    pub acceptance_threshold: f32,
    /// A runner-up for another command this close to the winner flags ambiguity.
    pub ambiguity_margin: f32,
    /// Shortest trigger eligible for a one-typo direct match.
    pub near_match_min_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.6,
            ambiguity_margin: 0.05,
            near_match_min_len: 5,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.acceptance_threshold > 0.0 && self.acceptance_threshold <= 1.0) {
            return Err(IntentError::InvalidConfig(format!(
                "acceptance_threshold must be in (0, 1], got {}",
                self.acceptance_threshold
            )));
        }
        if !(0.0..1.0).contains(&self.ambiguity_margin) {
            return Err(IntentError::InvalidConfig(format!(
                "ambiguity_margin must be in [0, 1), got {}",
                self.ambiguity_margin
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
struct StageTimer {
    total: Duration,
}

impl StageTimer {
    fn stage<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        let elapsed = started.elapsed();
        self.total += elapsed;
        tracing::trace!(stage = name, elapsed_us = elapsed.as_micros() as u64, "stage done");
        out
    }
}

/// Parameter a command needs; filled from the raw utterance when no stage
/// extracted it.
fn primary_parameter(command: Command) -> Option<&'static str> {
    match command {
        Command::Echo | Command::Prompt => Some("text"),
        Command::Analyze => Some("target"),
        Command::Explain => Some("topic"),
        _ => None,
    }
}

pub struct IntentPipeline {
    config: PipelineConfig,
    termination: TerminationDetector,
    direct: DirectMatcher,
    strategies: Vec<Box<dyn IntentStrategy>>,
}

impl IntentPipeline {
    /// Pipeline with the built-in strategies, in priority order.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let strategies: Vec<Box<dyn IntentStrategy>> = vec![
            Box::new(SemanticStrategy::new()),
            Box::new(PatternStrategy::new()?),
            Box::new(KeywordStrategy::new()),
        ];
        tracing::debug!(
            threshold = config.acceptance_threshold,
            strategies = strategies.len(),
            "intent pipeline ready"
        );
        Ok(Self {
            termination: TerminationDetector::new()?,
            direct: DirectMatcher::new(config.near_match_min_len),
            config,
            strategies,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Append a strategy; it competes with the built-in ones on confidence.
    pub fn push_strategy(&mut self, strategy: Box<dyn IntentStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run only the termination stage. `Some` means the utterance ends the
    /// conversation whatever else is pending.
    pub fn detect_termination(&self, text: &str) -> Option<IntentResult> {
        let mut timer = StageTimer::default();
        let input = timer.stage("normalize", || UtteranceText::new(text));
        let hit = timer.stage("termination", || self.termination.candidate(&input.normalized))?;
        Some(self.finish(&input, hit, timer, false, false))
    }

    pub fn resolve(&self, text: &str) -> IntentResult {
        self.resolve_with(text, &ResolveContext::default())
    }

    /// Resolve one utterance. Never fails: anything unclassifiable becomes a
    /// PROMPT fallback carrying the raw text.
    pub fn resolve_with(&self, text: &str, context: &ResolveContext) -> IntentResult {
        let mut timer = StageTimer::default();
        let input = timer.stage("normalize", || UtteranceText::new(text));

        if let Some(hit) =
            timer.stage("termination", || self.termination.candidate(&input.normalized))
        {
            return self.finish(&input, hit, timer, false, false);
        }

        if let Some(hit) =
            timer.stage("direct", || self.direct.match_text(&input.normalized, context))
        {
            return self.finish(&input, hit, timer, false, false);
        }

        let mut candidates: Vec<Candidate> = Vec::new();
        if !input.normalized.is_empty() {
            for strategy in &self.strategies {
                let method = strategy.method();
                let found = timer.stage(strategy.name(), || strategy.try_resolve(&input));
                candidates.extend(found.into_iter().map(|mut c| {
                    c.method = method;
                    c
                }));
            }
        }

        let threshold = self.config.acceptance_threshold;
        let winner = candidates
            .iter()
            .filter(|c| c.confidence >= threshold)
            .fold(None::<&Candidate>, |best, c| match best {
                Some(b) if !c.beats(b) => Some(b),
                _ => Some(c),
            });

        match winner {
            Some(winner) => {
                let margin = self.config.ambiguity_margin;
                let ambiguous = candidates
                    .iter()
                    .any(|c| c.command != winner.command && c.confidence + margin >= winner.confidence);

                let mut chosen = winner.clone();
                let mut agreeing: Vec<&Candidate> = candidates
                    .iter()
                    .filter(|c| c.command == winner.command)
                    .collect();
                agreeing.sort_by_key(|c| c.method.priority());
                for c in agreeing {
                    for (key, value) in &c.parameters {
                        chosen
                            .parameters
                            .entry(key.clone())
                            .or_insert_with(|| value.clone());
                    }
                }
                self.finish(&input, chosen, timer, false, ambiguous)
            }
            None => {
                let best = candidates
                    .iter()
                    .map(|c| c.confidence)
                    .fold(0.0_f32, f32::max);
                let fallback = Candidate::new(Command::Prompt, best, ResolutionMethod::Fallback);
                self.finish(&input, fallback, timer, true, false)
            }
        }
    }

    fn finish(
        &self,
        input: &UtteranceText,
        mut candidate: Candidate,
        timer: StageTimer,
        fallback_used: bool,
        ambiguous: bool,
    ) -> IntentResult {
        if let Some(key) = primary_parameter(candidate.command) {
            candidate
                .parameters
                .entry(key.to_string())
                .or_insert_with(|| input.raw.clone());
        }
        let result =
            IntentResult::from_candidate(&input.raw, candidate, timer.total, fallback_used, ambiguous);
        tracing::debug!(
            command = %result.command,
            confidence = result.confidence,
            method = %result.method,
            fallback = result.fallback_used,
            ambiguous = result.ambiguous,
            elapsed_us = result.processing_time.as_micros() as u64,
            "intent resolved"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> IntentPipeline {
        IntentPipeline::new(PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_polite_termination() {
        let r = pipeline().resolve("C'est bon merci");
        assert_eq!(r.command, Command::Quit);
        assert!(r.confidence >= 0.8);
        assert_eq!(r.method, ResolutionMethod::Termination);
        assert!(!r.fallback_used);
    }

    #[test]
    fn test_termination_shadows_other_commands() {
        let r = pipeline().resolve("analyse ce code, merci pour ton aide, tu peux t'arrêter");
        assert_eq!(r.command, Command::Quit);
        assert_eq!(r.method, ResolutionMethod::Termination);
        let r = pipeline().resolve("stop");
        assert_eq!(r.command, Command::Quit);
    }

    #[test]
    fn test_plain_stop_requests_quit() {
        let p = pipeline();
        for text in [
            "tu peux t'arrêter",
            "ok tu peux quitter",
            "vous pouvez vous arrêter",
            "stop listening",
            "analyse ce code et arrête-toi",
            "quelle heure est-il, puis quitte",
        ] {
            let r = p.resolve(text);
            assert_eq!(r.command, Command::Quit, "{text:?}");
            assert_eq!(r.method, ResolutionMethod::Termination, "{text:?}");
            assert!(r.confidence >= 0.85, "{text:?}");
            assert!(!r.fallback_used);
        }
        assert_ne!(p.resolve("arrête de répéter ça").command, Command::Quit);
    }

    #[test]
    fn test_termination_stage_alone() {
        let p = pipeline();
        let r = p.detect_termination("au revoir").unwrap();
        assert_eq!(r.command, Command::Quit);
        assert!(p.detect_termination("oui").is_none());
        assert!(p.detect_termination("quelle heure est-il").is_none());
    }

    #[test]
    fn test_direct_match_bypasses_strategies() {
        let r = pipeline().resolve("aide");
        assert_eq!(r.command, Command::Help);
        assert_eq!(r.confidence, 1.0);
        assert_eq!(r.method, ResolutionMethod::DirectMatch);
        let r = pipeline().resolve("quelle heure est-il");
        assert_eq!(r.command, Command::Time);
        assert_eq!(r.method, ResolutionMethod::DirectMatch);
    }

    #[test]
    fn test_pattern_with_parameter() {
        let r = pipeline().resolve("Répète après moi : bonjour le monde");
        assert_eq!(r.command, Command::Echo);
        assert_eq!(r.method, ResolutionMethod::Pattern);
        assert_eq!(r.parameter("text"), Some("bonjour le monde"));
        assert!(!r.fallback_used);
    }

    #[test]
    fn test_semantic_paraphrase() {
        let r = pipeline().resolve("combien d'instances tournent en ce moment");
        assert_eq!(r.command, Command::ClusterStatus);
        assert_eq!(r.method, ResolutionMethod::Semantic);
        assert!(!r.ambiguous);
    }

    #[test]
    fn test_fallback_carries_raw_text() {
        let r = pipeline().resolve("raconte-moi une histoire de pirates");
        assert_eq!(r.command, Command::Prompt);
        assert!(r.fallback_used);
        assert_eq!(r.method, ResolutionMethod::Fallback);
        assert!(r.confidence < 0.6);
        assert_eq!(r.parameter("text"), Some("raconte-moi une histoire de pirates"));
    }

    #[test]
    fn test_empty_and_garbage_degrade_to_fallback() {
        for text in ["", "   ", "?!?", "zzxq wvvk"] {
            let r = pipeline().resolve(text);
            assert_eq!(r.command, Command::Prompt, "input {text:?}");
            assert!(r.fallback_used);
            assert_eq!(r.confidence, 0.0);
        }
    }

    #[test]
    fn test_close_competitors_flag_ambiguity() {
        let r = pipeline().resolve("analyse et explique ce code");
        assert!(matches!(r.command, Command::Analyze | Command::Explain));
        assert!(r.ambiguous);
    }

    #[test]
    fn test_repeat_previous_command() {
        let ctx = ResolveContext {
            previous: Some(Command::Time),
        };
        let r = pipeline().resolve_with("encore une fois", &ctx);
        assert_eq!(r.command, Command::Time);
    }

    struct BuildStrategy;

    impl IntentStrategy for BuildStrategy {
        fn name(&self) -> &str {
            "build"
        }

        fn method(&self) -> ResolutionMethod {
            ResolutionMethod::Keyword
        }

        fn try_resolve(&self, input: &UtteranceText) -> Vec<Candidate> {
            if input.tokens().any(|t| t == "build") {
                vec![Candidate::new(Command::Version, 0.7, ResolutionMethod::Keyword)]
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn test_registered_strategy_competes() {
        let mut p = pipeline();
        p.push_strategy(Box::new(BuildStrategy));
        assert_eq!(p.strategy_names(), vec!["semantic", "pattern", "keyword", "build"]);
        let r = p.resolve("numéro de build");
        assert_eq!(r.command, Command::Version);
        assert_eq!(r.method, ResolutionMethod::Keyword);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            acceptance_threshold: 1.5,
            ..PipelineConfig::default()
        };
        assert!(IntentPipeline::new(config).is_err());
    }
}
