use crate::consent::domain::verdict::ConsentVerdict;

/// Domain interface for deciding whether an utterance grants consent.
///
/// Implementations must only treat explicit, first-person, present-tense
/// consent to be recorded as positive; errors mean "no verdict", which the
/// speech worker treats as negative.
pub trait ConsentClassifier: Send {
    fn classify(&mut self, utterance: &str) -> Result<ConsentVerdict, Box<dyn std::error::Error>>;
}
