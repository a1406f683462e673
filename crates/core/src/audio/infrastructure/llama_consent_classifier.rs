use std::num::NonZeroU32;
use std::path::Path;
use std::sync::OnceLock;

use llama_cpp_4::context::params::LlamaContextParams;
use llama_cpp_4::llama_backend::LlamaBackend;
use llama_cpp_4::llama_batch::LlamaBatch;
use llama_cpp_4::model::params::LlamaModelParams;
use llama_cpp_4::model::{AddBos, LlamaModel, Special};
use llama_cpp_4::sampling::LlamaSampler;

use crate::audio::domain::consent_classifier::ConsentClassifier;
use crate::consent::domain::verdict::ConsentVerdict;

const N_CTX: u32 = 1024;

/// Upper bound on generated tokens; the verdict is one short JSON object.
const MAX_TOKENS: usize = 96;

/// llama.cpp allows exactly one backend per process; every classifier in
/// the speech pool shares it.
static BACKEND: OnceLock<LlamaBackend> = OnceLock::new();

fn shared_backend() -> Result<&'static LlamaBackend, Box<dyn std::error::Error>> {
    if BACKEND.get().is_none() {
        let backend = LlamaBackend::init().map_err(|e| format!("llama backend init: {e}"))?;
        let _ = BACKEND.set(backend);
    }
    BACKEND.get().ok_or_else(|| "llama backend unavailable".into())
}

/// Consent classification with a small instruct LLM over llama.cpp (GGUF).
///
/// The prompt constrains the model to a single JSON object and to a narrow
/// definition of consent: explicit, first-person, present-tense agreement to
/// be recorded. Anything else — third-person, conditional, historical,
/// negated, ambiguous — must come back negative. Decoding is greedy so the
/// same utterance always yields the same verdict.
pub struct LlamaConsentClassifier {
    backend: &'static LlamaBackend,
    model: LlamaModel,
}

impl LlamaConsentClassifier {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let backend = shared_backend()?;
        let params = LlamaModelParams::default();
        let model = LlamaModel::load_from_file(backend, model_path, &params)
            .map_err(|e| format!("failed to load classifier model: {e}"))?;
        Ok(Self { backend, model })
    }

    fn generate(&self, prompt: &str) -> Result<String, Box<dyn std::error::Error>> {
        // Contexts borrow the model, so each call builds a fresh one; with a
        // 0.5B model and a sub-kilobyte prompt this stays well under the
        // per-utterance latency budget.
        let ctx_params = LlamaContextParams::default().with_n_ctx(NonZeroU32::new(N_CTX));
        let mut ctx = self
            .model
            .new_context(self.backend, ctx_params)
            .map_err(|e| format!("llama context: {e}"))?;

        let tokens = self
            .model
            .str_to_token(prompt, AddBos::Always)
            .map_err(|e| format!("tokenization failed: {e}"))?;
        if tokens.is_empty() || tokens.len() as u32 >= N_CTX {
            return Err(format!("prompt length {} outside context window", tokens.len()).into());
        }

        let mut batch = LlamaBatch::new(N_CTX as usize, 1);
        let last_index = tokens.len() as i32 - 1;
        for (i, token) in tokens.iter().enumerate() {
            batch.add(*token, i as i32, &[0], i as i32 == last_index)?;
        }
        ctx.decode(&mut batch).map_err(|e| format!("llama decode: {e}"))?;

        let mut sampler = LlamaSampler::greedy();
        let mut output = String::new();
        let mut pos = tokens.len() as i32;

        for _ in 0..MAX_TOKENS {
            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            sampler.accept(token);

            if self.model.is_eog_token(token) {
                break;
            }

            let piece = self
                .model
                .token_to_str(token, Special::Tokenize)
                .map_err(|e| format!("detokenization failed: {e}"))?;
            output.push_str(&piece);

            // A complete JSON object is all we need; stop early.
            if extract_json(&output).is_some() {
                break;
            }

            batch.clear();
            batch.add(token, pos, &[0], true)?;
            ctx.decode(&mut batch).map_err(|e| format!("llama decode: {e}"))?;
            pos += 1;
        }

        Ok(output)
    }
}

impl ConsentClassifier for LlamaConsentClassifier {
    fn classify(&mut self, utterance: &str) -> Result<ConsentVerdict, Box<dyn std::error::Error>> {
        let prompt = build_prompt(utterance);
        let output = self.generate(&prompt)?;
        let verdict = parse_verdict(&output)
            .ok_or_else(|| format!("classifier produced no parseable verdict: {output:?}"))?;
        Ok(verdict.normalized())
    }
}

/// The constrained classification prompt.
///
/// Kept strict on purpose: a false positive publishes someone's face.
fn build_prompt(utterance: &str) -> String {
    let utterance = sanitize(utterance);
    format!(
        "You label utterances heard by a wearable camera.\n\
         Decide whether the SPEAKER explicitly consents, right now and in the \
         first person, to being recorded or filmed.\n\
         Answer with exactly one JSON object: \
         {{\"consented\": true or false, \"name\": \"<name the speaker gives for themselves>\" or null}}\n\
         Label consented=false for: statements about someone else's consent, \
         conditionals (\"I would consent if...\"), questions, refusals, \
         negations (\"I don't consent\"), past or reported consent, jokes, and \
         anything ambiguous.\n\
         Examples:\n\
         \"I consent to being recorded, my name is Alice\" -> {{\"consented\": true, \"name\": \"Alice\"}}\n\
         \"yes you can film me\" -> {{\"consented\": true, \"name\": null}}\n\
         \"she said you can record her\" -> {{\"consented\": false, \"name\": null}}\n\
         \"I do not consent\" -> {{\"consented\": false, \"name\": null}}\n\
         Utterance: \"{utterance}\"\n\
         JSON:"
    )
}

/// Strip characters that would let a transcript break out of the quoted
/// utterance in the prompt.
fn sanitize(utterance: &str) -> String {
    utterance
        .chars()
        .map(|c| match c {
            '"' | '\\' => '\'',
            '\n' | '\r' | '\t' => ' ',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// First balanced `{...}` in model output, tolerating prose or code fences
/// around it.
fn extract_json(output: &str) -> Option<&str> {
    let start = output.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in output[start..].char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&output[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_verdict(output: &str) -> Option<ConsentVerdict> {
    let json = extract_json(output)?;
    serde_json::from_str::<ConsentVerdict>(json).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let out = r#"{"consented": true, "name": "Alice"}"#;
        assert_eq!(extract_json(out), Some(out));
    }

    #[test]
    fn test_extract_json_with_prose_and_fence() {
        let out = "Sure! Here is the answer:\n```json\n{\"consented\": false, \"name\": null}\n```";
        assert_eq!(
            extract_json(out),
            Some(r#"{"consented": false, "name": null}"#)
        );
    }

    #[test]
    fn test_extract_json_brace_inside_string() {
        let out = r#"{"consented": true, "name": "al{ice"}"#;
        assert_eq!(extract_json(out), Some(out));
    }

    #[test]
    fn test_extract_json_incomplete_returns_none() {
        assert_eq!(extract_json(r#"{"consented": tru"#), None);
        assert_eq!(extract_json("no braces here"), None);
    }

    #[test]
    fn test_parse_verdict_positive() {
        let v = parse_verdict(r#"{"consented": true, "name": "Alice"}"#).unwrap();
        assert!(v.consented);
        assert_eq!(v.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_parse_verdict_null_name() {
        let v = parse_verdict(r#"{"consented": true, "name": null}"#).unwrap();
        assert!(v.consented);
        assert_eq!(v.name, None);
    }

    #[test]
    fn test_parse_verdict_missing_name_field() {
        let v = parse_verdict(r#"{"consented": false}"#).unwrap();
        assert!(!v.consented);
        assert_eq!(v.name, None);
    }

    #[test]
    fn test_parse_verdict_garbage_returns_none() {
        assert!(parse_verdict("I think they consented").is_none());
        assert!(parse_verdict(r#"{"consented": "maybe"}"#).is_none());
    }

    #[test]
    fn test_sanitize_strips_breakout_characters() {
        assert_eq!(sanitize("say \"stop\"\nnow"), "say 'stop' now");
        assert_eq!(sanitize("back\\slash"), "back'slash");
    }

    #[test]
    fn test_prompt_contains_utterance_and_contract() {
        let p = build_prompt("I consent, my name is Bob");
        assert!(p.contains("I consent, my name is Bob"));
        assert!(p.contains("\"consented\""));
        assert!(p.contains("first person"));
    }

    #[test]
    fn test_new_with_missing_model_fails() {
        assert!(LlamaConsentClassifier::new(Path::new("/nonexistent/model.gguf")).is_err());
    }
}
