// Analysis module: turns a scripture passage into a prompt, sends it
// through a `CompletionService`, and splits the reply into the known
// sections. Rendering lives in `render`.

use crate::api::{CompletionRequest, CompletionService};
use crate::config::AnalyzerConfig;
use crate::error::ServiceError;
use crossterm::style::Color;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A section the model is asked to produce, with its display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpec {
    pub heading: &'static str,
    pub color: Color,
}

/// Known sections in display order. Adding a row here adds it to the
/// prompt, the parser and the output.
pub const SECTIONS: &[SectionSpec] = &[
    SectionSpec { heading: "HISTORICAL CONTEXT", color: Color::Yellow },
    SectionSpec { heading: "KEY SYMBOLS", color: Color::Green },
    SectionSpec { heading: "SPIRITUAL INTERPRETATION", color: Color::Cyan },
    SectionSpec { heading: "BIBLICAL CONNECTIONS", color: Color::Magenta },
];

pub const SYSTEM_PROMPT: &str = "You are a biblical scholar specializing in Catholic scripture \
interpretation and symbolism.";

/// The passage submitted for one turn. Never empty, always trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptureRequest {
    text: String,
}

impl ScriptureRequest {
    /// Returns `None` when `text` is empty or only whitespace.
    pub fn new(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(ScriptureRequest {
                text: trimmed.to_string(),
            })
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Embed the passage into the fixed instruction template.
pub fn build_prompt(scripture: &str) -> String {
    let mut prompt = String::from(
        "Analyze the following biblical scripture and explain its symbolic meaning.\n\
         Format your response with these exact headers:\n",
    );
    for spec in SECTIONS {
        prompt.push_str(spec.heading);
        prompt.push_str(":\n");
    }
    prompt.push_str("\nScripture:\n");
    prompt.push_str(scripture);
    prompt
}

/// The model's reply for one turn, split by heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResponse {
    raw: String,
    preamble: Option<String>,
    sections: HashMap<&'static str, String>,
}

impl AnalysisResponse {
    /// Split `raw` into sections. Headings are matched case-insensitively
    /// at line start; unknown text before the first heading becomes the
    /// preamble. A repeated heading keeps its last body.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let (preamble, sections) = split_sections(&raw);
        AnalysisResponse {
            raw,
            preamble,
            sections,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn preamble(&self) -> Option<&str> {
        self.preamble.as_deref()
    }

    pub fn section(&self, heading: &str) -> Option<&str> {
        self.sections.get(heading).map(String::as_str)
    }

    /// Present sections in display order.
    pub fn ordered(&self) -> impl Iterator<Item = (&'static SectionSpec, &str)> + '_ {
        SECTIONS
            .iter()
            .filter_map(move |spec| self.section(spec.heading).map(|body| (spec, body)))
    }

    /// Headings the model did not return.
    pub fn missing(&self) -> Vec<&'static str> {
        SECTIONS
            .iter()
            .map(|spec| spec.heading)
            .filter(|h| !self.sections.contains_key(h))
            .collect()
    }

    /// True when at least one known heading was found.
    pub fn has_sections(&self) -> bool {
        !self.sections.is_empty()
    }
}

fn split_sections(raw: &str) -> (Option<String>, HashMap<&'static str, String>) {
    let mut sections = HashMap::new();
    let mut preamble: Vec<&str> = Vec::new();
    let mut current: Option<(&'static str, Vec<&str>)> = None;

    for line in raw.lines() {
        if let Some((heading, rest)) = match_heading(line) {
            if let Some((prev, body)) = current.take() {
                insert_section(&mut sections, prev, &body);
            }
            let mut body = Vec::new();
            if !rest.is_empty() {
                body.push(rest);
            }
            current = Some((heading, body));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        } else {
            preamble.push(line);
        }
    }
    if let Some((prev, body)) = current.take() {
        insert_section(&mut sections, prev, &body);
    }

    let preamble = Some(join_trimmed(&preamble)).filter(|p| !p.is_empty());
    (preamble, sections)
}

fn insert_section(sections: &mut HashMap<&'static str, String>, heading: &'static str, body: &[&str]) {
    if sections.contains_key(heading) {
        debug!(heading, "repeated section heading, keeping the last one");
    }
    sections.insert(heading, join_trimmed(body));
}

fn join_trimmed(lines: &[&str]) -> String {
    lines.join("\n").trim().to_string()
}

fn is_marker(c: char) -> bool {
    matches!(c, '#' | '*' | '_')
}

/// Recognize a heading line such as `HISTORICAL CONTEXT:`,
/// `## Key Symbols`, `KEY SYMBOLS - text` or
/// `**2. Spiritual Interpretation:** text`. The heading must be followed by
/// end of line or punctuation.
/// Returns the heading and whatever follows it on the same line.
fn match_heading(line: &str) -> Option<(&'static str, &str)> {
    let mut s = line.trim_start().trim_start_matches(is_marker).trim_start();

    // optional list numbering: "1." or "1)"
    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let after = &s[digits..];
        if let Some(after) = after.strip_prefix('.').or_else(|| after.strip_prefix(')')) {
            s = after.trim_start().trim_start_matches(is_marker).trim_start();
        }
    }

    for spec in SECTIONS {
        let h = spec.heading;
        let Some(candidate) = s.get(..h.len()) else {
            continue;
        };
        if !candidate.eq_ignore_ascii_case(h) {
            continue;
        }
        let rest = &s[h.len()..];
        if rest.starts_with(|c: char| c.is_alphanumeric()) {
            continue;
        }
        // "Key symbols in this passage..." is prose, not a heading
        let rest = rest.trim_start_matches(is_marker).trim_start();
        if rest.starts_with(|c: char| c.is_alphanumeric()) {
            continue;
        }
        let rest = rest
            .trim_start_matches(is_separator)
            .trim_start()
            .trim_start_matches(is_marker);
        return Some((h, rest.trim()));
    }
    None
}

fn is_separator(c: char) -> bool {
    matches!(c, ':' | '-' | '.' | '\u{2013}' | '\u{2014}')
}

/// The Analysis Client: builds the request, calls the service and parses
/// the reply.
pub struct Analyzer<S> {
    service: S,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl<S: CompletionService> Analyzer<S> {
    pub fn new(service: S, config: &AnalyzerConfig) -> Self {
        Analyzer {
            service,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn completion_request(&self, request: &ScriptureRequest) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(request.text()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn analyze(&self, request: &ScriptureRequest) -> Result<AnalysisResponse, ServiceError> {
        let completion = self.completion_request(request);
        debug!(chars = request.text().len(), model = %self.model, "requesting analysis");

        let raw = self.service.complete(&completion)?;
        let response = AnalysisResponse::parse(raw);

        let missing = response.missing();
        if !missing.is_empty() {
            warn!(?missing, "response is missing sections");
        }
        Ok(response)
    }

    #[cfg(test)]
    pub(crate) fn service(&self) -> &S {
        &self.service
    }
}
