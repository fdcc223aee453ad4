use std::collections::BTreeMap;
use std::sync::OnceLock;

use ns_core::{ContentType, LineLocation, LineMetadata, NarrativeError};
use regex::Regex;

const MAX_SPEAKER_WORDS: usize = 3;
const MAX_SPEAKER_CHARS: usize = 50;
const THOUGHT_MARKERS: [&str; 3] = [" is thinking", " thinks", " thought"];

/// Classifies lines and keeps the errors it recovered from.
///
/// Classification itself never fails: a line that cannot be classified is
/// returned as narration carrying its original text.
#[derive(Debug, Default)]
pub struct LineClassifier {
    errors: Vec<NarrativeError>,
}

impl LineClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&mut self, raw: &str) -> LineMetadata {
        self.classify_inner(raw, None)
    }

    pub fn classify_at(&mut self, raw: &str, location: LineLocation) -> LineMetadata {
        self.classify_inner(raw, Some(location))
    }

    pub fn errors(&self) -> &[NarrativeError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<NarrativeError> {
        std::mem::take(&mut self.errors)
    }

    fn classify_inner(&mut self, raw: &str, location: Option<LineLocation>) -> LineMetadata {
        match classify_line(raw) {
            Ok(metadata) => metadata,
            Err(error) => {
                let error = match location {
                    Some(location) => error.with_location(location),
                    None => error,
                };
                tracing::warn!(code = %error.code, location = ?error.location, "{}", error.message);
                self.errors.push(error);
                fallback_narration(raw)
            }
        }
    }
}

/// Classifies one raw script line. First match wins: empty, comment, label,
/// thought, speech, narration.
pub fn classify_line(raw: &str) -> Result<LineMetadata, NarrativeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(LineMetadata::new(ContentType::Empty, ""));
    }

    if let Some(rest) = trimmed.strip_prefix("//") {
        return Ok(LineMetadata::new(ContentType::Comment, rest.trim()));
    }
    if let Some(rest) = trimmed.strip_prefix(';') {
        return Ok(LineMetadata::new(ContentType::Comment, rest.trim()));
    }

    if let Some(rest) = trimmed.strip_prefix('#') {
        let name = rest.trim();
        if name.is_empty() {
            return Err(NarrativeError::new(
                "LINE_LABEL_EMPTY",
                "Label line has no name after '#'.",
            ));
        }
        let mut metadata = LineMetadata::new(ContentType::Label, name);
        metadata.label_name = Some(name.to_string());
        return Ok(metadata);
    }

    if let Some(metadata) = classify_thought(trimmed) {
        return Ok(with_variables(metadata));
    }

    if let Some((speaker, text)) = split_speaker(trimmed) {
        if !text.is_empty() {
            let mut metadata = LineMetadata::new(ContentType::CharacterSpeech, text);
            metadata.speaker_id = Some(speaker);
            return Ok(with_variables(with_trailing_attributes(metadata)));
        }
    }

    let metadata = LineMetadata::new(ContentType::Narration, trimmed);
    Ok(with_variables(with_trailing_attributes(metadata)))
}

/// Speaker names are short, unpunctuated phrases.
pub fn is_plausible_speaker(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && name.chars().count() <= MAX_SPEAKER_CHARS
        && name.split_whitespace().count() <= MAX_SPEAKER_WORDS
        && !name.contains("..")
        && !name.contains('?')
        && !name.contains('!')
}

/// Extracts `{identifier}` references in order of first appearance.
pub fn scan_variable_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for captures in variable_regex().captures_iter(text) {
        let Some(inner) = captures.get(1) else {
            continue;
        };
        let name = inner.as_str();
        if identifier_regex().is_match(name) && !names.iter().any(|known| known == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn classify_thought(trimmed: &str) -> Option<LineMetadata> {
    let (inner, marker) = if trimmed.len() >= 2 && trimmed.starts_with('*') && trimmed.ends_with('*')
    {
        (&trimmed[1..trimmed.len() - 1], "asterisk")
    } else if trimmed.starts_with('(') && trimmed.ends_with(')') {
        (&trimmed[1..trimmed.len() - 1], "parenthesis")
    } else {
        return None;
    };

    let (left, right) = inner.split_once(':')?;
    let mut speaker = left.to_string();
    for thought_marker in THOUGHT_MARKERS {
        speaker = speaker.replace(thought_marker, "");
    }
    let speaker = speaker.trim();
    if !is_plausible_speaker(speaker) {
        return None;
    }

    let mut metadata = LineMetadata::new(ContentType::CharacterThought, right.trim());
    metadata.speaker_id = Some(speaker.to_string());
    metadata
        .attributes
        .insert("thought_marker".to_string(), marker.to_string());
    Some(metadata)
}

fn split_speaker(trimmed: &str) -> Option<(String, String)> {
    let (left, right) = trimmed.split_once(':')?;
    let speaker = left.trim();
    if !is_plausible_speaker(speaker) {
        return None;
    }
    Some((speaker.to_string(), right.trim().to_string()))
}

fn with_trailing_attributes(mut metadata: LineMetadata) -> LineMetadata {
    let Some(captures) = attribute_block_regex().captures(&metadata.processed_text) else {
        return metadata;
    };
    let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
        return metadata;
    };

    let mut attributes = BTreeMap::new();
    for pair in body.as_str().split(';') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        attributes.insert(key, value.trim().to_string());
    }
    if attributes.is_empty() {
        return metadata;
    }

    let stripped = metadata.processed_text[..whole.start()].trim_end().to_string();
    metadata.processed_text = stripped;
    metadata.attributes.extend(attributes);
    metadata
}

fn with_variables(mut metadata: LineMetadata) -> LineMetadata {
    metadata.variable_names = scan_variable_names(&metadata.processed_text);
    metadata.has_variables = !metadata.variable_names.is_empty();
    metadata
}

fn fallback_narration(raw: &str) -> LineMetadata {
    with_variables(LineMetadata::new(ContentType::Narration, raw.trim()))
}

fn variable_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("variable regex"))
}

fn identifier_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("identifier regex"))
}

fn attribute_block_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s*\[([^\[\]]*=[^\[\]]*)\]\s*$").expect("attribute regex"))
}
