use ns_core::NarrativeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTokens {
    /// Lower-cased alias without the leading `@`.
    pub alias: String,
    pub fragments: Vec<Fragment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Lower-cased key, `None` for positional fragments.
    pub key: Option<String>,
    /// Unquoted, unescaped value text.
    pub value: String,
    pub quoted: bool,
}

impl Fragment {
    pub fn keyed(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.into(),
            quoted: false,
        }
    }

    pub fn positional(value: impl Into<String>) -> Self {
        Self {
            key: None,
            value: value.into(),
            quoted: false,
        }
    }
}

/// Returns the alias of a command line without tokenizing the rest.
pub fn command_alias(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed);
    let alias = trimmed.split_whitespace().next()?;
    Some(alias.to_ascii_lowercase())
}

/// Splits a command line into its alias and `key:value` / positional fragments.
pub fn tokenize_command(text: &str) -> Result<CommandTokens, NarrativeError> {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('@').unwrap_or(trimmed);
    let alias_end = body.find(char::is_whitespace).unwrap_or(body.len());
    let alias = &body[..alias_end];

    if alias.is_empty() {
        return Err(NarrativeError::new(
            "TOKEN_EMPTY_COMMAND",
            "Command line has no alias.",
        ));
    }
    if alias.contains(&[':', '"', '\''][..]) {
        return Err(NarrativeError::new(
            "TOKEN_INVALID_ALIAS",
            format!("Command alias \"{}\" contains reserved characters.", alias),
        ));
    }

    let mut scanner = Scanner::new(&body[alias_end..]);
    let mut fragments = Vec::new();
    while let Some(fragment) = scanner.next_fragment()? {
        fragments.push(fragment);
    }

    Ok(CommandTokens {
        alias: alias.to_ascii_lowercase(),
        fragments,
    })
}

/// Renders a value so that `tokenize_command` reads it back unchanged.
pub fn quote_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|ch| ch.is_whitespace() || matches!(ch, '"' | '\'' | '\\'));
    if !needs_quotes {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if matches!(ch, '"' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Scanner<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
        }
    }

    fn next_fragment(&mut self) -> Result<Option<Fragment>, NarrativeError> {
        while matches!(self.chars.peek(), Some(ch) if ch.is_whitespace()) {
            self.chars.next();
        }
        if self.chars.peek().is_none() {
            return Ok(None);
        }

        let mut key: Option<String> = None;
        let mut buffer = String::new();
        let mut quoted = false;

        while let Some(&ch) = self.chars.peek() {
            if ch.is_whitespace() {
                break;
            }
            self.chars.next();
            match ch {
                '\\' => match self.chars.next() {
                    Some(escaped) => buffer.push(escaped),
                    None => buffer.push('\\'),
                },
                '"' | '\'' if buffer.is_empty() => {
                    buffer = self.read_quoted(ch)?;
                    quoted = true;
                    match self.chars.peek() {
                        None => {}
                        Some(next) if next.is_whitespace() => {}
                        Some(_) => {
                            return Err(NarrativeError::new(
                                "TOKEN_MALFORMED_QUOTE",
                                "Quoted value must be followed by a space or the end of the line.",
                            ))
                        }
                    }
                }
                ':' if key.is_none() && !quoted => {
                    let name = buffer.trim().to_ascii_lowercase();
                    if name.is_empty() {
                        return Err(NarrativeError::new(
                            "TOKEN_EMPTY_KEY",
                            "Fragment has an empty key before ':'.",
                        ));
                    }
                    key = Some(name);
                    buffer.clear();
                }
                other => buffer.push(other),
            }
        }

        Ok(Some(Fragment {
            key,
            value: buffer,
            quoted,
        }))
    }

    fn read_quoted(&mut self, quote: char) -> Result<String, NarrativeError> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                None => {
                    return Err(NarrativeError::new(
                        "TOKEN_UNTERMINATED_QUOTE",
                        format!("Missing closing {} in quoted value.", quote),
                    ))
                }
                Some('\\') => match self.chars.next() {
                    Some(escaped) => value.push(escaped),
                    None => {
                        return Err(NarrativeError::new(
                            "TOKEN_UNTERMINATED_QUOTE",
                            format!("Missing closing {} in quoted value.", quote),
                        ))
                    }
                },
                Some(ch) if ch == quote => return Ok(value),
                Some(ch) => value.push(ch),
            }
        }
    }
}

#[cfg(test)]
mod tokenize_tests {
    use super::*;

    fn tokens(text: &str) -> CommandTokens {
        tokenize_command(text).expect("command should tokenize")
    }

    #[test]
    fn keyed_fragments_split_on_first_colon() {
        let parsed = tokens("@Set var:health val:100");
        assert_eq!(parsed.alias, "set");
        assert_eq!(
            parsed.fragments,
            vec![Fragment::keyed("var", "health"), Fragment::keyed("val", "100")]
        );

        let parsed = tokens("alarm time:12:30");
        assert_eq!(parsed.fragments, vec![Fragment::keyed("time", "12:30")]);
    }

    #[test]
    fn quoted_values_keep_spaces_and_colons() {
        let parsed = tokens(r#"print text:"Hello, brave world: hi" speaker:'Old Man'"#);
        assert_eq!(parsed.fragments.len(), 2);
        assert_eq!(parsed.fragments[0].value, "Hello, brave world: hi");
        assert!(parsed.fragments[0].quoted);
        assert_eq!(parsed.fragments[1].key.as_deref(), Some("speaker"));
        assert_eq!(parsed.fragments[1].value, "Old Man");
    }

    #[test]
    fn positional_and_escaped_fragments() {
        let parsed = tokens(r#"goto intro "two words" it's a\ b"#);
        assert_eq!(
            parsed
                .fragments
                .iter()
                .map(|fragment| fragment.value.as_str())
                .collect::<Vec<_>>(),
            vec!["intro", "two words", "it's", "a b"]
        );
        assert!(parsed.fragments.iter().all(|fragment| fragment.key.is_none()));

        let parsed = tokens(r#"print text:"say \"hi\"""#);
        assert_eq!(parsed.fragments[0].value, r#"say "hi""#);
    }

    #[test]
    fn empty_quoted_value_is_present() {
        let parsed = tokens(r#"set var:name val:"""#);
        assert_eq!(parsed.fragments[1].value, "");
        assert!(parsed.fragments[1].quoted);
    }

    #[test]
    fn malformed_input_is_rejected() {
        let error = tokenize_command(r#"print text:"never closed"#).expect_err("unterminated");
        assert_eq!(error.code, "TOKEN_UNTERMINATED_QUOTE");

        let error = tokenize_command(r#"print text:"a"b"#).expect_err("trailing text");
        assert_eq!(error.code, "TOKEN_MALFORMED_QUOTE");

        let error = tokenize_command("set :value").expect_err("empty key");
        assert_eq!(error.code, "TOKEN_EMPTY_KEY");

        let error = tokenize_command("@   ").expect_err("empty alias");
        assert_eq!(error.code, "TOKEN_EMPTY_COMMAND");

        let error = tokenize_command("set:x").expect_err("bad alias");
        assert_eq!(error.code, "TOKEN_INVALID_ALIAS");
    }

    #[test]
    fn quote_value_round_trips_through_tokenizer() {
        for value in ["plain", "", "two words", r#"say "hi""#, r"back\slash", "12:30"] {
            let line = format!("print text:{}", quote_value(value));
            let parsed = tokens(&line);
            assert_eq!(parsed.fragments[0].value, value, "value {:?}", value);
        }
    }

    #[test]
    fn command_alias_reads_first_word() {
        assert_eq!(command_alias("  @Wait 2"), Some("wait".to_string()));
        assert_eq!(command_alias("   "), None);
    }
}
