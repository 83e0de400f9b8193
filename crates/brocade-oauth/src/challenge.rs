//! WWW-Authenticate challenge parsing.
//!
//! Best-effort rather than strict RFC 7235: real servers emit quoted values
//! with unescaped inner quotes, so the quoted-string reader only treats a `"`
//! as closing when what follows (after optional whitespace) is a comma or the
//! end of input. Anything else keeps the quote as literal content.

use smol_str::SmolStr;

/// One parsed challenge. The scheme is lower-cased; parameter keys keep their
/// original case and order, and lookups are expected case-insensitively on
/// the scheme only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WwwAuthenticateChallenge {
    pub scheme: SmolStr,
    pub parameters: Vec<(SmolStr, SmolStr)>,
}

impl WwwAuthenticateChallenge {
    /// First value for `name`, compared case-sensitively.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Parse the joined `WWW-Authenticate` header value(s). Multiple header
/// occurrences are joined with `", "` first, matching what transports do.
/// Returns `None` when no valid challenge is present.
pub fn parse_www_authenticate<'a>(
    header_values: impl IntoIterator<Item = &'a str>,
) -> Option<Vec<WwwAuthenticateChallenge>> {
    let joined = header_values.into_iter().collect::<Vec<_>>().join(", ");
    let mut cursor = Cursor::new(&joined);
    let mut challenges = Vec::new();

    loop {
        cursor.skip_separators();
        let Some(scheme) = cursor.read_token() else { break };
        let mut challenge = WwwAuthenticateChallenge {
            scheme: scheme.to_ascii_lowercase().into(),
            parameters: Vec::new(),
        };
        // auth-params until something that reads as a new scheme token
        loop {
            let checkpoint = cursor.pos;
            cursor.skip_separators();
            let Some(key) = cursor.read_token() else {
                cursor.pos = checkpoint;
                break;
            };
            cursor.skip_spaces();
            if !cursor.eat(b'=') {
                // Not `key=value`; this token starts the next challenge.
                cursor.pos = checkpoint;
                break;
            }
            cursor.skip_spaces();
            let value = if cursor.peek() == Some(b'"') {
                cursor.read_quoted_string()
            } else {
                cursor.read_token().unwrap_or_default().to_owned()
            };
            challenge.parameters.push((key.into(), value.into()));
        }
        challenges.push(challenge);
    }

    if challenges.is_empty() { None } else { Some(challenges) }
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

fn is_tchar(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b',')) {
            self.pos += 1;
        }
    }

    fn read_token(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while self.peek().is_some_and(is_tchar) {
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            // Token bytes are ASCII.
            Some(std::str::from_utf8(&self.input[start..self.pos]).unwrap_or_default())
        }
    }

    /// Quoted-string with backslash escapes. An unescaped `"` closes the
    /// string only when the remainder, after optional whitespace, is a comma
    /// or the end of input; otherwise it is kept as content. This greedily
    /// swallows ill-formed inner quotes instead of truncating the value.
    fn read_quoted_string(&mut self) -> String {
        debug_assert_eq!(self.peek(), Some(b'"'));
        self.pos += 1;
        let mut value = Vec::new();
        while let Some(byte) = self.peek() {
            match byte {
                b'\\' => {
                    self.pos += 1;
                    if let Some(escaped) = self.peek() {
                        value.push(escaped);
                        self.pos += 1;
                    }
                }
                b'"' => {
                    let mut lookahead = self.pos + 1;
                    while matches!(self.input.get(lookahead), Some(b' ') | Some(b'\t')) {
                        lookahead += 1;
                    }
                    match self.input.get(lookahead) {
                        None | Some(b',') => {
                            self.pos += 1;
                            break;
                        }
                        _ => {
                            value.push(byte);
                            self.pos += 1;
                        }
                    }
                }
                _ => {
                    value.push(byte);
                    self.pos += 1;
                }
            }
        }
        String::from_utf8_lossy(&value).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_with_params() {
        let parsed = parse_www_authenticate(["Basic realm=\"Access to the staging site\", charset=\"UTF-8\""]).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].scheme, "basic");
        assert_eq!(
            parsed[0].parameter("realm"),
            Some("Access to the staging site")
        );
        assert_eq!(parsed[0].parameter("charset"), Some("UTF-8"));
    }

    #[test]
    fn two_bare_schemes_across_occurrences() {
        let parsed = parse_www_authenticate(["Basic", "DPoP"]).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].scheme, "basic");
        assert!(parsed[0].parameters.is_empty());
        assert_eq!(parsed[1].scheme, "dpop");
        assert!(parsed[1].parameters.is_empty());
    }

    #[test]
    fn scheme_then_params_then_next_scheme() {
        let parsed = parse_www_authenticate([
            "Bearer error=\"invalid_token\", error_description=\"expired\", DPoP algs=\"ES256 PS256\"",
        ])
        .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].scheme, "bearer");
        assert_eq!(parsed[0].parameter("error"), Some("invalid_token"));
        assert_eq!(parsed[1].scheme, "dpop");
        assert_eq!(parsed[1].parameter("algs"), Some("ES256 PS256"));
    }

    #[test]
    fn quoted_value_with_embedded_comma_and_escape() {
        let parsed =
            parse_www_authenticate(["Bearer realm=\"api, v2\", title=\"say \\\"hi\\\"\""]).unwrap();
        assert_eq!(parsed[0].parameter("realm"), Some("api, v2"));
        assert_eq!(parsed[0].parameter("title"), Some("say \"hi\""));
    }

    #[test]
    fn unescaped_inner_quote_swallowed_greedily() {
        // Ill-formed input: the inner quotes do not close the string because
        // they are not followed by a comma or end of input.
        let parsed = parse_www_authenticate(["Basic realm=\"the \"staging\" site\""]).unwrap();
        assert_eq!(parsed[0].parameter("realm"), Some("the \"staging\" site"));
    }

    #[test]
    fn unquoted_token_value() {
        let parsed = parse_www_authenticate(["DPoP error=use_dpop_nonce"]).unwrap();
        assert_eq!(parsed[0].scheme, "dpop");
        assert_eq!(parsed[0].parameter("error"), Some("use_dpop_nonce"));
    }

    #[test]
    fn empty_input_is_none() {
        assert!(parse_www_authenticate([""]).is_none());
        assert!(parse_www_authenticate([]).is_none());
    }

    #[test]
    fn parameter_keys_keep_case() {
        let parsed = parse_www_authenticate(["Bearer Realm=\"x\""]).unwrap();
        assert_eq!(parsed[0].parameter("Realm"), Some("x"));
        assert_eq!(parsed[0].parameter("realm"), None);
    }
}
