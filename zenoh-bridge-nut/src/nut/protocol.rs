//! Line-level encoding of the NUT network protocol.
//!
//! Requests and replies are single ASCII lines. Words are separated by
//! spaces; a word may be double-quoted, in which case `\"` and `\\` escape a
//! quote and a backslash.

/// Quote a command argument if it contains spaces, quotes or backslashes.
pub fn quote(arg: &str) -> String {
    let needs_quotes = arg.is_empty() || arg.contains([' ', '\t', '"', '\\']);
    if !needs_quotes {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Split a reply line into words, honoring quotes and escapes.
///
/// Returns `None` for an unterminated quote or a dangling escape.
pub fn tokenize(line: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_ascii_whitespace()).is_some() {}

        let Some(&first) = chars.peek() else {
            return Some(words);
        };

        let mut word = String::new();
        if first == '"' {
            chars.next();
            loop {
                match chars.next()? {
                    '"' => break,
                    '\\' => word.push(chars.next()?),
                    c => word.push(c),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_ascii_whitespace()) {
                if c == '\\' {
                    word.push(chars.next()?);
                } else {
                    word.push(c);
                }
            }
        }
        words.push(word);
    }
}

/// Build a request line from a command and its arguments.
pub fn request(command: &str, args: &[&str]) -> String {
    let mut line = command.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&quote(arg));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(line: &str) -> Vec<String> {
        tokenize(line).unwrap()
    }

    #[test]
    fn test_tokenize_plain_and_quoted() {
        assert_eq!(words("UPS myups \"APC Smart-UPS\""), vec!["UPS", "myups", "APC Smart-UPS"]);
        assert_eq!(
            words("VAR myups battery.charge \"100\""),
            vec!["VAR", "myups", "battery.charge", "100"]
        );
        assert_eq!(words("VAR myups ups.status \"OL CHRG\"")[3], "OL CHRG");
        assert_eq!(words("  OK  "), vec!["OK"]);
        assert!(words("").is_empty());
    }

    #[test]
    fn test_tokenize_escapes() {
        assert_eq!(
            words(r#"VAR ups ups.id "say \"hi\" \\ bye""#)[3],
            r#"say "hi" \ bye"#
        );
        assert_eq!(words(r#"VAR ups x """#)[3], "");
    }

    #[test]
    fn test_tokenize_malformed() {
        assert_eq!(tokenize("VAR ups x \"unterminated"), None);
        assert_eq!(tokenize("VAR ups x \"dangling\\"), None);
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("monuser"), "monuser");
        assert_eq!(quote("two words"), "\"two words\"");
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
        assert_eq!(quote(""), "\"\"");
    }

    #[test]
    fn test_request_line_round_trips() {
        let line = request("PASSWORD", &["p@ss word\"1"]);
        assert_eq!(line, r#"PASSWORD "p@ss word\"1""#);
        assert_eq!(words(&line), vec!["PASSWORD", "p@ss word\"1"]);
        assert_eq!(request("LIST", &["VAR", "myups"]), "LIST VAR myups");
    }
}
