//! Mention detection: `@name`, `@"quoted name"` and `@everyone`.

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether `text` mentions `name` (case-insensitive, word-bounded).
pub fn mentions(text: &str, name: &str) -> bool {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return false;
    }
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let target: Vec<char> = name.chars().collect();

    for (i, &c) in text.iter().enumerate() {
        if c != '@' {
            continue;
        }
        if i > 0 && is_word(text[i - 1]) {
            continue;
        }
        let rest = &text[i + 1..];
        if rest.first() == Some(&'"') {
            if let Some(close) = rest[1..].iter().position(|&c| c == '"') {
                let inner: String = rest[1..1 + close].iter().collect();
                if inner.trim() == name {
                    return true;
                }
            }
            continue;
        }
        if rest.len() >= target.len()
            && rest[..target.len()] == target[..]
            && rest.get(target.len()).map_or(true, |&c| !is_word(c))
        {
            return true;
        }
    }
    false
}

/// `@me` or `@everyone`.
pub fn mentions_me(text: &str, me: &str) -> bool {
    !me.is_empty() && (mentions(text, "everyone") || mentions(text, me))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_mention() {
        assert!(mentions_me("hey @alice look", "alice"));
        assert!(mentions_me("@Alice", "alice"));
        assert!(mentions_me("(@alice)", "alice"));
    }

    #[test]
    fn test_word_boundary_after_name() {
        assert!(!mentions_me("@alicex hi", "alice"));
        assert!(mentions_me("@alice, hi", "alice"));
    }

    #[test]
    fn test_email_like_is_not_mention() {
        assert!(!mentions_me("mail bob@alice.com", "alice"));
    }

    #[test]
    fn test_quoted_mention() {
        assert!(mentions_me("ping @\" Mary Jane \" now", "mary jane"));
        assert!(!mentions_me("ping @\"mary\" now", "mary jane"));
    }

    #[test]
    fn test_everyone() {
        assert!(mentions_me("@everyone standup", "bob"));
        assert!(mentions_me("@\"everyone\"", "bob"));
        assert!(!mentions_me("@everyones", "bob"));
    }

    #[test]
    fn test_empty_me_never_mentioned() {
        assert!(!mentions_me("@everyone", ""));
    }
}
