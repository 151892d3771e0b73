/// Reserved words that introduce or punctuate statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Var,
    GoTo,
    Return,
    If,
    Else,
    While,
    For,
    Break,
    Continue,
    To,
    Step,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("var", Keyword::Var),
    ("goto", Keyword::GoTo),
    ("return", Keyword::Return),
    ("if", Keyword::If),
    ("else", Keyword::Else),
    ("while", Keyword::While),
    ("for", Keyword::For),
    ("break", Keyword::Break),
    ("continue", Keyword::Continue),
    ("to", Keyword::To),
    ("step", Keyword::Step),
];

/// Words that lex as operators rather than identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperatorWord {
    And,
    Or,
    Xor,
    Not,
}

const OPERATOR_WORDS: &[(&str, OperatorWord)] = &[
    ("and", OperatorWord::And),
    ("or", OperatorWord::Or),
    ("xor", OperatorWord::Xor),
    ("not", OperatorWord::Not),
];

/// Case-insensitive keyword lookup.
pub fn keyword(word: &str) -> Option<Keyword> {
    KEYWORDS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(word))
        .map(|&(_, kw)| kw)
}

pub(crate) fn operator_word(word: &str) -> Option<OperatorWord> {
    OPERATOR_WORDS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(word))
        .map(|&(_, op)| op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(keyword("WHILE"), Some(Keyword::While));
        assert_eq!(keyword("GoTo"), Some(Keyword::GoTo));
        assert_eq!(keyword("whilst"), None);
    }

    #[test]
    fn operator_words_ignore_case() {
        assert_eq!(operator_word("Xor"), Some(OperatorWord::Xor));
        assert_eq!(operator_word("NOT"), Some(OperatorWord::Not));
        assert_eq!(operator_word("main"), None);
        assert_eq!(keyword("and"), None);
    }
}
