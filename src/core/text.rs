//! Text helpers shared by keyword retrieval and the heuristic conflict judge

/// Common English words that carry no retrieval signal
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "did", "do", "does", "for", "from", "had", "has", "have", "how", "i",
    "in", "into", "is", "it", "its", "me", "my", "of", "on", "or", "our", "ours", "please",
    "so", "tell", "than", "that", "the", "their", "them", "then", "these", "they", "this",
    "to", "us", "was", "we", "were", "what", "when", "where", "which", "who", "why", "will",
    "with", "you", "your",
];

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercase alphanumeric tokens, in order
pub fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Keyword search terms: length > 2, no stop-words, deduplicated
pub fn search_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in tokens(query) {
        if token.chars().count() > 2 && !is_stopword(&token) && !terms.contains(&token) {
            terms.push(token);
        }
    }
    terms
}

/// Rough token estimate (~4 chars per token)
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_lowercase_and_split_punctuation() {
        assert_eq!(
            tokens("Launch date: March-22, 2025!"),
            vec!["launch", "date", "march", "22", "2025"]
        );
    }

    #[test]
    fn test_search_terms_drop_short_and_stopwords() {
        assert_eq!(search_terms("What is the API timeout?"), vec!["api", "timeout"]);
        assert!(search_terms("is it ok to go").is_empty());
    }

    #[test]
    fn test_search_terms_dedup() {
        assert_eq!(search_terms("Slack slack SLACK"), vec!["slack"]);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
