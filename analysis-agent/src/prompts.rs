//! Prompt templates for the three classification stages

use common::Topic;

/// Keep at most `max_chars` characters of the comment
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

pub fn sentiment_prompt(comment: &str) -> String {
    format!(
        r#"You are a sentiment analysis expert. Your task is to classify a customer comment as 'positive', 'negative', or 'neutral'. You must respond with only one of those three words and nothing else.

Here are some examples:
Comment: "I love the new update, it's so fast!"
Classification: positive

Comment: "My app keeps crashing after the latest version."
Classification: negative

Now, classify the following comment:
Comment: "{comment}"
Classification:"#
    )
}

pub fn severity_prompt(comment: &str) -> String {
    format!(
        r#"You are an expert at prioritizing customer feedback. Your task is to rate the severity of a customer issue on a scale from 1 to 4.
You must respond with ONLY the number (1, 2, 3, or 4) and nothing else.

Here is the severity scale:
1 - Low: A minor issue, typo, or suggestion with no impact on functionality. Basic problem or mostly opinion of the user.
2 - Medium: A user experience issue or a non-critical bug that has a workaround. An issue that is not very vital but might need some looking at.
3 - High: A major feature is broken or functionality is significantly impaired. An issue that is worth looking at by the company.
4 - Critical: A complete service outage, data loss, or security vulnerability. An issue that the company must work on for sure!

Here are some examples:
Comment: "There's a spelling mistake on the pricing page."
Severity: 1

Comment: "The new save button is in a really weird spot, it's hard to find."
Severity: 2

Comment: "The app crashes every time I try to save my work. I have to restart it."
Severity: 3

Comment: "I can't log in at all, the whole system seems to be down for everyone!"
Severity: 4

---
Now, think on behalf of the company and rate the severity of this new comment:
Comment: "{comment}"
Severity:"#
    )
}

pub fn topic_prompt(comment: &str) -> String {
    let categories = Topic::CLOSED_SET
        .iter()
        .map(Topic::label)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are an expert at categorizing customer feedback.
Based on the comment provided, which of the following categories does it best fit into?

Categories: {categories}

You must respond with ONLY the single best category name from the list and nothing else.

Comment: "{comment}"

Category:"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // Multi-byte characters are never split
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars(&"x".repeat(2000), 1024).len(), 1024);
    }

    #[test]
    fn test_topic_prompt_lists_closed_set_in_order() {
        let prompt = topic_prompt("Where is dark mode?");
        assert!(prompt.contains(
            "Categories: Bug Report, Feature Request, UI/UX Feedback, Authentication Issue, \
             Performance, Pricing & Billing, How-To Question, General Praise, Miscellaneous"
        ));
        assert!(prompt.contains("Comment: \"Where is dark mode?\""));
    }

    #[test]
    fn test_prompts_embed_comment() {
        assert!(sentiment_prompt("great app").contains("Comment: \"great app\""));
        assert!(severity_prompt("it broke").ends_with("Comment: \"it broke\"\nSeverity:"));
    }
}
