//! AMQP-style topic pattern matching.
//!
//! Topics are dot-separated words. In a binding pattern, `*` matches
//! exactly one word and `#` matches zero or more words.

/// Does `topic` match the binding `pattern`?
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let topic: Vec<&str> = topic.split('.').collect();
    matches_at(&pattern, &topic)
}

fn matches_at(pattern: &[&str], topic: &[&str]) -> bool {
    match pattern {
        [] => topic.is_empty(),
        ["#", rest @ ..] => {
            // `#` absorbs zero or more words; try every split point.
            (0..=topic.len()).any(|skip| matches_at(rest, &topic[skip..]))
        }
        ["*", rest @ ..] => match topic {
            [_, topic_rest @ ..] => matches_at(rest, topic_rest),
            [] => false,
        },
        [word, rest @ ..] => match topic {
            [head, topic_rest @ ..] => word == head && matches_at(rest, topic_rest),
            [] => false,
        },
    }
}
