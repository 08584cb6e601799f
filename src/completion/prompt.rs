//! Prompt assembly for grounded generation.

use std::fmt::Write as _;

use crate::config::PlaceholderConfig;
use crate::corpus::PullRequestRecord;
use crate::documents::Document;

/// Prompt answering a free-form question from retrieved context.
#[must_use]
pub fn question_prompt(question: &str, context: &[Document]) -> String {
    let mut prompt = String::from(
        "You are an assistant for software repository mining. \
         Answer the user using the reference material below.\n\n",
    );
    let _ = writeln!(prompt, "Question: {question}\n");
    push_context(&mut prompt, "Reference material:", context);
    prompt.push_str("\nAnswer:");
    prompt
}

/// Prompt asking for the body message of `pr`, given similar pull requests.
#[must_use]
pub fn body_message_prompt(
    pr: &PullRequestRecord,
    context: &[Document],
    placeholders: &PlaceholderConfig,
) -> String {
    let comments = pr
        .issue
        .as_ref()
        .map(|issue| issue.comments.join(" "))
        .filter(|joined| !joined.is_empty());

    let mut prompt = String::from(
        "You are an expert software developer. \
         Write the body message of a pull request given its context.\n\n",
    );
    prompt.push_str("Pull request to complete:\n");
    let _ = writeln!(prompt, "Title: {}", pr.title.or(""));
    let _ = writeln!(prompt, "Commit Message: {}", pr.commit_message.or(""));
    let _ = writeln!(prompt, "Diff: {}", pr.diff.or(&placeholders.diff));
    let _ = writeln!(prompt, "Issue: {}", pr.issue_title().or(&placeholders.issue));
    let _ = writeln!(
        prompt,
        "Issue comments: {}\n",
        comments.as_deref().unwrap_or(&placeholders.comments)
    );
    push_context(&mut prompt, "Similar pull requests:", context);
    prompt.push_str("\nWrite only the body message for this pull request.");
    prompt
}

fn push_context(prompt: &mut String, heading: &str, context: &[Document]) {
    prompt.push_str(heading);
    prompt.push('\n');
    for (rank, doc) in context.iter().enumerate() {
        let body = doc.field("body_message").map_or_else(
            || doc.text.clone(),
            |body| format!("{}\nBody Message: {body}", doc.text),
        );
        let _ = writeln!(prompt, "[{}] {body}", rank + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::FieldValue;

    #[test]
    fn test_question_prompt_numbers_context() {
        let docs = vec![Document::new("first"), Document::new("second")];
        let prompt = question_prompt("what?", &docs);
        assert!(prompt.contains("Question: what?"));
        assert!(prompt.contains("[1] first\n[2] second\n"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_body_prompt_uses_placeholders_and_neighbor_bodies() {
        let pr = PullRequestRecord {
            title: FieldValue::from("Fix NPE"),
            commit_message: FieldValue::from("guard null"),
            ..PullRequestRecord::default()
        };
        let neighbor = Document::new("Title: Old fix").with_field("body_message", "Adds a guard");
        let placeholders = PlaceholderConfig::default();

        let prompt = body_message_prompt(&pr, &[neighbor], &placeholders);
        assert!(prompt.contains("Title: Fix NPE\n"));
        assert!(prompt.contains(&format!("Issue: {}\n", placeholders.issue)));
        assert!(prompt.contains(&format!("Issue comments: {}\n", placeholders.comments)));
        assert!(prompt.contains("[1] Title: Old fix\nBody Message: Adds a guard"));
    }
}
