//! /history command - list the current thread's messages

use crate::utils::preview;
use lore_ai::Message;

pub struct HistoryCommand;

impl HistoryCommand {
    pub fn render(thread_id: &str, messages: &[Message]) -> String {
        if messages.is_empty() {
            return format!("Thread {} has no messages yet.", thread_id);
        }

        let mut output = format!("Thread {} ({} messages)\n", thread_id, messages.len());
        output.push_str(&"-".repeat(40));
        for (i, msg) in messages.iter().enumerate() {
            output.push_str(&format!(
                "\n{:>3}: [{}] {}",
                i,
                msg.role().as_str(),
                preview(msg.text(), 70)
            ));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_roles_in_order() {
        let text = HistoryCommand::render(
            "t1",
            &[Message::user("hi"), Message::assistant("hello\nthere")],
        );
        assert!(text.contains("2 messages"));
        assert!(text.contains("  0: [user] hi"));
        assert!(text.contains("  1: [assistant] hello there"));
    }

    #[test]
    fn test_render_empty() {
        assert!(HistoryCommand::render("t1", &[]).contains("no messages"));
    }
}
