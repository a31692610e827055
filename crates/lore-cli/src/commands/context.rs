//! /context command - show what the last turn was grounded on

use crate::utils::preview;

pub struct ContextCommand;

impl ContextCommand {
    pub fn render(fragments: &[String]) -> String {
        if fragments.is_empty() {
            return "No context was retrieved for the last turn.".to_string();
        }

        let mut output = format!("{} fragment(s) retrieved:", fragments.len());
        for (i, fragment) in fragments.iter().enumerate() {
            output.push_str(&format!("\n  [{}] {}", i + 1, preview(fragment, 100)));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_numbers_fragments() {
        let text = ContextCommand::render(&["a".to_string(), "b".to_string()]);
        assert!(text.starts_with("2 fragment(s)"));
        assert!(text.contains("[2] b"));
    }
}
