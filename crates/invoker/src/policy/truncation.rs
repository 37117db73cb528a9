use converse_core::config::TruncationConfig;
use converse_core::{Message, Role};
use llm::{ContentBlock, ConversationRole, ConverseMessage, SystemBlock};
use tracing::debug;

/// How much of the conversation is sent on an attempt. Each token-limit
/// failure moves one stage further; there is nothing past `Clipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TruncationStage {
    Full,
    RecentOnly,
    Clipped,
}

impl TruncationStage {
    pub fn next(self) -> Option<Self> {
        match self {
            TruncationStage::Full => Some(TruncationStage::RecentOnly),
            TruncationStage::RecentOnly => Some(TruncationStage::Clipped),
            TruncationStage::Clipped => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TruncationStage::Full => "full",
            TruncationStage::RecentOnly => "recent_only",
            TruncationStage::Clipped => "clipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TruncationPolicy {
    pub keep_recent_user_messages: usize,
    pub max_chars_per_message: usize,
    pub chars_per_token: usize,
    pub token_budget: Option<usize>,
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        Self::from_config(&TruncationConfig::default())
    }
}

impl TruncationPolicy {
    pub fn from_config(config: &TruncationConfig) -> Self {
        Self {
            keep_recent_user_messages: config.keep_recent_user_messages.max(1),
            max_chars_per_message: config.max_chars_per_message.max(1),
            chars_per_token: config.chars_per_token.max(1),
            token_budget: config.token_budget,
        }
    }

    /// Wire payload for `stage`. System blocks are always kept whole.
    pub fn apply(
        &self,
        stage: TruncationStage,
        system: &[SystemBlock],
        messages: &[ConverseMessage],
    ) -> (Vec<SystemBlock>, Vec<ConverseMessage>) {
        match stage {
            TruncationStage::Full => (system.to_vec(), messages.to_vec()),
            TruncationStage::RecentOnly => (system.to_vec(), self.recent_user_messages(messages)),
            TruncationStage::Clipped => {
                let clipped = self
                    .recent_user_messages(messages)
                    .into_iter()
                    .map(|message| self.clip_message(message))
                    .collect();
                (system.to_vec(), clipped)
            }
        }
    }

    fn recent_user_messages(&self, messages: &[ConverseMessage]) -> Vec<ConverseMessage> {
        let users: Vec<&ConverseMessage> = messages
            .iter()
            .filter(|message| message.role == ConversationRole::User)
            .collect();
        if users.is_empty() {
            return messages.to_vec();
        }
        let skip = users.len().saturating_sub(self.keep_recent_user_messages);
        users.into_iter().skip(skip).cloned().collect()
    }

    fn clip_message(&self, mut message: ConverseMessage) -> ConverseMessage {
        for block in message.content.iter_mut() {
            if let ContentBlock::Text(text) = block {
                *text = clip(text, self.max_chars_per_message);
            }
        }
        message
    }

    /// Rough token count using the characters-per-token heuristic.
    pub fn estimate_tokens(&self, messages: &[Message]) -> usize {
        let chars: usize = messages.iter().map(Message::text_len).sum();
        chars.div_ceil(self.chars_per_token)
    }

    /// Shrinks `messages` under the configured token budget before the first
    /// attempt. Oldest non-system messages go first; if the newest one alone
    /// is still too large, text is clipped. Returns whether anything changed.
    pub fn pre_truncate(&self, messages: Vec<Message>) -> (Vec<Message>, bool) {
        let Some(budget) = self.token_budget else {
            return (messages, false);
        };
        if self.estimate_tokens(&messages) <= budget {
            return (messages, false);
        }

        let before = messages.len();
        let (system, mut conversation): (Vec<Message>, Vec<Message>) = messages
            .into_iter()
            .partition(|message| message.role == Role::System);

        let char_budget = budget.saturating_mul(self.chars_per_token);
        let system_chars: usize = system.iter().map(Message::text_len).sum();
        let mut conversation_chars: usize = conversation.iter().map(Message::text_len).sum();

        while conversation.len() > 1 && system_chars + conversation_chars > char_budget {
            let dropped = conversation.remove(0);
            conversation_chars -= dropped.text_len();
        }
        while conversation.len() > 1 && conversation[0].role == Role::Assistant {
            let dropped = conversation.remove(0);
            conversation_chars -= dropped.text_len();
        }

        if system_chars + conversation_chars > char_budget {
            let allowance = (char_budget.saturating_sub(system_chars) / conversation.len().max(1)).max(1);
            for message in conversation.iter_mut() {
                message.map_texts(|text| clip(text, allowance));
            }
        }

        debug!(
            "Pre-truncated conversation from {} to {} message(s) for a budget of {} tokens",
            before,
            system.len() + conversation.len(),
            budget
        );
        let mut result = system;
        result.extend(conversation);
        (result, true)
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(role: ConversationRole, text: &str) -> ConverseMessage {
        ConverseMessage {
            role,
            content: vec![ContentBlock::Text(text.to_string())],
        }
    }

    fn policy() -> TruncationPolicy {
        TruncationPolicy {
            keep_recent_user_messages: 2,
            max_chars_per_message: 5,
            chars_per_token: 4,
            token_budget: None,
        }
    }

    fn conversation() -> Vec<ConverseMessage> {
        vec![
            text_message(ConversationRole::User, "first question"),
            text_message(ConversationRole::Assistant, "first answer"),
            text_message(ConversationRole::User, "second question"),
            text_message(ConversationRole::Assistant, "second answer"),
            text_message(ConversationRole::User, "third question"),
        ]
    }

    #[test]
    fn should_walk_stages_in_order() {
        assert_eq!(TruncationStage::Full.next(), Some(TruncationStage::RecentOnly));
        assert_eq!(TruncationStage::RecentOnly.next(), Some(TruncationStage::Clipped));
        assert_eq!(TruncationStage::Clipped.next(), None);
    }

    #[test]
    fn should_send_everything_at_full_stage() {
        let (_, messages) = policy().apply(TruncationStage::Full, &[], &conversation());
        assert_eq!(messages, conversation());
    }

    #[test]
    fn should_keep_system_and_last_two_user_messages() {
        let system = vec![SystemBlock {
            text: "You are helpful and thorough.".to_string(),
        }];

        let (kept_system, messages) =
            policy().apply(TruncationStage::RecentOnly, &system, &conversation());

        assert_eq!(kept_system, system);
        assert_eq!(
            messages,
            vec![
                text_message(ConversationRole::User, "second question"),
                text_message(ConversationRole::User, "third question"),
            ]
        );
    }

    #[test]
    fn should_clip_text_blocks_but_not_system() {
        let system = vec![SystemBlock {
            text: "You are helpful and thorough.".to_string(),
        }];

        let (kept_system, messages) =
            policy().apply(TruncationStage::Clipped, &system, &conversation());

        assert_eq!(kept_system, system);
        assert_eq!(
            messages,
            vec![
                text_message(ConversationRole::User, "secon"),
                text_message(ConversationRole::User, "third"),
            ]
        );
    }

    #[test]
    fn should_estimate_four_chars_per_token() {
        let messages = vec![Message::user("abcdefgh"), Message::assistant("abc")];
        assert_eq!(policy().estimate_tokens(&messages), 3);
    }

    #[test]
    fn should_leave_messages_under_budget_untouched() {
        let policy = TruncationPolicy {
            token_budget: Some(100),
            ..policy()
        };
        let messages = vec![Message::system("rules"), Message::user("short")];

        let (result, changed) = policy.pre_truncate(messages.clone());

        assert!(!changed);
        assert_eq!(result, messages);
    }

    #[test]
    fn should_drop_oldest_turns_to_fit_budget() {
        let policy = TruncationPolicy {
            token_budget: Some(10),
            ..policy()
        };
        let messages = vec![
            Message::system("rules"),
            Message::user(&"a".repeat(40)),
            Message::assistant(&"b".repeat(40)),
            Message::user("latest question"),
        ];

        let (result, changed) = policy.pre_truncate(messages);

        assert!(changed);
        assert_eq!(result, vec![Message::system("rules"), Message::user("latest question")]);
        assert!(policy.estimate_tokens(&result) <= 10);
    }

    #[test]
    fn should_clip_single_oversized_message() {
        let policy = TruncationPolicy {
            token_budget: Some(5),
            ..policy()
        };
        let messages = vec![Message::user(&"x".repeat(100))];

        let (result, changed) = policy.pre_truncate(messages);

        assert!(changed);
        assert_eq!(result[0].text_len(), 20);
    }
}
