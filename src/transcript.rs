use serde::{Deserialize, Serialize};

use crate::markup::{self, Fragment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One settled message. Never edited after it lands in a [`Transcript`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    pub markup: String,
    #[serde(default)]
    pub errored: bool,
}

impl ChatTurn {
    pub fn user(text: &str) -> Self {
        ChatTurn {
            role: Role::User,
            text: text.to_string(),
            markup: markup::escape(text),
            errored: false,
        }
    }

    pub fn assistant(text: &str, rendered: &Fragment) -> Self {
        ChatTurn {
            role: Role::Assistant,
            text: text.to_string(),
            markup: rendered.to_markup(),
            errored: false,
        }
    }

    pub fn failed(message: &str) -> Self {
        ChatTurn {
            role: Role::Assistant,
            text: message.to_string(),
            markup: markup::escape(message),
            errored: true,
        }
    }

    /// Rebuilds the fragment shown for this turn. User text and error
    /// messages are shown as typed; assistant replies get formatted again.
    pub fn fragment(&self) -> Fragment {
        match self.role {
            Role::Assistant if !self.errored => markup::parse(&self.text),
            _ => Fragment::plain(&self.text),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl FromIterator<ChatTurn> for Transcript {
    fn from_iter<I: IntoIterator<Item = ChatTurn>>(iter: I) -> Self {
        Transcript {
            turns: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let transcript: Transcript = [ChatTurn::user("Hello")].into_iter().collect();
        assert_eq!(
            transcript.to_json().unwrap(),
            r#"[{"role":"user","text":"Hello","markup":"Hello","errored":false}]"#
        );
    }

    #[test]
    fn test_errored_flag_defaults_to_false() {
        let transcript =
            Transcript::from_json(r#"[{"role":"assistant","text":"hey","markup":"hey"}]"#).unwrap();
        assert_eq!(transcript.len(), 1);
        assert!(!transcript.turns()[0].errored);
    }

    #[test]
    fn test_fragment_rebuilds_formatting_for_replies_only() {
        let reply = ChatTurn::assistant("**hi**", &markup::parse("**hi**"));
        assert_eq!(reply.markup, "<strong>hi</strong>");
        assert_eq!(reply.fragment(), markup::parse("**hi**"));

        let question = ChatTurn::user("**hi**");
        assert_eq!(question.fragment().plain_text(), "**hi**");

        let failure = ChatTurn::failed("rate limited");
        assert!(failure.errored);
        assert_eq!(failure.fragment().plain_text(), "rate limited");
    }

    #[test]
    fn test_user_markup_is_escaped() {
        assert_eq!(ChatTurn::user("<script>").markup, "&lt;script&gt;");
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Transcript::from_json("<div class=\"message\">").is_err());
    }
}
