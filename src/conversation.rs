//! The conversation controller.
//!
//! Owns the visible chat, the single [`ConversationState`] and the active
//! typewriter. The iced app feeds it user actions, timer ticks and network
//! results; the controller answers with what (if anything) to schedule next.
//! Only one completion request may be outstanding at a time, and that rule is
//! enforced here and nowhere else.

use std::time::Duration;

use crate::completion::{ApiError, CompletionRequest};
use crate::config::{Config, TypingConfig};
use crate::markup::{self, Fragment};
use crate::storage::{Persistence, ThemePreference};
use crate::transcript::{ChatTurn, Role, Transcript};
use crate::typing::{Tick, Typewriter, TypingStrategy};

/// Scroll offsets below this count as "the user scrolled away".
const FOLLOW_THRESHOLD: f32 = 0.98;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    AwaitingResponse,
    TypingOut,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Typing,
    Settled,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyState {
    #[default]
    Ready,
    Copied,
}

/// One message in the chat list.
#[derive(Debug, Clone, PartialEq)]
pub struct Bubble {
    pub id: TurnId,
    pub role: Role,
    /// Source text: what the user typed, the raw reply, or the error message.
    pub text: String,
    /// What is currently on screen.
    pub fragment: Fragment,
    pub phase: Phase,
    pub copy: CopyState,
}

impl Bubble {
    /// Copy is offered once a reply has fully settled.
    pub fn can_copy(&self) -> bool {
        self.role == Role::Assistant && self.phase == Phase::Settled
    }

    fn to_turn(&self) -> Option<ChatTurn> {
        match (self.role, self.phase) {
            (Role::User, _) => Some(ChatTurn::user(&self.text)),
            (Role::Assistant, Phase::Settled) => Some(ChatTurn::assistant(&self.text, &self.fragment)),
            (Role::Assistant, Phase::Errored) => Some(ChatTurn::failed(&self.text)),
            (Role::Assistant, Phase::Loading | Phase::Typing) => None,
        }
    }

    fn restore(id: TurnId, turn: &ChatTurn) -> Self {
        Bubble {
            id,
            role: turn.role,
            text: turn.text.clone(),
            fragment: turn.fragment(),
            phase: if turn.errored { Phase::Errored } else { Phase::Settled },
            copy: CopyState::Ready,
        }
    }
}

pub fn render_outgoing(id: TurnId, text: &str) -> Bubble {
    Bubble {
        id,
        role: Role::User,
        text: text.to_string(),
        fragment: Fragment::plain(text),
        phase: Phase::Settled,
        copy: CopyState::Ready,
    }
}

pub fn render_incoming_placeholder(id: TurnId) -> Bubble {
    Bubble {
        id,
        role: Role::Assistant,
        text: String::new(),
        fragment: Fragment::default(),
        phase: Phase::Loading,
        copy: CopyState::Ready,
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub system_prompt: Option<String>,
    pub typing: TypingConfig,
    pub loading_delay: Duration,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Settings {
            system_prompt: config.api.system_prompt.clone(),
            typing: config.typing.clone(),
            loading_delay: config.chat.loading_delay(),
        }
    }
}

/// An accepted submit. The caller waits `delay` and then calls
/// [`Controller::show_loading`] with `turn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub turn: TurnId,
    pub delay: Duration,
}

/// What a network result or a tick did to the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The reply is being typed out; more ticks are needed.
    Typing,
    /// The reply is fully shown and saved.
    Settled,
    /// The turn failed and shows the error.
    Failed,
    /// Nothing matched (stale turn, no active typewriter).
    Ignored,
}

#[derive(Debug)]
struct PendingTurn {
    id: TurnId,
    text: String,
}

#[derive(Debug)]
struct ActiveTyping {
    turn: TurnId,
    typewriter: Typewriter,
}

pub struct Controller {
    state: ConversationState,
    bubbles: Vec<Bubble>,
    buffered: Option<String>,
    pending: Option<PendingTurn>,
    typing: Option<ActiveTyping>,
    next_id: u64,
    theme: ThemePreference,
    scroll_locked: bool,
    persistence: Persistence,
    settings: Settings,
}

impl Controller {
    /// Restores the theme and the saved chats, then starts idle.
    pub fn new(persistence: Persistence, settings: Settings) -> Self {
        let snapshot = persistence.load();
        let bubbles: Vec<Bubble> = snapshot
            .transcript
            .turns()
            .iter()
            .enumerate()
            .map(|(index, turn)| Bubble::restore(TurnId(index as u64), turn))
            .collect();

        Controller {
            state: ConversationState::Idle,
            next_id: bubbles.len() as u64,
            bubbles,
            buffered: None,
            pending: None,
            typing: None,
            theme: snapshot.theme,
            scroll_locked: false,
            persistence,
            settings,
        }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }

    pub fn theme(&self) -> ThemePreference {
        self.theme
    }

    /// Tick interval while a reply is being typed out.
    pub fn typing_interval(&self) -> Option<Duration> {
        match (&self.typing, self.state) {
            (Some(active), ConversationState::TypingOut) => Some(active.typewriter.interval()),
            _ => None,
        }
    }

    pub fn should_autoscroll(&self) -> bool {
        !self.scroll_locked
    }

    /// Accepts new input only when nothing is outstanding.
    pub fn accepts_input(&self) -> bool {
        matches!(self.state, ConversationState::Idle | ConversationState::Error)
    }

    /// The settled part of the chat, as it is saved.
    pub fn transcript(&self) -> Transcript {
        self.bubbles.iter().filter_map(Bubble::to_turn).collect()
    }

    /// Starts a turn. Empty input re-sends the last message, if there was one.
    /// Any call while a turn is outstanding is a no-op.
    pub fn submit(&mut self, raw: &str) -> Option<Submission> {
        if !self.accepts_input() {
            tracing::debug!(state = ?self.state, "submit ignored while a reply is outstanding");
            return None;
        }

        let trimmed = raw.trim();
        let text = if trimmed.is_empty() {
            self.buffered.clone()?
        } else {
            trimmed.to_string()
        };
        self.buffered = Some(text.clone());

        let turn = self.allocate_id();
        self.bubbles.push(render_outgoing(turn, &text));
        self.pending = Some(PendingTurn { id: turn, text });
        self.scroll_locked = false;
        self.transition(ConversationState::AwaitingResponse);
        self.persist();

        Some(Submission {
            turn,
            delay: self.settings.loading_delay,
        })
    }

    /// Sends a canned prompt as if it had been typed. It becomes the buffered
    /// message like any other submit.
    pub fn suggest(&mut self, prompt: &str) -> Option<Submission> {
        self.submit(prompt)
    }

    /// Puts the loading placeholder up and returns the request to send.
    pub fn show_loading(&mut self, turn: TurnId) -> Option<CompletionRequest> {
        let pending = self.pending.as_ref().filter(|p| p.id == turn)?;
        if self.placeholder_index(turn).is_some() {
            return None;
        }
        let request = CompletionRequest {
            system_prompt: self.settings.system_prompt.clone(),
            user_text: pending.text.clone(),
        };
        self.bubbles.push(render_incoming_placeholder(turn));
        Some(request)
    }

    /// Applies the network result for `turn`.
    pub fn receive(&mut self, turn: TurnId, result: Result<String, ApiError>) -> Progress {
        if self.pending.as_ref().map(|p| p.id) != Some(turn) {
            tracing::debug!(?turn, "dropping result for a turn that is no longer pending");
            return Progress::Ignored;
        }
        self.pending = None;

        let Some(index) = self.placeholder_index(turn) else {
            tracing::debug!(?turn, "placeholder is gone, discarding result");
            self.transition(ConversationState::Idle);
            return Progress::Ignored;
        };

        match result {
            Ok(text) => {
                let fragment = markup::parse(&text);
                self.bubbles[index].text = text;

                if fragment.is_empty() {
                    self.bubbles[index].fragment = fragment;
                    self.bubbles[index].phase = Phase::Settled;
                    self.transition(ConversationState::Idle);
                    self.persist();
                    return Progress::Settled;
                }

                let strategy = TypingStrategy::select(&fragment, &self.settings.typing);
                let typewriter = Typewriter::start(fragment, strategy);
                tracing::debug!(
                    ?turn,
                    cadence = ?typewriter.strategy().cadence,
                    pieces = typewriter.remaining(),
                    "typing out reply"
                );
                self.bubbles[index].phase = Phase::Typing;
                self.typing = Some(ActiveTyping { turn, typewriter });
                self.transition(ConversationState::TypingOut);
                Progress::Typing
            }
            Err(err) => {
                tracing::warn!(?turn, "turn failed: {err}");
                self.transition(ConversationState::Error);
                let message = err.to_string();
                let bubble = &mut self.bubbles[index];
                bubble.fragment = Fragment::plain(&message);
                bubble.text = message;
                bubble.phase = Phase::Errored;
                self.persist();
                self.transition(ConversationState::Idle);
                Progress::Failed
            }
        }
    }

    /// Advances the active typewriter by one piece.
    pub fn tick(&mut self) -> Progress {
        let (turn, tick) = match self.typing.as_mut() {
            Some(active) => (active.turn, active.typewriter.tick()),
            None => return Progress::Ignored,
        };

        match tick {
            Tick::Cancelled => {
                self.typing = None;
                Progress::Ignored
            }
            Tick::Revealed => {
                if let (Some(active), Some(bubble)) =
                    (self.typing.as_ref(), find_reply(&mut self.bubbles, turn))
                {
                    bubble.fragment = active.typewriter.revealed().clone();
                }
                Progress::Typing
            }
            Tick::Finished => {
                if let Some(active) = self.typing.take() {
                    if let Some(bubble) = find_reply(&mut self.bubbles, turn) {
                        bubble.fragment = active.typewriter.into_source();
                        bubble.phase = Phase::Settled;
                    }
                }
                self.transition(ConversationState::Idle);
                self.persist();
                Progress::Settled
            }
        }
    }

    /// Wipes the chat and the saved copy. A request already in flight is not
    /// cancelled; its result will find no placeholder and be dropped. A turn
    /// still waiting for its loading delay is abandoned outright.
    pub fn delete_all(&mut self) {
        if let Some(active) = self.typing.take() {
            active.typewriter.cancel();
        }
        let in_flight = self
            .pending
            .as_ref()
            .is_some_and(|p| self.placeholder_index(p.id).is_some());
        if !in_flight {
            self.pending = None;
        }
        self.bubbles.clear();
        if !in_flight {
            self.transition(ConversationState::Idle);
        }
        self.persistence.clear();
        tracing::info!("deleted all chats");
    }

    pub fn toggle_theme(&mut self) -> ThemePreference {
        self.theme = self.theme.toggled();
        self.persistence.save_theme(self.theme);
        self.theme
    }

    /// Returns the text to put on the clipboard and flips the bubble into its
    /// confirmation state.
    pub fn copy(&mut self, turn: TurnId) -> Option<String> {
        let bubble = find_reply(&mut self.bubbles, turn).filter(|b| b.can_copy())?;
        bubble.copy = CopyState::Copied;
        Some(bubble.fragment.plain_text())
    }

    pub fn reset_copy(&mut self, turn: TurnId) {
        if let Some(bubble) = find_reply(&mut self.bubbles, turn) {
            bubble.copy = CopyState::Ready;
        }
    }

    /// Updates the scroll lock from the chat list's relative vertical offset
    /// (0.0 = top, 1.0 = bottom).
    pub fn update_scroll(&mut self, relative_y: f32) {
        let locked = relative_y.is_finite() && relative_y < FOLLOW_THRESHOLD;
        if locked != self.scroll_locked {
            tracing::debug!(locked, "scroll lock changed");
        }
        self.scroll_locked = locked;
    }

    fn placeholder_index(&self, turn: TurnId) -> Option<usize> {
        self.bubbles
            .iter()
            .position(|b| b.id == turn && b.role == Role::Assistant && b.phase == Phase::Loading)
    }

    fn allocate_id(&mut self) -> TurnId {
        let id = TurnId(self.next_id);
        self.next_id += 1;
        id
    }

    fn transition(&mut self, next: ConversationState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "conversation state");
        }
        self.state = next;
    }

    fn persist(&mut self) {
        let transcript = self.transcript();
        self.persistence.save(&transcript);
    }
}

fn find_reply(bubbles: &mut [Bubble], turn: TurnId) -> Option<&mut Bubble> {
    bubbles
        .iter_mut()
        .find(|b| b.id == turn && b.role == Role::Assistant)
}
